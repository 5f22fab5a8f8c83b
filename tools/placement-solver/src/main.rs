use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use colored::*;

use failover_placement::{check_assignment, Inventory, PlacementSolver, SearchMode, SolverConfig};

fn init_logger() {
    use env_logger::Builder;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Stop at the first placement found
    FirstMatch,
    /// Count all placements
    EnumerateAll,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::FirstMatch => SearchMode::FirstMatch,
            Mode::EnumerateAll => SearchMode::EnumerateAll,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Searches a failover-safe placement of virtual servers on hosts
struct Args {
    /// Path to YAML file with hosts and virtual servers
    #[arg(short, long)]
    inventory: PathBuf,

    /// Path to YAML file with solver configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search mode (overrides the config)
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Disable skipping of equivalent disks
    #[arg(long, default_value_t = false)]
    no_symmetry_pruning: bool,

    /// Check the found placement independently of the solver
    #[arg(long, default_value_t = false)]
    verify: bool,

    /// Path to produced JSON file with search report
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn report_file_name(stem: &str) -> String {
    format!("{}-placement.json", stem)
}

fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let inventory = Inventory::from_file(&args.inventory)?;
    let mut config = match &args.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    if let Some(mode) = args.mode {
        config = config.mode(mode.into());
    }
    if args.no_symmetry_pruning {
        config = config.symmetry_pruning(false);
    }

    let mut solver = PlacementSolver::new(inventory.clone(), config);
    let report = solver.solve();

    match &report.assignment {
        Some(assignment) => {
            if args.verify {
                check_assignment(&inventory, assignment)?;
            }
            println!(
                "{}",
                format!(
                    "placement found ({} solution(s), {:.3}s)",
                    report.solutions,
                    report.elapsed.as_secs_f64()
                )
                .green()
            );
            print!("{}", assignment);
        }
        None => println!(
            "{}",
            format!("no placement exists ({:.3}s)", report.elapsed.as_secs_f64()).red()
        ),
    }
    print!("{}", report.diagnostics);

    let output = args.output.unwrap_or_else(|| {
        let stem = args
            .inventory
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("inventory");
        args.inventory.with_file_name(report_file_name(stem))
    });
    std::fs::File::create(&output)?.write_all(serde_json::to_string_pretty(&report)?.as_bytes())?;
    log::info!("report written to {}", output.display());

    Ok(report.is_feasible())
}

fn main() -> ExitCode {
    init_logger();
    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_report_file_name_keeps_dotted_stem() {
        let inventory = Path::new("configs/fleet.v2.yaml");
        let stem = inventory.file_stem().and_then(|stem| stem.to_str()).unwrap();
        assert_eq!(
            inventory.with_file_name(report_file_name(stem)),
            Path::new("configs/fleet.v2-placement.json")
        );
    }
}
