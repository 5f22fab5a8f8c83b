//! Backtracking search of a failover-safe placement.
//!
//! Virtual servers are placed one by one in four nested steps: primary host, primary disks, secondary host and
//! secondary disks. Each step tries every candidate in turn: it checks the candidate against the current allocation
//! state, commits the allocation, descends into the next step and reverts the allocation before trying the next
//! candidate. Every push of an allocation is therefore matched by exactly one pop in the same frame, and host and
//! disk counters are back to their initial values whenever the search returns.
//!
//! Hosts and virtual servers live in flat vectors owned by the solver and refer to each other by index.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::assignment::{Assignment, DiskPlacement, ServerPlacement};
use crate::config::{SearchMode, SolverConfig};
use crate::diagnostics::{Diagnostics, Phase, RejectReason};
use crate::disk::DiskType;
use crate::host::Host;
use crate::inventory::Inventory;
use crate::ordering::{host_order, server_order};
use crate::virtual_server::VirtualServer;

/// Result of a solver run.
#[derive(Clone, Debug, Serialize)]
pub struct SearchReport {
    pub mode: SearchMode,
    /// Number of complete placements found. At most one in first-match mode.
    pub solutions: u64,
    /// The first complete placement found.
    pub assignment: Option<Assignment>,
    pub diagnostics: Diagnostics,
    pub elapsed: Duration,
}

impl SearchReport {
    /// Returns true if at least one placement exists.
    pub fn is_feasible(&self) -> bool {
        self.solutions > 0
    }
}

type Flow = ControlFlow<()>;

#[cfg(test)]
type Checkpoint = Vec<Host>;
#[cfg(not(test))]
type Checkpoint = ();

/// Exhaustive depth-first placement solver.
pub struct PlacementSolver {
    config: SolverConfig,
    hosts: Vec<Host>,
    servers: Vec<VirtualServer>,
    host_order: Vec<usize>,
    server_order: Vec<usize>,
    diagnostics: Diagnostics,
    solutions: u64,
    first: Option<Assignment>,
}

impl PlacementSolver {
    /// Creates solver for the given inventory.
    pub fn new(inventory: Inventory, config: SolverConfig) -> Self {
        let (mut hosts, mut servers) = inventory.into_parts();
        let pool_size = hosts.len();
        for host in hosts.iter_mut() {
            host.reset(pool_size);
        }
        for server in servers.iter_mut() {
            server.selected_primary_host = None;
            server.selected_secondary_host = None;
            for disk in server.disks.iter_mut() {
                disk.selected_primary_disk = None;
                disk.selected_secondary_disk = None;
            }
        }
        let (host_order, server_order) = if config.sort_inventory {
            (host_order(&hosts), server_order(&servers))
        } else {
            ((0..hosts.len()).collect(), (0..servers.len()).collect())
        };
        Self {
            config,
            hosts,
            servers,
            host_order,
            server_order,
            diagnostics: Diagnostics::new(),
            solutions: 0,
            first: None,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Returns hosts with their current allocation state, in inventory order.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Returns virtual servers with their current selections, in inventory order.
    pub fn virtual_servers(&self) -> &[VirtualServer] {
        &self.servers
    }

    /// Runs the search from scratch.
    ///
    /// The solver can be run repeatedly: allocation state is fully restored when the search returns.
    pub fn solve(&mut self) -> SearchReport {
        let start = Instant::now();
        self.diagnostics = Diagnostics::new();
        self.solutions = 0;
        self.first = None;

        info!(
            "searching placement of {} virtual servers on {} hosts ({:?})",
            self.servers.len(),
            self.hosts.len(),
            self.config.mode
        );
        let _ = self.place_server(0);

        let report = SearchReport {
            mode: self.config.mode,
            solutions: self.solutions,
            assignment: self.first.take(),
            diagnostics: std::mem::take(&mut self.diagnostics),
            elapsed: start.elapsed(),
        };
        if report.is_feasible() {
            info!(
                "found {} placement(s) in {:.3}s, explored {} candidates",
                report.solutions,
                report.elapsed.as_secs_f64(),
                report.diagnostics.explored()
            );
        } else {
            warn!(
                "no placement exists, explored {} candidates and rejected {} in {:.3}s",
                report.diagnostics.explored(),
                report.diagnostics.total_rejected(),
                report.elapsed.as_secs_f64()
            );
        }
        debug!("search diagnostics:\n{}", report.diagnostics);
        report
    }

    /// Selects primary host of the virtual server at position `pos` of the search order.
    fn place_server(&mut self, pos: usize) -> Flow {
        if pos == self.server_order.len() {
            return self.on_solution();
        }
        let server_idx = self.server_order[pos];
        for order_pos in 0..self.host_order.len() {
            let host_idx = self.host_order[order_pos];
            if let Err(reason) = self.hosts[host_idx].can_host_primary(&self.servers[server_idx]) {
                self.diagnostics.reject(Phase::PrimaryHost, reason);
                continue;
            }
            self.on_accepted(Phase::PrimaryHost, pos);
            if pos == 0 {
                debug!(
                    "trying {} on primary {}",
                    self.servers[server_idx].hostname, self.hosts[host_idx].hostname
                );
            }

            let checkpoint = self.checkpoint();
            let reservation = self.hosts[host_idx].push_primary(&self.servers[server_idx]);
            self.servers[server_idx].selected_primary_host = Some(host_idx);
            let flow = self.place_primary_disk(pos, host_idx, 0);
            self.servers[server_idx].selected_primary_host = None;
            self.hosts[host_idx].pop_primary(reservation);
            self.assert_restored(checkpoint);

            if flow.is_break() {
                return flow;
            }
        }
        Flow::Continue(())
    }

    /// Maps virtual disk `disk_pos` of the current virtual server onto a disk of its primary host.
    fn place_primary_disk(&mut self, pos: usize, host_idx: usize, disk_pos: usize) -> Flow {
        let server_idx = self.server_order[pos];
        if disk_pos == self.servers[server_idx].disks.len() {
            return self.place_secondary(pos, host_idx);
        }
        let vdisk = &self.servers[server_idx].disks[disk_pos];
        let (disk_type, extents, weight) = (vdisk.primary_type, vdisk.extents, vdisk.primary_weight);

        for disk_idx in 0..self.hosts[host_idx].disks.len() {
            if let Err(reason) = self.check_disk(host_idx, disk_idx, disk_type, extents, weight) {
                self.diagnostics.reject(Phase::PrimaryDisk, reason);
                continue;
            }
            self.on_accepted(Phase::PrimaryDisk, pos);

            let checkpoint = self.checkpoint();
            let reservation = self.hosts[host_idx].disks[disk_idx].push(extents, weight);
            self.servers[server_idx].disks[disk_pos].selected_primary_disk = Some(disk_idx);
            let flow = self.place_primary_disk(pos, host_idx, disk_pos + 1);
            self.servers[server_idx].disks[disk_pos].selected_primary_disk = None;
            self.hosts[host_idx].disks[disk_idx].pop(reservation);
            self.assert_restored(checkpoint);

            if flow.is_break() {
                return flow;
            }
        }
        Flow::Continue(())
    }

    /// Selects secondary host of the current virtual server, whose primary is `primary_idx`.
    fn place_secondary(&mut self, pos: usize, primary_idx: usize) -> Flow {
        let server_idx = self.server_order[pos];
        for order_pos in 0..self.host_order.len() {
            let host_idx = self.host_order[order_pos];
            if host_idx == primary_idx {
                continue;
            }
            if let Err(reason) = self.hosts[host_idx].can_host_secondary(&self.servers[server_idx], primary_idx) {
                self.diagnostics.reject(Phase::SecondaryHost, reason);
                continue;
            }
            self.on_accepted(Phase::SecondaryHost, pos);

            let checkpoint = self.checkpoint();
            let reservation = self.hosts[host_idx].push_secondary(&self.servers[server_idx], primary_idx);
            self.servers[server_idx].selected_secondary_host = Some(host_idx);
            let flow = self.place_secondary_disk(pos, host_idx, 0);
            self.servers[server_idx].selected_secondary_host = None;
            self.hosts[host_idx].pop_secondary(reservation);
            self.assert_restored(checkpoint);

            if flow.is_break() {
                return flow;
            }
        }
        Flow::Continue(())
    }

    /// Maps virtual disk `disk_pos` of the current virtual server onto a disk of its secondary host.
    fn place_secondary_disk(&mut self, pos: usize, host_idx: usize, disk_pos: usize) -> Flow {
        let server_idx = self.server_order[pos];
        if disk_pos == self.servers[server_idx].disks.len() {
            return self.place_server(pos + 1);
        }
        let vdisk = &self.servers[server_idx].disks[disk_pos];
        let (disk_type, extents, weight) = (vdisk.secondary_type, vdisk.extents, vdisk.secondary_weight);

        for disk_idx in 0..self.hosts[host_idx].disks.len() {
            if let Err(reason) = self.check_disk(host_idx, disk_idx, disk_type, extents, weight) {
                self.diagnostics.reject(Phase::SecondaryDisk, reason);
                continue;
            }
            self.on_accepted(Phase::SecondaryDisk, pos);

            let checkpoint = self.checkpoint();
            let reservation = self.hosts[host_idx].disks[disk_idx].push(extents, weight);
            self.servers[server_idx].disks[disk_pos].selected_secondary_disk = Some(disk_idx);
            let flow = self.place_secondary_disk(pos, host_idx, disk_pos + 1);
            self.servers[server_idx].disks[disk_pos].selected_secondary_disk = None;
            self.hosts[host_idx].disks[disk_idx].pop(reservation);
            self.assert_restored(checkpoint);

            if flow.is_break() {
                return flow;
            }
        }
        Flow::Continue(())
    }

    fn check_disk(
        &self,
        host_idx: usize,
        disk_idx: usize,
        disk_type: DiskType,
        extents: u64,
        weight: u32,
    ) -> Result<(), RejectReason> {
        let disks = &self.hosts[host_idx].disks;
        let disk = &disks[disk_idx];
        disk.can_allocate(disk_type, extents, weight)?;
        // an earlier disk in the same state has already been explored with an identical subtree
        if self.prune_symmetric() && disks[..disk_idx].iter().any(|earlier| earlier.is_equivalent(disk)) {
            return Err(RejectReason::Symmetry);
        }
        Ok(())
    }

    fn prune_symmetric(&self) -> bool {
        self.config.symmetry_pruning && self.config.mode == SearchMode::FirstMatch
    }

    fn on_accepted(&mut self, phase: Phase, pos: usize) {
        self.diagnostics.accept(phase);
        let period = self.config.progress_period;
        if period > 0 && self.diagnostics.explored() % period == 0 {
            debug!(
                "explored {} candidates, depth {}/{}, {} solution(s) so far",
                self.diagnostics.explored(),
                pos + 1,
                self.server_order.len(),
                self.solutions
            );
        }
    }

    fn on_solution(&mut self) -> Flow {
        self.solutions += 1;
        if self.first.is_none() {
            self.first = self.snapshot();
            debug!("found first placement after {} candidates", self.diagnostics.explored());
        }
        match self.config.mode {
            SearchMode::FirstMatch => Flow::Break(()),
            SearchMode::EnumerateAll => Flow::Continue(()),
        }
    }

    /// Builds assignment from the current selections. Returns `None` if some selection is missing.
    fn snapshot(&self) -> Option<Assignment> {
        let servers = self
            .servers
            .iter()
            .map(|server| {
                let primary = &self.hosts[server.selected_primary_host?];
                let secondary = &self.hosts[server.selected_secondary_host?];
                let disks = server
                    .disks
                    .iter()
                    .map(|vdisk| {
                        Some(DiskPlacement {
                            device: vdisk.device.clone(),
                            primary_disk: primary.disks[vdisk.selected_primary_disk?].device.clone(),
                            secondary_disk: secondary.disks[vdisk.selected_secondary_disk?].device.clone(),
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(ServerPlacement {
                    server: server.hostname.clone(),
                    primary_host: primary.hostname.clone(),
                    secondary_host: secondary.hostname.clone(),
                    disks,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Assignment { servers })
    }

    #[cfg(test)]
    fn checkpoint(&self) -> Checkpoint {
        self.hosts.clone()
    }

    #[cfg(not(test))]
    fn checkpoint(&self) -> Checkpoint {}

    #[cfg(test)]
    fn assert_restored(&self, checkpoint: Checkpoint) {
        assert_eq!(self.hosts, checkpoint, "allocation state is not restored after backtracking");
    }

    #[cfg(not(test))]
    fn assert_restored(&self, _checkpoint: Checkpoint) {}
}

/// Searches placement of the inventory with the given configuration.
pub fn find_placement(inventory: &Inventory, config: &SolverConfig) -> SearchReport {
    PlacementSolver::new(inventory.clone(), config.clone()).solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::check_assignment;
    use crate::disk::Disk;
    use crate::virtual_server::VirtualDisk;

    fn two_hosts() -> Vec<Host> {
        vec![
            Host::new("h1", 8, 16384).disk(Disk::new("sda", DiskType::Raid1_7200, 1000)),
            Host::new("h2", 4, 8192).disk(Disk::new("sda", DiskType::Raid1_7200, 1000)),
        ]
    }

    fn server(name: &str, ram: u64) -> VirtualServer {
        VirtualServer::new(name, 2, 500, ram, ram).disk(VirtualDisk::new("xvda", 200, DiskType::Raid1_7200, 500))
    }

    #[test]
    fn test_state_restored_after_first_match() {
        let inventory = Inventory::new(two_hosts(), vec![server("vs1", 4096), server("vs2", 2048)]).unwrap();
        let mut solver = PlacementSolver::new(inventory.clone(), SolverConfig::default());
        let pristine = solver.hosts().to_vec();

        let report = solver.solve();
        assert!(report.is_feasible());
        assert_eq!(report.solutions, 1);
        assert_eq!(solver.hosts(), pristine.as_slice());
        for server in solver.virtual_servers() {
            assert_eq!(server.selected_primary_host(), None);
            assert_eq!(server.selected_secondary_host(), None);
            assert!(server.disks.iter().all(|disk| disk.selected_primary_disk().is_none()));
        }
        check_assignment(&inventory, report.assignment.as_ref().unwrap()).unwrap();
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let inventory = Inventory::new(two_hosts(), vec![server("vs1", 4096), server("vs2", 2048)]).unwrap();
        let mut solver = PlacementSolver::new(inventory, SolverConfig::default());
        let first = solver.solve();
        let second = solver.solve();
        assert_eq!(first.assignment, second.assignment);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_enumerate_all_restores_state() {
        let inventory = Inventory::new(two_hosts(), vec![server("vs1", 4096), server("vs2", 2048)]).unwrap();
        let mut solver = PlacementSolver::new(inventory, SolverConfig::default().mode(SearchMode::EnumerateAll));
        let pristine = solver.hosts().to_vec();
        let report = solver.solve();
        // each server independently picks h1 or h2 as primary, the other one as secondary
        assert_eq!(report.solutions, 4);
        assert_eq!(solver.hosts(), pristine.as_slice());
    }

    #[test]
    fn test_symmetric_disks_are_pruned_in_first_match_only() {
        let hosts = vec![
            Host::new("h1", 8, 16384)
                .disk(Disk::new("sda", DiskType::Raid1_7200, 1000))
                .disk(Disk::new("sdb", DiskType::Raid1_7200, 1000)),
            Host::new("h2", 8, 16384).disk(Disk::new("sda", DiskType::Raid1_7200, 1000)),
        ];
        let servers = vec![server("vs1", 1024).primary_pin("h1")];
        let inventory = Inventory::new(hosts, servers).unwrap();

        let all = find_placement(&inventory, &SolverConfig::default().mode(SearchMode::EnumerateAll));
        assert_eq!(all.solutions, 2);
        assert_eq!(all.diagnostics.rejected_for(RejectReason::Symmetry), 0);

        // the only solution found first uses sda, so sdb is never reached; make sda unusable to force a retry
        let hosts = vec![
            Host::new("h1", 8, 16384)
                .disk(Disk::new("sda", DiskType::Raid1_7200, 1000))
                .disk(Disk::new("sdb", DiskType::Raid1_7200, 1000)),
            Host::new("h2", 8, 16384).disk(Disk::new("sda", DiskType::Raid1Ssd, 1000)),
        ];
        let servers = vec![server("vs1", 1024).primary_pin("h1")];
        let inventory = Inventory::new(hosts, servers).unwrap();
        let first = find_placement(&inventory, &SolverConfig::default());
        assert!(!first.is_feasible());
        assert_eq!(first.diagnostics.rejected(Phase::PrimaryDisk, RejectReason::Symmetry), 1);
        assert_eq!(first.diagnostics.rejected(Phase::SecondaryDisk, RejectReason::DiskType), 1);

        let unpruned = find_placement(&inventory, &SolverConfig::default().symmetry_pruning(false));
        assert!(!unpruned.is_feasible());
        assert_eq!(unpruned.diagnostics.rejected_for(RejectReason::Symmetry), 0);
        assert_eq!(unpruned.diagnostics.rejected(Phase::SecondaryDisk, RejectReason::DiskType), 2);
    }

    #[test]
    fn test_secondary_ram_accounts_single_failure() {
        // Both servers fail over to h3. Their primaries differ, so h3 needs only 6144 MiB for the worst failure.
        let hosts = vec![
            Host::new("h1", 4, 6144),
            Host::new("h2", 4, 6144),
            Host::new("h3", 4, 6144),
        ];
        let servers = vec![
            VirtualServer::new("vs1", 1, 100, 6144, 6144)
                .primary_pin("h1")
                .secondary_pin("h3"),
            VirtualServer::new("vs2", 1, 100, 6144, 6144)
                .primary_pin("h2")
                .secondary_pin("h3"),
        ];
        let inventory = Inventory::new(hosts, servers).unwrap();
        let report = find_placement(&inventory, &SolverConfig::default());
        assert!(report.is_feasible());
        check_assignment(&inventory, report.assignment.as_ref().unwrap()).unwrap();
    }

    #[test]
    fn test_secondary_ram_rejected_for_same_failure() {
        // Both servers run on h1 and fail over to h3, which can't absorb 2 * 4096 MiB.
        let hosts = vec![
            Host::new("h1", 4, 8192),
            Host::new("h2", 4, 1024),
            Host::new("h3", 4, 6144),
        ];
        let servers = vec![
            VirtualServer::new("vs1", 1, 100, 4096, 4096)
                .primary_pin("h1")
                .secondary_pin("h3"),
            VirtualServer::new("vs2", 1, 100, 4096, 4096)
                .primary_pin("h1")
                .secondary_pin("h3"),
        ];
        let inventory = Inventory::new(hosts, servers).unwrap();
        let report = find_placement(&inventory, &SolverConfig::default());
        assert!(!report.is_feasible());
        assert!(report.diagnostics.rejected(Phase::SecondaryHost, RejectReason::Ram) > 0);
    }

    #[test]
    fn test_empty_inventory() {
        let report = find_placement(&Inventory::new(vec![], vec![]).unwrap(), &SolverConfig::default());
        assert_eq!(report.solutions, 1);
        assert_eq!(report.assignment, Some(Assignment::default()));
    }

    #[test]
    fn test_single_host_has_no_failover() {
        let inventory = Inventory::new(vec![Host::new("h1", 8, 16384)], vec![VirtualServer::new("vs", 1, 100, 1, 1)])
            .unwrap();
        let report = find_placement(&inventory, &SolverConfig::default());
        assert!(!report.is_feasible());
        assert_eq!(report.diagnostics.accepted(Phase::PrimaryHost), 1);
        assert_eq!(report.diagnostics.accepted(Phase::SecondaryHost), 0);
    }
}
