//! Search diagnostics: why candidates were rejected and how much of the tree was explored.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use enum_iterator::IntoEnumIterator;
use serde::Serialize;

/// Point of the search at which a candidate is considered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, IntoEnumIterator)]
pub enum Phase {
    /// Selecting the primary host of a virtual server.
    PrimaryHost,
    /// Mapping a virtual disk onto a physical disk of the primary host.
    PrimaryDisk,
    /// Selecting the secondary (failover) host of a virtual server.
    SecondaryHost,
    /// Mapping a virtual disk onto a physical disk of the secondary host.
    SecondaryDisk,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::PrimaryHost => "primary host",
            Phase::PrimaryDisk => "primary disk",
            Phase::SecondaryHost => "secondary host",
            Phase::SecondaryDisk => "secondary disk",
        };
        f.write_str(name)
    }
}

/// Reason for rejecting a candidate host or disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, IntoEnumIterator)]
pub enum RejectReason {
    /// Virtual server is pinned to another host.
    PinMismatch,
    /// Host processor is older than the required minimum.
    ProcessorType,
    /// Host processor architecture differs from the required one.
    ProcessorArchitecture,
    /// Host processor is slower than the required minimum.
    ProcessorSpeed,
    /// Host does not have enough cores to run the virtual server at all.
    CoreCount,
    /// Host processor weight budget would be exceeded.
    ProcessorWeight,
    /// Host RAM would be exceeded.
    Ram,
    /// Physical disk is of another type.
    DiskType,
    /// Physical disk does not have enough free extents.
    DiskExtents,
    /// Physical disk weight budget would be exceeded.
    DiskWeight,
    /// Physical disk is equivalent to an already explored one.
    Symmetry,
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RejectReason::PinMismatch => "pin mismatch",
            RejectReason::ProcessorType => "processor type",
            RejectReason::ProcessorArchitecture => "processor architecture",
            RejectReason::ProcessorSpeed => "processor speed",
            RejectReason::CoreCount => "core count",
            RejectReason::ProcessorWeight => "processor weight exceeded",
            RejectReason::Ram => "ram exceeded",
            RejectReason::DiskType => "disk type",
            RejectReason::DiskExtents => "disk extents exceeded",
            RejectReason::DiskWeight => "disk weight exceeded",
            RejectReason::Symmetry => "symmetry pruned",
        };
        f.write_str(name)
    }
}

/// Counters collected during a single solver run.
///
/// Counters are telemetry only: they never influence the search itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Number of rejected candidates per phase and reason.
    pub rejected: BTreeMap<Phase, BTreeMap<RejectReason, u64>>,
    /// Number of accepted (and therefore explored) candidates per phase.
    pub accepted: BTreeMap<Phase, u64>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn reject(&mut self, phase: Phase, reason: RejectReason) {
        *self.rejected.entry(phase).or_default().entry(reason).or_insert(0) += 1;
    }

    pub(crate) fn accept(&mut self, phase: Phase) {
        *self.accepted.entry(phase).or_insert(0) += 1;
    }

    /// Returns the number of candidates rejected in the given phase for the given reason.
    pub fn rejected(&self, phase: Phase, reason: RejectReason) -> u64 {
        self.rejected
            .get(&phase)
            .and_then(|reasons| reasons.get(&reason))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of candidates rejected for the given reason in any phase.
    pub fn rejected_for(&self, reason: RejectReason) -> u64 {
        self.rejected
            .values()
            .filter_map(|reasons| reasons.get(&reason))
            .sum()
    }

    /// Returns the total number of rejected candidates.
    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().flat_map(|reasons| reasons.values()).sum()
    }

    /// Returns the number of accepted candidates in the given phase.
    pub fn accepted(&self, phase: Phase) -> u64 {
        self.accepted.get(&phase).copied().unwrap_or(0)
    }

    /// Returns the total number of accepted candidates, i.e. the number of explored search nodes.
    pub fn explored(&self) -> u64 {
        self.accepted.values().sum()
    }

    /// Adds counters of another run to this one.
    pub fn combine(&mut self, other: Diagnostics) {
        for (phase, reasons) in other.rejected {
            let entry = self.rejected.entry(phase).or_default();
            for (reason, cnt) in reasons {
                *entry.entry(reason).or_insert(0) += cnt;
            }
        }
        for (phase, cnt) in other.accepted {
            *self.accepted.entry(phase).or_insert(0) += cnt;
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "explored {} candidates, rejected {}",
            self.explored(),
            self.total_rejected()
        )?;
        for phase in Phase::into_enum_iter() {
            let accepted = self.accepted(phase);
            let rejected: Vec<String> = RejectReason::into_enum_iter()
                .filter_map(|reason| match self.rejected(phase, reason) {
                    0 => None,
                    cnt => Some(format!("{} {}", cnt, reason)),
                })
                .collect();
            if accepted == 0 && rejected.is_empty() {
                continue;
            }
            write!(f, "  {:<15} accepted {:>10}", phase, accepted)?;
            if !rejected.is_empty() {
                write!(f, ", rejected: {}", rejected.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut diag = Diagnostics::new();
        diag.reject(Phase::PrimaryHost, RejectReason::Ram);
        diag.reject(Phase::PrimaryHost, RejectReason::Ram);
        diag.reject(Phase::SecondaryHost, RejectReason::Ram);
        diag.reject(Phase::PrimaryDisk, RejectReason::DiskType);
        diag.accept(Phase::PrimaryHost);

        assert_eq!(diag.rejected(Phase::PrimaryHost, RejectReason::Ram), 2);
        assert_eq!(diag.rejected(Phase::SecondaryDisk, RejectReason::Ram), 0);
        assert_eq!(diag.rejected_for(RejectReason::Ram), 3);
        assert_eq!(diag.total_rejected(), 4);
        assert_eq!(diag.explored(), 1);
    }

    #[test]
    fn test_combine() {
        let mut first = Diagnostics::new();
        first.reject(Phase::PrimaryDisk, RejectReason::DiskWeight);
        first.accept(Phase::PrimaryDisk);
        let mut second = Diagnostics::new();
        second.reject(Phase::PrimaryDisk, RejectReason::DiskWeight);
        second.reject(Phase::SecondaryDisk, RejectReason::Symmetry);
        second.accept(Phase::SecondaryHost);

        first.combine(second);
        assert_eq!(first.rejected(Phase::PrimaryDisk, RejectReason::DiskWeight), 2);
        assert_eq!(first.rejected(Phase::SecondaryDisk, RejectReason::Symmetry), 1);
        assert_eq!(first.explored(), 2);
    }

    #[test]
    fn test_display_skips_empty_phases() {
        let mut diag = Diagnostics::new();
        diag.reject(Phase::SecondaryHost, RejectReason::PinMismatch);
        let text = diag.to_string();
        assert!(text.contains("secondary host"));
        assert!(text.contains("1 pin mismatch"));
        assert!(!text.contains("primary disk"));
    }
}
