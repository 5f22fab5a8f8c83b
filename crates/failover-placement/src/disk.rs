//! Physical disk and its allocation counters.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::diagnostics::RejectReason;

/// Upper bound of any per-mille weight.
pub const MAX_WEIGHT: u32 = 1000;

/// RAID level and speed class of a physical disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiskType {
    #[serde(rename = "RAID1_7200")]
    Raid1_7200,
    #[serde(rename = "RAID1_10000")]
    Raid1_10000,
    #[serde(rename = "RAID1_15000")]
    Raid1_15000,
    #[serde(rename = "RAID1_SSD")]
    Raid1Ssd,
}

impl Display for DiskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiskType::Raid1_7200 => "RAID1_7200",
            DiskType::Raid1_10000 => "RAID1_10000",
            DiskType::Raid1_15000 => "RAID1_15000",
            DiskType::Raid1Ssd => "RAID1_SSD",
        };
        f.write_str(name)
    }
}

/// Physical disk of a host.
///
/// Capacity is measured in extents (fixed-size allocation units), load in per-mille weight of the disk IO budget.
/// Allocations made for primary and secondary copies of virtual disks share the same counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disk {
    /// Device name, unique within the host.
    pub device: String,
    pub disk_type: DiskType,
    /// Capacity in extents.
    pub extents: u64,

    allocated_extents: u64,
    allocated_weight: u32,
}

/// Disk counters captured by [`Disk::push`], consumed by [`Disk::pop`].
#[must_use]
#[derive(Debug)]
pub(crate) struct DiskReservation {
    prev_extents: u64,
    prev_weight: u32,
    extents: u64,
    weight: u32,
}

impl Disk {
    /// Creates disk with no allocations.
    pub fn new(device: &str, disk_type: DiskType, extents: u64) -> Self {
        Self {
            device: device.to_string(),
            disk_type,
            extents,
            allocated_extents: 0,
            allocated_weight: 0,
        }
    }

    pub fn allocated_extents(&self) -> u64 {
        self.allocated_extents
    }

    pub fn allocated_weight(&self) -> u32 {
        self.allocated_weight
    }

    pub fn available_extents(&self) -> u64 {
        self.extents - self.allocated_extents
    }

    /// Checks if a virtual disk with the given requirements currently fits on this disk.
    pub fn can_allocate(&self, disk_type: DiskType, extents: u64, weight: u32) -> Result<(), RejectReason> {
        if self.disk_type != disk_type {
            return Err(RejectReason::DiskType);
        }
        if self.allocated_extents + extents > self.extents {
            return Err(RejectReason::DiskExtents);
        }
        if self.allocated_weight + weight > MAX_WEIGHT {
            return Err(RejectReason::DiskWeight);
        }
        Ok(())
    }

    /// Returns true if both disks would accept exactly the same future allocations.
    pub(crate) fn is_equivalent(&self, other: &Disk) -> bool {
        self.disk_type == other.disk_type
            && self.available_extents() == other.available_extents()
            && self.allocated_weight == other.allocated_weight
    }

    pub(crate) fn push(&mut self, extents: u64, weight: u32) -> DiskReservation {
        let reservation = DiskReservation {
            prev_extents: self.allocated_extents,
            prev_weight: self.allocated_weight,
            extents,
            weight,
        };
        self.allocated_extents += extents;
        self.allocated_weight += weight;
        reservation
    }

    pub(crate) fn pop(&mut self, reservation: DiskReservation) {
        debug_assert_eq!(
            self.allocated_extents,
            reservation.prev_extents + reservation.extents,
            "unbalanced extent allocation on disk {}",
            self.device
        );
        debug_assert_eq!(
            self.allocated_weight,
            reservation.prev_weight + reservation.weight,
            "unbalanced weight allocation on disk {}",
            self.device
        );
        self.allocated_extents = reservation.prev_extents;
        self.allocated_weight = reservation.prev_weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_allocate() {
        let mut disk = Disk::new("sda", DiskType::Raid1_7200, 1000);
        assert_eq!(disk.can_allocate(DiskType::Raid1_10000, 1, 1), Err(RejectReason::DiskType));
        assert_eq!(disk.can_allocate(DiskType::Raid1_7200, 1001, 1), Err(RejectReason::DiskExtents));
        assert_eq!(disk.can_allocate(DiskType::Raid1_7200, 1000, 1000), Ok(()));

        let reservation = disk.push(600, 700);
        assert_eq!(disk.available_extents(), 400);
        assert_eq!(disk.can_allocate(DiskType::Raid1_7200, 400, 301), Err(RejectReason::DiskWeight));
        assert_eq!(disk.can_allocate(DiskType::Raid1_7200, 400, 300), Ok(()));
        disk.pop(reservation);
        assert_eq!(disk, Disk::new("sda", DiskType::Raid1_7200, 1000));
    }

    #[test]
    fn test_nested_push_pop() {
        let mut disk = Disk::new("sdb", DiskType::Raid1Ssd, 100);
        let outer = disk.push(10, 100);
        let inner = disk.push(20, 200);
        assert_eq!(disk.allocated_extents(), 30);
        assert_eq!(disk.allocated_weight(), 300);
        disk.pop(inner);
        assert_eq!(disk.allocated_extents(), 10);
        disk.pop(outer);
        assert_eq!(disk.allocated_extents(), 0);
        assert_eq!(disk.allocated_weight(), 0);
    }

    #[test]
    fn test_equivalence() {
        let mut a = Disk::new("sda", DiskType::Raid1_7200, 1000);
        let b = Disk::new("sdb", DiskType::Raid1_7200, 1000);
        let c = Disk::new("sdc", DiskType::Raid1_7200, 2000);
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
        let _reservation = a.push(0, 10);
        assert!(!a.is_equivalent(&b));
    }
}
