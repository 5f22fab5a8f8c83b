//! Physical host: capacity properties and allocation state.

use serde::{Deserialize, Serialize};

use crate::diagnostics::RejectReason;
use crate::disk::{Disk, MAX_WEIGHT};
use crate::virtual_server::VirtualServer;

/// Processor generation. Later variants are considered newer and compare greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessorType {
    Core2,
    Nehalem,
    Westmere,
    SandyBridge,
    IvyBridge,
    Haswell,
    Broadwell,
    Skylake,
    CascadeLake,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "i686")]
    I686,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "aarch64")]
    Aarch64,
}

/// Stores host properties (capacity) and state (resources allocated by the current partial placement).
///
/// Secondary RAM is tracked separately for every possible failed primary: the entry at index `p` holds the RAM this
/// host would have to provide if host `p` failed. Only one host is assumed to fail at a time, so the host must fit its
/// primary load plus the largest of these entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Host {
    pub hostname: String,
    pub rack: Option<String>,
    /// RAM capacity in MiB.
    pub ram: u64,
    pub processor_type: ProcessorType,
    pub architecture: Architecture,
    /// Processor speed in MHz.
    pub processor_speed: u32,
    pub cores: u32,
    pub disks: Vec<Disk>,

    allocated_processor_weight: u64,
    allocated_primary_ram: u64,
    allocated_secondary_ram: Vec<u64>,
    max_allocated_secondary_ram: u64,
}

/// Host counters captured by [`Host::push_primary`], consumed by [`Host::pop_primary`].
#[must_use]
#[derive(Debug)]
pub(crate) struct PrimaryReservation {
    prev_processor_weight: u64,
    prev_ram: u64,
    processor_weight: u64,
    ram: u64,
}

/// Host counters captured by [`Host::push_secondary`], consumed by [`Host::pop_secondary`].
#[must_use]
#[derive(Debug)]
pub(crate) struct SecondaryReservation {
    failed_primary: usize,
    prev_slot: u64,
    prev_max: u64,
    ram: u64,
}

impl Host {
    /// Creates host without disks.
    pub fn new(hostname: &str, cores: u32, ram: u64) -> Self {
        Self {
            hostname: hostname.to_string(),
            rack: None,
            ram,
            processor_type: ProcessorType::Core2,
            architecture: Architecture::X86_64,
            processor_speed: 0,
            cores,
            disks: Vec::new(),
            allocated_processor_weight: 0,
            allocated_primary_ram: 0,
            allocated_secondary_ram: Vec::new(),
            max_allocated_secondary_ram: 0,
        }
    }

    /// Adds physical disk.
    pub fn disk(mut self, disk: Disk) -> Self {
        self.disks.push(disk);
        self
    }

    /// Sets processor properties.
    pub fn processor(mut self, processor_type: ProcessorType, architecture: Architecture, speed: u32) -> Self {
        self.processor_type = processor_type;
        self.architecture = architecture;
        self.processor_speed = speed;
        self
    }

    pub fn rack(mut self, rack: &str) -> Self {
        self.rack = Some(rack.to_string());
        self
    }

    /// Total processor weight budget of the host.
    pub fn processor_capacity(&self) -> u64 {
        self.cores as u64 * MAX_WEIGHT as u64
    }

    /// Extents of the largest disk, used to order hosts by capacity.
    pub fn largest_disk_extents(&self) -> u64 {
        self.disks.iter().map(|disk| disk.extents).max().unwrap_or(0)
    }

    pub fn allocated_processor_weight(&self) -> u64 {
        self.allocated_processor_weight
    }

    pub fn allocated_primary_ram(&self) -> u64 {
        self.allocated_primary_ram
    }

    /// Returns the secondary RAM this host covers for the failure of the host with the given index.
    pub fn allocated_secondary_ram(&self, failed_primary: usize) -> u64 {
        self.allocated_secondary_ram.get(failed_primary).copied().unwrap_or(0)
    }

    pub fn max_allocated_secondary_ram(&self) -> u64 {
        self.max_allocated_secondary_ram
    }

    /// Clears allocation state and sizes per-failure counters for a pool of `pool_size` hosts.
    pub(crate) fn reset(&mut self, pool_size: usize) {
        self.allocated_processor_weight = 0;
        self.allocated_primary_ram = 0;
        self.allocated_secondary_ram = vec![0; pool_size];
        self.max_allocated_secondary_ram = 0;
    }

    /// Checks if the server can currently use this host as primary.
    pub fn can_host_primary(&self, server: &VirtualServer) -> Result<(), RejectReason> {
        if let Some(pin) = &server.primary_pin {
            if *pin != self.hostname {
                return Err(RejectReason::PinMismatch);
            }
        }
        self.check_processor(server)?;
        if let Some(speed) = server.minimum_processor_speed {
            if self.processor_speed < speed {
                return Err(RejectReason::ProcessorSpeed);
            }
        }
        if self.allocated_processor_weight + server.weighted_cores() > self.processor_capacity() {
            return Err(RejectReason::ProcessorWeight);
        }
        if self.ram < self.allocated_primary_ram + server.primary_ram + self.max_allocated_secondary_ram {
            return Err(RejectReason::Ram);
        }
        Ok(())
    }

    /// Checks if the server can currently use this host as secondary for the primary host with the given index.
    ///
    /// Processor speed and weight are not checked: a failover only has to run the server, and only one primary
    /// fails at a time.
    pub fn can_host_secondary(&self, server: &VirtualServer, primary: usize) -> Result<(), RejectReason> {
        if let Some(pin) = &server.secondary_pin {
            if *pin != self.hostname {
                return Err(RejectReason::PinMismatch);
            }
        }
        self.check_processor(server)?;
        if self.cores < server.cores {
            return Err(RejectReason::CoreCount);
        }
        if self.ram < self.allocated_primary_ram + self.allocated_secondary_ram(primary) + server.secondary_ram {
            return Err(RejectReason::Ram);
        }
        Ok(())
    }

    fn check_processor(&self, server: &VirtualServer) -> Result<(), RejectReason> {
        if let Some(processor_type) = server.minimum_processor_type {
            if self.processor_type < processor_type {
                return Err(RejectReason::ProcessorType);
            }
        }
        if let Some(architecture) = server.required_architecture {
            if self.architecture != architecture {
                return Err(RejectReason::ProcessorArchitecture);
            }
        }
        Ok(())
    }

    pub(crate) fn push_primary(&mut self, server: &VirtualServer) -> PrimaryReservation {
        let reservation = PrimaryReservation {
            prev_processor_weight: self.allocated_processor_weight,
            prev_ram: self.allocated_primary_ram,
            processor_weight: server.weighted_cores(),
            ram: server.primary_ram,
        };
        self.allocated_processor_weight += reservation.processor_weight;
        self.allocated_primary_ram += reservation.ram;
        reservation
    }

    pub(crate) fn pop_primary(&mut self, reservation: PrimaryReservation) {
        debug_assert_eq!(
            self.allocated_processor_weight,
            reservation.prev_processor_weight + reservation.processor_weight,
            "unbalanced processor allocation on host {}",
            self.hostname
        );
        debug_assert_eq!(
            self.allocated_primary_ram,
            reservation.prev_ram + reservation.ram,
            "unbalanced primary ram allocation on host {}",
            self.hostname
        );
        self.allocated_processor_weight = reservation.prev_processor_weight;
        self.allocated_primary_ram = reservation.prev_ram;
    }

    pub(crate) fn push_secondary(&mut self, server: &VirtualServer, failed_primary: usize) -> SecondaryReservation {
        let reservation = SecondaryReservation {
            failed_primary,
            prev_slot: self.allocated_secondary_ram[failed_primary],
            prev_max: self.max_allocated_secondary_ram,
            ram: server.secondary_ram,
        };
        let slot = reservation.prev_slot + reservation.ram;
        self.allocated_secondary_ram[failed_primary] = slot;
        self.max_allocated_secondary_ram = self.max_allocated_secondary_ram.max(slot);
        reservation
    }

    pub(crate) fn pop_secondary(&mut self, reservation: SecondaryReservation) {
        let slot = &mut self.allocated_secondary_ram[reservation.failed_primary];
        debug_assert_eq!(
            *slot,
            reservation.prev_slot + reservation.ram,
            "unbalanced secondary ram allocation on host {}",
            self.hostname
        );
        *slot = reservation.prev_slot;
        self.max_allocated_secondary_ram = reservation.prev_max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskType;

    fn host() -> Host {
        let mut host = Host::new("h1", 4, 8192)
            .processor(ProcessorType::Haswell, Architecture::X86_64, 2400)
            .disk(Disk::new("sda", DiskType::Raid1_7200, 1000));
        host.reset(3);
        host
    }

    #[test]
    fn test_primary_checks() {
        let host = host();
        let server = VirtualServer::new("vs", 2, 500, 4096, 4096);
        assert_eq!(host.can_host_primary(&server), Ok(()));
        assert_eq!(
            host.can_host_primary(&server.clone().primary_pin("h2")),
            Err(RejectReason::PinMismatch)
        );
        assert_eq!(
            host.can_host_primary(&server.clone().processor(Some(ProcessorType::Skylake), None, None)),
            Err(RejectReason::ProcessorType)
        );
        assert_eq!(
            host.can_host_primary(&server.clone().processor(None, Some(Architecture::I686), None)),
            Err(RejectReason::ProcessorArchitecture)
        );
        assert_eq!(
            host.can_host_primary(&server.clone().processor(None, None, Some(3000))),
            Err(RejectReason::ProcessorSpeed)
        );
        assert_eq!(
            host.can_host_primary(&VirtualServer::new("vs", 5, 1000, 1, 1)),
            Err(RejectReason::ProcessorWeight)
        );
        assert_eq!(
            host.can_host_primary(&VirtualServer::new("vs", 1, 1, 8193, 1)),
            Err(RejectReason::Ram)
        );
    }

    #[test]
    fn test_secondary_ignores_speed_and_weight() {
        let mut host = host();
        let hog = VirtualServer::new("hog", 4, 1000, 1024, 1024);
        let _reservation = host.push_primary(&hog);
        let server = VirtualServer::new("vs", 4, 1000, 4096, 4096).processor(None, None, Some(9999));
        assert_eq!(host.can_host_primary(&server), Err(RejectReason::ProcessorSpeed));
        assert_eq!(host.can_host_secondary(&server, 0), Ok(()));
        assert_eq!(
            host.can_host_secondary(&VirtualServer::new("big", 8, 1, 1, 1), 0),
            Err(RejectReason::CoreCount)
        );
    }

    #[test]
    fn test_secondary_ram_is_tracked_per_failure() {
        let mut host = host();
        let server = VirtualServer::new("vs", 1, 100, 1024, 4096);

        let first = host.push_secondary(&server, 1);
        let second = host.push_secondary(&server, 2);
        assert_eq!(host.allocated_secondary_ram(1), 4096);
        assert_eq!(host.allocated_secondary_ram(2), 4096);
        assert_eq!(host.max_allocated_secondary_ram(), 4096);
        // Another server backed up for failed host 1 would need 8192 in that slot, which still fits.
        assert_eq!(host.can_host_secondary(&server, 1), Ok(()));
        // But no primary RAM is left once the worst failure is accounted for.
        assert_eq!(
            host.can_host_primary(&VirtualServer::new("p", 1, 1, 4097, 0)),
            Err(RejectReason::Ram)
        );

        host.pop_secondary(second);
        host.pop_secondary(first);
        assert_eq!(host, self::host());
    }

    #[test]
    fn test_secondary_max_is_restored_exactly() {
        let mut host = host();
        let small = VirtualServer::new("small", 1, 100, 0, 1000);
        let large = VirtualServer::new("large", 1, 100, 0, 3000);

        let outer = host.push_secondary(&large, 0);
        let inner = host.push_secondary(&small, 1);
        assert_eq!(host.max_allocated_secondary_ram(), 3000);
        host.pop_secondary(inner);
        assert_eq!(host.max_allocated_secondary_ram(), 3000);
        host.pop_secondary(outer);
        assert_eq!(host.max_allocated_secondary_ram(), 0);
    }
}
