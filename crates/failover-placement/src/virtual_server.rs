//! Placement requests: virtual servers and their virtual disks.

use crate::disk::DiskType;
use crate::host::{Architecture, ProcessorType};

/// Storage requirement of a virtual server.
///
/// Primary and secondary copies may require different disk types and weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualDisk {
    /// Device label inside the virtual server.
    pub device: String,
    /// Required size in extents, identical for both copies.
    pub extents: u64,
    pub primary_type: DiskType,
    pub primary_weight: u32,
    pub secondary_type: DiskType,
    pub secondary_weight: u32,

    pub(crate) selected_primary_disk: Option<usize>,
    pub(crate) selected_secondary_disk: Option<usize>,
}

impl VirtualDisk {
    /// Creates virtual disk with the same requirements for primary and secondary copies.
    pub fn new(device: &str, extents: u64, disk_type: DiskType, weight: u32) -> Self {
        Self {
            device: device.to_string(),
            extents,
            primary_type: disk_type,
            primary_weight: weight,
            secondary_type: disk_type,
            secondary_weight: weight,
            selected_primary_disk: None,
            selected_secondary_disk: None,
        }
    }

    /// Sets requirements for the secondary copy.
    pub fn secondary(mut self, disk_type: DiskType, weight: u32) -> Self {
        self.secondary_type = disk_type;
        self.secondary_weight = weight;
        self
    }

    /// Index of the physical disk currently holding the primary copy (on the selected primary host).
    pub fn selected_primary_disk(&self) -> Option<usize> {
        self.selected_primary_disk
    }

    /// Index of the physical disk currently holding the secondary copy (on the selected secondary host).
    pub fn selected_secondary_disk(&self) -> Option<usize> {
        self.selected_secondary_disk
    }
}

/// Virtual server to be placed on a primary and a secondary host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualServer {
    pub hostname: String,
    /// Name of the host which must be used as primary.
    pub primary_pin: Option<String>,
    /// Name of the host which must be used as secondary.
    pub secondary_pin: Option<String>,
    /// RAM in MiB reserved on the primary host.
    pub primary_ram: u64,
    /// RAM in MiB reserved on the secondary host in case the primary fails.
    pub secondary_ram: u64,
    pub minimum_processor_type: Option<ProcessorType>,
    pub required_architecture: Option<Architecture>,
    /// Minimum processor speed in MHz, checked on the primary host only.
    pub minimum_processor_speed: Option<u32>,
    pub cores: u32,
    /// Per-mille share of each core used by the server.
    pub processor_weight: u32,
    pub disks: Vec<VirtualDisk>,

    pub(crate) selected_primary_host: Option<usize>,
    pub(crate) selected_secondary_host: Option<usize>,
}

impl VirtualServer {
    /// Creates virtual server without disks, pins and processor requirements.
    pub fn new(hostname: &str, cores: u32, processor_weight: u32, primary_ram: u64, secondary_ram: u64) -> Self {
        Self {
            hostname: hostname.to_string(),
            primary_pin: None,
            secondary_pin: None,
            primary_ram,
            secondary_ram,
            minimum_processor_type: None,
            required_architecture: None,
            minimum_processor_speed: None,
            cores,
            processor_weight,
            disks: Vec::new(),
            selected_primary_host: None,
            selected_secondary_host: None,
        }
    }

    /// Adds virtual disk.
    pub fn disk(mut self, disk: VirtualDisk) -> Self {
        self.disks.push(disk);
        self
    }

    /// Pins the server to the given primary host.
    pub fn primary_pin(mut self, host: &str) -> Self {
        self.primary_pin = Some(host.to_string());
        self
    }

    /// Pins the server to the given secondary host.
    pub fn secondary_pin(mut self, host: &str) -> Self {
        self.secondary_pin = Some(host.to_string());
        self
    }

    /// Sets processor requirements.
    pub fn processor(
        mut self,
        minimum_type: Option<ProcessorType>,
        architecture: Option<Architecture>,
        minimum_speed: Option<u32>,
    ) -> Self {
        self.minimum_processor_type = minimum_type;
        self.required_architecture = architecture;
        self.minimum_processor_speed = minimum_speed;
        self
    }

    /// Processor weight reserved on the primary host across all cores.
    pub fn weighted_cores(&self) -> u64 {
        self.cores as u64 * self.processor_weight as u64
    }

    /// Total extents of all virtual disks.
    pub fn total_extents(&self) -> u64 {
        self.disks.iter().map(|disk| disk.extents).sum()
    }

    pub fn selected_primary_host(&self) -> Option<usize> {
        self.selected_primary_host
    }

    pub fn selected_secondary_host(&self) -> Option<usize> {
        self.selected_secondary_host
    }
}
