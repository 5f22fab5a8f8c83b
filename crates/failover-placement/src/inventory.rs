//! Inventory of hosts and virtual servers.
//!
//! The inventory is usually read from a YAML file of the following form:
//!
//! ```yaml
//! hosts:
//!   - name: xen1
//!     rack: r1
//!     ram: 16384
//!     processor_type: Haswell
//!     architecture: x86_64
//!     processor_speed: 2400
//!     cores: 8
//!     disks:
//!       - device: sda
//!         type: RAID1_7200
//!         extents: 1000
//!   - name_prefix: node
//!     count: 4
//!     ...
//! virtual_servers:
//!   - name: www1
//!     primary_ram: 4096
//!     cores: 2
//!     processor_weight: 500
//!     disks:
//!       - device: xvda
//!         extents: 200
//!         primary_type: RAID1_7200
//!         primary_weight: 500
//! ```
//!
//! Entries with `count` > 1 describe identical machines, whose names are produced by appending the instance number
//! (starting from 1) to `name_prefix`.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::disk::{Disk, DiskType, MAX_WEIGHT};
use crate::error::InventoryError;
use crate::host::{Architecture, Host, ProcessorType};
use crate::virtual_server::{VirtualDisk, VirtualServer};

/// Holds configuration of a physical disk.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DiskConfig {
    pub device: String,
    pub r#type: DiskType,
    /// Capacity in extents.
    pub extents: u64,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of such hosts.
    pub count: Option<u32>,
    pub rack: Option<String>,
    /// RAM capacity in MiB.
    pub ram: u64,
    pub processor_type: ProcessorType,
    pub architecture: Architecture,
    /// Processor speed in MHz.
    pub processor_speed: u32,
    pub cores: u32,
    #[serde(default)]
    pub disks: Vec<DiskConfig>,
}

/// Holds configuration of a virtual disk.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VirtualDiskConfig {
    pub device: String,
    pub extents: u64,
    pub primary_type: DiskType,
    pub primary_weight: u32,
    /// Defaults to the primary type.
    pub secondary_type: Option<DiskType>,
    /// Defaults to the primary weight.
    pub secondary_weight: Option<u32>,
}

/// Holds configuration of a single virtual server or a set of identical virtual servers.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VirtualServerConfig {
    /// Virtual server name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Virtual server name prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of such virtual servers.
    pub count: Option<u32>,
    pub primary_pin: Option<String>,
    pub secondary_pin: Option<String>,
    /// RAM in MiB.
    pub primary_ram: u64,
    /// Defaults to the primary RAM.
    pub secondary_ram: Option<u64>,
    pub minimum_processor_type: Option<ProcessorType>,
    pub required_architecture: Option<Architecture>,
    pub minimum_processor_speed: Option<u32>,
    pub cores: u32,
    pub processor_weight: u32,
    #[serde(default)]
    pub disks: Vec<VirtualDiskConfig>,
}

/// Holds raw inventory parsed from YAML.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawInventory {
    pub hosts: Option<Vec<HostConfig>>,
    pub virtual_servers: Option<Vec<VirtualServerConfig>>,
}

/// Validated set of hosts and virtual servers.
#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    hosts: Vec<Host>,
    virtual_servers: Vec<VirtualServer>,
    host_index: IndexMap<String, usize>,
}

fn expand_names(
    kind: &'static str,
    name: &Option<String>,
    name_prefix: &Option<String>,
    count: Option<u32>,
) -> Result<Vec<String>, InventoryError> {
    let count = count.unwrap_or(1);
    if count == 0 {
        return Err(InventoryError::ZeroCount { kind });
    }
    match (name, name_prefix) {
        (Some(name), _) if count == 1 => Ok(vec![name.clone()]),
        (_, Some(prefix)) => Ok((1..=count).map(|i| format!("{}{}", prefix, i)).collect()),
        (Some(name), None) => Err(InventoryError::CountWithoutPrefix {
            kind,
            name: name.clone(),
            count,
        }),
        (None, None) => Err(InventoryError::Unnamed { kind }),
    }
}

impl HostConfig {
    fn build(&self) -> Result<Vec<Host>, InventoryError> {
        let names = expand_names("host", &self.name, &self.name_prefix, self.count)?;
        Ok(names
            .iter()
            .map(|name| {
                let mut host = Host::new(name, self.cores, self.ram).processor(
                    self.processor_type,
                    self.architecture,
                    self.processor_speed,
                );
                host.rack = self.rack.clone();
                host.disks = self
                    .disks
                    .iter()
                    .map(|disk| Disk::new(&disk.device, disk.r#type, disk.extents))
                    .collect();
                host
            })
            .collect())
    }
}

impl VirtualServerConfig {
    fn build(&self) -> Result<Vec<VirtualServer>, InventoryError> {
        let names = expand_names("virtual server", &self.name, &self.name_prefix, self.count)?;
        Ok(names
            .iter()
            .map(|name| {
                let mut server = VirtualServer::new(
                    name,
                    self.cores,
                    self.processor_weight,
                    self.primary_ram,
                    self.secondary_ram.unwrap_or(self.primary_ram),
                )
                .processor(
                    self.minimum_processor_type,
                    self.required_architecture,
                    self.minimum_processor_speed,
                );
                server.primary_pin = self.primary_pin.clone();
                server.secondary_pin = self.secondary_pin.clone();
                server.disks = self
                    .disks
                    .iter()
                    .map(|disk| {
                        VirtualDisk::new(&disk.device, disk.extents, disk.primary_type, disk.primary_weight).secondary(
                            disk.secondary_type.unwrap_or(disk.primary_type),
                            disk.secondary_weight.unwrap_or(disk.primary_weight),
                        )
                    })
                    .collect();
                server
            })
            .collect())
    }
}

impl Inventory {
    /// Creates inventory from already constructed entities and validates it.
    pub fn new(hosts: Vec<Host>, virtual_servers: Vec<VirtualServer>) -> Result<Self, InventoryError> {
        let mut host_index = IndexMap::new();
        for (idx, host) in hosts.iter().enumerate() {
            if host_index.insert(host.hostname.clone(), idx).is_some() {
                return Err(InventoryError::DuplicateHost(host.hostname.clone()));
            }
        }
        let inventory = Self {
            hosts,
            virtual_servers,
            host_index,
        };
        inventory.validate()?;
        Ok(inventory)
    }

    /// Reads inventory from YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&data)
    }

    /// Parses inventory from YAML string.
    pub fn from_yaml_str(data: &str) -> Result<Self, InventoryError> {
        let raw: RawInventory = serde_yaml::from_str(data)?;
        let mut hosts = Vec::new();
        for config in raw.hosts.unwrap_or_default() {
            hosts.extend(config.build()?);
        }
        let mut virtual_servers = Vec::new();
        for config in raw.virtual_servers.unwrap_or_default() {
            virtual_servers.extend(config.build()?);
        }
        Self::new(hosts, virtual_servers)
    }

    /// Checks referential integrity and value ranges.
    fn validate(&self) -> Result<(), InventoryError> {
        for host in &self.hosts {
            if host.cores == 0 {
                return Err(InventoryError::NoHostCores(host.hostname.clone()));
            }
            let mut devices = IndexSet::new();
            for disk in &host.disks {
                if !devices.insert(disk.device.as_str()) {
                    return Err(InventoryError::DuplicateDisk {
                        host: host.hostname.clone(),
                        device: disk.device.clone(),
                    });
                }
            }
        }

        let mut names = IndexSet::new();
        for server in &self.virtual_servers {
            if !names.insert(server.hostname.as_str()) {
                return Err(InventoryError::DuplicateVirtualServer(server.hostname.clone()));
            }
            if server.cores == 0 {
                return Err(InventoryError::NoServerCores(server.hostname.clone()));
            }
            check_weight(server.processor_weight, || {
                format!("virtual server {} processor", server.hostname)
            })?;
            for pin in [&server.primary_pin, &server.secondary_pin].into_iter().flatten() {
                if !self.host_index.contains_key(pin) {
                    return Err(InventoryError::UnknownPin {
                        server: server.hostname.clone(),
                        host: pin.clone(),
                    });
                }
            }
            if let (Some(primary), Some(secondary)) = (&server.primary_pin, &server.secondary_pin) {
                if primary == secondary {
                    return Err(InventoryError::SelfFailoverPin {
                        server: server.hostname.clone(),
                        host: primary.clone(),
                    });
                }
            }

            let mut devices = IndexSet::new();
            for disk in &server.disks {
                if !devices.insert(disk.device.as_str()) {
                    return Err(InventoryError::DuplicateVirtualDisk {
                        server: server.hostname.clone(),
                        device: disk.device.clone(),
                    });
                }
                check_weight(disk.primary_weight, || {
                    format!("virtual disk {} on {} primary", disk.device, server.hostname)
                })?;
                check_weight(disk.secondary_weight, || {
                    format!("virtual disk {} on {} secondary", disk.device, server.hostname)
                })?;
            }
        }

        // every allocation counter and tentative sum is bounded by one of these totals
        let servers = &self.virtual_servers;
        checked_total(servers.iter().flat_map(|s| [s.primary_ram, s.secondary_ram]), "RAM")?;
        checked_total(servers.iter().map(|s| s.weighted_cores()), "processor weight")?;
        checked_total(
            servers.iter().flat_map(|s| &s.disks).flat_map(|d| [d.extents, d.extents]),
            "disk extents",
        )?;
        Ok(())
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn virtual_servers(&self) -> &[VirtualServer] {
        &self.virtual_servers
    }

    /// Returns the index of the host with the given name.
    pub fn host_index(&self, hostname: &str) -> Option<usize> {
        self.host_index.get(hostname).copied()
    }

    /// Returns the host with the given name.
    pub fn host_by_name(&self, hostname: &str) -> Option<&Host> {
        self.host_index(hostname).map(|idx| &self.hosts[idx])
    }

    pub(crate) fn into_parts(self) -> (Vec<Host>, Vec<VirtualServer>) {
        (self.hosts, self.virtual_servers)
    }
}

fn check_weight<F: FnOnce() -> String>(weight: u32, what: F) -> Result<(), InventoryError> {
    if weight > MAX_WEIGHT {
        return Err(InventoryError::WeightOutOfRange { what: what(), weight });
    }
    Ok(())
}

fn checked_total<I: IntoIterator<Item = u64>>(values: I, quantity: &'static str) -> Result<u64, InventoryError> {
    values
        .into_iter()
        .try_fold(0u64, |total, value| total.checked_add(value))
        .ok_or(InventoryError::TotalOverflow { quantity })
}
