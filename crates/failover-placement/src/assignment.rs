//! Complete placement produced by the solver and its independent verification.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::disk::MAX_WEIGHT;
use crate::inventory::Inventory;

/// Location of both copies of a virtual disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiskPlacement {
    /// Virtual disk device.
    pub device: String,
    /// Physical disk device on the primary host.
    pub primary_disk: String,
    /// Physical disk device on the secondary host.
    pub secondary_disk: String,
}

/// Placement of a single virtual server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServerPlacement {
    pub server: String,
    pub primary_host: String,
    pub secondary_host: String,
    pub disks: Vec<DiskPlacement>,
}

/// Placement of every virtual server of the inventory, listed in inventory order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub servers: Vec<ServerPlacement>,
}

impl Assignment {
    /// Returns placement of the given virtual server.
    pub fn get(&self, server: &str) -> Option<&ServerPlacement> {
        self.servers.iter().find(|placement| placement.server == server)
    }

    /// Returns the number of placed virtual servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for placement in &self.servers {
            write!(
                f,
                "{}: {} -> {}",
                placement.server, placement.primary_host, placement.secondary_host
            )?;
            let disks: Vec<String> = placement
                .disks
                .iter()
                .map(|disk| format!("{} on {}/{}", disk.device, disk.primary_disk, disk.secondary_disk))
                .collect();
            if !disks.is_empty() {
                write!(f, " [{}]", disks.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Constraint broken by an assignment.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlacementViolation {
    #[error("virtual server {0} is not placed")]
    MissingServer(String),
    #[error("virtual server {0} is not part of the inventory")]
    UnknownServer(String),
    #[error("virtual server {server} is placed on unknown host {host}")]
    UnknownHost { server: String, host: String },
    #[error("virtual disk {device} of {server} is not placed")]
    MissingDisk { server: String, device: String },
    #[error("virtual disk {device} of {server} is placed on unknown disk {disk} of host {host}")]
    UnknownDisk {
        server: String,
        device: String,
        host: String,
        disk: String,
    },
    #[error("virtual server {0} uses the same host as primary and secondary")]
    SelfFailover(String),
    #[error("virtual server {server} is pinned to {pin} but placed on {host}")]
    PinViolated { server: String, pin: String, host: String },
    #[error("host {host} does not satisfy processor requirements of {server}")]
    ProcessorMismatch { server: String, host: String },
    #[error("virtual disk {device} of {server} is placed on disk {disk} of wrong type")]
    DiskTypeMismatch { server: String, device: String, disk: String },
    #[error("processor weight {allocated} of host {host} exceeds {capacity}")]
    ProcessorOverload { host: String, allocated: u64, capacity: u64 },
    #[error("host {host} needs {required} MiB of RAM in the worst single failure but has {capacity}")]
    RamOverload { host: String, required: u64, capacity: u64 },
    #[error("disk {disk} of host {host} is overloaded")]
    DiskOverload { host: String, disk: String },
}

#[derive(Default)]
struct HostLoad {
    processor_weight: u64,
    primary_ram: u64,
    secondary_ram: BTreeMap<usize, u64>,
    disks: BTreeMap<usize, (u64, u32)>,
}

/// Checks the assignment against the inventory without using any solver state.
///
/// Verifies that every virtual server and virtual disk is placed, that pins, processor requirements and disk types
/// are respected, that no server fails over to its own primary, and that no host or disk is overloaded, including
/// the RAM needed when any single host fails.
pub fn check_assignment(inventory: &Inventory, assignment: &Assignment) -> Result<(), PlacementViolation> {
    for placement in &assignment.servers {
        if !inventory
            .virtual_servers()
            .iter()
            .any(|server| server.hostname == placement.server)
        {
            return Err(PlacementViolation::UnknownServer(placement.server.clone()));
        }
    }

    let hosts = inventory.hosts();
    let mut loads: Vec<HostLoad> = hosts.iter().map(|_| HostLoad::default()).collect();

    for server in inventory.virtual_servers() {
        let placement = assignment
            .get(&server.hostname)
            .ok_or_else(|| PlacementViolation::MissingServer(server.hostname.clone()))?;
        let lookup = |name: &str| {
            inventory.host_index(name).ok_or_else(|| PlacementViolation::UnknownHost {
                server: server.hostname.clone(),
                host: name.to_string(),
            })
        };
        let primary = lookup(&placement.primary_host)?;
        let secondary = lookup(&placement.secondary_host)?;
        if primary == secondary {
            return Err(PlacementViolation::SelfFailover(server.hostname.clone()));
        }
        for (pin, host) in [
            (&server.primary_pin, &placement.primary_host),
            (&server.secondary_pin, &placement.secondary_host),
        ] {
            if let Some(pin) = pin {
                if pin != host {
                    return Err(PlacementViolation::PinViolated {
                        server: server.hostname.clone(),
                        pin: pin.clone(),
                        host: host.clone(),
                    });
                }
            }
        }

        let processor_fits = |idx: usize, check_speed: bool| {
            let host = &hosts[idx];
            server.minimum_processor_type.map_or(true, |t| host.processor_type >= t)
                && server.required_architecture.map_or(true, |a| host.architecture == a)
                && (!check_speed || server.minimum_processor_speed.map_or(true, |s| host.processor_speed >= s))
                && (check_speed || host.cores >= server.cores)
        };
        for (idx, check_speed) in [(primary, true), (secondary, false)] {
            if !processor_fits(idx, check_speed) {
                return Err(PlacementViolation::ProcessorMismatch {
                    server: server.hostname.clone(),
                    host: hosts[idx].hostname.clone(),
                });
            }
        }

        loads[primary].processor_weight += server.weighted_cores();
        loads[primary].primary_ram += server.primary_ram;
        *loads[secondary].secondary_ram.entry(primary).or_insert(0) += server.secondary_ram;

        for vdisk in &server.disks {
            let disk_placement = placement
                .disks
                .iter()
                .find(|disk| disk.device == vdisk.device)
                .ok_or_else(|| PlacementViolation::MissingDisk {
                    server: server.hostname.clone(),
                    device: vdisk.device.clone(),
                })?;
            for (host_idx, disk_name, disk_type, weight) in [
                (primary, &disk_placement.primary_disk, vdisk.primary_type, vdisk.primary_weight),
                (secondary, &disk_placement.secondary_disk, vdisk.secondary_type, vdisk.secondary_weight),
            ] {
                let host = &hosts[host_idx];
                let disk_idx = host
                    .disks
                    .iter()
                    .position(|disk| disk.device == *disk_name)
                    .ok_or_else(|| PlacementViolation::UnknownDisk {
                        server: server.hostname.clone(),
                        device: vdisk.device.clone(),
                        host: host.hostname.clone(),
                        disk: disk_name.clone(),
                    })?;
                if host.disks[disk_idx].disk_type != disk_type {
                    return Err(PlacementViolation::DiskTypeMismatch {
                        server: server.hostname.clone(),
                        device: vdisk.device.clone(),
                        disk: disk_name.clone(),
                    });
                }
                let load = loads[host_idx].disks.entry(disk_idx).or_insert((0, 0));
                load.0 += vdisk.extents;
                load.1 += weight;
            }
        }
    }

    for (host, load) in hosts.iter().zip(loads.iter()) {
        if load.processor_weight > host.processor_capacity() {
            return Err(PlacementViolation::ProcessorOverload {
                host: host.hostname.clone(),
                allocated: load.processor_weight,
                capacity: host.processor_capacity(),
            });
        }
        let worst_failure = load.secondary_ram.values().copied().max().unwrap_or(0);
        if load.primary_ram + worst_failure > host.ram {
            return Err(PlacementViolation::RamOverload {
                host: host.hostname.clone(),
                required: load.primary_ram + worst_failure,
                capacity: host.ram,
            });
        }
        for (&disk_idx, &(extents, weight)) in &load.disks {
            let disk = &host.disks[disk_idx];
            if extents > disk.extents || weight > MAX_WEIGHT {
                return Err(PlacementViolation::DiskOverload {
                    host: host.hostname.clone(),
                    disk: disk.device.clone(),
                });
            }
        }
    }
    Ok(())
}
