//! Search order of hosts and virtual servers.
//!
//! Trying the smallest hosts and the most demanding virtual servers first makes capacity violations surface close
//! to the root of the search tree. The order never changes the set of feasible placements. Both sorts are stable, so
//! entries with equal keys keep their inventory order and the search stays deterministic.

use std::cmp::Reverse;

use crate::host::Host;
use crate::virtual_server::VirtualServer;

/// Returns host indices ordered by ascending RAM, then cores, then the largest disk.
pub fn host_order(hosts: &[Host]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..hosts.len()).collect();
    order.sort_by_key(|&idx| {
        let host = &hosts[idx];
        (host.ram, host.cores, host.largest_disk_extents())
    });
    order
}

/// Returns virtual server indices ordered by descending RAM, then weighted cores, then total disk extents.
pub fn server_order(servers: &[VirtualServer]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..servers.len()).collect();
    order.sort_by_key(|&idx| {
        let server = &servers[idx];
        Reverse((server.primary_ram, server.weighted_cores(), server.total_extents()))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{Disk, DiskType};
    use crate::virtual_server::VirtualDisk;

    #[test]
    fn test_host_order() {
        let hosts = vec![
            Host::new("big", 16, 65536),
            Host::new("small-disk", 4, 8192).disk(Disk::new("sda", DiskType::Raid1_7200, 100)),
            Host::new("large-disk", 4, 8192).disk(Disk::new("sda", DiskType::Raid1_7200, 5000)),
            Host::new("few-cores", 2, 8192).disk(Disk::new("sda", DiskType::Raid1_7200, 9000)),
            Host::new("tie", 4, 8192).disk(Disk::new("sda", DiskType::Raid1_7200, 100)),
        ];
        assert_eq!(host_order(&hosts), vec![3, 1, 4, 2, 0]);
    }

    #[test]
    fn test_server_order() {
        let servers = vec![
            VirtualServer::new("small", 1, 100, 1024, 1024),
            VirtualServer::new("busy", 4, 1000, 4096, 4096),
            VirtualServer::new("idle", 4, 100, 4096, 4096),
            VirtualServer::new("idle-disk", 4, 100, 4096, 4096)
                .disk(VirtualDisk::new("xvda", 10, DiskType::Raid1_7200, 1)),
            VirtualServer::new("huge", 1, 100, 32768, 0),
        ];
        assert_eq!(server_order(&servers), vec![4, 1, 3, 2, 0]);
    }
}
