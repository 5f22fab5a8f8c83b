//! Errors reported before the search starts.

use std::path::PathBuf;

use crate::disk::MAX_WEIGHT;

/// Inventory that cannot be searched.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("can't read inventory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse inventory: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{kind} entry has neither name nor name_prefix")]
    Unnamed { kind: &'static str },
    #[error("{kind} entry {name} has count {count} but no name_prefix")]
    CountWithoutPrefix {
        kind: &'static str,
        name: String,
        count: u32,
    },
    #[error("{kind} entry has count 0")]
    ZeroCount { kind: &'static str },
    #[error("duplicate host {0}")]
    DuplicateHost(String),
    #[error("duplicate virtual server {0}")]
    DuplicateVirtualServer(String),
    #[error("duplicate disk {device} on host {host}")]
    DuplicateDisk { host: String, device: String },
    #[error("duplicate virtual disk {device} on virtual server {server}")]
    DuplicateVirtualDisk { server: String, device: String },
    #[error("host {0} has no cores")]
    NoHostCores(String),
    #[error("virtual server {0} has no cores")]
    NoServerCores(String),
    #[error("virtual server {server} is pinned to unknown host {host}")]
    UnknownPin { server: String, host: String },
    #[error("virtual server {server} uses host {host} as both primary and secondary pin")]
    SelfFailoverPin { server: String, host: String },
    #[error("weight {weight} of {what} exceeds {}", MAX_WEIGHT)]
    WeightOutOfRange { what: String, weight: u32 },
    #[error("total {quantity} of virtual servers does not fit in 64 bits")]
    TotalOverflow { quantity: &'static str },
}

/// Solver configuration that cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
