#![doc = include_str!("../readme.md")]

pub mod assignment;
pub mod config;
pub mod diagnostics;
pub mod disk;
pub mod error;
pub mod host;
pub mod inventory;
pub mod ordering;
pub mod solver;
pub mod virtual_server;

pub use assignment::{check_assignment, Assignment, PlacementViolation};
pub use config::{SearchMode, SolverConfig};
pub use diagnostics::{Diagnostics, Phase, RejectReason};
pub use disk::{Disk, DiskType};
pub use error::{ConfigError, InventoryError};
pub use host::{Architecture, Host, ProcessorType};
pub use inventory::Inventory;
pub use solver::{find_placement, PlacementSolver, SearchReport};
pub use virtual_server::{VirtualDisk, VirtualServer};
