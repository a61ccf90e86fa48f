//! Time-bounded cache of what a Slurm cluster offers: node shapes, the accounts a user may
//! charge, and the reservations open to them.
//!
//! Everything is read through the `scontrol` and `sacctmgr` command line tools. When those
//! cannot be reached the views come back empty instead of failing, so a form built from them
//! simply offers nothing; output the tools produce but we cannot parse is reported as an error.

pub mod accounts;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod nodes;
pub mod parser;
pub mod reservations;
pub mod service;
pub mod utils;

pub use cache::{Clock, MockClock, SystemClock};
pub use command::{CommandRunner, SystemRunner};
pub use config::CacheConfig;
pub use error::{CommandError, ConfigError, SlurmError};
pub use nodes::NodeInfo;
pub use reservations::Reservation;
pub use service::SlurmCache;

pub const AUTHOR_HELP: &str = "Part of the fi-slurm utilities. Set RUST_LOG=debug to trace every Slurm call.";
