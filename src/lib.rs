//! # Escale — relay-mediated file synchronization
//!
//! Escale synchronizes a directory between clients that never talk to each
//! other directly: all coordination happens through placeholder and lock
//! blobs on a shared, dumb relay store (local directory, object storage,
//! anything reachable through a [`relay::RelayAdapter`]).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use escale::config::Config;
//! use escale::relay::local::LocalRelay;
//! use escale::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let relay = LocalRelay::open(&config.relay_uri).await?;
//!     // build an Engine and drive it with a scheduler::Scheduler
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod cancel;
pub mod callback;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod framing;
pub mod identity;
pub mod index;
pub mod lock;
pub mod logging;
pub mod maintenance;
pub mod message;
pub mod naming;
pub mod path;
pub mod placeholder;
pub mod relay;
pub mod scheduler;
pub mod strategies;
pub mod util;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use engine::{Engine, SyncOutcome};
pub use error::{RelayError, SyncError};
pub use exclusion::{ExclusionEngine, ExclusionError};
pub use path::LogicalPath;
pub use scheduler::{Scheduler, SchedulerConfig};

// vim: ts=4
