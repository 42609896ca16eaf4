//! `sweep-core`: configuration, errors and caller identity shared by the
//! subscription scheduler and the HTTP gateway.

pub mod config;
pub mod error;
pub mod types;

pub use config::SweepConfig;
pub use error::{Result, SweepError};
pub use types::{Caller, Role};
