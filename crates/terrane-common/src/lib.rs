//! Shared building blocks for terrane.
//!
//! Configuration, the error type, bounded polling, the step pipeline, and the
//! backend traits (IaC, cluster, package manager, cloud provider) together
//! with their CLI/API implementations.

pub mod cloud;
pub mod cluster;
pub mod config;
pub mod confirm;
pub mod error;
pub mod exec;
pub mod helm;
pub mod iac;
pub mod outputs;
pub mod pipeline;
pub mod poll;
pub mod state;

pub use error::{BackendErrorExt, Error, ErrorCategory, Result};
