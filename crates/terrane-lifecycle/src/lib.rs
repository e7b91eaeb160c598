//! Infrastructure lifecycle engines.
//!
//! [`apply::ApplyEngine`] provisions and waits for the workload;
//! [`destroy::DestroyEngine`] tears everything down, detaching known stuck
//! resources when forced.

pub mod apply;
pub mod destroy;
pub mod stuck;

#[cfg(test)]
mod mocks;

pub use apply::{ApplyEngine, ApplyReport};
pub use destroy::{DestroyEngine, DestroyReport, CONFIRM_PHRASE};
pub use stuck::StuckResourceList;
