//! Backend mocks from `terrane-common` used by the coordinator tests.

pub use terrane_common::cloud::MockCloudProvider as MockCloud;
pub use terrane_common::cluster::MockClusterOps as MockCluster;
pub use terrane_common::iac::MockIacBackend as MockIac;
