//! Backend mocks from `terrane-common`, under the names the engine tests use.

pub use terrane_common::cloud::MockCloudProvider as MockCloud;
pub use terrane_common::cluster::MockClusterOps as MockCluster;
pub use terrane_common::confirm::MockConfirmer as MockConfirm;
pub use terrane_common::helm::MockReleaseManager as MockHelm;
pub use terrane_common::iac::MockIacBackend as MockIac;
