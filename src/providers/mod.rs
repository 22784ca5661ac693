//! # Cloud Provider Capability Interface
//!
//! Everything the orchestration core asks of a cloud account goes through a
//! [`CloudDriver`]. SDK calls live behind the trait; the core only sees the
//! per-host result shapes and the small [`DriverError`] taxonomy.
//!
//! A stack may span several cloud accounts. The [`DriverRegistry`] resolves
//! an account slug to its driver and refuses drivers that cannot terminate
//! instances, so an unusable driver fails at registration instead of halfway
//! through a teardown.

pub mod actions;
pub mod driver;
pub mod errors;
pub mod map;
pub mod registry;

pub use actions::HostAction;
pub use driver::{CloudDriver, HostLaunchResult, InstanceInfo};
pub use errors::{DriverError, DriverResult};
pub use map::{ProvisioningMap, ProvisioningSpec};
pub use registry::DriverRegistry;
