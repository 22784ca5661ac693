//! Shared fixtures for the integration suites.

pub mod builders;
pub mod mock_driver;
pub mod mock_salt;
pub mod strategies;

pub use builders::{standard_components, test_config, TestHarness, ACCOUNT};
pub use mock_driver::MockDriver;
pub use mock_salt::MockSalt;
