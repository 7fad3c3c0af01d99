//! Shared harness for gateway integration tests.

pub mod fixtures;
pub mod mocks;
pub mod setup;
