//! Testing utilities and mock implementations
//!
//! Mocks for the sink and hub transport seams, usable from unit and
//! integration tests without network access.

pub mod mocks;

pub use mocks::*;
