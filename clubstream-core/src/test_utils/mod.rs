// File: clubstream-core/src/test_utils/mod.rs
//
// In-memory stand-ins for the remote collaborators. Used by the unit tests
// here and by the integration tests under `clubstream-core/tests/`.

pub mod fakes;

pub use fakes::*;
