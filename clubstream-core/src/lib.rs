// src/lib.rs

pub mod config;
pub mod eventbus;
pub mod platforms;
pub mod services;
pub mod tasks;
pub mod test_utils;

pub use clubstream_common::error::Error;
pub use config::{BridgeConfig, ExpiryPolicy};
pub use eventbus::{EventBus, StreamEvent};
