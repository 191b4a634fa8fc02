// File: clubstream-core/src/platforms/trackmania/mod.rs

pub mod client;

pub use client::{RosterEntry, TrackmaniaClient};
