// src/tasks/mod.rs

pub mod roster_sync;

pub use roster_sync::{run_roster_sync, spawn_roster_sync_task};
