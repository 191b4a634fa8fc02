// File: clubstream-core/src/platforms/twitch_eventsub/mod.rs

pub mod events;
pub mod listener;

pub use listener::{eventsub_router, spawn_eventsub_listener, ListenerState, EVENTSUB_PATH};
