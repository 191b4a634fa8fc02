// File: src/platforms/twitch/requests/mod.rs

pub mod stream;
pub mod subscriptions;
pub mod token;
pub mod users;
