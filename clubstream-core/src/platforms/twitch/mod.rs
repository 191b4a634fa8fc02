// File: src/platforms/twitch/mod.rs

pub mod client;
pub mod requests;

pub use client::TwitchHelixClient;
pub use requests::token::AppTokenProvider;
