// File: src/platforms/mod.rs
//
// Concrete collaborators: Twitch Helix (EventSource), the EventSub webhook
// listener, Discord (PresentationSink) and trackmania.io (RosterSource).

pub mod discord;
pub mod trackmania;
pub mod twitch;
pub mod twitch_eventsub;
