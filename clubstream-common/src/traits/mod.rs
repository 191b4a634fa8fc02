pub mod api;

pub use api::{EventSource, PresentationSink, RosterSource};
