//! LookOut control library - client, rendering and feed seeding for lookoutctl.

pub mod client;
pub mod display;
pub mod seed;
