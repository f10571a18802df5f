//! Local media capture control

pub mod controller;

pub use controller::{LocalMediaController, LocalMediaSource, MediaBackend, ProfileBackend};
