//! Application layer: session orchestration

pub mod session_controller;

pub use session_controller::{Command, SessionController, SessionHandle};
