//! Screen recorder with cursor-following zoom, click ripples and an optional
//! GIF export.
//!
//! [`capture::SessionController`] is the control surface; UI or CLI
//! collaborators pick a [`capture::CaptureTarget`] and call start, stop and
//! pause on it.

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
