//! # Configuration Module
//!
//! Session configuration shared by the CLI and embedding applications.

pub mod tracker;

pub use tracker::{TrackerConfig, DEFAULT_CALIBRATION};
