//! # Tracker Configuration
//!
//! Settings for one tracking session. The CLI and embedding applications
//! build a [`TrackerConfig`], validate it, then hand it to
//! [`crate::session::TrackingSession::builder`].
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Default | Description |
//! |-----------|------|---------|-------------|
//! | `calibration` | `String` | `/data/camera_para.dat` | Camera-parameter asset passed to the engine |
//! | `near` / `far` | `f64` | 10 / 100000 | Clip planes substituted into the projection |
//! | `device` | `Option<DeviceClass>` | `None` | Forces the device class; `None` inspects `user_agent` |
//! | `display_width` | `f64` | 0 | Outer display width, read on mobile only |
//! | `render_target` | `Option<Size>` | `None` | Render surface size for cover-fit correction; `None` applies no cover-fit correction |
//! | `command_capacity` | `usize` | 3 | Depth of the worker command queue |
//! | `fps` | `u32` | 30 | Frame rate of [`crate::session::TrackingSession::run`] |
//!
//! ## Examples
//!
//! ```rust
//! use nft_overlay::config::TrackerConfig;
//!
//! let mut config = TrackerConfig::default();
//! config.far = 5000.0;
//! assert!(config.validate().is_ok());
//!
//! config.near = 6000.0;
//! assert!(config.validate().is_err());
//! ```

use nft_layout::{DeviceClass, DeviceProfile, Size};
use nft_worker::WorkerConfig;

/// Default camera-parameter asset reference.
pub const DEFAULT_CALIBRATION: &str = "/data/camera_para.dat";

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Opaque camera-parameter asset reference, forwarded to the engine as is.
    pub calibration: String,

    /// Near clip plane of the adjusted projection.
    pub near: f64,

    /// Far clip plane of the adjusted projection. Must exceed `near`.
    pub far: f64,

    /// Forced device class. When `None` the class is derived from
    /// `user_agent`, falling back to desktop.
    pub device: Option<DeviceClass>,

    /// Browser-style user agent used for device detection.
    pub user_agent: Option<String>,

    /// Outer display width in pixels.
    ///
    /// Only consulted for mobile devices, where the video is stretched to
    /// this width. Must be positive in that case.
    pub display_width: f64,

    /// Size of the surface the overlay is rendered into. When set and its
    /// aspect differs from the video's, the projection gets a cover-fit
    /// correction; `None` applies no correction.
    pub render_target: Option<Size>,

    /// Capacity of the worker command queue.
    pub command_capacity: usize,

    /// Target frames per second when the session drives itself.
    pub fps: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            calibration: DEFAULT_CALIBRATION.to_string(),
            near: 10.0,
            far: 100_000.0,
            device: None,
            user_agent: None,
            display_width: 0.0,
            render_target: None,
            command_capacity: 3,
            fps: 30,
        }
    }
}

impl TrackerConfig {
    /// Resolved device class: the override, else the user agent, else desktop.
    pub fn device_class(&self) -> DeviceClass {
        match (self.device, self.user_agent.as_deref()) {
            (Some(class), _) => class,
            (None, Some(ua)) => DeviceClass::from_user_agent(ua),
            (None, None) => DeviceClass::Desktop,
        }
    }

    /// Device profile consumed by the layout calculator.
    pub fn device_profile(&self) -> DeviceProfile {
        match self.device_class() {
            DeviceClass::Desktop => DeviceProfile::desktop(),
            DeviceClass::Mobile => DeviceProfile::mobile(self.display_width),
        }
    }

    /// Queue sizing for the session's worker thread.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            command_capacity: self.command_capacity,
            ..WorkerConfig::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.calibration.trim().is_empty() {
            return Err("Calibration asset reference must not be empty".to_string());
        }
        if !self.near.is_finite() || !self.far.is_finite() || self.near <= 0.0 {
            return Err(format!(
                "Clip planes must be finite and positive (near={}, far={})",
                self.near, self.far
            ));
        }
        if self.near >= self.far {
            return Err(format!("Near plane {} must be closer than far plane {}", self.near, self.far));
        }
        if self.device_class() == DeviceClass::Mobile
            && (!self.display_width.is_finite() || self.display_width <= 0.0)
        {
            return Err("Display width must be positive on mobile devices".to_string());
        }
        if let Some(target) = self.render_target {
            if target.w == 0 || target.h == 0 {
                return Err(format!("Render target {}x{} must be non-empty", target.w, target.h));
            }
        }
        if self.command_capacity == 0 {
            return Err("Command queue capacity must be at least 1".to_string());
        }
        if !(1..=240).contains(&self.fps) {
            return Err("FPS must be between 1 and 240".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.calibration, "/data/camera_para.dat");
        assert_eq!(config.near, 10.0);
        assert_eq!(config.far, 100_000.0);
        assert_eq!(config.device_class(), DeviceClass::Desktop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrackerConfig::default();

        config.near = 0.0;
        assert!(config.validate().is_err());
        config.near = 10.0;

        config.far = 10.0;
        assert!(config.validate().is_err());
        config.far = f64::INFINITY;
        assert!(config.validate().is_err());
        config.far = 100_000.0;

        config.fps = 0;
        assert!(config.validate().is_err());
        config.fps = 30;

        config.render_target = Some(Size { w: 0, h: 600 });
        assert!(config.validate().is_err());
        config.render_target = Some(Size { w: 800, h: 600 });

        config.command_capacity = 0;
        assert!(config.validate().is_err());
        config.command_capacity = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn mobile_needs_a_display_width() {
        let mut config = TrackerConfig {
            user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)".into()),
            ..TrackerConfig::default()
        };
        assert_eq!(config.device_class(), DeviceClass::Mobile);
        assert!(config.validate().is_err());

        config.display_width = 390.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.device_profile(), DeviceProfile::mobile(390.0));
    }

    #[test]
    fn override_beats_user_agent() {
        let config = TrackerConfig {
            device: Some(DeviceClass::Desktop),
            user_agent: Some("Android".into()),
            ..TrackerConfig::default()
        };
        assert_eq!(config.device_profile(), DeviceProfile::desktop());
    }
}
