// SPDX-License-Identifier: MIT
//! # Processing-Buffer Layout
//!
//! Computes where a camera frame lands inside the fixed-size buffer handed to
//! the tracking engine. The engine is calibrated against a single buffer
//! resolution, so every camera aspect ratio is downscaled and letterboxed into
//! the same 4:3 envelope.
//!
//! ## Geometry
//!
//! ```text
//!  buffer_width
//! ┌──────────────────────┐
//! │ offset_y (black)     │
//! ├──────────────────────┤
//! │   scaled content     │ buffer_height
//! ├──────────────────────┤
//! │ offset_y (black)     │
//! └──────────────────────┘
//! ```
//!
//! - `downscale = 320 / max(w, h * 4/3)`
//! - `buffer = max(scaled, 4:3 counterpart)` on each axis
//! - offsets center the scaled content
//!
//! The same offsets must be used by the projection rescale; see
//! `nft_overlay::calibration`.

use std::fmt;

/// Long edge of the processing buffer, in pixels.
pub const TARGET_LONG_EDGE: f64 = 320.0;

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

/// Errors raised before any layout arithmetic happens.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// Source or display dimensions cannot produce a finite layout.
    InvalidFrameGeometry {
        width: f64,
        height: f64,
        reason: &'static str,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::InvalidFrameGeometry {
                width,
                height,
                reason,
            } => write!(f, "Invalid frame geometry {}x{}: {}", width, height, reason),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Coarse device classification driving the display-scale heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DeviceClass {
    /// Video is shown at native size; `device_scale` is 1.0.
    Desktop,
    /// Video is stretched to the display width.
    Mobile,
}

impl DeviceClass {
    /// Classify a browser-style user agent string.
    ///
    /// Matches `android`, `mobile`, `ipad` and `iphone` case-insensitively.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ["android", "mobile", "ipad", "iphone"]
            .iter()
            .any(|needle| ua.contains(needle))
        {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Device characteristics consumed by [`build_layout`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceProfile {
    pub class: DeviceClass,
    /// Outer width of the display in pixels. Only read for mobile devices.
    pub display_width: f64,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self {
            class: DeviceClass::Desktop,
            display_width: 0.0,
        }
    }

    pub fn mobile(display_width: f64) -> Self {
        Self {
            class: DeviceClass::Mobile,
            display_width,
        }
    }
}

/// Letterboxed processing-buffer layout for one source resolution.
///
/// All fields are kept in floating point, matching how the projection rescale
/// consumes them. Use [`ProcessingLayout::buffer_size`] and
/// [`ProcessingLayout::content_roi`] for pixel-exact views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessingLayout {
    /// Native video frame dimensions
    pub source: Size,
    /// 1.0 on desktop, `display_width / source.w` on mobile
    pub device_scale: f64,
    /// Ratio bringing the long edge (under a 4:3 assumption) to 320px
    pub downscale: f64,
    pub scaled_width: f64,
    pub scaled_height: f64,
    pub buffer_width: f64,
    pub buffer_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ProcessingLayout {
    /// Integer buffer dimensions handed to the tracking engine.
    pub fn buffer_size(&self) -> Size {
        Size {
            w: (self.buffer_width.round() as u32).max(1),
            h: (self.buffer_height.round() as u32).max(1),
        }
    }

    /// Byte length of an RGBA8 processing buffer.
    pub fn buffer_len(&self) -> usize {
        let size = self.buffer_size();
        size.w as usize * size.h as usize * 4
    }

    /// Content rectangle `(x, y, width, height)` inside the buffer, rounded
    /// to whole pixels and clamped so it never leaves the buffer.
    pub fn content_roi(&self) -> (u32, u32, u32, u32) {
        let buffer = self.buffer_size();
        let x = (self.offset_x.round() as u32).min(buffer.w - 1);
        let y = (self.offset_y.round() as u32).min(buffer.h - 1);
        let w = (self.scaled_width.round() as u32).clamp(1, buffer.w - x);
        let h = (self.scaled_height.round() as u32).clamp(1, buffer.h - y);
        (x, y, w, h)
    }

    /// On-screen size of the video after the device scale heuristic.
    pub fn display_size(&self) -> (f64, f64) {
        (
            self.source.w as f64 * self.device_scale,
            self.source.h as f64 * self.device_scale,
        )
    }

    /// Horizontal and vertical padding ratios (`buffer / scaled`), the
    /// factors that undo the letterbox in projection space.
    pub fn letterbox_ratios(&self) -> (f64, f64) {
        (
            self.buffer_width / self.scaled_width,
            self.buffer_height / self.scaled_height,
        )
    }
}

/// Compute the processing layout for a source resolution.
///
/// Fails with [`LayoutError::InvalidFrameGeometry`] for zero-sized sources and
/// for mobile profiles whose display width is not a positive finite number.
///
/// # Performance
/// O(1), a handful of floating-point operations.
pub fn build_layout(source: Size, device: DeviceProfile) -> Result<ProcessingLayout, LayoutError> {
    if source.w == 0 || source.h == 0 {
        return Err(LayoutError::InvalidFrameGeometry {
            width: source.w as f64,
            height: source.h as f64,
            reason: "video dimensions must be non-zero",
        });
    }

    let (vw, vh) = (source.w as f64, source.h as f64);

    let device_scale = match device.class {
        DeviceClass::Desktop => 1.0,
        DeviceClass::Mobile => {
            if !device.display_width.is_finite() || device.display_width <= 0.0 {
                return Err(LayoutError::InvalidFrameGeometry {
                    width: device.display_width,
                    height: vh,
                    reason: "display width must be positive on mobile devices",
                });
            }
            device.display_width / vw
        }
    };

    let downscale = TARGET_LONG_EDGE / vw.max((vh / 3.0) * 4.0);

    let w = vw * downscale;
    let h = vh * downscale;

    let pw = w.max((h / 3.0) * 4.0);
    let ph = h.max((w / 4.0) * 3.0);

    Ok(ProcessingLayout {
        source,
        device_scale,
        downscale,
        scaled_width: w,
        scaled_height: h,
        buffer_width: pw,
        buffer_height: ph,
        offset_x: (pw - w) / 2.0,
        offset_y: (ph - h) / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop(w: u32, h: u32) -> ProcessingLayout {
        build_layout(Size { w, h }, DeviceProfile::desktop()).unwrap()
    }

    #[test]
    fn hd_landscape_is_letterboxed_vertically() {
        let layout = desktop(1280, 720);
        assert_eq!(layout.downscale, 0.25);
        assert_eq!(layout.scaled_width, 320.0);
        assert_eq!(layout.scaled_height, 180.0);
        assert_eq!(layout.buffer_width, 320.0);
        assert_eq!(layout.buffer_height, 240.0);
        assert_eq!(layout.offset_x, 0.0);
        assert_eq!(layout.offset_y, 30.0);
        assert_eq!(layout.buffer_size(), Size { w: 320, h: 240 });
        assert_eq!(layout.content_roi(), (0, 30, 320, 180));
    }

    #[test]
    fn vga_fills_the_buffer() {
        let layout = desktop(640, 480);
        assert_eq!(layout.buffer_size(), Size { w: 320, h: 240 });
        assert_eq!(layout.content_roi(), (0, 0, 320, 240));
    }

    #[test]
    fn portrait_is_pillarboxed() {
        let layout = desktop(720, 1280);
        assert!((layout.scaled_height - 240.0).abs() < 1e-9);
        assert!((layout.buffer_width - 320.0).abs() < 1e-9);
        assert!(layout.offset_x > 0.0);
        assert!(layout.offset_y.abs() < 1e-9);
    }

    #[test]
    fn invariants_hold_over_a_size_grid() {
        for w in (1..4000).step_by(97) {
            for h in (1..4000).step_by(89) {
                let l = desktop(w, h);
                assert!(l.buffer_width >= l.scaled_width, "{}x{}", w, h);
                assert!(l.buffer_height >= l.scaled_height, "{}x{}", w, h);
                assert!(l.offset_x >= 0.0 && l.offset_y >= 0.0, "{}x{}", w, h);
                assert!((l.offset_x * 2.0 + l.scaled_width - l.buffer_width).abs() < 1e-9);
                assert!((l.offset_y * 2.0 + l.scaled_height - l.buffer_height).abs() < 1e-9);

                let (x, y, rw, rh) = l.content_roi();
                let size = l.buffer_size();
                assert!(x + rw <= size.w && y + rh <= size.h, "{}x{}", w, h);
            }
        }
    }

    #[test]
    fn mobile_scale_tracks_display_width() {
        let layout = build_layout(Size { w: 640, h: 480 }, DeviceProfile::mobile(1080.0)).unwrap();
        assert!((layout.device_scale - 1080.0 / 640.0).abs() < 1e-12);
        let (dw, dh) = layout.display_size();
        assert!((dw - 1080.0).abs() < 1e-9);
        assert!((dh - 810.0).abs() < 1e-9);
        // Device scale never changes the processing buffer.
        assert_eq!(layout.buffer_size(), Size { w: 320, h: 240 });
    }

    #[test]
    fn degenerate_dimensions_are_rejected() {
        assert!(matches!(
            build_layout(Size { w: 0, h: 480 }, DeviceProfile::desktop()),
            Err(LayoutError::InvalidFrameGeometry { .. })
        ));
        assert!(matches!(
            build_layout(Size { w: 640, h: 0 }, DeviceProfile::desktop()),
            Err(LayoutError::InvalidFrameGeometry { .. })
        ));
        assert!(matches!(
            build_layout(Size { w: 640, h: 480 }, DeviceProfile::mobile(f64::NAN)),
            Err(LayoutError::InvalidFrameGeometry { .. })
        ));
    }

    #[test]
    fn user_agent_classification() {
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
            DeviceClass::Mobile
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Linux; ANDROID 14)"),
            DeviceClass::Mobile
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/130.0"),
            DeviceClass::Desktop
        );
    }
}
