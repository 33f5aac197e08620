//! # Calibration Adapter
//!
//! The engine computes its projection for the letterboxed processing buffer.
//! The overlay is drawn over the unpadded video, so the padding has to be
//! taken back out of the projection:
//!
//! - row 0 (column-major indices 0, 4, 8, 12) × `buffer_width / scaled_width`
//! - row 1 (indices 1, 5, 9, 13) × `buffer_height / scaled_height`
//! - index 10 = `-far / (far - near)`, index 14 = `-(far * near) / (far - near)`
//!
//! When the render target has a different aspect from the video, the video
//! is assumed to be shown with cover fit (scaled to fill, overflow cropped)
//! and the axis that overflows is stretched to match. Equal aspects leave the
//! matrix untouched by this step.

use glam::DMat4;
use nft_layout::{ProcessingLayout, Size};
use nft_worker::RawPose;

use crate::error::{OverlayResult, TrackingError};

const ROW_0: [usize; 4] = [0, 4, 8, 12];
const ROW_1: [usize; 4] = [1, 5, 9, 13];

/// Engine projection and its render-ready adaptation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionState {
    /// Matrix as reported by the engine, against the buffer resolution
    pub raw: [f64; 16],
    /// Matrix installed on the scene camera
    pub adjusted: [f64; 16],
}

impl ProjectionState {
    pub fn adjusted_matrix(&self) -> DMat4 {
        DMat4::from_cols_array(&self.adjusted)
    }
}

/// Parse the engine's serialized projection: a JSON array of 16 numbers, or
/// an object keyed by element index.
pub fn parse_projection(json: &str) -> OverlayResult<[f64; 16]> {
    let raw: RawPose = serde_json::from_str(json)
        .map_err(|e| TrackingError::calibration(format!("projection is not a numeric matrix: {e}")))?;

    let mut matrix = [0.0; 16];
    for (i, value) in matrix.iter_mut().enumerate() {
        *value = raw.get(i).ok_or_else(|| {
            TrackingError::calibration(format!("projection has {} entries, element {} missing", raw.len(), i))
        })?;
    }
    Ok(matrix)
}

/// Cover-fit stretch `(x, y)` for showing a `video_w × video_h` picture in
/// `target`. At least one factor is always 1.
pub fn cover_fit_scale(video_w: f64, video_h: f64, target: Size) -> (f64, f64) {
    let video_aspect = video_w / video_h;
    let target_aspect = target.w as f64 / target.h as f64;
    if video_aspect > target_aspect {
        (video_aspect / target_aspect, 1.0)
    } else {
        (1.0, target_aspect / video_aspect)
    }
}

/// Adapt the engine projection to the render target.
///
/// `render_target` of `None` applies no cover-fit correction; the overlay
/// is assumed to be drawn at the video's own aspect.
pub fn adapt(
    raw: &[f64; 16],
    layout: &ProcessingLayout,
    render_target: Option<Size>,
    near: f64,
    far: f64,
) -> OverlayResult<ProjectionState> {
    if !near.is_finite() || !far.is_finite() {
        return Err(TrackingError::calibration(format!(
            "clip planes must be finite (near={near}, far={far})"
        )));
    }
    if near >= far {
        return Err(TrackingError::calibration(format!(
            "near plane {near} must be closer than far plane {far}"
        )));
    }
    if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
        return Err(TrackingError::calibration(format!("projection element {i} is not finite")));
    }

    let (mut ratio_w, mut ratio_h) = layout.letterbox_ratios();
    if let Some(target) = render_target {
        if target.w == 0 || target.h == 0 {
            return Err(TrackingError::calibration(format!(
                "render target {}x{} is empty",
                target.w, target.h
            )));
        }
        let (cover_w, cover_h) = cover_fit_scale(layout.scaled_width, layout.scaled_height, target);
        ratio_w *= cover_w;
        ratio_h *= cover_h;
    }

    let mut adjusted = *raw;
    for i in ROW_0 {
        adjusted[i] *= ratio_w;
    }
    for i in ROW_1 {
        adjusted[i] *= ratio_h;
    }
    adjusted[10] = -(far / (far - near));
    adjusted[14] = -((far * near) / (far - near));

    tracing::debug!(ratio_w, ratio_h, near, far, "Projection adapted to render target");

    Ok(ProjectionState { raw: *raw, adjusted })
}
