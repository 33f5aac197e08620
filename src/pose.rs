//! # Pose Applier
//!
//! Turns engine detections into scene-node mutations and runs the per-slot
//! visibility machine:
//!
//! ```text
//!            found                lost (not persisted)
//!  Hidden ───────────▶ Visible ───────────────────────▶ Hidden
//!                        │  ▲
//!                        └──┘ found / lost (persisted)
//! ```
//!
//! `lost` carries no candidate index. The engine reports at most one marker
//! per frame, so a loss hides every slot that is not persisted.

use glam::{DMat4, DVec2};
use nft_worker::{MarkerInfo, RawPose};

use crate::error::{OverlayResult, TrackingError};
use crate::registry::{MarkerRegistry, SlotHandle, Visibility};

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

/// A validated 4×4 column-major, right-handed GL transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMatrix(pub [f64; 16]);

impl PoseMatrix {
    pub fn to_mat4(&self) -> DMat4 {
        DMat4::from_cols_array(&self.0)
    }
}

impl TryFrom<&RawPose> for PoseMatrix {
    type Error = TrackingError;

    /// Every element index `0..16` must be present. Extra indices are ignored.
    fn try_from(raw: &RawPose) -> Result<Self, Self::Error> {
        let mut values = [0.0; 16];
        let mut missing = Vec::new();
        for (i, slot) in values.iter_mut().enumerate() {
            match raw.get(i) {
                Some(v) => *slot = v,
                None => missing.push(i),
            }
        }
        if missing.is_empty() {
            Ok(PoseMatrix(values))
        } else {
            Err(TrackingError::MalformedPose {
                entries: raw.len(),
                missing,
            })
        }
    }
}

/// Center of the marker's training image in millimetres, measured from its
/// origin corner.
pub fn marker_center_mm(info: &MarkerInfo) -> DVec2 {
    DVec2::new(
        info.width / info.dpi * MM_PER_INCH / 2.0,
        info.height / info.dpi * MM_PER_INCH / 2.0,
    )
}

/// Apply a `found` result to the slot owning `candidate_index`.
///
/// Validation happens before any mutation: on error the slot is untouched.
pub fn apply_found(registry: &mut MarkerRegistry, candidate_index: usize, pose: &RawPose) -> OverlayResult<SlotHandle> {
    let handle = registry.slot_for_candidate(candidate_index)?;
    let center = registry
        .metadata_for(candidate_index)
        .map(marker_center_mm)
        .ok_or(TrackingError::MissingMetadata { index: candidate_index })?;
    let matrix = PoseMatrix::try_from(pose)?.to_mat4();

    let candidates = registry.candidate_count();
    let slot = registry
        .slot_mut(handle)
        .ok_or(TrackingError::UnknownCandidate {
            index: candidate_index,
            candidates,
        })?;

    slot.node.set_content_offset(center);
    slot.node.set_matrix(&matrix);
    slot.node.set_visible(true);
    if slot.visibility == Visibility::Hidden {
        tracing::info!(slot = handle.index(), candidate = candidate_index, "Marker found");
    }
    slot.visibility = Visibility::Visible;

    Ok(handle)
}

/// Apply a `lost` result: hide every non-persisted slot. Returns the slots
/// that went from visible to hidden.
pub fn apply_lost(registry: &mut MarkerRegistry) -> Vec<SlotHandle> {
    let mut hidden = Vec::new();
    for (handle, slot) in registry.slots_mut() {
        if slot.persisted {
            continue;
        }
        slot.node.set_visible(false);
        if slot.visibility == Visibility::Visible {
            tracing::info!(slot = handle.index(), "Marker lost");
            hidden.push(handle);
        }
        slot.visibility = Visibility::Hidden;
    }
    hidden
}
