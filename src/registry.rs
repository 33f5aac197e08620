//! # Marker Registry
//!
//! Owns the registered marker slots and the mapping between the flat
//! candidate list sent to the engine and the slots those candidates belong
//! to.
//!
//! A slot may list several candidate descriptors (alternative training
//! images for the same physical marker). The engine only sees the flattened
//! list and reports detections by position in it:
//!
//! ```text
//! register(["a", "b"]) -> slot 0      flatten: [a, b, c]
//! register(["c"])      -> slot 1      lookup:  [0, 0, 1]
//! ```
//!
//! Slots live for the whole session. Overlapping descriptors across slots are
//! not deduplicated.

use nft_worker::MarkerInfo;

use crate::error::{OverlayResult, TrackingError};
use crate::scene::SceneNode;

/// Stable identifier of a registered slot (its registration index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotHandle(usize);

impl SlotHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

/// One entry of the flattened candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatCandidate {
    pub slot: SlotHandle,
    pub descriptor: String,
}

pub(crate) struct MarkerSlot {
    pub(crate) node: Box<dyn SceneNode>,
    pub(crate) candidates: Vec<String>,
    pub(crate) persisted: bool,
    pub(crate) visibility: Visibility,
}

#[derive(Default)]
pub struct MarkerRegistry {
    slots: Vec<MarkerSlot>,
    /// Flattened candidate index -> slot index
    candidate_slots: Vec<usize>,
    /// Flattened candidate index -> metadata, once loaded
    metadata: Option<Vec<MarkerInfo>>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot. Its candidates are appended to the flattened list.
    pub fn register<I, S>(&mut self, candidates: I, node: impl SceneNode + 'static, persisted: bool) -> SlotHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = self.slots.len();
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        self.candidate_slots
            .extend(std::iter::repeat_n(index, candidates.len()));

        tracing::debug!(slot = index, candidates = candidates.len(), persisted, "Marker slot registered");

        self.slots.push(MarkerSlot {
            node: Box::new(node),
            candidates,
            persisted,
            visibility: Visibility::Hidden,
        });
        SlotHandle(index)
    }

    /// All candidates in slot order, then candidate order within the slot.
    pub fn flatten(&self) -> Vec<FlatCandidate> {
        self.slots
            .iter()
            .enumerate()
            .flat_map(|(i, slot)| {
                slot.candidates.iter().map(move |descriptor| FlatCandidate {
                    slot: SlotHandle(i),
                    descriptor: descriptor.clone(),
                })
            })
            .collect()
    }

    /// Descriptor list in the order the engine must load it.
    pub fn descriptors(&self) -> Vec<String> {
        self.flatten().into_iter().map(|c| c.descriptor).collect()
    }

    pub fn slot_for_candidate(&self, candidate_index: usize) -> OverlayResult<SlotHandle> {
        self.candidate_slots
            .get(candidate_index)
            .map(|&slot| SlotHandle(slot))
            .ok_or(TrackingError::UnknownCandidate {
                index: candidate_index,
                candidates: self.candidate_slots.len(),
            })
    }

    /// Associate loaded metadata with candidates by position.
    ///
    /// The list must have exactly one entry per flattened candidate, each
    /// with a finite size and a positive finite dpi. On any error nothing is
    /// stored.
    pub fn apply_metadata(&mut self, metadata: Vec<MarkerInfo>) -> OverlayResult<()> {
        if metadata.len() != self.candidate_slots.len() {
            return Err(TrackingError::MetadataMismatch {
                expected: self.candidate_slots.len(),
                actual: metadata.len(),
            });
        }
        for (index, info) in metadata.iter().enumerate() {
            check_info(info).map_err(|reason| TrackingError::InvalidMetadata { index, reason })?;
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    pub fn metadata_for(&self, candidate_index: usize) -> Option<&MarkerInfo> {
        self.metadata.as_ref()?.get(candidate_index)
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidate_slots.len()
    }

    pub fn visibility(&self, slot: SlotHandle) -> Option<Visibility> {
        self.slots.get(slot.0).map(|s| s.visibility)
    }

    pub fn is_persisted(&self, slot: SlotHandle) -> Option<bool> {
        self.slots.get(slot.0).map(|s| s.persisted)
    }

    pub fn candidates(&self, slot: SlotHandle) -> Option<&[String]> {
        self.slots.get(slot.0).map(|s| s.candidates.as_slice())
    }

    /// Visibility of every slot, in registration order.
    pub fn visibilities(&self) -> Vec<(SlotHandle, Visibility)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (SlotHandle(i), s.visibility))
            .collect()
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotHandle) -> Option<&mut MarkerSlot> {
        self.slots.get_mut(slot.0)
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = (SlotHandle, &mut MarkerSlot)> {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, s)| (SlotHandle(i), s))
    }
}

fn check_info(info: &MarkerInfo) -> Result<(), String> {
    if !info.dpi.is_finite() || info.dpi <= 0.0 {
        return Err(format!("dpi must be positive, got {}", info.dpi));
    }
    if !info.width.is_finite() || !info.height.is_finite() {
        return Err(format!("size {}x{} is not finite", info.width, info.height));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MarkerNode;

    fn info(id: i32) -> MarkerInfo {
        MarkerInfo { id, width: 800.0, height: 600.0, dpi: 72.0 }
    }

    fn two_one() -> MarkerRegistry {
        let mut registry = MarkerRegistry::new();
        registry.register(["a", "b"], MarkerNode::default(), false);
        registry.register(["c"], MarkerNode::default(), true);
        registry
    }

    #[test]
    fn flatten_preserves_slot_then_candidate_order() {
        let registry = two_one();
        let flat = registry.flatten();
        let pairs: Vec<_> = flat.iter().map(|c| (c.slot.index(), c.descriptor.as_str())).collect();
        assert_eq!(pairs, vec![(0, "a"), (0, "b"), (1, "c")]);
        assert_eq!(registry.descriptors(), vec!["a", "b", "c"]);
    }

    #[test]
    fn candidates_resolve_to_their_slots() {
        let registry = two_one();
        assert_eq!(registry.slot_for_candidate(0).unwrap().index(), 0);
        assert_eq!(registry.slot_for_candidate(1).unwrap().index(), 0);
        assert_eq!(registry.slot_for_candidate(2).unwrap().index(), 1);
        assert!(matches!(
            registry.slot_for_candidate(3),
            Err(TrackingError::UnknownCandidate { index: 3, candidates: 3 })
        ));
    }

    #[test]
    fn metadata_must_match_candidate_count() {
        let mut registry = two_one();
        let err = registry.apply_metadata(vec![info(0), info(1)]).unwrap_err();
        assert!(matches!(err, TrackingError::MetadataMismatch { expected: 3, actual: 2 }));
        assert!(!registry.has_metadata());

        registry.apply_metadata(vec![info(0), info(1), info(2)]).unwrap();
        assert_eq!(registry.metadata_for(2).map(|m| m.id), Some(2));
        assert!(registry.metadata_for(3).is_none());
    }

    #[test]
    fn unusable_metadata_is_rejected_whole() {
        let mut registry = two_one();
        let mut zero_dpi = info(1);
        zero_dpi.dpi = 0.0;
        let err = registry.apply_metadata(vec![info(0), zero_dpi, info(2)]).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidMetadata { index: 1, .. }));
        assert_eq!(err.category(), "registry");
        assert!(!registry.has_metadata());

        let mut nan_width = info(2);
        nan_width.width = f64::NAN;
        let err = registry.apply_metadata(vec![info(0), info(1), nan_width]).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidMetadata { index: 2, .. }));

        let mut infinite_dpi = info(0);
        infinite_dpi.dpi = f64::INFINITY;
        assert!(registry.apply_metadata(vec![infinite_dpi, info(1), info(2)]).is_err());
        assert!(!registry.has_metadata());
    }

    #[test]
    fn resolution_holds_for_any_registration_shape() {
        for counts in [vec![1], vec![3, 1, 2], vec![0, 2, 0, 1], vec![5, 5], vec![0], vec![2, 1]] {
            let mut registry = MarkerRegistry::new();
            for (slot, &n) in counts.iter().enumerate() {
                let names: Vec<String> = (0..n).map(|c| format!("s{slot}c{c}")).collect();
                let handle = registry.register(names, MarkerNode::default(), slot % 2 == 1);
                assert_eq!(handle.index(), slot);
            }

            let total: usize = counts.iter().sum();
            assert_eq!(registry.candidate_count(), total);
            assert_eq!(registry.slot_count(), counts.len());

            let mut candidate = 0;
            for (slot, &n) in counts.iter().enumerate() {
                for c in 0..n {
                    assert_eq!(
                        registry.slot_for_candidate(candidate).unwrap().index(),
                        slot,
                        "candidate {candidate} of {counts:?}"
                    );
                    assert_eq!(registry.descriptors()[candidate], format!("s{slot}c{c}"));
                    candidate += 1;
                }
            }
            assert!(registry.slot_for_candidate(total).is_err());
        }
    }

    #[test]
    fn duplicate_descriptors_are_kept() {
        let mut registry = MarkerRegistry::new();
        registry.register(["same"], MarkerNode::default(), false);
        registry.register(["same"], MarkerNode::default(), false);
        assert_eq!(registry.candidate_count(), 2);
        assert_eq!(registry.slot_for_candidate(1).unwrap().index(), 1);
    }

    #[test]
    fn slots_start_hidden() {
        let registry = two_one();
        assert!(registry
            .visibilities()
            .iter()
            .all(|(_, v)| *v == Visibility::Hidden));
        assert_eq!(registry.is_persisted(SlotHandle(1)), Some(true));
        assert_eq!(registry.candidates(SlotHandle(0)).map(|c| c.len()), Some(2));
    }
}
