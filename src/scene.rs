//! # Scene Collaborators
//!
//! The session never renders. It writes marker poses into [`SceneNode`]s and
//! the adapted projection into a [`SceneCamera`]; the renderer reads them on
//! its next draw.
//!
//! [`MarkerNode`] and [`PerspectiveCamera`] are plain state holders for
//! renderers that poll. Wrap them in [`SharedNode`] / [`SharedCamera`] to keep
//! a handle on the render side while the session owns the other clone.

use std::sync::Arc;

use glam::{DMat4, DVec2};
use parking_lot::RwLock;

/// Transform node owned by the caller, one per registered marker slot.
pub trait SceneNode: Send {
    /// Replace the node's local transform.
    fn set_matrix(&mut self, matrix: &DMat4);

    fn set_visible(&mut self, visible: bool);

    /// Position of the inner content group, in millimetres. Used to move
    /// content from the marker's corner to its center.
    fn set_content_offset(&mut self, offset: DVec2);
}

/// Camera whose projection is driven by the calibration adapter.
pub trait SceneCamera: Send {
    fn set_projection(&mut self, projection: &DMat4);

    /// When disabled the renderer must not recompute the camera matrices.
    fn set_matrix_auto_update(&mut self, enabled: bool);
}

/// Plain scene node state.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerNode {
    pub matrix: DMat4,
    pub visible: bool,
    pub content_offset: DVec2,
    /// Number of matrix writes received
    pub matrix_updates: u64,
}

impl Default for MarkerNode {
    fn default() -> Self {
        Self {
            matrix: DMat4::IDENTITY,
            visible: false,
            content_offset: DVec2::ZERO,
            matrix_updates: 0,
        }
    }
}

impl SceneNode for MarkerNode {
    fn set_matrix(&mut self, matrix: &DMat4) {
        self.matrix = *matrix;
        self.matrix_updates += 1;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn set_content_offset(&mut self, offset: DVec2) {
        self.content_offset = offset;
    }
}

/// Plain camera state.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub projection: DMat4,
    pub matrix_auto_update: bool,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            projection: DMat4::IDENTITY,
            matrix_auto_update: true,
        }
    }
}

impl SceneCamera for PerspectiveCamera {
    fn set_projection(&mut self, projection: &DMat4) {
        self.projection = *projection;
    }

    fn set_matrix_auto_update(&mut self, enabled: bool) {
        self.matrix_auto_update = enabled;
    }
}

pub type SharedNode = Arc<RwLock<MarkerNode>>;
pub type SharedCamera = Arc<RwLock<PerspectiveCamera>>;

impl<N: SceneNode + Sync> SceneNode for Arc<RwLock<N>> {
    fn set_matrix(&mut self, matrix: &DMat4) {
        self.write().set_matrix(matrix);
    }

    fn set_visible(&mut self, visible: bool) {
        self.write().set_visible(visible);
    }

    fn set_content_offset(&mut self, offset: DVec2) {
        self.write().set_content_offset(offset);
    }
}

impl<C: SceneCamera + Sync> SceneCamera for Arc<RwLock<C>> {
    fn set_projection(&mut self, projection: &DMat4) {
        self.write().set_projection(projection);
    }

    fn set_matrix_auto_update(&mut self, enabled: bool) {
        self.write().set_matrix_auto_update(enabled);
    }
}

/// Create a node handle pair: keep one clone, register the other.
pub fn shared_node() -> SharedNode {
    Arc::new(RwLock::new(MarkerNode::default()))
}

pub fn shared_camera() -> SharedCamera {
    Arc::new(RwLock::new(PerspectiveCamera::default()))
}
