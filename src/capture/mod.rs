// # Capture Module
//
// Frame sources feeding a tracking session. Camera acquisition itself lives
// outside this crate; these sources cover still-image sequences and
// synthetic frames for headless runs.

pub mod image_sequence;
pub mod synthetic;

use async_trait::async_trait;
use nft_layout::{FrameView, Size};

use crate::error::OverlayResult;

pub use image_sequence::ImageSequenceSource;
pub use synthetic::SolidFrameSource;

/// Abstract interface for video frame sources.
///
/// The session opens the source once, sizes its layout from the reported
/// native resolution, then pulls the current frame on every tick.
#[async_trait]
pub trait FrameSource: Send {
    /// Open the source and report its native frame size.
    async fn open(&mut self) -> OverlayResult<Size>;

    /// The frame to process on this tick, as tightly packed or strided RGBA8.
    /// `None` when no frame is available yet.
    fn current_frame(&mut self) -> Option<FrameView<'_>>;

    /// Release the source.
    async fn close(&mut self) -> OverlayResult<()>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "frame-source"
    }
}
