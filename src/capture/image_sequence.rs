// # Image Sequence Source
//
// Plays a list of still images as a looping video. All images must share
// the first image's dimensions.

use std::path::PathBuf;

use async_trait::async_trait;
use image::RgbaImage;
use nft_layout::{FrameView, Size};

use super::FrameSource;
use crate::error::{OverlayResult, TrackingError};

pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    frames: Vec<RgbaImage>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            frames: Vec::new(),
            cursor: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn decode_all(paths: &[PathBuf]) -> OverlayResult<Vec<RgbaImage>> {
    let mut frames: Vec<RgbaImage> = Vec::with_capacity(paths.len());
    for path in paths {
        let frame = image::open(path)
            .map_err(|e| TrackingError::capture("image-sequence", format!("{}: {}", path.display(), e)))?
            .to_rgba8();

        if let Some(first) = frames.first() {
            if first.dimensions() != frame.dimensions() {
                return Err(TrackingError::capture(
                    "image-sequence",
                    format!(
                        "{} is {}x{}, expected {}x{}",
                        path.display(),
                        frame.width(),
                        frame.height(),
                        first.width(),
                        first.height()
                    ),
                ));
            }
        }
        frames.push(frame);
    }
    Ok(frames)
}

#[async_trait]
impl FrameSource for ImageSequenceSource {
    async fn open(&mut self) -> OverlayResult<Size> {
        if self.paths.is_empty() {
            return Err(TrackingError::capture("image-sequence", "no images given"));
        }

        let paths = self.paths.clone();
        let frames = tokio::task::spawn_blocking(move || decode_all(&paths))
            .await
            .map_err(|e| TrackingError::capture("image-sequence", format!("decoder task failed: {e}")))??;

        let (w, h) = frames
            .first()
            .map(|f| f.dimensions())
            .ok_or_else(|| TrackingError::capture("image-sequence", "no frames decoded"))?;
        tracing::info!(frames = frames.len(), width = w, height = h, "Image sequence opened");
        self.frames = frames;
        self.cursor = 0;
        Ok(Size { w, h })
    }

    fn current_frame(&mut self) -> Option<FrameView<'_>> {
        if self.frames.is_empty() {
            return None;
        }
        let index = self.cursor % self.frames.len();
        self.cursor = self.cursor.wrapping_add(1);

        let frame = &self.frames[index];
        Some(FrameView {
            data: frame.as_raw(),
            size: Size { w: frame.width(), h: frame.height() },
            stride: None,
        })
    }

    async fn close(&mut self) -> OverlayResult<()> {
        self.frames.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "image-sequence"
    }
}
