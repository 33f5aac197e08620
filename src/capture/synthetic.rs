// # Synthetic Source
//
// Solid-colour frames of a fixed size. Useful for driving a session
// without a camera, e.g. against a replayed engine.

use async_trait::async_trait;
use nft_layout::{FrameView, Size};

use super::FrameSource;
use crate::error::OverlayResult;

pub struct SolidFrameSource {
    size: Size,
    rgba: [u8; 4],
    data: Vec<u8>,
}

impl SolidFrameSource {
    pub fn new(size: Size, rgba: [u8; 4]) -> Self {
        Self {
            size,
            rgba,
            data: Vec::new(),
        }
    }
}

#[async_trait]
impl FrameSource for SolidFrameSource {
    /// Reports the configured size as is; a zero size is rejected later by
    /// the layout calculator.
    async fn open(&mut self) -> OverlayResult<Size> {
        let pixels = self.size.w as usize * self.size.h as usize;
        self.data = self.rgba.repeat(pixels);
        Ok(self.size)
    }

    fn current_frame(&mut self) -> Option<FrameView<'_>> {
        if self.data.is_empty() {
            return None;
        }
        Some(FrameView {
            data: &self.data,
            size: self.size,
            stride: None,
        })
    }

    async fn close(&mut self) -> OverlayResult<()> {
        self.data = Vec::new();
        Ok(())
    }

    fn name(&self) -> &str {
        "solid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_exist_only_while_open() {
        let mut source = SolidFrameSource::new(Size { w: 4, h: 2 }, [9, 8, 7, 255]);
        assert!(source.current_frame().is_none());

        assert_eq!(source.open().await.unwrap(), Size { w: 4, h: 2 });
        let frame = source.current_frame().unwrap();
        assert_eq!(frame.data.len(), 32);
        assert_eq!(&frame.data[28..], &[9, 8, 7, 255]);

        source.close().await.unwrap();
        assert!(source.current_frame().is_none());
    }
}
