// SPDX-License-Identifier: MIT
// Letterbox compositor built on fast_image_resize (SIMD-accelerated).
// RGBA8 in → RGBA8 out, direct write into a caller-provided processing buffer.

use fast_image_resize as fir;
use fir::images::{TypedCroppedImageMut, TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};

use crate::layout::{ProcessingLayout, Size};

/// Opaque black, the fill drawn behind the content rectangle.
pub const LETTERBOX_FILL: [u8; 4] = [0, 0, 0, 255];

#[derive(Debug)]
pub enum ComposeError {
    BufferTooSmall { needed: usize, got: usize },
    SourceTooSmall { needed: usize, got: usize },
    StrideMismatchAndNoStaging,
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
    Crop(fir::CropBoxError),
}

impl From<fir::ResizeError> for ComposeError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ComposeError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }
impl From<fir::CropBoxError> for ComposeError { fn from(e: fir::CropBoxError) -> Self { Self::Crop(e) } }

impl std::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposeError::BufferTooSmall { needed, got } => {
                write!(f, "Processing buffer too small: need {} bytes, got {}", needed, got)
            }
            ComposeError::SourceTooSmall { needed, got } => {
                write!(f, "Source frame too small: need {} bytes, got {}", needed, got)
            }
            ComposeError::StrideMismatchAndNoStaging => write!(f, "Stride mismatch but no staging buffer provided"),
            ComposeError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ComposeError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
            ComposeError::Crop(e) => write!(f, "Crop error: {}", e),
        }
    }
}

impl std::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposeError::Fir(e) => Some(e),
            ComposeError::ImageBuf(e) => Some(e),
            ComposeError::Crop(e) => Some(e),
            _ => None,
        }
    }
}

/// Pre-allocated scratch to compact strided input to tightly packed rows (only if needed).
pub struct Staging {
    pub(crate) buf: Vec<u8>,
}

impl Staging {
    pub fn with_capacity(cap: usize) -> Self { Self { buf: Vec::with_capacity(cap) } }
    pub fn ensure_len(&mut self, len: usize) { if self.buf.len() < len { self.buf.resize(len, 0); } }
    pub fn as_slice(&self) -> &[u8] { &self.buf }
}

/// Borrowed RGBA8 camera frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub size: Size,
    /// Bytes per row. `None` means tightly packed (`size.w * 4`).
    pub stride: Option<usize>,
}

/// Draw `frame` into the letterboxed processing buffer described by `layout`.
///
/// The whole of `dst` (the first `layout.buffer_len()` bytes) is cleared to
/// [`LETTERBOX_FILL`] first, then the frame is resized into
/// [`ProcessingLayout::content_roi`]. The frame does not need to match
/// `layout.source`; it is always stretched over the content rectangle.
pub fn compose_letterbox(
    resizer: &mut Resizer,
    frame: FrameView<'_>,
    layout: &ProcessingLayout,
    dst: &mut [u8],
    mut staging: Option<&mut Staging>,
) -> Result<(), ComposeError> {
    let buffer = layout.buffer_size();
    let dst_len = layout.buffer_len();
    if dst.len() < dst_len {
        return Err(ComposeError::BufferTooSmall { needed: dst_len, got: dst.len() });
    }

    // --- Build source view (tightly packed) ---
    let tight_row_bytes = (frame.size.w as usize) * 4;
    let pitch = frame.stride.unwrap_or(tight_row_bytes);
    let rows = frame.size.h as usize;
    let needed = if rows == 0 { 0 } else { pitch * (rows - 1) + tight_row_bytes };
    if frame.data.len() < needed {
        return Err(ComposeError::SourceTooSmall { needed, got: frame.data.len() });
    }

    let src_view = if pitch == tight_row_bytes {
        TypedImageRef::<U8x4>::from_buffer(frame.size.w, frame.size.h, &frame.data[..tight_row_bytes * rows])?
    } else {
        let st = staging.as_deref_mut().ok_or(ComposeError::StrideMismatchAndNoStaging)?;
        st.ensure_len(tight_row_bytes * rows);
        compact_rows(frame.data, pitch, st.buf.as_mut_slice(), tight_row_bytes, rows);
        TypedImageRef::<U8x4>::from_buffer(frame.size.w, frame.size.h, &st.as_slice()[..tight_row_bytes * rows])?
    };

    // --- Letterbox fill, then carve out the content rectangle ---
    let dst = &mut dst[..dst_len];
    fill_rgba(dst, LETTERBOX_FILL);
    let mut dst_image = TypedImage::<U8x4>::from_buffer(buffer.w, buffer.h, dst)?;

    let (x, y, w, h) = layout.content_roi();
    let mut roi = TypedCroppedImageMut::from_ref(&mut dst_image, x, y, w, h)?;

    let opts = ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear))
        .use_alpha(false);
    resizer.resize_typed::<U8x4>(&src_view, &mut roi, &opts)?;

    Ok(())
}

#[inline]
fn fill_rgba(dst: &mut [u8], fill: [u8; 4]) {
    for px in dst.chunks_exact_mut(4) {
        px.copy_from_slice(&fill);
    }
}

#[inline]
fn compact_rows(src: &[u8], src_pitch: usize, dst: &mut [u8], row_bytes: usize, rows: usize) {
    for r in 0..rows {
        let s = &src[r * src_pitch .. r * src_pitch + row_bytes];
        let d = &mut dst[r * row_bytes .. (r + 1) * row_bytes];
        d.copy_from_slice(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_layout, DeviceProfile};

    fn solid(size: Size, rgba: [u8; 4]) -> Vec<u8> {
        let mut data = vec![0u8; size.w as usize * size.h as usize * 4];
        fill_rgba(&mut data, rgba);
        data
    }

    fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    #[test]
    fn letterbox_bars_are_black_and_content_is_drawn() {
        let size = Size { w: 1280, h: 720 };
        let layout = build_layout(size, DeviceProfile::desktop()).unwrap();
        let src = solid(size, [200, 100, 50, 255]);
        let mut dst = vec![7u8; layout.buffer_len()];

        compose_letterbox(
            &mut Resizer::new(),
            FrameView { data: &src, size, stride: None },
            &layout,
            &mut dst,
            None,
        )
        .unwrap();

        // Top and bottom bars are 30 rows each.
        assert_eq!(pixel(&dst, 320, 10, 0), LETTERBOX_FILL);
        assert_eq!(pixel(&dst, 320, 10, 29), LETTERBOX_FILL);
        assert_eq!(pixel(&dst, 320, 10, 239), LETTERBOX_FILL);
        assert_eq!(pixel(&dst, 320, 160, 120), [200, 100, 50, 255]);
    }

    #[test]
    fn strided_input_requires_staging() {
        let size = Size { w: 64, h: 48 };
        let layout = build_layout(size, DeviceProfile::desktop()).unwrap();
        let stride = 64 * 4 + 16;
        let src = vec![255u8; stride * 48];
        let mut dst = vec![0u8; layout.buffer_len()];

        let err = compose_letterbox(
            &mut Resizer::new(),
            FrameView { data: &src, size, stride: Some(stride) },
            &layout,
            &mut dst,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ComposeError::StrideMismatchAndNoStaging));

        let mut staging = Staging::with_capacity(64 * 48 * 4);
        compose_letterbox(
            &mut Resizer::new(),
            FrameView { data: &src, size, stride: Some(stride) },
            &layout,
            &mut dst,
            Some(&mut staging),
        )
        .unwrap();
        assert_eq!(pixel(&dst, 320, 100, 100), [255, 255, 255, 255]);
    }

    #[test]
    fn short_destination_is_rejected() {
        let size = Size { w: 640, h: 480 };
        let layout = build_layout(size, DeviceProfile::desktop()).unwrap();
        let src = solid(size, [1, 2, 3, 255]);
        let mut dst = vec![0u8; 16];
        let err = compose_letterbox(
            &mut Resizer::new(),
            FrameView { data: &src, size, stride: None },
            &layout,
            &mut dst,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ComposeError::BufferTooSmall { .. }));
    }
}
