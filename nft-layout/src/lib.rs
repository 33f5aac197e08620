// SPDX-License-Identifier: MIT
//! # nft-layout: Processing-Buffer Geometry for Marker Tracking
//!
//! Natural-feature-tracking engines are calibrated against one fixed buffer
//! resolution. This crate turns an arbitrary camera resolution into that
//! buffer: it computes the downscaled, letterboxed layout and draws frames
//! into it.
//!
//! ## Key Components
//!
//! - [`layout`]: pure layout computation (`ProcessingLayout`) and the device heuristic
//! - [`compose`]: CPU letterbox compositor using fast_image_resize
//!
//! ## Usage Example
//!
//! ```rust
//! use nft_layout::layout::{build_layout, DeviceProfile, Size};
//!
//! let layout = build_layout(Size { w: 1280, h: 720 }, DeviceProfile::desktop())?;
//! assert_eq!(layout.buffer_size(), Size { w: 320, h: 240 });
//! assert_eq!(layout.offset_y, 30.0);
//! # Ok::<(), nft_layout::layout::LayoutError>(())
//! ```

pub mod compose;
pub mod layout;

pub use compose::{compose_letterbox, ComposeError, FrameView, Staging};
pub use layout::{build_layout, DeviceClass, DeviceProfile, LayoutError, ProcessingLayout, Size};
