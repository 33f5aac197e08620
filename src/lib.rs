//! # NFT Overlay Library
//!
//! Orchestration layer for overlaying 3D content on a live camera feed using
//! natural-feature (image) markers. The tracking engine itself is an external
//! collaborator running on its own worker thread; this crate sizes the
//! frames it receives, manages its lifecycle and applies its results to
//! scene nodes.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `session`: lifecycle glue and per-frame driving
//! - `registry`: marker slots and candidate → slot resolution
//! - `pose`: applying detections and losses to scene nodes
//! - `calibration`: adapting the engine projection to the render target
//! - `capture`: frame sources
//! - `scene`: scene node and camera interfaces
//! - `config`: configuration management and validation
//!
//! Buffer geometry lives in the `nft-layout` crate and the worker transport
//! in `nft-worker`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nft_overlay::capture::SolidFrameSource;
//! use nft_overlay::scene::shared_node;
//! use nft_overlay::TrackingSession;
//! use nft_layout::Size;
//! use nft_worker::replay::ReplayEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = TrackingSession::builder()
//!     .with_engine(ReplayEngine::from_path("session.jsonl")?)
//!     .build()?;
//!
//! let poster = shared_node();
//! session.register_marker(["/data/marker/poster"], poster.clone(), true)?;
//!
//! let mut source = SolidFrameSource::new(Size { w: 640, h: 480 }, [0, 0, 0, 255]);
//! session
//!     .run(&mut source, tokio::time::sleep(std::time::Duration::from_secs(5)))
//!     .await?;
//!
//! println!("poster visible: {}", poster.read().visible);
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod capture;
pub mod config;
pub mod error;
pub mod pose;
pub mod registry;
pub mod scene;
pub mod session;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, HasSeverity, OverlayResult, TrackingError};

pub use config::TrackerConfig;
pub use registry::{MarkerRegistry, SlotHandle, Visibility};
pub use session::{FrameDisposition, Lifecycle, SessionStats, TrackingSession, TrackingSessionBuilder};

/// Re-export commonly used types from the workspace crates
pub use nft_layout::{DeviceClass, ProcessingLayout, Size};
pub use nft_worker::{MarkerInfo, TrackingEngine};
