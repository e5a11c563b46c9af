//! Depth-camera session wrapper for creative-coding loops.
//!
//! [`Device`] composes calls into a capture runtime (the [`runtime`]
//! traits): stream configuration, the init/start/update/stop lifecycle,
//! per-frame extraction of color and depth into owned pixel buffers, and
//! the spatial mapping pipeline (point cloud, depth/color registration,
//! per-point conversions). Blob and face tracking are optional add-ons.
//!
//! The crate is synchronous and single-threaded: call `update` from one
//! owning loop, once per logical frame.

mod blob;
mod cloud;
mod data;
mod device;
pub mod runtime;
mod settings;

use thiserror::Error;

pub use blob::{Blob, MAX_BLOBS};
pub use data::{ContourPoint, Intrinsics, Point2, Point3, BLACK};
pub use device::Device;
pub use settings::{AlignMode, CloudRes, ColorRes, DepthRes, FaceMode};

pub use image::{GrayImage, Rgba, RgbaImage};

/// 16-bit single-channel depth buffer.
pub type Depth16Image = image::ImageBuffer<image::Luma<u16>, Vec<u16>>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sdk(#[from] runtime::SdkError),
    #[error("No capture runtime available")]
    NoRuntime,
    #[error("Session not initialized, call init() first")]
    NotInitialized,
    #[error("{0} is only allowed while running")]
    OnlyWhileRunning(&'static str),
    #[error("{0} must be called before start()")]
    OnlyBeforeStart(&'static str),
    #[error("Invalid point cloud range ({0}, {1})")]
    InvalidCloudRange(f32, f32),
}
