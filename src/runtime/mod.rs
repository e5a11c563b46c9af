//! Contract between the device wrapper and the native capture runtime.
//!
//! The proprietary runtime hands out session, frame, image and mapper
//! handles that must be acquired and released in strict pairs. Here every
//! such handle is a type that releases on [`Drop`], so a release cannot be
//! forgotten on early-return paths. The one exception is
//! [`RegisteredImage::release`], which the runtime allows to fail; callers
//! log the failure and carry on.

#[cfg(feature = "mock")]
pub mod mock;

use std::ops::Deref;

use image::GrayImage;
use thiserror::Error;

use crate::data::{ContourPoint, Point2, Point3};
use crate::settings::FaceMode;

/// A negative status code returned by the capture runtime.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("capture runtime status {0}")]
pub struct SdkError(pub i32);

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Color,
    Depth,
}

/// Fixed pixel layouts a sample image can be viewed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// 32-bit packed color, 4 bytes per pixel. Also used for the
    /// visualized rendition of a depth image.
    Rgba32,
    /// Raw 16-bit depth samples, little endian, 2 bytes per pixel.
    Depth16,
}

/// Entry point of a capture runtime.
pub trait Runtime {
    type Session: Session;

    /// Allocate a capture session. `None` when the runtime is unavailable.
    fn create_session(&mut self) -> Option<Self::Session>;
}

/// A capture session: stream negotiation and the per-frame poll.
pub trait Session {
    type Frame: FrameSample;
    type Mapper: Mapper<Image = <Self::Frame as FrameSample>::Image>;
    type Blobs: BlobSource;

    /// Request a stream before negotiation.
    fn enable_stream(&mut self, kind: StreamKind, width: u32, height: u32, fps: f32)
        -> SdkResult<()>;

    /// Finalize stream negotiation. Streams cannot be enabled afterwards.
    fn negotiate(&mut self) -> SdkResult<()>;

    /// Only accepted once the session is negotiated.
    fn set_mirrored(&mut self, mirrored: bool) -> SdkResult<()>;

    /// Spatial transform handle for the negotiated streams.
    fn create_mapper(&mut self) -> Option<Self::Mapper>;

    /// Turn on the blob module, capped at `max_blobs` tracked blobs.
    fn enable_blobs(&mut self, max_blobs: usize) -> SdkResult<Self::Blobs>;

    /// Turn on the face module with the given tracking mode.
    fn enable_face(&mut self, mode: FaceMode) -> SdkResult<()>;

    fn release_face(&mut self);

    /// Zero-timeout poll for the next frame. `None` when no frame is
    /// ready; the returned sample releases the runtime frame on drop.
    fn acquire_frame(&mut self) -> Option<Self::Frame>;

    fn close(&mut self);
}

/// One acquired frame, holding the per-stream image handles.
pub trait FrameSample {
    type Image: SampleImage;

    fn image(&self, kind: StreamKind) -> Option<&Self::Image>;
}

/// A runtime-owned image that can be viewed as raw bytes.
pub trait SampleImage {
    /// Read-only view of the image bytes; releases the access on drop.
    type View<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    fn acquire_view(&self, layout: PixelLayout) -> SdkResult<Self::View<'_>>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;
}

/// Spatial transform handle tied to the active session.
///
/// All projections are batched: one call per point set, never per point.
/// Implementations clear `out` and write exactly one output per input, in
/// input order.
pub trait Mapper {
    type Image: SampleImage;
    type Registered: RegisteredImage;

    /// Depth-image points (pixel x, pixel y, raw depth) to camera space.
    fn project_depth_to_camera(&self, points: &[Point3], out: &mut Vec<Point3>) -> SdkResult<()>;

    /// Depth-image points to color-image pixel coordinates.
    fn map_depth_to_color(&self, points: &[Point3], out: &mut Vec<Point2>) -> SdkResult<()>;

    /// Camera-space points to color-image pixel coordinates.
    fn project_camera_to_color(&self, points: &[Point3], out: &mut Vec<Point2>) -> SdkResult<()>;

    /// Runtime-side registered image: color resampled into the depth
    /// frame's geometry. `None` when the runtime cannot build it.
    fn color_mapped_to_depth(
        &self,
        depth: &Self::Image,
        color: &Self::Image,
    ) -> Option<Self::Registered>;

    /// Runtime-side registered image: depth resampled into the color
    /// frame's geometry, in visualized color form.
    fn depth_mapped_to_color(
        &self,
        color: &Self::Image,
        depth: &Self::Image,
    ) -> Option<Self::Registered>;
}

/// A temporary registered image created by the mapper. Unlike views and
/// frames this one is released explicitly, and the release may fail.
pub trait RegisteredImage: SampleImage {
    fn release(self) -> SdkResult<()>;
}

/// Per-frame blob query object.
pub trait BlobSource {
    /// Refresh the query against the latest frame.
    fn update(&mut self) -> SdkResult<()>;

    fn blob_count(&self) -> usize;

    fn contour_count(&self, blob: usize) -> usize;

    /// Points of one contour of one blob. A failure here concerns that
    /// contour only.
    fn contour_points(&self, blob: usize, contour: usize) -> SdkResult<Vec<ContourPoint>>;

    /// Copy of the blob's segmentation image, if the runtime provides one.
    fn segmentation(&self, blob: usize) -> Option<GrayImage>;
}
