use image::{Rgba, RgbaImage};
use log::{debug, warn};

use crate::blob::{self, Blob, MAX_BLOBS};
use crate::cloud;
use crate::data::{Point2, Point3, BLACK};
use crate::runtime::{
    FrameSample, Mapper, PixelLayout, RegisteredImage, Runtime, SampleImage, Session, StreamKind,
};
use crate::settings::{AlignMode, CloudRes, ColorRes, DepthRes, FaceMode};
use crate::{Depth16Image, Error};

type SessionOf<R> = <R as Runtime>::Session;
type MapperOf<R> = <SessionOf<R> as Session>::Mapper;
type BlobsOf<R> = <SessionOf<R> as Session>::Blobs;

/// A depth-camera capture session.
///
/// Owns every runtime handle and every published buffer; single-threaded,
/// polled from one owning loop:
///
/// `init` -> `init_color`/`init_depth` -> `start` -> `update` per frame ->
/// `stop`.
///
/// Getters expose whatever the last successful `update` published; check
/// the `update` result before trusting them.
pub struct Device<R: Runtime> {
    runtime: R,
    session: Option<SessionOf<R>>,
    mapper: Option<MapperOf<R>>,
    blob_source: Option<BlobsOf<R>>,

    running: bool,
    mirrored: bool,
    has_color: bool,
    has_depth: bool,
    depth_as_color: bool,
    align: Option<AlignMode>,
    cloud_res: Option<CloudRes>,
    face_tracking: bool,
    blob_tracking: bool,
    max_contours: usize,

    color_size: (u32, u32),
    depth_size: (u32, u32),
    cloud_range: (f32, f32),

    color_frame: RgbaImage,
    depth_frame: Depth16Image,
    depth_as_color_frame: RgbaImage,
    color_to_depth_frame: RgbaImage,
    depth_to_color_frame: RgbaImage,
    raw_depth: Vec<u16>,
    point_cloud: Vec<Point3>,
    blob_set: Vec<Blob>,
}

impl<R: Runtime> Device<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            session: None,
            mapper: None,
            blob_source: None,
            running: false,
            mirrored: false,
            has_color: false,
            has_depth: false,
            depth_as_color: false,
            align: None,
            cloud_res: None,
            face_tracking: false,
            blob_tracking: false,
            max_contours: 1,
            color_size: (0, 0),
            depth_size: (0, 0),
            cloud_range: (0.0, 3000.0),
            color_frame: RgbaImage::new(0, 0),
            depth_frame: Depth16Image::new(0, 0),
            depth_as_color_frame: RgbaImage::new(0, 0),
            color_to_depth_frame: RgbaImage::new(0, 0),
            depth_to_color_frame: RgbaImage::new(0, 0),
            raw_depth: Vec::new(),
            point_cloud: Vec::new(),
            blob_set: Vec::new(),
        }
    }

    /// Acquire the underlying capture session.
    pub fn init(&mut self) -> Result<(), Error> {
        self.session = Some(self.runtime.create_session().ok_or(Error::NoRuntime)?);

        Ok(())
    }

    /// Request the color stream. Must be called between `init` and
    /// `start`; buffers are allocated only when the runtime accepts the
    /// stream.
    pub fn init_color(&mut self, res: ColorRes, fps: f32) -> Result<(), Error> {
        if self.running {
            return Err(Error::OnlyBeforeStart("init_color"));
        }

        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;
        let (width, height) = res.dims();

        session.enable_stream(StreamKind::Color, width, height, fps)?;

        self.has_color = true;
        self.color_size = (width, height);
        self.color_frame = RgbaImage::new(width, height);

        Ok(())
    }

    /// Request the depth stream. `as_color` additionally publishes an
    /// 8-bit visualized rendition of each depth frame.
    pub fn init_depth(&mut self, res: DepthRes, fps: f32, as_color: bool) -> Result<(), Error> {
        if self.running {
            return Err(Error::OnlyBeforeStart("init_depth"));
        }

        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;
        let (width, height) = res.dims();

        session.enable_stream(StreamKind::Depth, width, height, fps)?;

        self.has_depth = true;
        self.depth_as_color = as_color;
        self.depth_size = (width, height);
        self.depth_frame = Depth16Image::new(width, height);
        self.raw_depth = vec![0; (width * height) as usize];

        if as_color {
            self.depth_as_color_frame = RgbaImage::new(width, height);
        }

        Ok(())
    }

    /// Finalize stream negotiation, capture the coordinate mapper and
    /// apply any deferred mirror setting.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.running {
            return Ok(());
        }

        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;

        session.negotiate()?;

        self.mapper = session.create_mapper();

        if self.align == Some(AlignMode::Frames) {
            let (width, height) = self.color_size;

            self.color_to_depth_frame = RgbaImage::new(width, height);
            self.depth_to_color_frame = RgbaImage::new(width, height);
        }

        session.set_mirrored(self.mirrored)?;
        self.running = true;

        Ok(())
    }

    /// Zero-timeout poll for one frame.
    ///
    /// `Ok(true)` publishes the enabled streams and derived products
    /// atomically; on `Ok(false)` (no frame ready, a stream missing from
    /// the sample, or a buffer-access failure) every published buffer
    /// keeps its previous contents, byte for byte.
    pub fn update(&mut self) -> Result<bool, Error> {
        if !self.running {
            return Err(Error::OnlyWhileRunning("update"));
        }

        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;
        let Some(frame) = session.acquire_frame() else {
            return Ok(false);
        };

        let mut staged_color: Option<RgbaImage> = None;
        let mut staged_depth: Option<(Depth16Image, Vec<u16>)> = None;
        let mut staged_depth_vis: Option<RgbaImage> = None;
        let mut staged_color_to_depth: Option<RgbaImage> = None;
        let mut staged_depth_to_color: Option<RgbaImage> = None;

        if self.has_color {
            let Some(image) = frame.image(StreamKind::Color) else {
                debug!("sample is missing the color stream");
                return Ok(false);
            };
            let view = match image.acquire_view(PixelLayout::Rgba32) {
                Ok(view) => view,
                Err(error) => {
                    debug!("color view acquire failed: {error}");
                    return Ok(false);
                }
            };
            let (width, height) = self.color_size;
            let Some(buffer) = copy_rgba(&view, width, height) else {
                debug!("color view has unexpected length");
                return Ok(false);
            };

            staged_color = Some(buffer);
        }

        if self.has_depth {
            let Some(image) = frame.image(StreamKind::Depth) else {
                debug!("sample is missing the depth stream");
                return Ok(false);
            };
            let (width, height) = self.depth_size;

            {
                let view = match image.acquire_view(PixelLayout::Depth16) {
                    Ok(view) => view,
                    Err(error) => {
                        debug!("depth view acquire failed: {error}");
                        return Ok(false);
                    }
                };
                let Some(raw) = copy_depth16(&view, width, height) else {
                    debug!("depth view has unexpected length");
                    return Ok(false);
                };
                let Some(buffer) = Depth16Image::from_raw(width, height, raw.clone()) else {
                    return Ok(false);
                };

                staged_depth = Some((buffer, raw));
            }

            if self.depth_as_color {
                let view = match image.acquire_view(PixelLayout::Rgba32) {
                    Ok(view) => view,
                    Err(error) => {
                        debug!("visualized depth view acquire failed: {error}");
                        return Ok(false);
                    }
                };
                let Some(buffer) = copy_rgba(&view, width, height) else {
                    return Ok(false);
                };

                staged_depth_vis = Some(buffer);
            }
        }

        if self.has_color && self.has_depth && self.align == Some(AlignMode::Frames) {
            let (Some(depth_image), Some(color_image)) = (
                frame.image(StreamKind::Depth),
                frame.image(StreamKind::Color),
            ) else {
                return Ok(false);
            };
            let Some(mapper) = self.mapper.as_ref() else {
                debug!("alignment requested without a mapper");
                return Ok(false);
            };
            let Some(mapped_color) = mapper.color_mapped_to_depth(depth_image, color_image) else {
                return Ok(false);
            };
            let Some(mapped_depth) = mapper.depth_mapped_to_color(color_image, depth_image) else {
                release_registered(mapped_color);
                return Ok(false);
            };
            let (width, height) = self.color_size;

            // a failed view on a registered image skips that aligned
            // buffer without failing the frame
            if let Ok(view) = mapped_color.acquire_view(PixelLayout::Rgba32) {
                staged_color_to_depth = copy_rgba(&view, width, height);
            }
            if let Ok(view) = mapped_depth.acquire_view(PixelLayout::Rgba32) {
                staged_depth_to_color = copy_rgba(&view, width, height);
            }

            release_registered(mapped_color);
            release_registered(mapped_depth);
        }

        let staged_cloud = match (self.cloud_res, staged_depth.as_ref()) {
            (Some(res), Some((_, raw))) => {
                let Some(mapper) = self.mapper.as_ref() else {
                    debug!("point cloud requested without a mapper");
                    return Ok(false);
                };
                let (width, height) = self.depth_size;
                let mut points = Vec::new();

                cloud::rebuild(
                    &mut points,
                    mapper,
                    raw,
                    width as usize,
                    height as usize,
                    res.step(),
                    self.cloud_range,
                )?;

                Some(points)
            }
            _ => None,
        };

        let staged_blobs = match (self.blob_tracking, self.blob_source.as_mut()) {
            (true, Some(source)) => Some(blob::collect(source, MAX_BLOBS, self.max_contours)),
            _ => None,
        };

        // the whole frame succeeded; publish everything at once
        if let Some(buffer) = staged_color {
            self.color_frame = buffer;
        }
        if let Some((buffer, raw)) = staged_depth {
            self.depth_frame = buffer;
            self.raw_depth = raw;
        }
        if let Some(buffer) = staged_depth_vis {
            self.depth_as_color_frame = buffer;
        }
        if let Some(buffer) = staged_color_to_depth {
            self.color_to_depth_frame = buffer;
        }
        if let Some(buffer) = staged_depth_to_color {
            self.depth_to_color_frame = buffer;
        }
        if let Some(points) = staged_cloud {
            self.point_cloud = points;
        }
        if let Some(set) = staged_blobs {
            self.blob_set = set;
        }

        Ok(true)
    }

    /// Release every runtime handle and free all owned buffers.
    /// Idempotent; safe to call without a session.
    pub fn stop(&mut self) {
        self.running = false;
        self.mapper = None;
        self.blob_source = None;

        if let Some(session) = self.session.as_mut() {
            if self.face_tracking {
                session.release_face();
            }
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }

        self.raw_depth = Vec::new();
        self.point_cloud = Vec::new();
        self.blob_set = Vec::new();
    }

    /// Mirror the capture horizontally. Applied immediately while
    /// running; the device only accepts the setting once negotiated, so
    /// before `start` the request is stored and applied there.
    pub fn set_mirrored(&mut self, mirrored: bool) -> Result<(), Error> {
        self.mirrored = mirrored;

        if !self.running {
            return Ok(());
        }

        self.session
            .as_mut()
            .ok_or(Error::NotInitialized)?
            .set_mirrored(mirrored)?;

        Ok(())
    }

    /// Raw depth bounds outside which samples are excluded from the
    /// point cloud; both ends are exclusive.
    pub fn set_point_cloud_range(&mut self, min: f32, max: f32) -> Result<(), Error> {
        if min >= max {
            return Err(Error::InvalidCloudRange(min, max));
        }

        self.cloud_range = (min, max);

        Ok(())
    }

    /// Rebuild a point cloud on every update, decimated at the given
    /// stride.
    pub fn enable_point_cloud(&mut self, res: CloudRes) {
        self.cloud_res = Some(res);
    }

    /// Request depth/color registration. `AlignMode::Frames` allocates
    /// the aligned buffers at `start`, so it must precede it.
    pub fn enable_alignment(&mut self, mode: AlignMode) -> Result<(), Error> {
        if self.running {
            return Err(Error::OnlyBeforeStart("enable_alignment"));
        }

        self.align = Some(mode);

        Ok(())
    }

    /// Turn on the blob module, tracking at most [`MAX_BLOBS`] blobs.
    pub fn enable_blob_tracking(&mut self) -> Result<(), Error> {
        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;

        self.blob_source = Some(session.enable_blobs(MAX_BLOBS)?);
        self.blob_tracking = true;

        Ok(())
    }

    /// Turn on face tracking, in color-only or color-plus-depth mode.
    pub fn enable_face_tracking(&mut self, use_depth: bool) -> Result<(), Error> {
        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;
        let mode = if use_depth {
            FaceMode::ColorPlusDepth
        } else {
            FaceMode::Color
        };

        session.enable_face(mode)?;
        self.face_tracking = true;

        Ok(())
    }

    /// Contours extracted per blob. Defaults to 1: multi-contour blobs
    /// are truncated unless a caller raises the limit.
    pub fn set_max_contours(&mut self, max_contours: usize) {
        self.max_contours = max_contours.max(1);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn color_frame(&self) -> &RgbaImage {
        &self.color_frame
    }

    pub fn depth_frame(&self) -> &Depth16Image {
        &self.depth_frame
    }

    pub fn depth_as_color_frame(&self) -> &RgbaImage {
        &self.depth_as_color_frame
    }

    pub fn color_mapped_to_depth_frame(&self) -> &RgbaImage {
        &self.color_to_depth_frame
    }

    pub fn depth_mapped_to_color_frame(&self) -> &RgbaImage {
        &self.depth_to_color_frame
    }

    pub fn point_cloud(&self) -> &[Point3] {
        &self.point_cloud
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blob_set
    }

    // Nomenclature:
    //   a "depth point" is a depth-image point (pixel x, pixel y, raw z)
    //   a "camera point" is a 3D camera-space point
    //   "coords" are normalized (0-1) color-texture coordinates

    /// Camera-space point for a depth-image point; origin when no mapper
    /// exists yet.
    pub fn camera_point_from_depth(&self, x: f32, y: f32, z: f32) -> Point3 {
        let Some(mapper) = self.mapper.as_ref() else {
            return Point3::ORIGIN;
        };
        let mut out = Vec::with_capacity(1);

        if mapper
            .project_depth_to_camera(&[Point3::new(x, y, z)], &mut out)
            .is_err()
        {
            return Point3::ORIGIN;
        }

        out.first().copied().unwrap_or(Point3::ORIGIN)
    }

    /// Color under a depth-image point; black when no mapper exists or
    /// the mapped pixel falls outside the color stream.
    pub fn color_from_depth_point(&self, x: f32, y: f32, z: f32) -> Rgba<u8> {
        let Some(pixel) = self.map_one_depth_point(x, y, z) else {
            return BLACK;
        };

        self.color_at(pixel.x, pixel.y)
    }

    /// Color under a camera-space point; black when no mapper exists or
    /// the projected pixel falls outside the color stream.
    pub fn color_from_camera_point(&self, point: Point3) -> Rgba<u8> {
        let Some(pixel) = self.project_one_camera_point(point) else {
            return BLACK;
        };

        self.color_at(pixel.x, pixel.y)
    }

    /// Normalized color-texture coordinates for a depth-image point;
    /// origin when no mapper exists yet.
    pub fn color_coords_from_depth_point(&self, x: f32, y: f32, z: f32) -> Point2 {
        let Some(pixel) = self.map_one_depth_point(x, y, z) else {
            return Point2::ORIGIN;
        };

        self.normalize_color_pixel(pixel)
    }

    /// Normalized color-texture coordinates for a camera-space point;
    /// origin when no mapper exists yet.
    pub fn color_coords_from_camera_point(&self, point: Point3) -> Point2 {
        let Some(pixel) = self.project_one_camera_point(point) else {
            return Point2::ORIGIN;
        };

        self.normalize_color_pixel(pixel)
    }

    fn map_one_depth_point(&self, x: f32, y: f32, z: f32) -> Option<Point2> {
        let mapper = self.mapper.as_ref()?;
        let mut out = Vec::with_capacity(1);

        mapper
            .map_depth_to_color(&[Point3::new(x, y, z)], &mut out)
            .ok()?;
        out.first().copied()
    }

    fn project_one_camera_point(&self, point: Point3) -> Option<Point2> {
        let mapper = self.mapper.as_ref()?;
        let mut out = Vec::with_capacity(1);

        mapper.project_camera_to_color(&[point], &mut out).ok()?;
        out.first().copied()
    }

    fn color_at(&self, x: f32, y: f32) -> Rgba<u8> {
        let (width, height) = self.color_size;

        if x < 0.0 || y < 0.0 {
            return BLACK;
        }

        let (px, py) = (x as u32, y as u32);

        if px >= width || py >= height {
            return BLACK;
        }

        *self.color_frame.get_pixel(px, py)
    }

    fn normalize_color_pixel(&self, pixel: Point2) -> Point2 {
        let (width, height) = self.color_size;

        if width == 0 || height == 0 {
            return Point2::ORIGIN;
        }

        Point2::new(pixel.x / width as f32, pixel.y / height as f32)
    }
}

fn release_registered<I: RegisteredImage>(image: I) {
    if let Err(error) = image.release() {
        warn!("Release check error: {error}");
    }
}

fn copy_rgba(bytes: &[u8], width: u32, height: u32) -> Option<RgbaImage> {
    if bytes.len() != (width * height * 4) as usize {
        return None;
    }

    RgbaImage::from_raw(width, height, bytes.to_vec())
}

fn copy_depth16(bytes: &[u8], width: u32, height: u32) -> Option<Vec<u16>> {
    if bytes.len() != (width * height * 2) as usize {
        return None;
    }

    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    )
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::runtime::mock::{MockRuntime, MockShared};

    fn configured_device() -> (Device<MockRuntime>, Rc<MockShared>) {
        let runtime = MockRuntime::new();
        let shared = runtime.shared();
        let mut device = Device::new(runtime);

        device.init().expect("init");
        device.init_color(ColorRes::Sm, 30.0).expect("init_color");
        device
            .init_depth(DepthRes::Qvga, 30.0, false)
            .expect("init_depth");

        (device, shared)
    }

    fn started_device() -> (Device<MockRuntime>, Rc<MockShared>) {
        let (mut device, shared) = configured_device();

        device.start().expect("start");

        (device, shared)
    }

    #[test]
    fn init_fails_without_a_runtime() {
        let runtime = MockRuntime::new();

        runtime.shared().state().deny_session = true;

        let mut device = Device::new(runtime);
        assert!(matches!(device.init(), Err(Error::NoRuntime)));
    }

    #[test]
    fn update_before_start_fails() {
        let (mut device, _shared) = configured_device();

        assert!(matches!(
            device.update(),
            Err(Error::OnlyWhileRunning("update"))
        ));
    }

    #[test]
    fn stream_init_rejected_after_start() {
        let (mut device, _shared) = started_device();

        assert!(matches!(
            device.init_color(ColorRes::Vga, 30.0),
            Err(Error::OnlyBeforeStart("init_color"))
        ));
    }

    #[test]
    fn update_publishes_enabled_streams() {
        let (mut device, shared) = started_device();

        assert!(device.update().expect("update"));
        assert_eq!(device.color_frame().dimensions(), (320, 240));
        assert_eq!(device.depth_frame().dimensions(), (320, 240));
        assert_eq!(device.depth_frame().get_pixel(7, 5).0[0], 1000);
        assert_eq!(device.point_cloud().len(), 0);
        assert_eq!(shared.active_views(), 0);
        assert_eq!(shared.live_frames(), 0);
    }

    #[test]
    fn no_frame_available_returns_false() {
        let (mut device, shared) = started_device();

        shared.state().no_frame = true;

        assert!(!device.update().expect("update"));
    }

    #[test]
    fn failed_update_preserves_published_buffers() {
        let (mut device, shared) = started_device();

        assert!(device.update().expect("first update"));

        let color_before = device.color_frame().clone();
        let depth_before = device.depth_frame().clone();

        // change what the next frame would contain, then make it fail
        // after the color copy already succeeded
        device.set_mirrored(true).expect("set_mirrored");
        shared.state().depth_fill = 2222;
        shared.state().fail_depth_view = true;

        assert!(!device.update().expect("failing update"));
        assert_eq!(device.color_frame().as_raw(), color_before.as_raw());
        assert_eq!(device.depth_frame().as_raw(), depth_before.as_raw());
        assert_eq!(shared.active_views(), 0);
        assert_eq!(shared.live_frames(), 0);
    }

    #[test]
    fn missing_stream_aborts_the_frame() {
        let (mut device, shared) = started_device();

        shared.state().drop_color = true;

        assert!(!device.update().expect("update"));
        assert_eq!(shared.live_frames(), 0);
    }

    #[test]
    fn point_cloud_filters_by_range_in_scan_order() {
        let (mut device, shared) = configured_device();

        device.enable_point_cloud(CloudRes::Full);
        device
            .set_point_cloud_range(100.0, 1500.0)
            .expect("cloud range");

        let mut depth = vec![0u16; 320 * 240];
        depth[0] = 1499; // kept, pixel (0, 0)
        depth[1] = 1500; // excluded, max is exclusive
        depth[2] = 100; // excluded, min is exclusive
        depth[3] = 101; // kept, pixel (3, 0)
        shared.state().depth_image = Some(depth);

        device.start().expect("start");
        assert!(device.update().expect("update"));

        let cloud = device.point_cloud();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud[0].z, 1499.0);
        assert_eq!(cloud[1].z, 101.0);
    }

    #[test]
    fn point_cloud_stride_reduces_samples() {
        let (mut device, shared) = configured_device();

        device.enable_point_cloud(CloudRes::Half);
        shared.state().depth_fill = 500;

        device.start().expect("start");
        assert!(device.update().expect("update"));

        // every sample is in range; half resolution visits a quarter
        assert_eq!(device.point_cloud().len(), 160 * 120);
    }

    #[test]
    fn mapping_queries_return_sentinels_without_a_mapper() {
        let (device, _shared) = configured_device();

        assert_eq!(
            device.camera_point_from_depth(10.0, 10.0, 500.0),
            Point3::ORIGIN
        );
        assert_eq!(device.color_from_depth_point(10.0, 10.0, 500.0), BLACK);
        assert_eq!(
            device.color_from_camera_point(Point3::new(0.0, 0.0, 1.0)),
            BLACK
        );
        assert_eq!(
            device.color_coords_from_depth_point(10.0, 10.0, 500.0),
            Point2::ORIGIN
        );
    }

    #[test]
    fn principal_point_maps_to_color_center() {
        let (mut device, _shared) = started_device();

        assert!(device.update().expect("update"));

        // Sm color and Qvga depth share ideal 320x240 intrinsics, so the
        // depth principal point lands exactly on the color center pixel.
        let looked_up = device.color_from_depth_point(160.0, 120.0, 1000.0);
        assert_eq!(looked_up, *device.color_frame().get_pixel(160, 120));

        let coords = device.color_coords_from_depth_point(160.0, 120.0, 1000.0);
        assert!((coords.x - 0.5).abs() < 1e-6);
        assert!((coords.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_bounds_color_lookup_is_black() {
        let (mut device, _shared) = started_device();

        assert!(device.update().expect("update"));
        // projects far off the right edge of the color image
        assert_eq!(
            device.color_from_camera_point(Point3::new(1.0e6, 0.0, 1.0)),
            BLACK
        );
        assert_eq!(
            device.color_from_camera_point(Point3::new(-1.0e6, 0.0, 1.0)),
            BLACK
        );
    }

    #[test]
    fn mirror_request_is_deferred_until_start() {
        let (mut device, shared) = configured_device();

        device.set_mirrored(true).expect("set_mirrored");
        assert!(!shared.mirrored());

        device.start().expect("start");
        assert!(shared.mirrored());
        assert!(device.is_mirrored());
    }

    #[test]
    fn blob_tracking_caps_blobs_and_truncates_contours() {
        let (mut device, shared) = configured_device();

        device.enable_blob_tracking().expect("enable blobs");
        shared.state().blob_count = 9;
        shared.state().contour_count = 3;

        device.start().expect("start");
        assert!(device.update().expect("update"));
        assert_eq!(device.blobs().len(), MAX_BLOBS);
        assert_eq!(device.blobs()[0].contours.len(), 1);

        device.set_max_contours(2);
        assert!(device.update().expect("update"));
        assert_eq!(device.blobs()[0].contours.len(), 2);
    }

    #[test]
    fn aligned_frames_have_color_dimensions() {
        let (mut device, _shared) = configured_device();

        device
            .enable_alignment(AlignMode::Frames)
            .expect("alignment");
        device.start().expect("start");

        assert!(device.update().expect("update"));
        assert_eq!(device.color_mapped_to_depth_frame().dimensions(), (320, 240));
        assert_eq!(device.depth_mapped_to_color_frame().dimensions(), (320, 240));
    }

    #[test]
    fn registered_image_failure_aborts_the_frame() {
        let (mut device, shared) = configured_device();

        device
            .enable_alignment(AlignMode::Frames)
            .expect("alignment");
        device.start().expect("start");

        shared.state().fail_registered = true;

        assert!(!device.update().expect("update"));
        assert_eq!(shared.live_frames(), 0);
    }

    #[test]
    fn stop_frees_owned_buffers_and_is_idempotent() {
        let (mut device, _shared) = started_device();

        device.enable_point_cloud(CloudRes::Full);
        assert!(device.update().expect("update"));

        device.stop();
        assert!(device.point_cloud().is_empty());
        assert!(device.blobs().is_empty());
        assert!(!device.is_running());
        assert!(matches!(device.update(), Err(Error::OnlyWhileRunning(_))));

        // a second stop must be harmless
        device.stop();
    }

    #[test]
    fn cloud_range_rejects_inverted_bounds() {
        let (mut device, _shared) = configured_device();

        assert!(matches!(
            device.set_point_cloud_range(500.0, 500.0),
            Err(Error::InvalidCloudRange(_, _))
        ));
        assert!(matches!(
            device.set_point_cloud_range(900.0, 100.0),
            Err(Error::InvalidCloudRange(_, _))
        ));
    }

    #[test]
    fn face_tracking_enables_and_releases_on_stop() {
        let (mut device, _shared) = configured_device();

        device.enable_face_tracking(true).expect("enable faces");
        device.start().expect("start");
        device.stop();
    }
}
