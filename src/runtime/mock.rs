//! Deterministic synthetic backend implementing the runtime contract.
//!
//! Frames are generated from a pinhole-camera model with ideal intrinsics
//! derived from the negotiated stream sizes, so projection calls are exact
//! and invertible. A shared state handle offers failure-injection knobs and
//! counters for the acquire/release discipline, which is what the tests
//! lean on.

use std::cell::{Cell, RefCell, RefMut};
use std::ops::Deref;
use std::rc::Rc;

use image::GrayImage;

use crate::data::{ContourPoint, Intrinsics, Point2, Point3};
use crate::settings::FaceMode;

use super::{
    BlobSource, FrameSample, Mapper, PixelLayout, RegisteredImage, Runtime, SampleImage, SdkError,
    SdkResult, Session, StreamKind,
};

/// Default raw depth value of every generated sample.
pub const DEFAULT_DEPTH_FILL: u16 = 1000;

/// Mutable knobs of the synthetic runtime.
///
/// Flags stay in effect until cleared, so a test can force the same
/// failure across several polls.
pub struct MockState {
    /// Refuse to allocate a session.
    pub deny_session: bool,
    /// Raw depth written to every pixel when no image override is set.
    pub depth_fill: u16,
    /// Full row-major depth image override; must match the negotiated
    /// depth dimensions.
    pub depth_image: Option<Vec<u16>>,
    /// Zero-timeout poll finds no frame.
    pub no_frame: bool,
    /// Omit the color image from the sample.
    pub drop_color: bool,
    /// Omit the depth image from the sample.
    pub drop_depth: bool,
    pub fail_color_view: bool,
    pub fail_depth_view: bool,
    /// Registered-image creation returns `None`.
    pub fail_registered: bool,
    /// Registered-image release reports a negative status.
    pub fail_registered_release: bool,
    pub blob_count: usize,
    pub contour_count: usize,
    /// Points generated per contour.
    pub contour_len: usize,
    /// Contour index whose point query fails.
    pub fail_contour: Option<usize>,
    pub mirrored: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            deny_session: false,
            depth_fill: DEFAULT_DEPTH_FILL,
            depth_image: None,
            no_frame: false,
            drop_color: false,
            drop_depth: false,
            fail_color_view: false,
            fail_depth_view: false,
            fail_registered: false,
            fail_registered_release: false,
            blob_count: 0,
            contour_count: 1,
            contour_len: 4,
            fail_contour: None,
            mirrored: false,
        }
    }
}

/// State shared between the runtime handle kept by a test and the
/// session/frame/mapper objects handed to the device.
pub struct MockShared {
    views: Rc<Cell<i64>>,
    frames: Cell<i64>,
    state: RefCell<MockState>,
}

impl MockShared {
    fn new() -> Self {
        Self {
            views: Rc::new(Cell::new(0)),
            frames: Cell::new(0),
            state: RefCell::new(MockState::default()),
        }
    }

    /// Currently acquired image views across all images.
    pub fn active_views(&self) -> i64 {
        self.views.get()
    }

    /// Frames acquired and not yet released.
    pub fn live_frames(&self) -> i64 {
        self.frames.get()
    }

    pub fn state(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn mirrored(&self) -> bool {
        self.state.borrow().mirrored
    }
}

pub struct MockRuntime {
    shared: Rc<MockShared>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(MockShared::new()),
        }
    }

    /// Handle to the shared state, valid across session lifecycles.
    pub fn shared(&self) -> Rc<MockShared> {
        Rc::clone(&self.shared)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for MockRuntime {
    type Session = MockSession;

    fn create_session(&mut self) -> Option<MockSession> {
        if self.shared.state.borrow().deny_session {
            return None;
        }

        Some(MockSession {
            shared: Rc::clone(&self.shared),
            color_size: None,
            depth_size: None,
            negotiated: false,
            max_blobs: 0,
        })
    }
}

pub struct MockSession {
    shared: Rc<MockShared>,
    color_size: Option<(u32, u32)>,
    depth_size: Option<(u32, u32)>,
    negotiated: bool,
    max_blobs: usize,
}

impl MockSession {
    fn depth_intrinsics(&self) -> Intrinsics {
        let (width, height) = self.depth_size.or(self.color_size).unwrap_or((1, 1));
        Intrinsics::ideal(width as f32, width, height)
    }

    fn color_intrinsics(&self) -> Intrinsics {
        let (width, height) = self.color_size.or(self.depth_size).unwrap_or((1, 1));
        Intrinsics::ideal(width as f32, width, height)
    }

    fn make_color_image(&self, state: &MockState) -> MockImage {
        let (width, height) = self.color_size.unwrap_or((0, 0));
        let mut rgba = vec![0u8; (width * height * 4) as usize];

        for y in 0..height {
            for x in 0..width {
                // deterministic ramp, flipped when mirroring is on
                let sx = if state.mirrored { width - 1 - x } else { x };
                let index = ((y * width + x) * 4) as usize;

                rgba[index] = (sx % 256) as u8;
                rgba[index + 1] = (y % 256) as u8;
                rgba[index + 2] = ((sx + y) % 256) as u8;
                rgba[index + 3] = 255;
            }
        }

        MockImage {
            width,
            height,
            rgba,
            depth16: Vec::new(),
            fail_view: state.fail_color_view,
            views: Rc::clone(&self.shared.views),
        }
    }

    fn make_depth_image(&self, state: &MockState) -> MockImage {
        let (width, height) = self.depth_size.unwrap_or((0, 0));
        let pixel_count = (width * height) as usize;
        let samples = match &state.depth_image {
            Some(samples) if samples.len() == pixel_count => samples.clone(),
            _ => vec![state.depth_fill; pixel_count],
        };

        MockImage {
            width,
            height,
            rgba: depth_visualization(&samples),
            depth16: samples.iter().flat_map(|z| z.to_le_bytes()).collect(),
            fail_view: state.fail_depth_view,
            views: Rc::clone(&self.shared.views),
        }
    }
}

impl Session for MockSession {
    type Frame = MockFrame;
    type Mapper = MockMapper;
    type Blobs = MockBlobs;

    fn enable_stream(
        &mut self,
        kind: StreamKind,
        width: u32,
        height: u32,
        fps: f32,
    ) -> SdkResult<()> {
        if self.negotiated {
            return Err(SdkError(-4));
        }
        if width == 0 || height == 0 || fps <= 0.0 {
            return Err(SdkError(-1));
        }

        match kind {
            StreamKind::Color => self.color_size = Some((width, height)),
            StreamKind::Depth => self.depth_size = Some((width, height)),
        }

        Ok(())
    }

    fn negotiate(&mut self) -> SdkResult<()> {
        if self.color_size.is_none() && self.depth_size.is_none() {
            return Err(SdkError(-3));
        }

        self.negotiated = true;

        Ok(())
    }

    fn set_mirrored(&mut self, mirrored: bool) -> SdkResult<()> {
        if !self.negotiated {
            return Err(SdkError(-4));
        }

        self.shared.state.borrow_mut().mirrored = mirrored;

        Ok(())
    }

    fn create_mapper(&mut self) -> Option<MockMapper> {
        if !self.negotiated {
            return None;
        }

        Some(MockMapper {
            depth: self.depth_intrinsics(),
            color: self.color_intrinsics(),
            shared: Rc::clone(&self.shared),
        })
    }

    fn enable_blobs(&mut self, max_blobs: usize) -> SdkResult<MockBlobs> {
        self.max_blobs = max_blobs;

        Ok(MockBlobs {
            shared: Rc::clone(&self.shared),
            segmentation_size: self.depth_size.unwrap_or((0, 0)),
        })
    }

    fn enable_face(&mut self, _mode: FaceMode) -> SdkResult<()> {
        Ok(())
    }

    fn release_face(&mut self) {}

    fn acquire_frame(&mut self) -> Option<MockFrame> {
        if !self.negotiated {
            return None;
        }

        let state = self.shared.state.borrow();

        if state.no_frame {
            return None;
        }

        let color = (self.color_size.is_some() && !state.drop_color)
            .then(|| self.make_color_image(&state));
        let depth = (self.depth_size.is_some() && !state.drop_depth)
            .then(|| self.make_depth_image(&state));

        drop(state);
        self.shared.frames.set(self.shared.frames.get() + 1);

        Some(MockFrame {
            color,
            depth,
            shared: Rc::clone(&self.shared),
        })
    }

    fn close(&mut self) {
        self.negotiated = false;
        self.color_size = None;
        self.depth_size = None;
    }
}

fn depth_visualization(samples: &[u16]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(samples.len() * 4);

    for z in samples {
        let shade = (z / 16).min(255) as u8;

        rgba.extend_from_slice(&[shade, shade, shade, 255]);
    }

    rgba
}

pub struct MockFrame {
    color: Option<MockImage>,
    depth: Option<MockImage>,
    shared: Rc<MockShared>,
}

impl FrameSample for MockFrame {
    type Image = MockImage;

    fn image(&self, kind: StreamKind) -> Option<&MockImage> {
        match kind {
            StreamKind::Color => self.color.as_ref(),
            StreamKind::Depth => self.depth.as_ref(),
        }
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        self.shared.frames.set(self.shared.frames.get() - 1);
    }
}

pub struct MockImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    /// Little-endian 16-bit samples; empty for color images.
    depth16: Vec<u8>,
    fail_view: bool,
    views: Rc<Cell<i64>>,
}

impl SampleImage for MockImage {
    type View<'a>
        = MockView<'a>
    where
        Self: 'a;

    fn acquire_view(&self, layout: PixelLayout) -> SdkResult<MockView<'_>> {
        if self.fail_view {
            return Err(SdkError(-2));
        }

        let data = match layout {
            PixelLayout::Rgba32 => &self.rgba,
            PixelLayout::Depth16 => &self.depth16,
        };

        if data.is_empty() {
            return Err(SdkError(-2));
        }

        self.views.set(self.views.get() + 1);

        Ok(MockView {
            data,
            views: Rc::clone(&self.views),
        })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

pub struct MockView<'a> {
    data: &'a [u8],
    views: Rc<Cell<i64>>,
}

impl Deref for MockView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl Drop for MockView<'_> {
    fn drop(&mut self) {
        self.views.set(self.views.get() - 1);
    }
}

pub struct MockMapper {
    depth: Intrinsics,
    color: Intrinsics,
    shared: Rc<MockShared>,
}

impl MockMapper {
    fn unproject(&self, point: Point3) -> Point3 {
        if point.z <= 0.0 {
            return Point3::ORIGIN;
        }

        Point3::new(
            (point.x - self.depth.cx) * point.z / self.depth.fx,
            (point.y - self.depth.cy) * point.z / self.depth.fy,
            point.z,
        )
    }

    fn camera_to_color_pixel(&self, point: Point3) -> Point2 {
        if point.z <= 0.0 {
            return Point2::ORIGIN;
        }

        Point2::new(
            point.x * self.color.fx / point.z + self.color.cx,
            point.y * self.color.fy / point.z + self.color.cy,
        )
    }

    /// Inverse of [`Mapper::project_depth_to_camera`], exposed for
    /// round-trip checks.
    pub fn camera_to_depth_pixel(&self, point: Point3) -> Point2 {
        if point.z <= 0.0 {
            return Point2::ORIGIN;
        }

        Point2::new(
            point.x * self.depth.fx / point.z + self.depth.cx,
            point.y * self.depth.fy / point.z + self.depth.cy,
        )
    }
}

impl Mapper for MockMapper {
    type Image = MockImage;
    type Registered = MockRegistered;

    fn project_depth_to_camera(&self, points: &[Point3], out: &mut Vec<Point3>) -> SdkResult<()> {
        out.clear();
        out.extend(points.iter().map(|point| self.unproject(*point)));

        Ok(())
    }

    fn map_depth_to_color(&self, points: &[Point3], out: &mut Vec<Point2>) -> SdkResult<()> {
        out.clear();
        out.extend(
            points
                .iter()
                .map(|point| self.camera_to_color_pixel(self.unproject(*point))),
        );

        Ok(())
    }

    fn project_camera_to_color(&self, points: &[Point3], out: &mut Vec<Point2>) -> SdkResult<()> {
        out.clear();
        out.extend(points.iter().map(|point| self.camera_to_color_pixel(*point)));

        Ok(())
    }

    fn color_mapped_to_depth(
        &self,
        _depth: &MockImage,
        color: &MockImage,
    ) -> Option<MockRegistered> {
        if self.shared.state.borrow().fail_registered {
            return None;
        }

        Some(MockRegistered {
            image: MockImage {
                width: color.width,
                height: color.height,
                rgba: color.rgba.clone(),
                depth16: Vec::new(),
                fail_view: false,
                views: Rc::clone(&self.shared.views),
            },
            shared: Rc::clone(&self.shared),
        })
    }

    fn depth_mapped_to_color(
        &self,
        color: &MockImage,
        depth: &MockImage,
    ) -> Option<MockRegistered> {
        if self.shared.state.borrow().fail_registered {
            return None;
        }

        // nearest-neighbor resample of the visualized depth into the
        // color frame's dimensions
        let (width, height) = (color.width, color.height);
        let mut rgba = vec![0u8; (width * height * 4) as usize];

        if depth.width > 0 && depth.height > 0 {
            for y in 0..height {
                for x in 0..width {
                    let sx = x * depth.width / width;
                    let sy = y * depth.height / height;
                    let src = ((sy * depth.width + sx) * 4) as usize;
                    let dst = ((y * width + x) * 4) as usize;

                    rgba[dst..dst + 4].copy_from_slice(&depth.rgba[src..src + 4]);
                }
            }
        }

        Some(MockRegistered {
            image: MockImage {
                width,
                height,
                rgba,
                depth16: Vec::new(),
                fail_view: false,
                views: Rc::clone(&self.shared.views),
            },
            shared: Rc::clone(&self.shared),
        })
    }
}

pub struct MockRegistered {
    image: MockImage,
    shared: Rc<MockShared>,
}

impl SampleImage for MockRegistered {
    type View<'a>
        = MockView<'a>
    where
        Self: 'a;

    fn acquire_view(&self, layout: PixelLayout) -> SdkResult<MockView<'_>> {
        self.image.acquire_view(layout)
    }

    fn width(&self) -> u32 {
        self.image.width
    }

    fn height(&self) -> u32 {
        self.image.height
    }
}

impl RegisteredImage for MockRegistered {
    fn release(self) -> SdkResult<()> {
        if self.shared.state.borrow().fail_registered_release {
            return Err(SdkError(-7));
        }

        Ok(())
    }
}

pub struct MockBlobs {
    shared: Rc<MockShared>,
    segmentation_size: (u32, u32),
}

impl BlobSource for MockBlobs {
    fn update(&mut self) -> SdkResult<()> {
        Ok(())
    }

    fn blob_count(&self) -> usize {
        self.shared.state.borrow().blob_count
    }

    fn contour_count(&self, _blob: usize) -> usize {
        self.shared.state.borrow().contour_count
    }

    fn contour_points(&self, blob: usize, contour: usize) -> SdkResult<Vec<ContourPoint>> {
        let state = self.shared.state.borrow();

        if state.fail_contour == Some(contour) {
            return Err(SdkError(-5));
        }

        Ok((0..state.contour_len)
            .map(|i| ContourPoint {
                x: (blob * 10 + i) as i32,
                y: contour as i32,
            })
            .collect())
    }

    fn segmentation(&self, _blob: usize) -> Option<GrayImage> {
        let (width, height) = self.segmentation_size;

        (width > 0 && height > 0).then(|| GrayImage::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiated_session() -> MockSession {
        let mut runtime = MockRuntime::new();
        let mut session = runtime.create_session().expect("session");

        session
            .enable_stream(StreamKind::Color, 320, 240, 30.0)
            .expect("color stream");
        session
            .enable_stream(StreamKind::Depth, 320, 240, 30.0)
            .expect("depth stream");
        session.negotiate().expect("negotiate");
        session
    }

    #[test]
    fn projection_round_trip_is_approximate_identity() {
        let mut session = negotiated_session();
        let mapper = session.create_mapper().expect("mapper");

        let depth_point = Point3::new(37.0, 101.0, 1234.0);
        let mut camera = Vec::new();
        assert!(mapper
            .project_depth_to_camera(&[depth_point], &mut camera)
            .is_ok());
        assert_eq!(camera.len(), 1);

        let back = mapper.camera_to_depth_pixel(camera[0]);
        assert!((back.x - depth_point.x).abs() < 1e-3);
        assert!((back.y - depth_point.y).abs() < 1e-3);
    }

    #[test]
    fn views_balance_after_drop() {
        let mut session = negotiated_session();
        let shared = Rc::clone(&session.shared);

        {
            let frame = session.acquire_frame().expect("frame");
            let image = frame.image(StreamKind::Depth).expect("depth image");
            let _view = image.acquire_view(PixelLayout::Depth16).expect("view");

            assert_eq!(shared.active_views(), 1);
            assert_eq!(shared.live_frames(), 1);
        }

        assert_eq!(shared.active_views(), 0);
        assert_eq!(shared.live_frames(), 0);
    }

    #[test]
    fn stream_enable_rejected_after_negotiation() {
        let mut session = negotiated_session();

        assert_eq!(
            session.enable_stream(StreamKind::Color, 640, 480, 30.0),
            Err(SdkError(-4))
        );
    }

    #[test]
    fn depth_image_override_must_match_dimensions() {
        let mut session = negotiated_session();

        session.shared.state().depth_image = Some(vec![42; 3]);

        let frame = session.acquire_frame().expect("frame");
        let image = frame.image(StreamKind::Depth).expect("depth image");
        let view = image.acquire_view(PixelLayout::Depth16).expect("view");

        // wrong-sized override falls back to the fill value
        assert_eq!(u16::from_le_bytes([view[0], view[1]]), DEFAULT_DEPTH_FILL);
    }
}
