use image::Rgba;

/// Sentinel color returned by lookups that cannot resolve a pixel
/// (no mapper yet, or mapped coordinates outside the color stream).
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A 2D point, used for color-image pixel coordinates and normalized
/// (0-1) texture coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 3D point.
///
/// Depending on context this is either a depth-image point
/// (pixel x, pixel y, raw depth as z) or a camera-space point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// An integer pixel coordinate on a blob contour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContourPoint {
    pub x: i32,
    pub y: i32,
}

/// Pinhole camera intrinsic parameters.
///
/// The native runtime keeps these to itself and only exposes projection
/// calls; the synthetic backend uses them to implement the same calls.
#[derive(Clone, Copy, Debug)]
pub struct Intrinsics {
    /// Focal length x (pixel)
    pub fx: f32,
    /// Focal length y (pixel)
    pub fy: f32,
    /// Principal point x (pixel)
    pub cx: f32,
    /// Principal point y (pixel)
    pub cy: f32,
}

impl Intrinsics {
    /// Distortion-free intrinsics with the principal point at the image
    /// center.
    pub fn ideal(focal: f32, width: u32, height: u32) -> Self {
        Self {
            fx: focal,
            fy: focal,
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ideal_intrinsics_center_principal_point() {
        let intrinsics = Intrinsics::ideal(320.0, 320, 240);
        assert!((intrinsics.cx - 160.0).abs() < f32::EPSILON);
        assert!((intrinsics.cy - 120.0).abs() < f32::EPSILON);
        assert!((intrinsics.fx - intrinsics.fy).abs() < f32::EPSILON);
    }
}
