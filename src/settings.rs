/// Color stream resolution presets supported by the capture runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorRes {
    /// 320x240
    Sm,
    /// 640x480
    Vga,
    /// 1280x720
    Hd720,
    /// 1920x1080
    Hd1080,
}

impl ColorRes {
    pub const fn dims(self) -> (u32, u32) {
        match self {
            ColorRes::Sm => (320, 240),
            ColorRes::Vga => (640, 480),
            ColorRes::Hd720 => (1280, 720),
            ColorRes::Hd1080 => (1920, 1080),
        }
    }
}

/// Depth stream resolution presets. The odd dimensions are native modes
/// of the supported camera generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthRes {
    /// 480x360 (R200)
    R200Sd,
    /// 628x468 (R200)
    R200Vga,
    /// 640x480 (F200)
    F200Vga,
    /// 320x240
    Qvga,
}

impl DepthRes {
    pub const fn dims(self) -> (u32, u32) {
        match self {
            DepthRes::R200Sd => (480, 360),
            DepthRes::R200Vga => (628, 468),
            DepthRes::F200Vga => (640, 480),
            DepthRes::Qvga => (320, 240),
        }
    }
}

/// Point cloud decimation stride, applied in both image axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CloudRes {
    Full = 1,
    Half = 2,
    Quarter = 4,
}

impl CloudRes {
    pub const fn step(self) -> usize {
        self as usize
    }
}

/// How depth/color registration is performed each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignMode {
    /// Build full registered frames (color mapped into the depth frame
    /// and depth mapped into the color frame) on every update.
    Frames,
    /// No per-frame registered buffers; alignment is served by the
    /// per-point coordinate queries only.
    UvsOnly,
}

/// Tracking mode for the face module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceMode {
    Color,
    ColorPlusDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_presets() {
        assert_eq!(ColorRes::Sm.dims(), (320, 240));
        assert_eq!(ColorRes::Hd1080.dims(), (1920, 1080));
        assert_eq!(DepthRes::R200Vga.dims(), (628, 468));
        assert_eq!(DepthRes::Qvga.dims(), (320, 240));
    }

    #[test]
    fn cloud_res_strides() {
        assert_eq!(CloudRes::Full.step(), 1);
        assert_eq!(CloudRes::Half.step(), 2);
        assert_eq!(CloudRes::Quarter.step(), 4);
    }
}
