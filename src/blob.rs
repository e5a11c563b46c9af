//! Per-frame blob extraction.

use image::GrayImage;
use log::debug;

use crate::data::ContourPoint;
use crate::runtime::BlobSource;

/// Most blobs the tracker is ever asked to follow.
pub const MAX_BLOBS: usize = 4;

/// One tracked blob: its contour point arrays and an optional
/// segmentation image. Contours beyond the configured per-blob limit are
/// not extracted.
#[derive(Debug, Default, Clone)]
pub struct Blob {
    pub contours: Vec<Vec<ContourPoint>>,
    pub segmentation: Option<GrayImage>,
}

/// Build this frame's blob set from the tracker's query object.
///
/// The caller replaces the previous set wholesale, which frees last
/// frame's contour memory. A failing contour query skips that contour
/// only; a failing tracker update yields an empty set.
pub(crate) fn collect<B: BlobSource>(
    source: &mut B,
    max_blobs: usize,
    max_contours: usize,
) -> Vec<Blob> {
    if let Err(error) = source.update() {
        debug!("blob query update failed: {error}");
        return Vec::new();
    }

    let count = source.blob_count().min(max_blobs);
    let mut set = Vec::with_capacity(count);

    for blob_index in 0..count {
        let mut blob = Blob {
            contours: Vec::new(),
            segmentation: source.segmentation(blob_index),
        };

        for contour_index in 0..source.contour_count(blob_index).min(max_contours) {
            match source.contour_points(blob_index, contour_index) {
                Ok(points) => blob.contours.push(points),
                Err(error) => {
                    debug!("skipping contour {contour_index} of blob {blob_index}: {error}")
                }
            }
        }

        set.push(blob);
    }

    set
}
