//! Point cloud construction from raw depth samples.

use crate::data::Point3;
use crate::runtime::{Mapper, SdkResult};

/// Rebuild `cloud` from scratch out of the raw depth image.
///
/// Candidates are the samples strictly inside `(min, max)` at `step`
/// stride in both axes, in row-major scan order; a single batched
/// projection call turns them into camera-space points, so the output
/// order follows the scan order of the kept pixels.
pub(crate) fn rebuild<M: Mapper>(
    cloud: &mut Vec<Point3>,
    mapper: &M,
    raw: &[u16],
    width: usize,
    height: usize,
    step: usize,
    (min, max): (f32, f32),
) -> SdkResult<()> {
    cloud.clear();

    let candidates = collect_candidates(raw, width, height, step, min, max);

    if candidates.is_empty() {
        return Ok(());
    }

    mapper.project_depth_to_camera(&candidates, cloud)
}

fn row_candidates(
    raw: &[u16],
    width: usize,
    dy: usize,
    step: usize,
    min: f32,
    max: f32,
) -> Vec<Point3> {
    (0..width)
        .step_by(step)
        .filter_map(|dx| {
            let z = f32::from(raw[dy * width + dx]);

            (z > min && z < max).then(|| Point3::new(dx as f32, dy as f32, z))
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn collect_candidates(
    raw: &[u16],
    width: usize,
    height: usize,
    step: usize,
    min: f32,
    max: f32,
) -> Vec<Point3> {
    use rayon::prelude::*;

    let rows: Vec<Vec<Point3>> = (0..height)
        .into_par_iter()
        .step_by(step)
        .map(|dy| row_candidates(raw, width, dy, step, min, max))
        .collect();

    rows.into_iter().flatten().collect()
}

#[cfg(not(feature = "parallel"))]
fn collect_candidates(
    raw: &[u16],
    width: usize,
    height: usize,
    step: usize,
    min: f32,
    max: f32,
) -> Vec<Point3> {
    (0..height)
        .step_by(step)
        .flat_map(|dy| row_candidates(raw, width, dy, step, min, max))
        .collect()
}
