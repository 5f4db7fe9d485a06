use ndarray::prelude::*;
use rustdct::DctPlanner;

/// Unnormalized type-II DCT applied along every axis of a volume.
///
/// rustdct needs each transformed line to be contiguous, but only the last axis of a
/// standard-layout array is. Each lane is therefore copied into a scratch buffer,
/// transformed, and copied back.
pub fn dct_3d(volume: &Array3<f64>) -> Array3<f64> {
    let mut volume = volume.clone();
    let mut planner = DctPlanner::new();

    for axis in 0..volume.ndim() {
        let len = volume.len_of(Axis(axis));
        let dct = planner.plan_dct2(len);
        let mut lane_buf = vec![0f64; len];

        for mut lane in volume.lanes_mut(Axis(axis)) {
            for (buf_val, val) in lane_buf.iter_mut().zip(lane.iter()) {
                *buf_val = *val;
            }

            dct.process_dct2(&mut lane_buf);

            for (val, buf_val) in lane.iter_mut().zip(lane_buf.iter()) {
                *val = *buf_val;
            }
        }
    }

    volume
}
