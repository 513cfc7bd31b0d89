use crate::types::{AlignedPulseSet, PlatformPose, Position, RadarPulses, SarError, SarResult};
use ndarray::{s, Array1, Array2, ArrayViewD, Axis, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// How a pulse picks its platform position between two pose samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentPolicy {
    /// Linear interpolation between the bracketing pose samples
    Linear,
    /// Nearest pose sample, rounding up above a 0.5 fraction
    Nearest,
}

/// Time alignment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentParams {
    pub policy: AlignmentPolicy,
    /// Pulse index at which the platform starts moving, before any shift
    pub radar_start: usize,
    /// Pose index of motion start; detected from the track when `None`
    pub platform_start: Option<usize>,
    /// Keep at most this many aligned pulses
    pub max_pulses: Option<usize>,
    /// Leading pose samples used to estimate the vertical jitter
    pub motion_window: usize,
    /// Radar clock ticks per second divided by the pulse timestamp delta
    /// gives the pulse rate
    pub radar_clock_scale: f64,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            policy: AlignmentPolicy::Linear,
            radar_start: 0,
            platform_start: None,
            max_pulses: None,
            motion_window: 1000,
            radar_clock_scale: 1000.0,
        }
    }
}

/// Gap-filled platform track with its detected motion start
#[derive(Debug, Clone)]
pub struct PreparedTrack {
    pub times: Array1<f64>,
    /// Positions (sample x [x, y, z])
    pub positions: Array2<f64>,
    pub motion_start: usize,
}

impl PreparedTrack {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn position(&self, index: usize) -> Position {
        let row = self.positions.row(index);
        [row[0], row[1], row[2]]
    }
}

/// Aligns platform poses onto the radar pulse time base
pub struct TimeAligner {
    params: AlignmentParams,
}

impl TimeAligner {
    pub fn new(params: AlignmentParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AlignmentParams {
        &self.params
    }

    /// Fill gaps in the track and locate the start of motion
    pub fn prepare_track(&self, track: &[PlatformPose]) -> SarResult<PreparedTrack> {
        if track.len() < 2 {
            return Err(SarError::Shape(format!(
                "platform track needs at least 2 samples, got {}",
                track.len()
            )));
        }

        let times = Array1::from_iter(track.iter().map(|p| p.time));
        let positions =
            Array2::from_shape_fn((track.len(), 3), |(i, axis)| track[i].position[axis]);

        let (times, positions) =
            linear_interp_nan(times.view().into_dyn(), positions.view().into_dyn())?;

        let motion_start = match self.params.platform_start {
            Some(start) => start,
            None => {
                let z: Vec<f64> = positions.column(2).to_vec();
                detect_motion_start(&z, self.params.motion_window)?
            }
        };

        if motion_start >= track.len() {
            return Err(SarError::InvalidParameter(format!(
                "platform start {} beyond track of {} samples",
                motion_start,
                track.len()
            )));
        }

        log::info!(
            "Prepared platform track: {} samples, motion starts at sample {}",
            track.len(),
            motion_start
        );

        Ok(PreparedTrack {
            times,
            positions,
            motion_start,
        })
    }

    /// First pulse index for `shift`, clamped into the pulse matrix
    pub fn effective_start(&self, num_pulses: usize, shift: i64) -> usize {
        let last = i64::try_from(num_pulses.saturating_sub(1)).unwrap_or(i64::MAX);
        let requested = i64::try_from(self.params.radar_start)
            .unwrap_or(i64::MAX)
            .saturating_add(shift);
        let start = requested.clamp(0, last);
        if start != requested {
            log::debug!("Radar start {} clamped to {}", requested, start);
        }
        start as usize
    }

    /// Align pulses and platform positions starting `shift` pulses away
    /// from the configured radar start
    pub fn align(
        &self,
        radar: &RadarPulses,
        track: &[PlatformPose],
        shift: i64,
    ) -> SarResult<AlignedPulseSet> {
        let prepared = self.prepare_track(track)?;
        self.align_prepared(radar, &prepared, shift)
    }

    pub fn align_prepared(
        &self,
        radar: &RadarPulses,
        track: &PreparedTrack,
        shift: i64,
    ) -> SarResult<AlignedPulseSet> {
        let num_pulses = radar.num_pulses();
        if num_pulses < 2 || radar.timestamps.len() < 2 {
            return Err(SarError::Shape(format!(
                "alignment needs at least 2 pulses, got {}",
                num_pulses
            )));
        }
        if track.len() < 2 {
            return Err(SarError::Shape(format!(
                "alignment needs at least 2 pose samples, got {}",
                track.len()
            )));
        }

        let radar_dt = radar.timestamps[1] - radar.timestamps[0];
        if !(radar_dt > 0.0) {
            return Err(SarError::Processing(format!(
                "radar timestamps do not advance at pulse 1 (delta {})",
                radar_dt
            )));
        }
        let pose_dt = track.times[1] - track.times[0];
        if !(pose_dt > 0.0) {
            return Err(SarError::Processing(format!(
                "pose timestamps do not advance at sample 1 (delta {})",
                pose_dt
            )));
        }

        let radar_rate = self.params.radar_clock_scale / radar_dt;
        let pose_rate = 1.0 / pose_dt;
        let ratio = pose_rate / radar_rate;

        let radar_start = self.effective_start(num_pulses, shift);
        let platform_start = self.params.platform_start.unwrap_or(track.motion_start);
        if platform_start >= track.len() {
            return Err(SarError::InvalidParameter(format!(
                "platform start {} beyond track of {} samples",
                platform_start,
                track.len()
            )));
        }
        let usable_poses = track.len() - platform_start;

        let mut positions = Vec::with_capacity(num_pulses - radar_start);
        for pulse in 0..(num_pulses - radar_start) {
            let pose_index = ratio * pulse as f64;
            let floor = pose_index.floor();
            let lower = floor as usize;
            if lower + 1 >= usable_poses {
                break;
            }
            let fraction = pose_index - floor;

            let a = track.position(platform_start + lower);
            let b = track.position(platform_start + lower + 1);
            let position = match self.params.policy {
                AlignmentPolicy::Linear => [
                    a[0] + (b[0] - a[0]) * fraction,
                    a[1] + (b[1] - a[1]) * fraction,
                    a[2] + (b[2] - a[2]) * fraction,
                ],
                AlignmentPolicy::Nearest => {
                    if fraction > 0.5 {
                        b
                    } else {
                        a
                    }
                }
            };
            positions.push(position);
        }

        if let Some(max_pulses) = self.params.max_pulses {
            positions.truncate(max_pulses);
        }

        let count = positions.len();
        let pulses = radar
            .pulses
            .slice(s![radar_start..radar_start + count, ..])
            .to_owned();

        log::info!(
            "Aligned {} pulses from pulse {} to poses from sample {} (rate ratio {:.4})",
            count,
            radar_start,
            platform_start,
            ratio
        );

        Ok(AlignedPulseSet {
            positions,
            pulses,
            range_axis: radar.range_axis,
            radar_start,
            platform_start,
        })
    }
}

/// First pose index where the vertical step exceeds the mean vertical step
/// of the leading `window` samples
pub fn detect_motion_start(z: &[f64], window: usize) -> SarResult<usize> {
    let window = window.min(z.len());
    if window < 2 {
        return Err(SarError::Shape(format!(
            "motion detection needs at least 2 samples, got {}",
            window
        )));
    }

    let threshold = (z[window - 1] - z[0]) / (window - 1) as f64;

    z.windows(2)
        .position(|pair| (pair[0] - pair[1]).powi(2) > threshold)
        .ok_or_else(|| {
            SarError::Processing(format!(
                "no platform motion detected in {} samples (threshold {:.3e})",
                z.len(),
                threshold
            ))
        })
}

/// Replace NaN coordinates and data samples by linear interpolation.
///
/// Coordinates must be 1-D (singleton axes are ignored) and are assumed to be
/// uniformly sampled; their NaNs are filled against the sample index. Data is
/// 1-D or 2-D; the axis whose length matches the coordinates is interpolated
/// and the result keeps the input orientation (1-D data becomes one column).
pub fn linear_interp_nan(
    coords: ArrayViewD<f64>,
    data: ArrayViewD<f64>,
) -> SarResult<(Array1<f64>, Array2<f64>)> {
    let non_singleton: Vec<usize> = coords.shape().iter().copied().filter(|&d| d != 1).collect();
    if non_singleton.len() > 1 {
        return Err(SarError::Shape(format!(
            "coordinates are not 1-D (shape {:?})",
            coords.shape()
        )));
    }
    let mut coords_out = Array1::from_iter(coords.iter().copied());
    let n = coords_out.len();

    let mut data_out = match data.ndim() {
        1 => data
            .into_dimensionality::<Ix1>()
            .map_err(|e| SarError::Shape(e.to_string()))?
            .insert_axis(Axis(1))
            .to_owned(),
        2 => data
            .into_dimensionality::<Ix2>()
            .map_err(|e| SarError::Shape(e.to_string()))?
            .to_owned(),
        ndim => {
            return Err(SarError::Shape(format!(
                "data must be a 1-D or 2-D matrix, got {} dimensions",
                ndim
            )))
        }
    };

    let (rows, cols) = data_out.dim();
    let transposed = match (rows == n, cols == n) {
        (false, false) => {
            return Err(SarError::Shape(format!(
                "no apparent agreement between {} coordinates and data of shape {:?}",
                n,
                (rows, cols)
            )))
        }
        (true, true) => {
            log::warn!(
                "Ambiguous dimensionalities; assuming columns of data are to be interpolated"
            );
            false
        }
        (true, false) => false,
        (false, true) => true,
    };
    if transposed {
        data_out = data_out.reversed_axes().as_standard_layout().to_owned();
    }

    // Coordinates against the uniform sample index
    let index: Vec<f64> = (0..n).map(|i| i as f64).collect();
    fill_nan(coords_out.as_slice_mut().ok_or_else(|| {
        SarError::Shape("coordinates are not contiguous".to_string())
    })?, &index, "coordinates")?;

    let coords_vec = coords_out.to_vec();
    for (column_index, mut column) in data_out.axis_iter_mut(Axis(1)).enumerate() {
        let mut values = column.to_vec();
        fill_nan(&mut values, &coords_vec, &format!("data column {}", column_index))?;
        column.assign(&Array1::from(values));
    }

    if transposed {
        data_out = data_out.reversed_axes().as_standard_layout().to_owned();
    }

    Ok((coords_out, data_out))
}

/// Fill NaN entries of `values` by interpolating the finite ones against `xs`
fn fill_nan(values: &mut [f64], xs: &[f64], what: &str) -> SarResult<()> {
    let (known_x, known_y): (Vec<f64>, Vec<f64>) = values
        .iter()
        .zip(xs.iter())
        .filter(|(v, _)| !v.is_nan())
        .map(|(&v, &x)| (x, v))
        .unzip();

    if known_x.len() == values.len() {
        return Ok(());
    }
    if known_x.is_empty() {
        return Err(SarError::Shape(format!("{} has no finite samples to interpolate from", what)));
    }

    for (value, &x) in values.iter_mut().zip(xs.iter()) {
        if value.is_nan() {
            *value = interp(x, &known_x, &known_y);
        }
    }
    Ok(())
}

/// Piecewise-linear interpolation of (xp, fp) at `x`, holding the end values
/// outside the sampled interval. `xp` must be increasing.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }

    let upper = xp.partition_point(|&v| v <= x).min(last);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[lower];
    }
    fp[lower] + (fp[upper] - fp[lower]) * (x - xp[lower]) / span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PulseMatrix, RangeAxis, SarComplex};
    use ndarray::{Array3, IxDyn};

    fn radar(num_pulses: usize, tick: f64) -> RadarPulses {
        let pulses = PulseMatrix::from_shape_fn((num_pulses, 4), |(p, b)| {
            SarComplex::new(p as f64, b as f64)
        });
        let timestamps = (0..num_pulses).map(|i| 5000.0 + tick * i as f64).collect();
        RadarPulses::new(pulses, timestamps, RangeAxis::new(0.0, 0.1, 4)).unwrap()
    }

    fn track(samples: usize, dt: f64) -> Vec<PlatformPose> {
        (0..samples)
            .map(|i| PlatformPose::new(i as f64 * dt, [i as f64, 2.0 * i as f64, 1.0]))
            .collect()
    }

    fn aligner(params: AlignmentParams) -> TimeAligner {
        TimeAligner::new(AlignmentParams {
            platform_start: Some(0),
            ..params
        })
    }

    #[test]
    fn test_interp_matches_linear() {
        let xp = [0.0, 1.0, 3.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(5.0, &xp, &fp), 30.0);
        assert!((interp(2.0, &xp, &fp) - 20.0).abs() < 1e-12);
        assert!((interp(1.0, &xp, &fp) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_interp_nan_fills_gaps() {
        let coords = Array1::from(vec![0.0, 0.1, f64::NAN, 0.3, 0.4]);
        let data = Array2::from_shape_vec(
            (5, 2),
            vec![0.0, 1.0, f64::NAN, 2.0, 2.0, f64::NAN, 3.0, 4.0, 4.0, 5.0],
        )
        .unwrap();

        let (c, d) = linear_interp_nan(coords.view().into_dyn(), data.view().into_dyn()).unwrap();
        assert!((c[2] - 0.2).abs() < 1e-12);
        assert!((d[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((d[[2, 1]] - 3.0).abs() < 1e-12);
        assert_eq!(d.dim(), (5, 2));
    }

    #[test]
    fn test_linear_interp_nan_transposed_data() {
        let coords = Array1::from(vec![0.0, 1.0, 2.0]);
        let data =
            Array2::from_shape_vec((2, 3), vec![0.0, f64::NAN, 2.0, 5.0, f64::NAN, 7.0]).unwrap();

        let (_, d) = linear_interp_nan(coords.view().into_dyn(), data.view().into_dyn()).unwrap();
        assert_eq!(d.dim(), (2, 3));
        assert!((d[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((d[[1, 1]] - 6.0).abs() < 1e-12);

        // Square data is ambiguous; columns are interpolated
        let square = Array2::from_shape_vec(
            (3, 3),
            vec![0.0, 10.0, f64::NAN, f64::NAN, 20.0, 4.0, 2.0, f64::NAN, 6.0],
        )
        .unwrap();
        let (_, d) = linear_interp_nan(coords.view().into_dyn(), square.view().into_dyn()).unwrap();
        assert_eq!(d.dim(), (3, 3));
        assert!((d[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((d[[2, 1]] - 20.0).abs() < 1e-12);
        assert!((d[[0, 2]] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_interp_nan_shape_errors() {
        let coords_2d = Array2::<f64>::zeros((3, 2));
        let data = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            linear_interp_nan(coords_2d.view().into_dyn(), data.view().into_dyn()),
            Err(SarError::Shape(_))
        ));

        let coords = Array1::<f64>::zeros(3);
        let data_3d = Array3::<f64>::zeros((3, 2, 2));
        assert!(matches!(
            linear_interp_nan(coords.view().into_dyn(), data_3d.view().into_dyn()),
            Err(SarError::Shape(_))
        ));

        let mismatched = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            linear_interp_nan(coords.view().into_dyn(), mismatched.view().into_dyn()),
            Err(SarError::Shape(_))
        ));

        // A (1, n) coordinate row squeezes to 1-D
        let row = ndarray::ArrayD::<f64>::zeros(IxDyn(&[1, 3]));
        let data = Array1::<f64>::zeros(3);
        assert!(linear_interp_nan(row.view(), data.view().into_dyn()).is_ok());
    }

    #[test]
    fn test_detect_motion_start() {
        let mut z = vec![1.0; 20];
        for (i, value) in z.iter_mut().enumerate().skip(12) {
            *value = 1.0 + 0.1 * (i - 11) as f64;
        }
        assert_eq!(detect_motion_start(&z, 10).unwrap(), 11);

        let still = vec![1.0; 20];
        assert!(matches!(detect_motion_start(&still, 10), Err(SarError::Processing(_))));
    }

    #[test]
    fn test_integer_rate_ratio_selects_samples() {
        // 64 Hz radar (15.625 ms ticks), 128 Hz poses -> every second pose
        let radar = radar(40, 15.625);
        let poses = track(50, 1.0 / 128.0);
        let aligner = aligner(AlignmentParams::default());

        let aligned = aligner.align(&radar, &poses, 0).unwrap();
        assert_eq!(aligned.positions.len(), aligned.pulses.nrows());
        assert_eq!(aligned.len(), 25);
        for (i, position) in aligned.positions.iter().enumerate() {
            assert_eq!(*position, poses[2 * i].position);
        }
    }

    #[test]
    fn test_fractional_ratio_policies() {
        // 100 Hz radar, 130 Hz poses -> ratio 1.3
        let radar = radar(10, 10.0);
        let poses = track(30, 1.0 / 130.0);

        let linear = aligner(AlignmentParams::default()).align(&radar, &poses, 0).unwrap();
        assert!((linear.positions[1][0] - 1.3).abs() < 1e-9);
        assert!((linear.positions[1][1] - 2.6).abs() < 1e-9);
        assert!((linear.positions[3][0] - 3.9).abs() < 1e-9);

        let nearest = aligner(AlignmentParams {
            policy: AlignmentPolicy::Nearest,
            ..AlignmentParams::default()
        })
        .align(&radar, &poses, 0)
        .unwrap();
        // 1.3 -> 1, 2.6 -> 3, 3.9 -> 4, 5.2 -> 5
        assert_eq!(nearest.positions[1][0], 1.0);
        assert_eq!(nearest.positions[2][0], 3.0);
        assert_eq!(nearest.positions[3][0], 4.0);
        assert_eq!(nearest.positions[4][0], 5.0);
        assert_eq!(nearest.len(), linear.len());
    }

    #[test]
    fn test_shift_clamped() {
        // Equal 64 Hz rates on both clocks
        let radar = radar(20, 15.625);
        let poses = track(100, 1.0 / 64.0);
        let aligner = aligner(AlignmentParams {
            radar_start: 5,
            ..AlignmentParams::default()
        });

        assert_eq!(aligner.effective_start(20, -10), 0);
        assert_eq!(aligner.effective_start(20, 100), 19);
        assert_eq!(aligner.effective_start(20, 3), 8);
        assert_eq!(aligner.effective_start(20, i64::MAX), 19);
        assert_eq!(aligner.effective_start(20, i64::MIN), 0);

        let low = aligner.align(&radar, &poses, -10).unwrap();
        assert_eq!(low.radar_start, 0);
        assert_eq!(low.pulses[[0, 0]], SarComplex::new(0.0, 0.0));
        assert_eq!(low.len(), 20);

        let high = aligner.align(&radar, &poses, 100).unwrap();
        assert_eq!(high.radar_start, 19);
        assert_eq!(high.len(), 1);
        assert_eq!(high.pulses[[0, 0]], SarComplex::new(19.0, 0.0));
    }

    #[test]
    fn test_align_detects_motion_start() {
        // Platform at rest on z = 1 for ten samples, then climbing
        let radar = radar(20, 15.625);
        let poses: Vec<PlatformPose> = (0..60usize)
            .map(|i| {
                let z = 1.0 + 0.5 * i.saturating_sub(9) as f64;
                PlatformPose::new(i as f64 / 64.0, [i as f64, 2.0 * i as f64, z])
            })
            .collect();
        let aligner = TimeAligner::new(AlignmentParams {
            motion_window: 10,
            ..AlignmentParams::default()
        });

        let track = aligner.prepare_track(&poses).unwrap();
        assert_eq!(track.motion_start, 9);

        let aligned = aligner.align(&radar, &poses, 0).unwrap();
        assert_eq!(aligned.platform_start, 9);
        assert_eq!(aligned.len(), 20);
        assert_eq!(aligned.positions[0], poses[9].position);
        assert_eq!(aligned.positions[19], poses[28].position);
    }

    #[test]
    fn test_platform_start_beyond_track() {
        let poses = track(30, 1.0 / 64.0);
        let aligner = TimeAligner::new(AlignmentParams {
            platform_start: Some(30),
            ..AlignmentParams::default()
        });
        assert!(matches!(
            aligner.prepare_track(&poses),
            Err(SarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_max_pulses_truncates_both() {
        let radar = radar(30, 15.625);
        let poses = track(100, 1.0 / 64.0);
        let aligner = aligner(AlignmentParams {
            max_pulses: Some(7),
            ..AlignmentParams::default()
        });

        let aligned = aligner.align(&radar, &poses, 0).unwrap();
        assert_eq!(aligned.positions.len(), 7);
        assert_eq!(aligned.pulses.nrows(), 7);
    }

    #[test]
    fn test_gappy_track_matches_clean_track() {
        let radar = radar(20, 15.625);
        let clean = track(60, 1.0 / 128.0);
        let mut gappy = clean.clone();
        gappy[7].position = [f64::NAN, f64::NAN, f64::NAN];
        gappy[8].time = f64::NAN;
        gappy[20].position[1] = f64::NAN;

        let aligner = aligner(AlignmentParams::default());
        let a = aligner.align(&radar, &clean, 0).unwrap();
        let b = aligner.align(&radar, &gappy, 0).unwrap();

        assert_eq!(a.len(), b.len());
        for (p, q) in a.positions.iter().zip(b.positions.iter()) {
            for axis in 0..3 {
                assert!((p[axis] - q[axis]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_stalled_radar_clock() {
        let mut radar = radar(10, 10.0);
        radar.timestamps[1] = radar.timestamps[0];
        let poses = track(20, 0.01);
        let result = aligner(AlignmentParams::default()).align(&radar, &poses, 0);
        assert!(matches!(result, Err(SarError::Processing(_))));
    }
}
