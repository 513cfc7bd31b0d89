use crate::types::{
    AlignedPulseSet, Image, ImageGrid, Position, SarComplex, SarError, SarImage, SarResult,
};
use ndarray::{Array1, ArrayView1};
use num_traits::Zero;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Image formation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackprojectionMethod {
    /// Linear interpolation between range bins
    Direct,
    /// Demodulation and linear phase ramp in the frequency domain
    Fourier,
}

/// Backprojection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackprojectionParams {
    pub method: BackprojectionMethod,
    /// Radar center frequency (Hz), used by the Fourier method
    pub center_frequency_hz: f64,
    /// Speed of light (m/s)
    pub speed_of_light: f64,
}

impl Default for BackprojectionParams {
    fn default() -> Self {
        Self {
            method: BackprojectionMethod::Direct,
            center_frequency_hz: 4.3e9,
            speed_of_light: 299_792_458.0,
        }
    }
}

/// Forms images from aligned pulses.
///
/// A range-bin lookup outside the range axis is an error in both methods
/// (`SarError::RangeIndex`); indices are never clamped or wrapped.
pub struct BackprojectionEngine {
    params: BackprojectionParams,
}

impl BackprojectionEngine {
    pub fn new(params: BackprojectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BackprojectionParams {
        &self.params
    }

    /// Focus `aligned` onto `grid`
    pub fn form_image(&self, aligned: &AlignedPulseSet, grid: &ImageGrid) -> SarResult<Image> {
        self.validate(aligned)?;

        log::info!(
            "Backprojecting {} pulses onto {} x {} grid ({:?})",
            aligned.len(),
            grid.ny,
            grid.nx,
            self.params.method
        );

        let data = match self.params.method {
            BackprojectionMethod::Direct => self.direct(aligned, grid)?,
            BackprojectionMethod::Fourier => self.fourier(aligned, grid)?,
        };

        Ok(Image { data, grid: *grid })
    }

    fn validate(&self, aligned: &AlignedPulseSet) -> SarResult<()> {
        if aligned.positions.len() != aligned.pulses.nrows() {
            return Err(SarError::Shape(format!(
                "{} positions for {} pulses",
                aligned.positions.len(),
                aligned.pulses.nrows()
            )));
        }
        if aligned.pulses.ncols() != aligned.range_axis.len {
            return Err(SarError::Shape(format!(
                "pulses have {} range bins but range axis has {}",
                aligned.pulses.ncols(),
                aligned.range_axis.len
            )));
        }
        if aligned.range_axis.len < 2 || !(aligned.range_axis.spacing > 0.0) {
            return Err(SarError::Shape(format!(
                "range axis needs at least 2 increasing bins, got {} with spacing {}",
                aligned.range_axis.len, aligned.range_axis.spacing
            )));
        }
        if !(self.params.speed_of_light > 0.0) {
            return Err(SarError::InvalidParameter(format!(
                "speed of light must be positive, got {}",
                self.params.speed_of_light
            )));
        }
        if self.params.method == BackprojectionMethod::Fourier
            && !self.params.center_frequency_hz.is_finite()
        {
            return Err(SarError::InvalidParameter(format!(
                "center frequency must be finite, got {}",
                self.params.center_frequency_hz
            )));
        }
        Ok(())
    }

    /// Sum of range-interpolated pulse samples per pixel, rows in parallel
    fn direct(&self, aligned: &AlignedPulseSet, grid: &ImageGrid) -> SarResult<SarImage> {
        let progress = Progress::new(grid.ny, "rows");

        let compute_row = |row: usize| -> SarResult<Vec<SarComplex>> {
            let values = (0..grid.nx)
                .map(|col| {
                    let (x, y) = grid.pixel_position(row, col);
                    let target = [x, y, grid.height];
                    let mut sum = SarComplex::zero();
                    for (pulse, (position, samples)) in
                        aligned.positions.iter().zip(aligned.pulses.rows()).enumerate()
                    {
                        let axis = &aligned.range_axis;
                        let index = axis.fractional_index(distance(position, &target));
                        let (lower, fraction) = checked_bin(index, axis.len, pulse, row, col)?;
                        sum += interpolate_bin(samples, lower, fraction);
                    }
                    Ok(sum)
                })
                .collect::<SarResult<Vec<_>>>()?;
            progress.tick();
            Ok(values)
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<SarComplex>> = {
            use rayon::prelude::*;
            (0..grid.ny).into_par_iter().map(compute_row).collect::<SarResult<_>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<SarComplex>> = (0..grid.ny).map(compute_row).collect::<SarResult<_>>()?;

        let flat: Vec<SarComplex> = rows.into_iter().flatten().collect();
        SarImage::from_shape_vec((grid.ny, grid.nx), flat)
            .map_err(|e| SarError::Shape(format!("image assembly failed: {}", e)))
    }

    /// Per column, align every pulse to each pixel's two-way delay with a
    /// linear phase ramp on its demodulated spectrum.
    ///
    /// Only range bin zero of each inverse transform is kept, so the inverse
    /// transform is evaluated at that single bin rather than in full.
    fn fourier(&self, aligned: &AlignedPulseSet, grid: &ImageGrid) -> SarResult<SarImage> {
        let c = self.params.speed_of_light;
        let fc = self.params.center_frequency_hz;
        let axis = &aligned.range_axis;
        let bins = axis.len;

        // Two-way fast time of each range bin
        let fast_time = axis.values().mapv(|r| 2.0 * r / c);
        let fast_time0 = fast_time[0];
        let delta_fast_time = 2.0 * axis.spacing / c;
        let delta_omega = 2.0 * PI / (delta_fast_time * bins as f64);
        let half = (bins / 2) as f64;

        let spectra = demodulated_spectra(aligned, &fast_time, fc);
        let progress = Progress::new(grid.nx, "columns");

        let compute_column = |col: usize| -> SarResult<Vec<SarComplex>> {
            let mut column = vec![SarComplex::zero(); grid.ny];
            let pulses = aligned.positions.iter().zip(spectra.iter()).enumerate();
            for (pulse, (position, spectrum)) in pulses {
                for (row, value) in column.iter_mut().enumerate() {
                    let (x, y) = grid.pixel_position(row, col);
                    let range = distance(position, &[x, y, grid.height]);
                    checked_bin(axis.fractional_index(range), bins, pulse, row, col)?;

                    let two_way_time = 2.0 * range / c;
                    let shift = two_way_time - fast_time0;

                    // sum_m S[m] exp(j (m - half) dw shift), by Horner in w = exp(j dw shift)
                    let step = SarComplex::from_polar(1.0, delta_omega * shift);
                    let mut acc = SarComplex::zero();
                    for bin in spectrum.iter().rev() {
                        acc = acc * step + *bin;
                    }
                    let ramp_origin = SarComplex::from_polar(1.0, -half * delta_omega * shift);
                    let carrier =
                        SarComplex::from_polar(1.0 / bins as f64, 2.0 * PI * fc * two_way_time);

                    *value += acc * ramp_origin * carrier;
                }
            }
            progress.tick();
            Ok(column)
        };

        #[cfg(feature = "parallel")]
        let columns: Vec<Vec<SarComplex>> = {
            use rayon::prelude::*;
            (0..grid.nx).into_par_iter().map(compute_column).collect::<SarResult<_>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let columns: Vec<Vec<SarComplex>> =
            (0..grid.nx).map(compute_column).collect::<SarResult<_>>()?;

        let mut image = SarImage::zeros((grid.ny, grid.nx));
        for (col, values) in columns.into_iter().enumerate() {
            image.column_mut(col).assign(&Array1::from(values));
        }
        Ok(image)
    }
}

/// Zero-centered spectrum of each pulse after removing the carrier at its
/// own fast time
fn demodulated_spectra(
    aligned: &AlignedPulseSet,
    fast_time: &Array1<f64>,
    fc: f64,
) -> Vec<Vec<SarComplex>> {
    let bins = fast_time.len();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(bins);

    aligned
        .pulses
        .rows()
        .into_iter()
        .map(|samples| {
            let mut buffer: Vec<SarComplex> = samples
                .iter()
                .zip(fast_time.iter())
                .map(|(&s, &t)| s * SarComplex::from_polar(1.0, -2.0 * PI * fc * t))
                .collect();
            fft.process(&mut buffer);
            buffer.rotate_right(bins / 2);
            buffer
        })
        .collect()
}

fn distance(a: &Position, b: &Position) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Lower bin and fraction for a fractional index, or a range index error
/// when either bracketing bin falls outside the axis
fn checked_bin(
    index: f64,
    bins: usize,
    pulse: usize,
    row: usize,
    col: usize,
) -> SarResult<(usize, f64)> {
    if !(index >= 0.0) || index.ceil() > (bins - 1) as f64 {
        return Err(SarError::RangeIndex {
            pulse,
            row,
            col,
            index,
            bins,
        });
    }
    let floor = index.floor();
    Ok((floor as usize, index - floor))
}

/// Linear interpolation of complex samples between `lower` and `lower + 1`
fn interpolate_bin(samples: ArrayView1<SarComplex>, lower: usize, fraction: f64) -> SarComplex {
    if fraction > 0.0 {
        samples[lower] * (1.0 - fraction) + samples[lower + 1] * fraction
    } else {
        samples[lower]
    }
}

/// Percentage progress across worker threads, logged at debug level
struct Progress {
    total: usize,
    done: AtomicUsize,
    unit: &'static str,
}

impl Progress {
    fn new(total: usize, unit: &'static str) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            unit,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let step = (self.total / 10).max(1);
        if done % step == 0 || done == self.total {
            log::debug!(
                "Backprojection {:.0}% ({} of {} {})",
                100.0 * done as f64 / self.total as f64,
                done,
                self.total,
                self.unit
            );
        }
    }
}
