use crate::types::{PulseMatrix, SarComplex};
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Analytic signal of every row of a real matrix (Hilbert transform along
/// the range axis).
pub fn analytic_signal_rows(scans: &Array2<f64>) -> PulseMatrix {
    let (rows, bins) = scans.dim();
    let mut pulses = PulseMatrix::zeros((rows, bins));
    if rows == 0 || bins == 0 {
        return pulses;
    }

    log::debug!("Computing analytic signal for {} scans of {} bins", rows, bins);

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(bins);
    let inverse = planner.plan_fft_inverse(bins);

    #[cfg(feature = "parallel")]
    Zip::from(pulses.rows_mut())
        .and(scans.rows())
        .par_for_each(|out, scan| analytic_row(scan, out, &forward, &inverse));

    #[cfg(not(feature = "parallel"))]
    Zip::from(pulses.rows_mut())
        .and(scans.rows())
        .for_each(|out, scan| analytic_row(scan, out, &forward, &inverse));

    pulses
}

/// Analytic signal of a single real sequence
pub fn analytic_signal(samples: &[f64]) -> Vec<SarComplex> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut out = vec![SarComplex::new(0.0, 0.0); n];
    analytic_row(
        ArrayView1::from(samples),
        ArrayViewMut1::from(out.as_mut_slice()),
        &forward,
        &inverse,
    );
    out
}

fn analytic_row(
    scan: ArrayView1<f64>,
    mut out: ArrayViewMut1<SarComplex>,
    forward: &Arc<dyn Fft<f64>>,
    inverse: &Arc<dyn Fft<f64>>,
) {
    let n = scan.len();
    let mut buffer: Vec<SarComplex> = scan.iter().map(|&s| SarComplex::new(s, 0.0)).collect();
    forward.process(&mut buffer);

    // Keep DC (and Nyquist for even lengths), double positive frequencies,
    // zero negative frequencies.
    let half = n / 2;
    for (k, bin) in buffer.iter_mut().enumerate() {
        let weight = if k == 0 || (n % 2 == 0 && k == half) {
            1.0
        } else if k < (n + 1) / 2 {
            2.0
        } else {
            0.0
        };
        *bin *= weight;
    }

    inverse.process(&mut buffer);
    let scale = 1.0 / n as f64;
    for (dst, src) in out.iter_mut().zip(buffer.iter()) {
        *dst = *src * scale;
    }
}
