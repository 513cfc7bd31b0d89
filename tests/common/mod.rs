#![allow(dead_code)]

use uavsar::types::{Position, PulseMatrix, RangeAxis, SarComplex};

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Synthetic point-target echo model on a uniform range axis
pub struct PointTarget {
    pub target: Position,
    pub axis: RangeAxis,
    /// Gaussian envelope width in range bins
    pub sigma_bins: f64,
    /// Carrier cycles per range bin of two-way fast time
    pub cycles_per_bin: f64,
}

impl PointTarget {
    pub fn new(target: Position, sigma_bins: f64, cycles_per_bin: f64) -> Self {
        Self {
            target,
            axis: RangeAxis::new(0.0, 0.05, 256),
            sigma_bins,
            cycles_per_bin,
        }
    }

    pub fn bin_time(&self) -> f64 {
        2.0 * self.axis.spacing / SPEED_OF_LIGHT
    }

    pub fn center_frequency(&self) -> f64 {
        self.cycles_per_bin / self.bin_time()
    }

    /// Echo received with the antenna at `antenna`
    pub fn echo(&self, antenna: &Position) -> Vec<SarComplex> {
        let dt = self.bin_time();
        let fc = self.center_frequency();
        let range = ((antenna[0] - self.target[0]).powi(2)
            + (antenna[1] - self.target[1]).powi(2)
            + (antenna[2] - self.target[2]).powi(2))
        .sqrt();
        let delay = 2.0 * range / SPEED_OF_LIGHT;

        (0..self.axis.len)
            .map(|n| {
                let t = 2.0 * self.axis.range_at(n) / SPEED_OF_LIGHT - delay;
                let envelope = (-0.5 * (t / dt / self.sigma_bins).powi(2)).exp();
                SarComplex::from_polar(envelope, 2.0 * std::f64::consts::PI * fc * t)
            })
            .collect()
    }

    pub fn echoes(&self, antennas: &[Position]) -> PulseMatrix {
        let bins = self.axis.len;
        let flat: Vec<SarComplex> = antennas.iter().flat_map(|a| self.echo(a)).collect();
        PulseMatrix::from_shape_vec((antennas.len(), bins), flat).expect("echo matrix shape")
    }
}
