//! Processing configuration shared by every stage

use crate::core::autofocus::{AutofocusParams, AutofocusSearch};
use crate::core::backprojection::{BackprojectionEngine, BackprojectionParams};
use crate::core::time_align::{AlignmentParams, TimeAligner};
use crate::io::pulse_reader::{DecoderParams, PulseFrameDecoder, MAX_SAMPLES_PER_PACKET};
use crate::types::{SarError, SarResult};
use serde::{Deserialize, Serialize};

/// Parameters for the full decode, align, focus chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub decoder: DecoderParams,
    pub alignment: AlignmentParams,
    pub backprojection: BackprojectionParams,
    pub autofocus: AutofocusParams,
}

impl ProcessingConfig {
    /// Check every parameter that would otherwise surface as a degenerate
    /// computation deep inside a stage
    pub fn validate(&self) -> SarResult<()> {
        let d = &self.decoder;
        positive("decoder.bin_duration_ns", d.bin_duration_ns)?;
        positive("decoder.speed_of_light", d.speed_of_light)?;
        if !d.dt0_ns.is_finite() {
            return Err(invalid(format!("decoder.dt0_ns must be finite, got {}", d.dt0_ns)));
        }
        if d.bin_group == 0 {
            return Err(invalid("decoder.bin_group must be non-zero".to_string()));
        }
        if d.samples_per_packet == 0 || d.samples_per_packet > MAX_SAMPLES_PER_PACKET {
            return Err(invalid(format!(
                "decoder.samples_per_packet must be in 1..={}, got {}",
                MAX_SAMPLES_PER_PACKET, d.samples_per_packet
            )));
        }

        let a = &self.alignment;
        positive("alignment.radar_clock_scale", a.radar_clock_scale)?;
        if a.platform_start.is_none() && a.motion_window < 2 {
            return Err(invalid(format!(
                "alignment.motion_window must cover at least 2 samples, got {}",
                a.motion_window
            )));
        }
        if a.max_pulses == Some(0) {
            return Err(invalid("alignment.max_pulses must be non-zero when set".to_string()));
        }

        let b = &self.backprojection;
        positive("backprojection.speed_of_light", b.speed_of_light)?;
        if !b.center_frequency_hz.is_finite() || b.center_frequency_hz < 0.0 {
            return Err(invalid(format!(
                "backprojection.center_frequency_hz must be finite and non-negative, got {}",
                b.center_frequency_hz
            )));
        }

        let f = &self.autofocus;
        if f.step <= 0 {
            return Err(invalid(format!("autofocus.step must be positive, got {}", f.step)));
        }
        if f.deviation < 0 {
            return Err(invalid(format!(
                "autofocus.deviation must be non-negative, got {}",
                f.deviation
            )));
        }

        Ok(())
    }

    pub fn decoder(&self) -> PulseFrameDecoder {
        PulseFrameDecoder::new(self.decoder.clone())
    }

    pub fn aligner(&self) -> TimeAligner {
        TimeAligner::new(self.alignment.clone())
    }

    pub fn engine(&self) -> BackprojectionEngine {
        BackprojectionEngine::new(self.backprojection.clone())
    }

    pub fn autofocus(&self) -> AutofocusSearch {
        AutofocusSearch::new(self.aligner(), self.engine(), self.autofocus.clone())
    }
}

fn positive(name: &str, value: f64) -> SarResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn invalid(message: String) -> SarError {
    SarError::InvalidParameter(message)
}
