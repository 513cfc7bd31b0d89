use crate::core::backprojection::BackprojectionEngine;
use crate::core::time_align::{PreparedTrack, TimeAligner};
use crate::types::{
    AlignedPulseSet, Image, ImageGrid, RadarPulses, SarError, SarRealImage, SarResult,
};
use serde::{Deserialize, Serialize};

/// Shift search parameters (in pulses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofocusParams {
    /// Candidates span `[-deviation, deviation)`
    pub deviation: i64,
    pub step: i64,
}

impl Default for AutofocusParams {
    fn default() -> Self {
        Self {
            deviation: 25,
            step: 3,
        }
    }
}

/// A trial radar start shift and the entropy of its image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusCandidate {
    pub shift: i64,
    pub entropy: f64,
}

/// Winning shift with its alignment and image
#[derive(Debug, Clone)]
pub struct FocusResult {
    pub best: FocusCandidate,
    /// Every evaluated candidate, zero shift first
    pub candidates: Vec<FocusCandidate>,
    pub aligned: AlignedPulseSet,
    pub image: Image,
}

/// Shannon entropy of a magnitude image after min-max normalization.
///
/// Pixels normalizing to zero contribute nothing; an image with no dynamic
/// range has entropy zero.
pub fn image_entropy(magnitude: &SarRealImage) -> f64 {
    let (min, max) = magnitude
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let range = (max - min).abs();
    if !(range > 0.0) || !range.is_finite() {
        return 0.0;
    }

    -magnitude
        .iter()
        .map(|&v| (v - min).abs() / range)
        .filter(|&p| p != 0.0)
        .map(|p| p * p.log2())
        .sum::<f64>()
}

/// Searches radar start shifts for the sharpest image
pub struct AutofocusSearch {
    aligner: TimeAligner,
    engine: BackprojectionEngine,
    params: AutofocusParams,
}

impl AutofocusSearch {
    pub fn new(
        aligner: TimeAligner,
        engine: BackprojectionEngine,
        params: AutofocusParams,
    ) -> Self {
        Self {
            aligner,
            engine,
            params,
        }
    }

    pub fn aligner(&self) -> &TimeAligner {
        &self.aligner
    }

    pub fn engine(&self) -> &BackprojectionEngine {
        &self.engine
    }

    /// Zero shift followed by `-deviation, -deviation + step, ...` below
    /// `deviation`
    pub fn candidate_shifts(&self) -> SarResult<Vec<i64>> {
        if self.params.step <= 0 {
            return Err(SarError::InvalidParameter(format!(
                "autofocus step must be positive, got {}",
                self.params.step
            )));
        }
        if self.params.deviation < 0 {
            return Err(SarError::InvalidParameter(format!(
                "autofocus deviation must be non-negative, got {}",
                self.params.deviation
            )));
        }

        let mut shifts = vec![0];
        let mut shift = -self.params.deviation;
        while shift < self.params.deviation {
            shifts.push(shift);
            match shift.checked_add(self.params.step) {
                Some(next) => shift = next,
                None => break,
            }
        }
        Ok(shifts)
    }

    /// Align and image for a single shift
    pub fn evaluate(
        &self,
        radar: &RadarPulses,
        track: &PreparedTrack,
        grid: &ImageGrid,
        shift: i64,
    ) -> SarResult<(AlignedPulseSet, Image)> {
        let aligned = self.aligner.align_prepared(radar, track, shift)?;
        let image = self.engine.form_image(&aligned, grid)?;
        Ok((aligned, image))
    }

    /// Evaluate every candidate shift over `region` and keep the one with
    /// the lowest entropy; ties go to the earliest candidate
    pub fn run(
        &self,
        radar: &RadarPulses,
        track: &PreparedTrack,
        region: &ImageGrid,
    ) -> SarResult<FocusResult> {
        let shifts = self.candidate_shifts()?;
        log::info!(
            "Autofocus over {} candidate shifts (deviation {}, step {})",
            shifts.len(),
            self.params.deviation,
            self.params.step
        );

        let score = |shift: i64| -> SarResult<FocusCandidate> {
            let (_, image) = self.evaluate(radar, track, region, shift)?;
            let entropy = image_entropy(&image.magnitude());
            log::debug!("Shift {}: entropy {:.6}", shift, entropy);
            Ok(FocusCandidate { shift, entropy })
        };

        #[cfg(feature = "parallel")]
        let candidates: Vec<FocusCandidate> = {
            use rayon::prelude::*;
            shifts.par_iter().map(|&shift| score(shift)).collect::<SarResult<_>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let candidates: Vec<FocusCandidate> = shifts
            .iter()
            .map(|&shift| score(shift))
            .collect::<SarResult<_>>()?;

        let best = select_best(&candidates)
            .ok_or_else(|| SarError::Processing("no autofocus candidates evaluated".to_string()))?;

        log::info!("Best shift {} with entropy {:.6}", best.shift, best.entropy);

        let (aligned, image) = self.evaluate(radar, track, region, best.shift)?;
        Ok(FocusResult {
            best,
            candidates,
            aligned,
            image,
        })
    }
}

/// Lowest-entropy candidate, keeping the first one on ties
fn select_best(candidates: &[FocusCandidate]) -> Option<FocusCandidate> {
    let mut iter = candidates.iter().copied();
    let first = iter.next()?;
    Some(iter.fold(first, |best, candidate| {
        if candidate.entropy < best.entropy {
            candidate
        } else {
            best
        }
    }))
}
