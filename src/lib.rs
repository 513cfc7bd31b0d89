//! uavsar: backprojection SAR imaging for a PulsON radar on a tracked platform
//!
//! This library decodes the radar's binary pulse stream, aligns the pulses
//! with a motion-capture track of the antenna, and focuses them onto a ground
//! grid by direct or frequency-domain backprojection, optionally searching the
//! radar/track time offset that minimizes image entropy.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use self::types::{
    AlignedPulseSet, Image, ImageGrid, PlatformPose, Position, PulseMatrix, RadarPulses, RangeAxis,
    SarComplex, SarError, SarImage, SarRealImage, SarResult,
};

pub use self::config::ProcessingConfig;
pub use self::core::{
    image_entropy, AlignmentParams, AlignmentPolicy, AutofocusParams, AutofocusSearch,
    BackprojectionEngine, BackprojectionMethod, BackprojectionParams, FocusCandidate, FocusResult,
    PreparedTrack, TimeAligner,
};
pub use self::io::{
    ConfigHeader, DecoderParams, ProtocolVersion, PulseData, PulseFrameDecoder, RangeBinSource,
};
