//! Core image formation modules

pub mod analytic;
pub mod autofocus;
pub mod backprojection;
pub mod time_align;

// Re-export main types
pub use analytic::{analytic_signal, analytic_signal_rows};
pub use autofocus::{image_entropy, AutofocusParams, AutofocusSearch, FocusCandidate, FocusResult};
pub use backprojection::{BackprojectionEngine, BackprojectionMethod, BackprojectionParams};
pub use time_align::{
    detect_motion_start, linear_interp_nan, AlignmentParams, AlignmentPolicy, PreparedTrack,
    TimeAligner,
};
