use ndarray::{Array1, Array2};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex-valued radar sample (I + jQ)
pub type SarComplex = Complex<f64>;

/// Real-valued magnitude data
pub type SarReal = f64;

/// 2D complex pulse data (pulse x range bin)
pub type PulseMatrix = Array2<SarComplex>;

/// 2D complex image data (y x x)
pub type SarImage = Array2<SarComplex>;

/// 2D real image data (y x x)
pub type SarRealImage = Array2<SarReal>;

/// Cartesian position in meters
pub type Position = [f64; 3];

/// Uniformly spaced range axis in meters (one-way range)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeAxis {
    /// Range of the first bin (meters)
    pub start: f64,
    /// Spacing between consecutive bins (meters)
    pub spacing: f64,
    /// Number of range bins
    pub len: usize,
}

impl RangeAxis {
    pub fn new(start: f64, spacing: f64, len: usize) -> Self {
        Self { start, spacing, len }
    }

    /// Build an axis from explicit range values, checking that they are
    /// increasing and uniformly spaced.
    pub fn from_values(values: &[f64]) -> SarResult<Self> {
        if values.len() < 2 {
            return Err(SarError::Shape(format!(
                "range axis needs at least 2 values, got {}",
                values.len()
            )));
        }

        let spacing = values[1] - values[0];
        if !(spacing > 0.0) {
            return Err(SarError::Shape(format!(
                "range axis is not increasing (spacing {})",
                spacing
            )));
        }

        let tolerance = spacing * 1e-6;
        for (i, pair) in values.windows(2).enumerate() {
            if ((pair[1] - pair[0]) - spacing).abs() > tolerance {
                return Err(SarError::Shape(format!(
                    "range axis is not uniform at index {}: step {} vs {}",
                    i + 1,
                    pair[1] - pair[0],
                    spacing
                )));
            }
        }

        Ok(Self::new(values[0], spacing, values.len()))
    }

    /// Range of bin `index`
    pub fn range_at(&self, index: usize) -> f64 {
        self.start + self.spacing * index as f64
    }

    /// Fractional bin index of `range`
    pub fn fractional_index(&self, range: f64) -> f64 {
        (range - self.start) / self.spacing
    }

    pub fn values(&self) -> Array1<f64> {
        Array1::from_iter((0..self.len).map(|i| self.range_at(i)))
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One motion-capture sample of the radar antenna
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformPose {
    /// Sample time (seconds); NaN when missing
    pub time: f64,
    /// [x, y, z] in meters, z vertical; NaN entries when missing
    pub position: Position,
}

impl PlatformPose {
    pub fn new(time: f64, position: Position) -> Self {
        Self { time, position }
    }
}

/// Complex pulses with their radar-clock timestamps and range axis
#[derive(Debug, Clone)]
pub struct RadarPulses {
    pub pulses: PulseMatrix,
    /// Radar clock timestamps, one per pulse row
    pub timestamps: Vec<f64>,
    pub range_axis: RangeAxis,
}

impl RadarPulses {
    pub fn new(
        pulses: PulseMatrix,
        timestamps: Vec<f64>,
        range_axis: RangeAxis,
    ) -> SarResult<Self> {
        if pulses.nrows() != timestamps.len() {
            return Err(SarError::Shape(format!(
                "{} pulses but {} timestamps",
                pulses.nrows(),
                timestamps.len()
            )));
        }
        if pulses.ncols() != range_axis.len {
            return Err(SarError::Shape(format!(
                "{} range bins per pulse but range axis has {}",
                pulses.ncols(),
                range_axis.len
            )));
        }
        Ok(Self { pulses, timestamps, range_axis })
    }

    pub fn num_pulses(&self) -> usize {
        self.pulses.nrows()
    }
}

/// Pulses paired one-to-one with platform positions
#[derive(Debug, Clone)]
pub struct AlignedPulseSet {
    /// Platform position per retained pulse
    pub positions: Vec<Position>,
    /// Retained pulses (row i was transmitted at `positions[i]`)
    pub pulses: PulseMatrix,
    pub range_axis: RangeAxis,
    /// Pulse index (in the source matrix) of the first retained pulse
    pub radar_start: usize,
    /// Pose index of the first retained pulse's platform sample
    pub platform_start: usize,
}

impl AlignedPulseSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Scene-to-pixel mapping of an image
///
/// Pixel `(row, col)` sits at `x = origin[0] + col * pitch`,
/// `y = origin[1] + row * pitch` on the plane `z = height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGrid {
    pub origin: [f64; 2],
    pub pitch: f64,
    pub nx: usize,
    pub ny: usize,
    pub height: f64,
}

impl ImageGrid {
    pub fn new(origin: [f64; 2], pitch: f64, nx: usize, ny: usize) -> SarResult<Self> {
        if !(pitch > 0.0) || !pitch.is_finite() {
            return Err(SarError::InvalidParameter(format!(
                "pixel pitch must be positive, got {}",
                pitch
            )));
        }
        if nx == 0 || ny == 0 {
            return Err(SarError::InvalidParameter(format!(
                "image grid must be non-empty, got {} x {}",
                ny, nx
            )));
        }
        Ok(Self { origin, pitch, nx, ny, height: 0.0 })
    }

    /// Grid of `nx` x `ny` pixels centered on `center`
    pub fn centered(center: [f64; 2], pitch: f64, nx: usize, ny: usize) -> SarResult<Self> {
        let origin = [
            center[0] - pitch * (nx as f64 - 1.0) / 2.0,
            center[1] - pitch * (ny as f64 - 1.0) / 2.0,
        ];
        Self::new(origin, pitch, nx, ny)
    }

    /// Grid spanning `[min, max)` on both axes with the given pitch
    pub fn from_bounds(x_bounds: (f64, f64), y_bounds: (f64, f64), pitch: f64) -> SarResult<Self> {
        let count = |(lo, hi): (f64, f64)| -> usize {
            if hi > lo && pitch > 0.0 {
                ((hi - lo) / pitch).ceil() as usize
            } else {
                0
            }
        };
        Self::new([x_bounds.0, y_bounds.0], pitch, count(x_bounds), count(y_bounds))
    }

    /// Plane height (z) of the scene
    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    /// Window `[start, end)` of pixels of this grid, resampled with
    /// `multiplier` pixels per original pixel along each axis.
    pub fn sub_region(
        &self,
        start: (usize, usize),
        end: (usize, usize),
        multiplier: usize,
    ) -> SarResult<Self> {
        let (start_row, start_col) = start;
        let (end_row, end_col) = end;
        if multiplier == 0 {
            return Err(SarError::InvalidParameter(
                "resolution multiplier must be >= 1".to_string(),
            ));
        }
        if end_row <= start_row || end_col <= start_col || end_row > self.ny || end_col > self.nx {
            return Err(SarError::InvalidParameter(format!(
                "sub-region rows {}..{} cols {}..{} outside {} x {} grid",
                start_row, end_row, start_col, end_col, self.ny, self.nx
            )));
        }

        let (x, y) = self.pixel_position(start_row, start_col);
        let grid = Self::new(
            [x, y],
            self.pitch / multiplier as f64,
            (end_col - start_col) * multiplier,
            (end_row - start_row) * multiplier,
        )?;
        Ok(grid.with_height(self.height))
    }

    /// Scene (x, y) of pixel (row, col)
    pub fn pixel_position(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin[0] + col as f64 * self.pitch,
            self.origin[1] + row as f64 * self.pitch,
        )
    }

    pub fn x_values(&self) -> Array1<f64> {
        Array1::from_iter((0..self.nx).map(|c| self.origin[0] + c as f64 * self.pitch))
    }

    pub fn y_values(&self) -> Array1<f64> {
        Array1::from_iter((0..self.ny).map(|r| self.origin[1] + r as f64 * self.pitch))
    }

    pub fn num_pixels(&self) -> usize {
        self.nx * self.ny
    }
}

/// Focused complex image and its geometry
#[derive(Debug, Clone)]
pub struct Image {
    pub data: SarImage,
    pub grid: ImageGrid,
}

impl Image {
    pub fn magnitude(&self) -> SarRealImage {
        self.data.mapv(|pixel| pixel.norm())
    }

    /// 20·log10 magnitude; zero pixels map to -inf
    pub fn to_db(&self) -> SarRealImage {
        self.data.mapv(|pixel| 20.0 * pixel.norm().log10())
    }

    /// (row, col, magnitude) of the brightest pixel
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        self.data
            .indexed_iter()
            .map(|((row, col), pixel)| (row, col, pixel.norm()))
            .fold(None, |best, candidate| match best {
                Some((_, _, mag)) if mag >= candidate.2 => best,
                _ => Some(candidate),
            })
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header decode error: need {needed} bytes, stream provided {available}")]
    HeaderDecode { needed: usize, available: usize },

    #[error("Protocol configuration error at byte {offset}: {message}")]
    ProtocolConfig { offset: u64, message: String },

    #[error("Truncated stream: partial frame of {length} bytes at byte {offset}")]
    TruncatedStream { offset: u64, length: usize },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Range index {index:.3} outside {bins} bins (pulse {pulse}, pixel [{row}, {col}])")]
    RangeIndex {
        pulse: usize,
        row: usize,
        col: usize,
        index: f64,
        bins: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
