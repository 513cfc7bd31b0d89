//! Python bindings

use crate::core::autofocus::image_entropy;
use crate::core::backprojection::{BackprojectionEngine, BackprojectionMethod, BackprojectionParams};
use crate::io::pulse_reader::{
    DecoderParams, ProtocolVersion, PulseData, PulseFrameDecoder, RangeBinSource,
};
use crate::types::{AlignedPulseSet, ImageGrid, Position, RangeAxis, SarError};
use numpy::{Complex64, IntoPyArray, PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(err: SarError) -> PyErr {
    match err {
        SarError::Io(e) => PyErr::new::<PyIOError, _>(format!("{}", e)),
        SarError::InvalidParameter(_) | SarError::Shape(_) => {
            PyErr::new::<PyValueError, _>(format!("{}", err))
        }
        _ => PyErr::new::<PyRuntimeError, _>(format!("{}", err)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyPulseDecoder>()?;
    m.add_class::<PyPulseData>()?;
    m.add_function(wrap_pyfunction!(form_image, m)?)?;
    m.add_function(wrap_pyfunction!(entropy, m)?)?;
    Ok(())
}

/// Python wrapper for PulseFrameDecoder
#[pyclass(name = "PulseDecoder")]
struct PyPulseDecoder {
    inner: PulseFrameDecoder,
}

#[pymethods]
impl PyPulseDecoder {
    #[new]
    #[pyo3(signature = (protocol = "compact", range_bins = "packet"))]
    fn new(protocol: &str, range_bins: &str) -> PyResult<Self> {
        let protocol = match protocol.to_lowercase().as_str() {
            "compact" => ProtocolVersion::Compact,
            "legacy" => ProtocolVersion::Legacy,
            _ => {
                return Err(PyErr::new::<PyValueError, _>(format!(
                    "Invalid protocol: {}",
                    protocol
                )))
            }
        };
        let range_bin_source = match range_bins.to_lowercase().as_str() {
            "packet" => RangeBinSource::PacketHeader,
            "window" => RangeBinSource::ScanWindow,
            _ => {
                return Err(PyErr::new::<PyValueError, _>(format!(
                    "Invalid range bin source: {}",
                    range_bins
                )))
            }
        };

        Ok(PyPulseDecoder {
            inner: PulseFrameDecoder::new(DecoderParams {
                protocol,
                range_bin_source,
                ..DecoderParams::default()
            }),
        })
    }

    fn decode(&self, py: Python, path: String) -> PyResult<PyPulseData> {
        let data = py
            .allow_threads(|| self.inner.decode_file(&path))
            .map_err(to_py_err)?;
        Ok(PyPulseData { inner: data })
    }
}

/// Python wrapper for decoded pulse data
#[pyclass(name = "PulseData")]
struct PyPulseData {
    inner: PulseData,
}

#[pymethods]
impl PyPulseData {
    #[getter]
    fn scans<'py>(&self, py: Python<'py>) -> &'py PyArray2<f64> {
        self.inner.scans.clone().into_pyarray(py)
    }

    #[getter]
    fn timestamps<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.inner.timestamps.clone().into_pyarray(py)
    }

    #[getter]
    fn range_axis<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.inner.range_axis.values().into_pyarray(py)
    }

    #[getter]
    fn last_scan_partial(&self) -> bool {
        self.inner.last_scan_partial
    }

    #[getter]
    fn scan_window(&self) -> (i32, i32) {
        (self.inner.header.scan_start, self.inner.header.scan_stop)
    }

    /// Complex pulses from the Hilbert transform of every scan
    fn analytic<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray2<Complex64>> {
        let pulses = self.inner.to_radar_pulses().map_err(to_py_err)?;
        Ok(pulses.pulses.into_pyarray(py))
    }

    fn __len__(&self) -> usize {
        self.inner.num_scans()
    }

    fn __str__(&self) -> String {
        format!(
            "PulseData(scans={}, range_bins={}, partial_last={})",
            self.inner.num_scans(),
            self.inner.range_axis.len,
            self.inner.last_scan_partial
        )
    }
}

/// Backproject aligned pulses (rows) and antenna positions (N x 3) onto a grid
#[pyfunction]
#[pyo3(signature = (
    pulses, positions, range_start, range_spacing, origin, pitch, nx, ny,
    height = 0.0, method = "direct", center_frequency_hz = 4.3e9
))]
#[allow(clippy::too_many_arguments)]
fn form_image<'py>(
    py: Python<'py>,
    pulses: PyReadonlyArray2<Complex64>,
    positions: PyReadonlyArray2<f64>,
    range_start: f64,
    range_spacing: f64,
    origin: (f64, f64),
    pitch: f64,
    nx: usize,
    ny: usize,
    height: f64,
    method: &str,
    center_frequency_hz: f64,
) -> PyResult<&'py PyArray2<Complex64>> {
    let method = match method.to_lowercase().as_str() {
        "direct" => BackprojectionMethod::Direct,
        "fourier" => BackprojectionMethod::Fourier,
        _ => return Err(PyErr::new::<PyValueError, _>(format!("Invalid method: {}", method))),
    };

    let positions = positions.as_array();
    if positions.ncols() != 3 {
        return Err(PyErr::new::<PyValueError, _>(format!(
            "positions must be N x 3, got {:?}",
            positions.shape()
        )));
    }
    let positions: Vec<Position> = positions
        .rows()
        .into_iter()
        .map(|r| [r[0], r[1], r[2]])
        .collect();

    let pulses = pulses.as_array().to_owned();
    let bins = pulses.ncols();
    let aligned = AlignedPulseSet {
        positions,
        pulses,
        range_axis: RangeAxis::new(range_start, range_spacing, bins),
        radar_start: 0,
        platform_start: 0,
    };
    let grid = ImageGrid::new([origin.0, origin.1], pitch, nx, ny)
        .map_err(to_py_err)?
        .with_height(height);

    let engine = BackprojectionEngine::new(BackprojectionParams {
        method,
        center_frequency_hz,
        ..BackprojectionParams::default()
    });

    let image = py
        .allow_threads(|| engine.form_image(&aligned, &grid))
        .map_err(to_py_err)?;
    Ok(image.data.into_pyarray(py))
}

/// Shannon entropy of a magnitude image
#[pyfunction]
fn entropy(magnitude: PyReadonlyArray2<f64>) -> f64 {
    image_entropy(&magnitude.as_array().to_owned())
}
