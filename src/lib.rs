//! geoscan: ROI anomaly scanning for GIS workflows
//!
//! Turns a drawn region of interest into a raster (fused satellite imagery or a
//! seeded synthetic field), computes a Difference-of-Gaussians anomaly heatmap,
//! extracts and georeferences peak anomalies with heuristic depth/volume
//! estimates, summarizes them in a report and exports everything to common GIS
//! formats.
//!
//! Depth and volume values are uncalibrated model output, not measurements.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AnomalyPoint, BoundingBox, DataSource, DataSourceUnavailable, GeoAnomaly, GeoError,
    GeoResult, Heatmap, Polarity, Raster, ScanSettings,
};

pub use crate::core::{
    build_georef, build_report, run_scan, Georef, Report, Roi, RoiBuilder, ScanConfig,
    ScanOrchestrator, ScanResult, ScanSession,
};
pub use io::{export_all, DrawnFeature, ExportFormat, ImagerySource};

#[cfg(feature = "python")]
mod bindings {
    use crate::core::{ScanConfig, ScanOrchestrator, ScanSession};
    use crate::types::{DataSource, GeoError, ScanSettings};
    use numpy::ToPyArray;
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use std::collections::HashMap;

    fn to_py_err(e: GeoError) -> PyErr {
        match e {
            GeoError::UnsupportedGeometry(_) | GeoError::InvalidGeometry(_) => {
                PyValueError::new_err(format!("{}", e))
            }
            _ => PyRuntimeError::new_err(format!("{}", e)),
        }
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyScanSession>()?;
        Ok(())
    }

    /// Python wrapper for ScanSession
    #[pyclass(name = "ScanSession")]
    struct PyScanSession {
        inner: ScanSession,
    }

    #[pymethods]
    impl PyScanSession {
        #[new]
        #[pyo3(signature = (raster_size = 256))]
        fn new(raster_size: usize) -> Self {
            let config = ScanConfig {
                raster_size,
                ..ScanConfig::default()
            };
            PyScanSession {
                inner: ScanSession::new(ScanOrchestrator::from_env(config)),
            }
        }

        /// Set the ROI from a drawn GeoJSON feature
        fn set_roi(&mut self, py: Python, geojson: &str) -> PyResult<PyObject> {
            let roi = self.inner.set_roi_from_feature(geojson).map_err(to_py_err)?;

            let result = PyDict::new(py);
            result.set_item("kind", format!("{:?}", roi.kind).to_lowercase())?;
            result.set_item("center", roi.center)?;
            result.set_item("area_m2", roi.area_m2)?;
            result.set_item("polygon", roi.polygon.clone())?;
            Ok(result.into())
        }

        #[pyo3(signature = (
            radar = true,
            optic = true,
            thermal = false,
            magnetic = false,
            use_real_data = false
        ))]
        fn run_scan(
            &mut self,
            py: Python,
            radar: bool,
            optic: bool,
            thermal: bool,
            magnetic: bool,
            use_real_data: bool,
        ) -> PyResult<PyObject> {
            let settings = ScanSettings { radar, optic, thermal, magnetic };
            let scan = self.inner.run_scan(settings, use_real_data).map_err(to_py_err)?;

            let mut points = Vec::with_capacity(scan.anomaly_points.len());
            for p in &scan.anomaly_points {
                let point = PyDict::new(py);
                point.set_item("row", p.point.row)?;
                point.set_item("col", p.point.col)?;
                point.set_item("lat", p.lat)?;
                point.set_item("lon", p.lon)?;
                point.set_item("score", p.point.score)?;
                point.set_item("polarity", p.point.polarity.to_string())?;
                point.set_item("z_rel", p.point.z_rel)?;
                point.set_item("depth_m", p.depth_m)?;
                point.set_item("volume_m3", p.volume_m3)?;
                points.push(point.to_object(py));
            }

            let georef = PyDict::new(py);
            georef.set_item("lon_min", scan.georef.lon_min)?;
            georef.set_item("lon_max", scan.georef.lon_max)?;
            georef.set_item("lat_min", scan.georef.lat_min)?;
            georef.set_item("lat_max", scan.georef.lat_max)?;
            georef.set_item("H", scan.georef.height)?;
            georef.set_item("W", scan.georef.width)?;

            let source = match &scan.data_source {
                DataSource::Imagery { .. } => "imagery".to_string(),
                DataSource::Synthetic { fallback_reason: None } => "synthetic".to_string(),
                DataSource::Synthetic {
                    fallback_reason: Some(reason),
                } => format!("synthetic ({})", reason),
            };

            let result = PyDict::new(py);
            result.set_item("roi_area_m2", scan.roi_area_m2)?;
            result.set_item("heatmap", scan.heatmap.to_pyarray(py))?;
            result.set_item("raster", scan.raster.to_pyarray(py))?;
            result.set_item("anomaly_points", points)?;
            result.set_item("georef", georef)?;
            result.set_item("data_source", source)?;
            Ok(result.into())
        }

        /// Report of the last scan as JSON, if any
        fn report_json(&self) -> PyResult<Option<String>> {
            self.inner
                .report()
                .map(|r| r.to_json())
                .transpose()
                .map_err(to_py_err)
        }

        /// Export the last scan; returns format label -> file path
        fn export(&self, out_dir: &str) -> PyResult<HashMap<String, String>> {
            let written = self.inner.export(out_dir).map_err(to_py_err)?;
            Ok(written
                .into_iter()
                .map(|(format, path)| (format.label().to_string(), path.display().to_string()))
                .collect())
        }

        fn clear(&mut self) {
            self.inner.clear();
        }
    }
}
