use crate::core::roi::Roi;
use crate::io::imagery::{validate_stack, BandStack, ImagerySource};
use crate::types::{DataSource, DataSourceUnavailable, ImageryLayer, Raster, ScanSettings};
use ndarray::{Array2, Axis, Zip};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

/// Added to standard deviations before dividing
const STD_EPSILON: f64 = 1e-6;

/// Number of Gaussian blobs in the synthetic raster
const SYNTHETIC_BLOBS: usize = 6;

/// Bands per imagery layer
const RADAR_BANDS: usize = 2;
const OPTICAL_BANDS: usize = 4;
const THERMAL_BANDS: usize = 1;

/// Default seed of the synthetic generator
pub const DEFAULT_SEED: u64 = 42;

/// A raster plus the source it was produced from
#[derive(Debug, Clone)]
pub struct RasterAcquisition {
    pub raster: Raster,
    pub source: DataSource,
}

/// Produces the scan raster from imagery or the synthetic generator
pub struct RasterProvider {
    imagery: Option<Box<dyn ImagerySource>>,
    seed: u64,
}

impl RasterProvider {
    /// Synthetic-only provider
    pub fn synthetic(seed: u64) -> Self {
        Self { imagery: None, seed }
    }

    /// Provider that tries `imagery` first in real-data mode
    pub fn with_imagery(imagery: Box<dyn ImagerySource>, seed: u64) -> Self {
        Self {
            imagery: Some(imagery),
            seed,
        }
    }

    pub fn has_imagery(&self) -> bool {
        self.imagery.is_some()
    }

    /// Produce a `size` x `size` raster over the ROI.
    ///
    /// Real-data failures never surface: they fall back to the synthetic
    /// raster and are recorded in the returned [`DataSource`].
    pub fn get_raster(
        &self,
        roi: &Roi,
        size: usize,
        settings: &ScanSettings,
        use_real_data: bool,
    ) -> RasterAcquisition {
        if !use_real_data {
            log::info!("Using synthetic {}x{} raster (seed {})", size, size, self.seed);
            return RasterAcquisition {
                raster: synthetic_raster(size, self.seed),
                source: DataSource::Synthetic { fallback_reason: None },
            };
        }

        self.try_real_raster(roi, size, settings)
            .map(|(raster, layers)| {
                log::info!("Using fused imagery raster from {:?}", layers);
                RasterAcquisition {
                    raster,
                    source: DataSource::Imagery { layers },
                }
            })
            .unwrap_or_else(|reason| {
                log::warn!(
                    "Real imagery unavailable ({}), falling back to synthetic raster",
                    reason
                );
                RasterAcquisition {
                    raster: synthetic_raster(size, self.seed),
                    source: DataSource::Synthetic {
                        fallback_reason: Some(reason),
                    },
                }
            })
    }

    /// Fetch, z-score and fuse the enabled imagery layers
    pub fn try_real_raster(
        &self,
        roi: &Roi,
        size: usize,
        settings: &ScanSettings,
    ) -> Result<(Raster, Vec<ImageryLayer>), DataSourceUnavailable> {
        let imagery = self
            .imagery
            .as_deref()
            .ok_or(DataSourceUnavailable::NoCollaborator)?;
        if !imagery.has_credentials() {
            return Err(DataSourceUnavailable::NoCredentials);
        }

        let bbox = roi.bounds();
        let shape = (size, size);
        let mut bands: Vec<Array2<f32>> = Vec::new();
        let mut layers = Vec::new();

        if settings.radar {
            let stack = imagery.fetch_radar(&bbox, shape)?;
            validate_stack(&stack, shape, RADAR_BANDS)?;
            push_zscored_bands(&mut bands, &stack);
            layers.push(ImageryLayer::Radar);
        }
        if settings.optic {
            let stack = imagery.fetch_optical(&bbox, shape)?;
            validate_stack(&stack, shape, OPTICAL_BANDS)?;
            push_zscored_bands(&mut bands, &stack);
            layers.push(ImageryLayer::Optical);
        }
        if settings.thermal {
            match imagery
                .fetch_thermal(&bbox, shape)
                .and_then(|stack| validate_stack(&stack, shape, THERMAL_BANDS).map(|_| stack))
            {
                Ok(stack) => {
                    push_zscored_bands(&mut bands, &stack);
                    layers.push(ImageryLayer::Thermal);
                }
                // Nothing real to fuse with, so the scan must not run on a zero band
                Err(e) if bands.is_empty() => return Err(e),
                Err(e) => {
                    log::warn!("Thermal request failed ({}), using a zero band", e);
                    let zeros = BandStack::zeros((size, size, THERMAL_BANDS));
                    push_zscored_bands(&mut bands, &zeros);
                }
            }
        }

        if bands.is_empty() {
            return Err(DataSourceUnavailable::NoLayersEnabled);
        }

        log::debug!("Fusing {} z-scored bands", bands.len());
        let fused = fuse_bands(&bands)?;
        Ok((standardize(&fused), layers))
    }
}

impl Default for RasterProvider {
    fn default() -> Self {
        Self::synthetic(DEFAULT_SEED)
    }
}

fn push_zscored_bands(bands: &mut Vec<Array2<f32>>, stack: &BandStack) {
    for band in stack.axis_iter(Axis(2)) {
        bands.push(zscore_nan(&band.to_owned()));
    }
}

/// Mean and population standard deviation over finite cells
fn finite_stats(values: &Array2<f32>) -> Option<(f64, f64)> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    let var = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    Some((mean, var.sqrt()))
}

/// NaN-safe z-score; non-finite cells stay NaN
pub fn zscore_nan(band: &Array2<f32>) -> Array2<f32> {
    match finite_stats(band) {
        Some((mean, std)) => band.mapv(|v| {
            if v.is_finite() {
                ((v as f64 - mean) / (std + STD_EPSILON)) as f32
            } else {
                f32::NAN
            }
        }),
        None => Array2::from_elem(band.dim(), f32::NAN),
    }
}

/// Per-pixel mean over the finite values of all bands; all-NaN pixels become 0
pub fn fuse_bands(bands: &[Array2<f32>]) -> Result<Array2<f32>, DataSourceUnavailable> {
    let dim = bands
        .first()
        .map(|b| b.dim())
        .ok_or(DataSourceUnavailable::NoLayersEnabled)?;
    if bands.iter().any(|b| b.dim() != dim) {
        return Err(DataSourceUnavailable::InvalidResponse(
            "imagery bands have mismatched shapes".to_string(),
        ));
    }

    let mut sum = Array2::<f64>::zeros(dim);
    let mut count = Array2::<u32>::zeros(dim);
    for band in bands {
        Zip::from(&mut sum)
            .and(&mut count)
            .and(band)
            .for_each(|s, n, &v| {
                if v.is_finite() {
                    *s += v as f64;
                    *n += 1;
                }
            });
    }

    let mut fused = Array2::<f32>::zeros(dim);
    Zip::from(&mut fused)
        .and(&sum)
        .and(&count)
        .for_each(|f, &s, &n| {
            *f = if n > 0 { (s / n as f64) as f32 } else { 0.0 };
        });
    Ok(fused)
}

/// Subtract the mean and divide by (std + epsilon)
pub fn standardize(grid: &Array2<f32>) -> Array2<f32> {
    let (mean, std) = finite_stats(grid).unwrap_or((0.0, 0.0));
    grid.mapv(|v| ((v as f64 - mean) / (std + STD_EPSILON)) as f32)
}

/// Deterministic synthetic raster: unit Gaussian noise plus six anisotropic
/// Gaussian blobs, standardized to zero mean and unit deviation.
pub fn synthetic_raster(size: usize, seed: u64) -> Raster {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut base = Array2::<f32>::random_using((size, size), StandardNormal, &mut rng);
    if size == 0 {
        return base;
    }

    let s = size as f64;
    for blob in 0..SYNTHETIC_BLOBS {
        let cx = rng.gen_range(0..size) as f64;
        let cy = rng.gen_range(0..size) as f64;
        let sx = rng.gen_range(s * 0.05..s * 0.18);
        let sy = rng.gen_range(s * 0.05..s * 0.18);
        let amp = rng.gen_range(-4.0..4.0);
        log::debug!(
            "Blob {}: center ({}, {}), spread ({:.2}, {:.2}), amplitude {:.3}",
            blob, cx, cy, sx, sy, amp
        );

        for ((y, x), v) in base.indexed_iter_mut() {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let g = (-(dx * dx / (2.0 * sx * sx) + dy * dy / (2.0 * sy * sy))).exp();
            *v += (amp * g) as f32;
        }
    }

    standardize(&base)
}
