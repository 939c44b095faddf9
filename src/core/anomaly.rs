use crate::types::{
    round_to, AnomalyPoint, GeoError, GeoResult, Heatmap, Polarity, Raster, ScanSettings,
};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Below this range the heatmap is treated as flat
const RANGE_EPSILON: f32 = 1e-6;

/// Value written over suppressed cells; below any valid score
const SUPPRESSED: f32 = -1.0;

/// Anomaly detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Fine Gaussian scale in pixels
    pub fine_sigma: f64,
    /// Coarse Gaussian scale in pixels
    pub coarse_sigma: f64,
    /// Kernel radius in units of sigma
    pub truncate: f64,
    /// Maximum number of peaks
    pub top_k: usize,
    /// Half-width of the square suppression window
    pub min_dist_px: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            fine_sigma: 1.2,
            coarse_sigma: 6.0,
            truncate: 4.0,
            top_k: 35,
            min_dist_px: 10,
        }
    }
}

/// Difference-of-Gaussians anomaly detector
pub struct AnomalyDetector {
    params: DetectorParams,
}

impl AnomalyDetector {
    /// Create a detector with default parameters
    pub fn new() -> Self {
        Self {
            params: DetectorParams::default(),
        }
    }

    /// Create a detector with custom parameters
    pub fn with_params(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Contrast weight from the enabled sensing layers
    pub fn layer_weight(settings: &ScanSettings) -> f32 {
        let mut w = 1.0f32;
        if settings.radar {
            w += 0.6;
        }
        if settings.optic {
            w += 0.4;
        }
        if settings.thermal {
            w += 0.8;
        }
        if settings.magnetic {
            w += 0.5;
        }
        w
    }

    /// Compute the normalized [0, 1] anomaly heatmap of a raster
    pub fn compute_heatmap(&self, raster: &Raster, settings: &ScanSettings) -> GeoResult<Heatmap> {
        let (height, width) = raster.dim();
        if height == 0 || width == 0 {
            return Err(GeoError::Processing(
                "Cannot compute heatmap of an empty raster".to_string(),
            ));
        }

        let w = Self::layer_weight(settings);
        log::info!("Computing DoG heatmap on {}x{} raster (weight {:.2})", height, width, w);
        log::debug!("Detector parameters: {:?}", self.params);

        let fine = gaussian_blur(raster, self.params.fine_sigma, self.params.truncate);
        let coarse = gaussian_blur(raster, self.params.coarse_sigma, self.params.truncate);
        let dog = (fine - coarse) * w;

        Ok(normalize_min_max(dog))
    }

    /// Greedy peak picking with square-window suppression.
    ///
    /// Each round takes the first row-major maximum of the working copy, stops
    /// once that maximum is <= 0, and overwrites rows `r-d..r+d` and columns
    /// `c-d..c+d` (end exclusive, clipped to the grid) with a sentinel.
    pub fn extract_points(&self, heatmap: &Heatmap) -> Vec<AnomalyPoint> {
        extract_points(heatmap, self.params.top_k, self.params.min_dist_px)
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// See [`AnomalyDetector::extract_points`]
pub fn extract_points(heatmap: &Heatmap, top_k: usize, min_dist_px: usize) -> Vec<AnomalyPoint> {
    let (height, width) = heatmap.dim();
    let mut working = heatmap.clone();
    let mut points = Vec::with_capacity(top_k);

    for _ in 0..top_k {
        let Some((r, c, peak)) = argmax(&working) else {
            break;
        };
        if peak <= 0.0 {
            break;
        }

        let score = heatmap[[r, c]] as f64;
        let polarity = Polarity::from_score(score);
        let z_rel = (score - 0.5) * 4.0;
        points.push(AnomalyPoint {
            row: r,
            col: c,
            score: round_to(score, 5),
            polarity,
            z_rel: round_to(z_rel, 3),
        });

        let r0 = r.saturating_sub(min_dist_px);
        let r1 = (r + min_dist_px).min(height);
        let c0 = c.saturating_sub(min_dist_px);
        let c1 = (c + min_dist_px).min(width);
        for i in r0..r1 {
            for j in c0..c1 {
                working[[i, j]] = SUPPRESSED;
            }
        }
    }

    log::debug!(
        "Extracted {} anomaly points (top_k {}, min_dist {} px)",
        points.len(),
        top_k,
        min_dist_px
    );
    points
}

/// First maximum in row-major order
fn argmax(grid: &Array2<f32>) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for ((i, j), &v) in grid.indexed_iter() {
        match best {
            Some((_, _, b)) if v <= b || v.is_nan() => {}
            Some(_) => best = Some((i, j, v)),
            None if !v.is_nan() => best = Some((i, j, v)),
            None => {}
        }
    }
    best
}

/// Min-max normalize to [0, 1]; a flat grid maps to all zeros
fn normalize_min_max(mut grid: Array2<f32>) -> Array2<f32> {
    let min = grid.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = grid.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range <= RANGE_EPSILON {
        log::warn!("Degenerate heatmap range ({} .. {}), returning flat heatmap", min, max);
        grid.fill(0.0);
        return grid;
    }

    grid.mapv_inplace(|v| (v - min) / range);
    grid
}

/// 1-D Gaussian kernel normalized to unit sum
fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5) as usize;
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let x = k as f64 - radius as f64;
            (-0.5 * x * x / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Half-sample symmetric index: d c b a | a b c d | d c b a
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

/// Separable Gaussian blur with reflect boundary handling
pub fn gaussian_blur(image: &Array2<f32>, sigma: f64, truncate: f64) -> Array2<f32> {
    if sigma <= 0.0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma, truncate);
    let rows_done = convolve_axis(image, &kernel, Axis(0));
    convolve_axis(&rows_done, &kernel, Axis(1))
}

fn convolve_axis(image: &Array2<f32>, kernel: &[f64], axis: Axis) -> Array2<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut output = Array2::<f32>::zeros(image.dim());

    for (src, mut dst) in image.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let n = src.len();
        for i in 0..n {
            let mut acc = 0.0f64;
            for (k, &w) in kernel.iter().enumerate() {
                let idx = reflect_index(i as isize + k as isize - radius, n);
                acc += w * src[idx] as f64;
            }
            dst[i] = acc as f32;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_layer_weight() {
        let settings = ScanSettings { radar: true, optic: true, thermal: false, magnetic: false };
        assert_abs_diff_eq!(AnomalyDetector::layer_weight(&settings), 2.0, epsilon = 1e-6);

        let all = ScanSettings { radar: true, optic: true, thermal: true, magnetic: true };
        assert_abs_diff_eq!(AnomalyDetector::layer_weight(&all), 3.3, epsilon = 1e-6);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        // Radius larger than the lane
        assert_eq!(reflect_index(9, 4), 1);
        assert_eq!(reflect_index(-9, 4), 0);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        let kernel = gaussian_kernel(6.0, 4.0);
        assert_eq!(kernel.len(), 2 * 24 + 1);
        assert_abs_diff_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let image = Array2::<f32>::from_elem((8, 5), 3.0);
        let blurred = gaussian_blur(&image, 6.0, 4.0);
        for &v in blurred.iter() {
            assert_abs_diff_eq!(v, 3.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_heatmap_range() {
        let mut raster = Array2::<f32>::zeros((32, 32));
        raster[[10, 12]] = 5.0;
        raster[[25, 5]] = -3.0;
        let heatmap = AnomalyDetector::new()
            .compute_heatmap(&raster, &ScanSettings::default())
            .unwrap();
        let min = heatmap.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = heatmap.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
        assert_eq!(argmax(&heatmap).map(|(r, c, _)| (r, c)), Some((10, 12)));
    }

    #[test]
    fn test_flat_raster_gives_zero_heatmap_and_no_points() {
        let raster = Array2::<f32>::zeros((256, 256));
        let detector = AnomalyDetector::new();
        let heatmap = detector.compute_heatmap(&raster, &ScanSettings::default()).unwrap();
        assert!(heatmap.iter().all(|&v| v == 0.0));
        assert!(detector.extract_points(&heatmap).is_empty());
    }

    #[test]
    fn test_extract_points_order_and_suppression() {
        let mut heatmap = Array2::<f32>::zeros((40, 40));
        heatmap[[5, 5]] = 0.9;
        heatmap[[5, 8]] = 0.95; // suppresses its neighbour at (5, 5)
        heatmap[[30, 30]] = 0.4;

        let points = extract_points(&heatmap, 10, 10);
        assert_eq!(points.len(), 2);
        assert_eq!((points[0].row, points[0].col), (5, 8));
        assert_eq!(points[0].polarity, Polarity::Pos);
        assert_eq!((points[1].row, points[1].col), (30, 30));
        assert_eq!(points[1].polarity, Polarity::Neg);
        assert_abs_diff_eq!(points[1].z_rel, -0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_extract_points_ties_resolve_row_major() {
        let mut heatmap = Array2::<f32>::zeros((30, 30));
        heatmap[[20, 3]] = 0.7;
        heatmap[[4, 25]] = 0.7;
        let points = extract_points(&heatmap, 1, 5);
        assert_eq!((points[0].row, points[0].col), (4, 25));
    }

    #[test]
    fn test_score_rounding_and_z_rel() {
        let mut heatmap = Array2::<f32>::zeros((5, 5));
        heatmap[[2, 2]] = 0.8;
        let points = extract_points(&heatmap, 35, 10);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].score, 0.8);
        assert_eq!(points[0].z_rel, 1.2);
    }
}
