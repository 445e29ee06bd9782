//! Two-dimensional layout of the embedding space for plotting.
//!
//! A neighborhood-graph layout in the UMAP family:
//!
//! 1. Build the k-nearest-neighbor graph under cosine distance.
//! 2. Turn distances into fuzzy membership weights, calibrated per point so
//!    every neighborhood carries `log2(k)` total weight, and symmetrize with
//!    the probabilistic union `a + b - ab`.
//! 3. Fit the low-dimensional similarity curve `1 / (1 + a d^2b)` to
//!    `min_dist`.
//! 4. Start from random positions and optimize with stochastic gradient
//!    descent: edges pull their endpoints together in proportion to weight,
//!    random negative samples push apart.
//!
//! All randomness comes from a single generator. With a fixed seed the
//! layout is reproducible; without one it differs between runs. Coordinates
//! carry no meaning beyond relative proximity.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cluster::cosine_distance;
use crate::embedding::check_dimensions;
use crate::error::{AnalysisError, AnalysisResult};

/// Default neighborhood size.
pub const DEFAULT_N_NEIGHBORS: usize = 15;

/// Default minimum spacing of points in the layout.
pub const DEFAULT_MIN_DIST: f64 = 0.1;

/// Default number of optimization epochs.
pub const DEFAULT_N_EPOCHS: usize = 200;

/// Default seed; pinned so reports are reproducible out of the box.
pub const DEFAULT_SEED: u64 = 42;

const NEGATIVE_SAMPLES: usize = 5;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;
const SIGMA_ITERATIONS: usize = 64;
const SIGMA_TOLERANCE: f64 = 1e-5;
const MIN_SIGMA: f64 = 1e-3;

/// Projection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    /// Neighbors considered per point; capped at `N - 1`.
    pub n_neighbors: usize,
    /// Minimum distance between points in the layout.
    pub min_dist: f64,
    /// Optimization epochs.
    pub n_epochs: usize,
    /// Random seed; `None` draws one from the operating system.
    pub seed: Option<u64>,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
            min_dist: DEFAULT_MIN_DIST,
            n_epochs: DEFAULT_N_EPOCHS,
            seed: Some(DEFAULT_SEED),
        }
    }
}

impl ProjectionParams {
    /// Check ranges before running.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.n_neighbors < 2 {
            return Err(AnalysisError::InvalidParameter {
                name: "n_neighbors",
                reason: "must be at least 2".to_string(),
            });
        }
        if !self.min_dist.is_finite() || self.min_dist < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "min_dist",
                reason: format!("{} is not a non-negative number", self.min_dist),
            });
        }
        Ok(())
    }
}

/// A position in the 2-D layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Lay out `points` in two dimensions. Returns one [`Point`] per input, in order.
#[tracing::instrument(skip(points), fields(n = points.len()))]
pub fn project(points: &[Vec<f32>], params: ProjectionParams) -> AnalysisResult<Vec<Point>> {
    params.validate()?;
    check_dimensions(points)?;

    let n = points.len();
    if n <= 1 {
        return Ok(vec![Point::default(); n]);
    }

    let k = params.n_neighbors.min(n - 1);
    let knn = nearest_neighbors(points, k);
    let edges = fuzzy_graph(&knn, k);
    let (a, b) = fit_curve(params.min_dist);
    tracing::debug!(k, edges = edges.len(), a, b, "neighbor graph built");

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut layout: Vec<[f64; 2]> = (0..n)
        .map(|_| {
            [
                rng.random_range(-INIT_RANGE..INIT_RANGE),
                rng.random_range(-INIT_RANGE..INIT_RANGE),
            ]
        })
        .collect();

    optimize(&mut layout, &edges, a, b, params.n_epochs, &mut rng);

    tracing::info!(n, epochs = params.n_epochs, seeded = params.seed.is_some(), "projection complete");
    Ok(layout.into_iter().map(|[x, y]| Point { x, y }).collect())
}

/// For each point, its `k` nearest other points as `(index, distance)`,
/// nearest first. Ties go to the lower index.
fn nearest_neighbors(points: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut dists: Vec<(usize, f64)> = (0..points.len())
                .filter(|&j| j != i)
                .map(|j| (j, cosine_distance(&points[i], &points[j])))
                .collect();
            dists.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

/// Symmetric weighted edge list `(i, j, w)` with `i < j`, sorted by endpoints.
fn fuzzy_graph(knn: &[Vec<(usize, f64)>], k: usize) -> Vec<(usize, usize, f64)> {
    let target = (k as f64).log2();
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, neighbors) in knn.iter().enumerate() {
        let rho = neighbors
            .iter()
            .map(|&(_, d)| d)
            .find(|&d| d > 0.0)
            .unwrap_or(0.0);
        let sigma = calibrate_sigma(neighbors, rho, target);
        for &(j, d) in neighbors {
            let w = (-(d - rho).max(0.0) / sigma).exp();
            directed.insert((i, j), w);
        }
    }

    let mut undirected: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if undirected.contains_key(&key) {
            continue;
        }
        let back = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w + back - w * back;
        if union > 0.0 {
            undirected.insert(key, union);
        }
    }
    undirected.into_iter().map(|((i, j), w)| (i, j, w)).collect()
}

/// Binary-search the bandwidth so the neighborhood's weights sum to `target`.
fn calibrate_sigma(neighbors: &[(usize, f64)], rho: f64, target: f64) -> f64 {
    let mass = |sigma: f64| -> f64 {
        neighbors
            .iter()
            .map(|&(_, d)| (-(d - rho).max(0.0) / sigma).exp())
            .sum()
    };

    let (mut lo, mut hi, mut mid) = (0.0_f64, f64::INFINITY, 1.0_f64);
    for _ in 0..SIGMA_ITERATIONS {
        let m = mass(mid);
        if (m - target).abs() < SIGMA_TOLERANCE {
            break;
        }
        if m > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_finite() { (lo + hi) / 2.0 } else { mid * 2.0 };
        }
    }
    mid.max(MIN_SIGMA)
}

/// Fit `1 / (1 + a x^2b)` to the target similarity for `min_dist` (spread 1).
///
/// Grid over `b`, golden-section over `ln a`; deterministic for a given
/// `min_dist`.
pub fn fit_curve(min_dist: f64) -> (f64, f64) {
    const SAMPLES: usize = 300;
    const SPREAD: f64 = 1.0;
    let xs: Vec<f64> = (1..=SAMPLES)
        .map(|i| 3.0 * SPREAD * i as f64 / SAMPLES as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / SPREAD).exp()
            }
        })
        .collect();

    let loss = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let fit = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (fit - y) * (fit - y)
            })
            .sum()
    };

    let best_a_for = |b: f64| -> (f64, f64) {
        let phi = (5.0_f64.sqrt() - 1.0) / 2.0;
        let (mut lo, mut hi) = (0.01_f64.ln(), 100.0_f64.ln());
        for _ in 0..60 {
            let l = hi - phi * (hi - lo);
            let r = lo + phi * (hi - lo);
            if loss(l.exp(), b) < loss(r.exp(), b) {
                hi = r;
            } else {
                lo = l;
            }
        }
        let a = ((lo + hi) / 2.0).exp();
        (a, loss(a, b))
    };

    let mut best = (1.0, 1.0, f64::INFINITY);
    for step in 0..=170 {
        let b = 0.3 + step as f64 * 0.01;
        let (a, l) = best_a_for(b);
        if l < best.2 {
            best = (a, b, l);
        }
    }
    (best.0, best.1)
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Stochastic gradient descent over the edge list.
///
/// Each edge is sampled with frequency proportional to its weight; the
/// learning rate decays linearly to zero.
fn optimize(
    layout: &mut [[f64; 2]],
    edges: &[(usize, usize, f64)],
    a: f64,
    b: f64,
    n_epochs: usize,
    rng: &mut StdRng,
) {
    let n = layout.len();
    let max_w = edges.iter().map(|e| e.2).fold(0.0_f64, f64::max);
    if max_w <= 0.0 || n_epochs == 0 {
        return;
    }
    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_w / e.2).collect();
    let mut next_sample = epochs_per_sample.clone();

    for epoch in 0..n_epochs {
        let alpha = 1.0 - epoch as f64 / n_epochs as f64;
        let now = epoch as f64 + 1.0;

        for (e, &(i, j, _)) in edges.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }
            next_sample[e] += epochs_per_sample[e];

            // Attraction, applied symmetrically.
            let diff = [layout[i][0] - layout[j][0], layout[i][1] - layout[j][1]];
            let d2 = diff[0] * diff[0] + diff[1] * diff[1];
            if d2 > 0.0 {
                let coeff = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
                for (axis, delta) in diff.iter().enumerate() {
                    let g = clip(coeff * delta) * alpha;
                    layout[i][axis] += g;
                    layout[j][axis] -= g;
                }
            }

            // Repulsion from random points, applied to `i` only.
            for _ in 0..NEGATIVE_SAMPLES {
                let other = rng.random_range(0..n);
                if other == i {
                    continue;
                }
                let diff = [
                    layout[i][0] - layout[other][0],
                    layout[i][1] - layout[other][1],
                ];
                let d2 = diff[0] * diff[0] + diff[1] * diff[1];
                let coeff = 2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
                for (axis, delta) in diff.iter().enumerate() {
                    let g = if d2 > 0.0 { clip(coeff * delta) } else { GRADIENT_CLIP };
                    layout[i][axis] += g * alpha;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f32>> {
        let mut points = Vec::new();
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            points.push(vec![1.0, jitter, 0.0, 0.0]);
            points.push(vec![0.0, 0.0, 1.0, jitter]);
        }
        points
    }

    fn params(seed: Option<u64>) -> ProjectionParams {
        ProjectionParams {
            n_neighbors: 5,
            seed,
            ..ProjectionParams::default()
        }
    }

    fn dist(p: Point, q: Point) -> f64 {
        ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt()
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(project(&[], params(Some(1))).unwrap().is_empty());
        assert_eq!(
            project(&[vec![0.2, 0.4]], params(None)).unwrap(),
            vec![Point::default()]
        );
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let points = two_groups();
        let first = project(&points, params(Some(7))).unwrap();
        let second = project(&points, params(Some(7))).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), points.len());
    }

    #[test]
    fn different_seeds_give_different_layouts() {
        let points = two_groups();
        let a = project(&points, params(Some(1))).unwrap();
        let b = project(&points, params(Some(2))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unseeded_layout_is_complete_and_finite() {
        let points = two_groups();
        let layout = project(&points, params(None)).unwrap();
        assert_eq!(layout.len(), points.len());
        assert!(layout.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn separated_groups_stay_separated() {
        let points = two_groups();
        let layout = project(&points, params(Some(42))).unwrap();

        let (mut intra, mut inter) = (Vec::new(), Vec::new());
        for i in 0..layout.len() {
            for j in (i + 1)..layout.len() {
                let d = dist(layout[i], layout[j]);
                if i % 2 == j % 2 {
                    intra.push(d);
                } else {
                    inter.push(d);
                }
            }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(mean(&intra) < mean(&inter), "{} vs {}", mean(&intra), mean(&inter));
    }

    #[test]
    fn two_points_and_small_neighborhoods() {
        let layout = project(&[vec![1.0, 0.0], vec![0.0, 1.0]], params(Some(3))).unwrap();
        assert_eq!(layout.len(), 2);
        assert!(layout.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn identical_points_do_not_blow_up() {
        let layout = project(&vec![vec![0.5, 0.5]; 6], params(Some(3))).unwrap();
        assert!(layout.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn curve_fit_matches_known_values() {
        let (a, b) = fit_curve(0.1);
        assert!((1.3..1.9).contains(&a), "a = {a}");
        assert!((0.8..1.0).contains(&b), "b = {b}");
    }

    #[test]
    fn fuzzy_graph_is_symmetric_and_bounded() {
        let points = two_groups();
        let knn = nearest_neighbors(&points, 5);
        let edges = fuzzy_graph(&knn, 5);
        assert!(!edges.is_empty());
        for &(i, j, w) in &edges {
            assert!(i < j);
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        let points = two_groups();
        let mut p = params(Some(1));
        p.n_neighbors = 1;
        assert!(project(&points, p).is_err());
        let mut p = params(Some(1));
        p.min_dist = -0.5;
        assert!(project(&points, p).is_err());
    }
}
