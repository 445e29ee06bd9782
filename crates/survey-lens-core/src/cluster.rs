//! Density-based clustering over cosine distance.
//!
//! Two points are neighbors when their cosine distance is at most `eps`. A
//! point with at least `min_samples` neighbors (itself included) is a core
//! point. Clusters grow by connecting core points transitively through their
//! neighborhoods; non-core points inside a core point's neighborhood join the
//! first cluster that reaches them. Everything else is [`NOISE`].
//!
//! Clusters are discovered by scanning points in input order, so ids are
//! deterministic for a fixed input order. Neighborhoods are computed in
//! parallel but collected by index, which keeps results independent of the
//! thread count. A cluster that ends up with a single member (only possible
//! with `min_samples = 1`) is reported as noise.

use std::collections::VecDeque;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Cluster id for points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Default neighborhood radius (cosine distance).
pub const DEFAULT_EPS: f64 = 0.35;

/// Default minimum neighborhood size for a core point.
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Maximum cosine distance between neighbors, in `(0, 2]`.
    pub eps: f64,
    /// Neighbors (including the point itself) required for a core point.
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl ClusterParams {
    /// Check ranges before running.
    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.eps > 0.0 && self.eps <= 2.0) {
            return Err(AnalysisError::InvalidParameter {
                name: "eps",
                reason: format!("{} is outside (0, 2]", self.eps),
            });
        }
        if self.min_samples == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "min_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Euclidean norm.
pub fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// Cosine distance in `[0, 2]`.
///
/// Two zero vectors are at distance 0; a zero vector and a non-zero vector
/// are at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (na, nb) = (norm(a), norm(b));
    match (na == 0.0, nb == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => {
            let dot: f64 = a
                .iter()
                .zip(b)
                .map(|(x, y)| f64::from(*x) * f64::from(*y))
                .sum();
            (1.0 - dot / (na * nb)).clamp(0.0, 2.0)
        }
    }
}

/// Indices within `eps` of each point, in ascending order, self included.
fn neighborhoods(points: &[Vec<f32>], eps: f64) -> Vec<Vec<usize>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            (0..points.len())
                .filter(|&j| i == j || cosine_distance(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect()
}

/// Assign a cluster id to every point.
///
/// The output has exactly one id per input point. Ids are `0..k` in discovery
/// order, with [`NOISE`] for unclustered points.
#[tracing::instrument(skip(points), fields(n = points.len()))]
pub fn dbscan(points: &[Vec<f32>], params: ClusterParams) -> AnalysisResult<Vec<i32>> {
    params.validate()?;
    crate::embedding::check_dimensions(points)?;

    let n = points.len();
    let mut labels: Vec<Option<i32>> = vec![None; n];
    if n < params.min_samples {
        tracing::debug!(n, min_samples = params.min_samples, "too few points; all noise");
        return Ok(vec![NOISE; n]);
    }

    let hoods = neighborhoods(points, params.eps);
    let is_core: Vec<bool> = hoods.iter().map(|h| h.len() >= params.min_samples).collect();

    let mut next_id = 0i32;
    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }
        let id = next_id;
        next_id += 1;
        labels[start] = Some(id);

        let mut queue: VecDeque<usize> = VecDeque::from([start]);
        while let Some(p) = queue.pop_front() {
            for &q in &hoods[p] {
                if labels[q].is_some() {
                    continue;
                }
                labels[q] = Some(id);
                if is_core[q] {
                    queue.push_back(q);
                }
            }
        }
    }

    let labels: Vec<i32> = labels.into_iter().map(|l| l.unwrap_or(NOISE)).collect();
    let labels = drop_singletons(labels);

    let clusters = labels.iter().filter(|&&l| l != NOISE).max().map_or(0, |m| m + 1);
    let noise = labels.iter().filter(|&&l| l == NOISE).count();
    tracing::info!(clusters, noise, eps = params.eps, min_samples = params.min_samples, "clustering complete");
    Ok(labels)
}

/// Relabel one-member clusters as noise and renumber the rest densely,
/// keeping discovery order.
fn drop_singletons(labels: Vec<i32>) -> Vec<i32> {
    let max = labels.iter().copied().max().unwrap_or(NOISE);
    if max < 0 {
        return labels;
    }
    let mut sizes = vec![0usize; (max + 1) as usize];
    for &l in &labels {
        if l >= 0 {
            sizes[l as usize] += 1;
        }
    }
    let mut remap = vec![NOISE; sizes.len()];
    let mut next = 0;
    for (old, &size) in sizes.iter().enumerate() {
        if size > 1 {
            remap[old] = next;
            next += 1;
        }
    }
    labels
        .into_iter()
        .map(|l| if l >= 0 { remap[l as usize] } else { NOISE })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(eps: f64, min_samples: usize) -> ClusterParams {
        ClusterParams { eps, min_samples }
    }

    #[test]
    fn single_point_is_noise_for_any_parameters() {
        for min_samples in [1, 2, 5] {
            let labels = dbscan(&[vec![1.0, 0.0]], params(0.35, min_samples)).unwrap();
            assert_eq!(labels, vec![NOISE]);
        }
    }

    #[test]
    fn near_identical_points_form_one_cluster() {
        let points: Vec<Vec<f32>> = (0..10)
            .map(|i| vec![1.0, 0.001 * i as f32, 0.5])
            .collect();
        let labels = dbscan(&points, params(0.35, 3)).unwrap();
        assert_eq!(labels.len(), 10);
        assert!(labels.iter().all(|&l| l == labels[0]));
        assert!(labels[0] >= 0);
    }

    #[test]
    fn identical_points_plus_outlier() {
        let points = vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]];
        let labels = dbscan(&points, params(0.35, 2)).unwrap();
        assert_eq!(labels, vec![0, 0, NOISE]);
    }

    #[test]
    fn fewer_points_than_min_samples_are_noise() {
        let points = vec![vec![1.0, 0.0]; 3];
        assert_eq!(dbscan(&points, params(0.35, 4)).unwrap(), vec![NOISE; 3]);
    }

    #[test]
    fn identical_vectors_share_one_cluster() {
        let points = vec![vec![0.3, 0.3, 0.3]; 7];
        let labels = dbscan(&points, params(0.1, 3)).unwrap();
        assert_eq!(labels, vec![0; 7]);
    }

    #[test]
    fn all_zero_vectors_share_one_cluster() {
        let points = vec![vec![0.0; 4]; 4];
        assert_eq!(dbscan(&points, params(0.35, 2)).unwrap(), vec![0; 4]);
    }

    #[test]
    fn ids_follow_discovery_order() {
        let points = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.01],
        ];
        let labels = dbscan(&points, params(0.2, 2)).unwrap();
        assert_eq!(labels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn core_points_chain_transitively() {
        // b is within eps of a and c; a and c are far apart.
        let a = vec![1.0, 0.0];
        let b = vec![0.8, 0.6];
        let c = vec![0.28, 0.96];
        let points = vec![a.clone(), a, b.clone(), b, c.clone(), c];
        let labels = dbscan(&points, params(0.25, 2)).unwrap();
        assert_eq!(labels, vec![0; 6]);
    }

    #[test]
    fn singleton_clusters_become_noise_with_min_samples_one() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]];
        let labels = dbscan(&points, params(0.1, 1)).unwrap();
        assert_eq!(labels, vec![NOISE, 0, 0]);
    }

    #[test]
    fn rejects_bad_parameters() {
        let points = vec![vec![1.0]];
        assert!(dbscan(&points, params(0.0, 2)).is_err());
        assert!(dbscan(&points, params(2.5, 2)).is_err());
        assert!(dbscan(&points, params(0.3, 0)).is_err());
    }

    #[test]
    fn rejects_ragged_input() {
        let points = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(matches!(
            dbscan(&points, params(0.3, 2)),
            Err(AnalysisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn cosine_distance_edge_cases() {
        assert!(cosine_distance(&[0.0, 0.0], &[0.0, 0.0]).abs() < 1e-12);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-12);
        assert!(cosine_distance(&[2.0, 2.0], &[1.0, 1.0]).abs() < 1e-9);
    }
}
