//! Minimal-sample robust ellipsoid estimation.
//!
//! Each trial fits an ellipsoid to 9 random points and scores it against the
//! whole cloud with a bounded cost. The cheapest candidate's inliers are then
//! refit with the direct solver.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::cost::{BoundedCost, Cost, CostKind};
use super::distance::distance_to_ellipsoid;
use super::fit::{fit_ellipsoid, MIN_FIT_POINTS};
use super::types::{Ellipsoid, FitError, NoValidFitReason};
use crate::cancel::CancelToken;

/// Trials drawn and scored between two cancellation checks.
const TRIAL_BATCH: usize = 256;

/// Parameters of the robust estimator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of random minimal-sample trials.
    pub num_trials: usize,
    /// Cost cap (world units) for points outside a candidate.
    pub outside_cutoff: f64,
    /// Cost cap (world units) for points inside a candidate.
    pub inside_cutoff: f64,
    /// Per-point cost.
    pub cost: CostKind,
    /// RNG seed used by [`EstimatorConfig::rng`]. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            num_trials: 10_000,
            outside_cutoff: 10.0,
            inside_cutoff: 10.0,
            cost: CostKind::Absolute,
            seed: None,
        }
    }
}

impl EstimatorConfig {
    /// Random source for [`estimate_ellipsoid`], seeded from `seed` if set.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn bounded_cost(&self) -> BoundedCost {
        BoundedCost::new(self.cost, self.inside_cutoff, self.outside_cutoff)
    }
}

/// Output of [`estimate_ellipsoid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateResult {
    /// Ellipsoid refit on the inliers of the best candidate.
    pub ellipsoid: Ellipsoid,
    /// Total cost of the best candidate over all points.
    pub best_cost: f64,
    /// Inliers of the best candidate (the refit input).
    pub num_inliers: usize,
    /// Trials that produced a non-degenerate candidate.
    pub valid_trials: usize,
}

struct Candidate {
    trial: usize,
    ellipsoid: Ellipsoid,
    cost: f64,
}

/// Robustly fit an ellipsoid to `points`.
///
/// All random draws come from `rng`; trials are scored in parallel when the
/// `rayon` feature is enabled without changing the result.
pub fn estimate_ellipsoid<R: Rng + ?Sized>(
    points: &[[f64; 3]],
    config: &EstimatorConfig,
    rng: &mut R,
) -> Result<EstimateResult, FitError> {
    estimate_ellipsoid_with_cancel(points, config, rng, &CancelToken::new())
}

/// [`estimate_ellipsoid`] that stops with [`FitError::Cancelled`] once
/// `cancel` is triggered.
pub fn estimate_ellipsoid_with_cancel<R: Rng + ?Sized>(
    points: &[[f64; 3]],
    config: &EstimatorConfig,
    rng: &mut R,
    cancel: &CancelToken,
) -> Result<EstimateResult, FitError> {
    let n = points.len();
    if n < MIN_FIT_POINTS {
        return Err(FitError::InsufficientPoints {
            needed: MIN_FIT_POINTS,
            got: n,
        });
    }

    tracing::debug!(
        points = n,
        trials = config.num_trials,
        outside_cutoff = config.outside_cutoff,
        inside_cutoff = config.inside_cutoff,
        cost = ?config.cost,
        "robust ellipsoid estimation"
    );

    let cloud: Vec<Vector3<f64>> = points
        .iter()
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .collect();
    let cost = config.bounded_cost();

    let mut scratch: Vec<usize> = (0..n).collect();
    let mut best: Option<Candidate> = None;
    let mut valid_trials = 0usize;
    let mut samples: Vec<[usize; MIN_FIT_POINTS]> = Vec::with_capacity(TRIAL_BATCH);

    let mut start = 0;
    while start < config.num_trials {
        if cancel.is_cancelled() {
            tracing::debug!(completed_trials = start, "robust estimation cancelled");
            return Err(FitError::Cancelled);
        }
        let end = (start + TRIAL_BATCH).min(config.num_trials);

        samples.clear();
        for _ in start..end {
            samples.push(sample_indices(rng, &mut scratch));
        }

        let scored = score_batch(&samples, points, &cloud, &cost);
        for (offset, candidate) in scored.into_iter().enumerate() {
            let Some((ellipsoid, total)) = candidate else {
                tracing::trace!(trial = start + offset, "degenerate trial skipped");
                continue;
            };
            valid_trials += 1;
            let better = best.as_ref().map_or(true, |b| total < b.cost);
            if better {
                best = Some(Candidate {
                    trial: start + offset,
                    ellipsoid,
                    cost: total,
                });
            }
        }
        start = end;
    }

    let Some(best) = best else {
        return Err(FitError::NoValidFit(NoValidFitReason::AllTrialsDegenerate {
            trials: config.num_trials,
        }));
    };
    tracing::debug!(
        trial = best.trial,
        cost = best.cost,
        valid_trials,
        degenerate_trials = config.num_trials - valid_trials,
        "best candidate"
    );

    let inliers: Vec<[f64; 3]> = points
        .iter()
        .zip(&cloud)
        .filter(|(_, p)| cost.is_inlier(&distance_to_ellipsoid(p, &best.ellipsoid)))
        .map(|(&raw, _)| raw)
        .collect();
    if inliers.len() < MIN_FIT_POINTS {
        return Err(FitError::NoValidFit(NoValidFitReason::TooFewInliers {
            needed: MIN_FIT_POINTS,
            found: inliers.len(),
        }));
    }

    let ellipsoid = match fit_ellipsoid(&inliers) {
        Ok(e) => e,
        Err(FitError::Degenerate(reason)) => {
            tracing::warn!(inliers = inliers.len(), %reason, "inlier refit degenerate");
            return Err(FitError::NoValidFit(NoValidFitReason::RefitDegenerate(
                reason,
            )));
        }
        Err(other) => return Err(other),
    };

    tracing::info!(
        inliers = inliers.len(),
        points = n,
        best_cost = best.cost,
        radii = ?[ellipsoid.radii()[0], ellipsoid.radii()[1], ellipsoid.radii()[2]],
        "ellipsoid estimated"
    );

    Ok(EstimateResult {
        ellipsoid,
        best_cost: best.cost,
        num_inliers: inliers.len(),
        valid_trials,
    })
}

/// Fit and score one minimal sample; `None` if it is degenerate.
fn score_trial(
    sample: &[usize; MIN_FIT_POINTS],
    points: &[[f64; 3]],
    cloud: &[Vector3<f64>],
    cost: &BoundedCost,
) -> Option<(Ellipsoid, f64)> {
    let subset = sample.map(|i| points[i]);
    let ellipsoid = fit_ellipsoid(&subset).ok()?;
    let total: f64 = cloud
        .iter()
        .map(|p| cost.point_cost(&distance_to_ellipsoid(p, &ellipsoid)))
        .sum();
    total.is_finite().then_some((ellipsoid, total))
}

#[cfg(feature = "rayon")]
fn score_batch(
    samples: &[[usize; MIN_FIT_POINTS]],
    points: &[[f64; 3]],
    cloud: &[Vector3<f64>],
    cost: &BoundedCost,
) -> Vec<Option<(Ellipsoid, f64)>> {
    samples
        .par_iter()
        .map(|s| score_trial(s, points, cloud, cost))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn score_batch(
    samples: &[[usize; MIN_FIT_POINTS]],
    points: &[[f64; 3]],
    cloud: &[Vector3<f64>],
    cost: &BoundedCost,
) -> Vec<Option<(Ellipsoid, f64)>> {
    samples
        .iter()
        .map(|s| score_trial(s, points, cloud, cost))
        .collect()
}

/// Draw `MIN_FIT_POINTS` distinct indices by a partial Fisher–Yates shuffle
/// of `scratch`, a permutation of `0..n` reused across trials.
fn sample_indices<R: Rng + ?Sized>(rng: &mut R, scratch: &mut [usize]) -> [usize; MIN_FIT_POINTS] {
    let n = scratch.len();
    debug_assert!(n >= MIN_FIT_POINTS);
    let mut out = [0usize; MIN_FIT_POINTS];
    for (i, slot) in out.iter_mut().enumerate() {
        let j = rng.gen_range(i..n);
        scratch.swap(i, j);
        *slot = scratch[i];
    }
    out
}
