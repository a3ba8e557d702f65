//! Bounded point-to-surface costs for scoring candidate ellipsoids.

use super::distance::SurfaceDistance;

/// Per-point cost of a candidate model.
///
/// Implementations must be bounded by the cutoffs so that far outliers
/// cannot dominate the total.
pub trait Cost: Sync {
    /// Cost contribution of one point given its distance to the candidate.
    fn point_cost(&self, d: &SurfaceDistance) -> f64;

    /// Whether the point counts as an inlier of the candidate.
    fn is_inlier(&self, d: &SurfaceDistance) -> bool;
}

/// Cutoff for a point given on which side of the surface it lies.
fn cutoff_for(d: &SurfaceDistance, inside_cutoff: f64, outside_cutoff: f64) -> f64 {
    if d.inside {
        inside_cutoff
    } else {
        outside_cutoff
    }
}

/// `min(d, cutoff)`, the cutoff depending on the side of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteDistanceCost {
    pub inside_cutoff: f64,
    pub outside_cutoff: f64,
}

impl Cost for AbsoluteDistanceCost {
    fn point_cost(&self, d: &SurfaceDistance) -> f64 {
        d.distance
            .min(cutoff_for(d, self.inside_cutoff, self.outside_cutoff))
    }

    fn is_inlier(&self, d: &SurfaceDistance) -> bool {
        d.distance <= cutoff_for(d, self.inside_cutoff, self.outside_cutoff)
    }
}

/// `min(d², cutoff²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquaredDistanceCost {
    pub inside_cutoff: f64,
    pub outside_cutoff: f64,
}

impl Cost for SquaredDistanceCost {
    fn point_cost(&self, d: &SurfaceDistance) -> f64 {
        let c = cutoff_for(d, self.inside_cutoff, self.outside_cutoff);
        (d.distance * d.distance).min(c * c)
    }

    fn is_inlier(&self, d: &SurfaceDistance) -> bool {
        d.distance <= cutoff_for(d, self.inside_cutoff, self.outside_cutoff)
    }
}

/// Cost selector used in serialized estimator configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    #[default]
    Absolute,
    Squared,
}

/// Either bounded cost, chosen at runtime from a [`CostKind`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundedCost {
    Absolute(AbsoluteDistanceCost),
    Squared(SquaredDistanceCost),
}

impl BoundedCost {
    pub fn new(kind: CostKind, inside_cutoff: f64, outside_cutoff: f64) -> Self {
        match kind {
            CostKind::Absolute => Self::Absolute(AbsoluteDistanceCost {
                inside_cutoff,
                outside_cutoff,
            }),
            CostKind::Squared => Self::Squared(SquaredDistanceCost {
                inside_cutoff,
                outside_cutoff,
            }),
        }
    }
}

impl Cost for BoundedCost {
    fn point_cost(&self, d: &SurfaceDistance) -> f64 {
        match self {
            Self::Absolute(c) => c.point_cost(d),
            Self::Squared(c) => c.point_cost(d),
        }
    }

    fn is_inlier(&self, d: &SurfaceDistance) -> bool {
        match self {
            Self::Absolute(c) => c.is_inlier(d),
            Self::Squared(c) => c.is_inlier(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sd(distance: f64, inside: bool) -> SurfaceDistance {
        SurfaceDistance {
            closest_point: Vector3::zeros(),
            distance,
            inside,
        }
    }

    #[test]
    fn absolute_cost_is_capped_per_side() {
        let c = AbsoluteDistanceCost {
            inside_cutoff: 2.0,
            outside_cutoff: 5.0,
        };
        assert_relative_eq!(c.point_cost(&sd(1.5, true)), 1.5);
        assert_relative_eq!(c.point_cost(&sd(3.0, true)), 2.0);
        assert_relative_eq!(c.point_cost(&sd(3.0, false)), 3.0);
        assert_relative_eq!(c.point_cost(&sd(1e6, false)), 5.0);
    }

    #[test]
    fn squared_cost_caps_at_cutoff_squared() {
        let c = BoundedCost::new(CostKind::Squared, 2.0, 5.0);
        assert_relative_eq!(c.point_cost(&sd(1.5, true)), 2.25);
        assert_relative_eq!(c.point_cost(&sd(3.0, true)), 4.0);
        assert_relative_eq!(c.point_cost(&sd(100.0, false)), 25.0);
    }

    #[test]
    fn inlier_boundary_is_inclusive() {
        let c = BoundedCost::new(CostKind::Absolute, 2.0, 5.0);
        assert!(c.is_inlier(&sd(2.0, true)));
        assert!(!c.is_inlier(&sd(2.0001, true)));
        assert!(c.is_inlier(&sd(5.0, false)));
        assert!(!c.is_inlier(&sd(5.5, false)));
    }

    #[test]
    fn cost_kind_serializes_snake_case() {
        let json = serde_json::to_string(&CostKind::Squared).unwrap();
        assert_eq!(json, "\"squared\"");
        let back: CostKind = serde_json::from_str("\"absolute\"").unwrap();
        assert_eq!(back, CostKind::Absolute);
    }
}
