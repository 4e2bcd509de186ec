//! Pairwise factorial design construction and level mapping

use crate::models::ParameterSpec;

/// Abstract position along a parameter's range, the -1/0/+1 coding of
/// the design matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    Center,
    High,
}

/// One row of the design matrix: a level per selected parameter
pub type DesignPoint = Vec<Level>;

/// Build a pairwise factorial design over `factor_count` parameters.
///
/// The matrix starts with an all-center point, then holds the four
/// low/high combinations for every factor pair (i, j) with i < j and
/// everything else at center, then three all-center replicates. The
/// emission order is fixed: run numbering downstream is positional.
///
/// Fewer than two factors yields an empty design; the caller is
/// responsible for surfacing the validation error.
pub fn build_design(factor_count: usize) -> Vec<DesignPoint> {
    if factor_count < 2 {
        return Vec::new();
    }

    let pair_count = factor_count * (factor_count - 1) / 2;
    let mut points = Vec::with_capacity(4 * pair_count + 4);

    points.push(vec![Level::Center; factor_count]);

    for i in 0..factor_count {
        for j in (i + 1)..factor_count {
            for (a, b) in [
                (Level::Low, Level::Low),
                (Level::Low, Level::High),
                (Level::High, Level::Low),
                (Level::High, Level::High),
            ] {
                let mut point = vec![Level::Center; factor_count];
                point[i] = a;
                point[j] = b;
                points.push(point);
            }
        }
    }

    // Replicate centers for a variance estimate at the midpoint
    for _ in 0..3 {
        points.push(vec![Level::Center; factor_count]);
    }

    points
}

/// Map an abstract level onto a parameter's physical range
pub fn map_level(level: Level, spec: &ParameterSpec) -> f64 {
    match level {
        Level::Low => spec.min,
        Level::Center => (spec.min + spec.max) / 2.0,
        Level::High => spec.max,
    }
}
