//! Covariance confidence ellipses for groups of embedded samples.

use super::Embedding;
use crate::data::Grouping;
use nalgebra::{Matrix2, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Default number of standard deviations covered by an ellipse.
pub const DEFAULT_N_STD: f64 = 2.0;
/// Default number of boundary points.
pub const DEFAULT_N_POINTS: usize = 100;

/// An ellipse described by its centre, axes and rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: (f64, f64),
    /// Full length of the major axis.
    pub width: f64,
    /// Full length of the minor axis.
    pub height: f64,
    /// Counter-clockwise angle of the major axis, in degrees.
    pub angle: f64,
    /// Closed boundary polyline (first and last points coincide).
    pub boundary: Vec<(f64, f64)>,
}

/// Ellipse for one group of an embedding; `None` when the group has fewer than 3 points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEllipse {
    pub group: String,
    pub n_points: usize,
    pub ellipse: Option<Ellipse>,
}

/// Confidence ellipse of a point cloud.
///
/// Uses the sample covariance (n - 1 denominator); axis lengths are
/// `2 * n_std * sqrt(eigenvalue)`. Returns `None` for fewer than 3 points or a
/// non-finite covariance.
pub fn confidence_ellipse(points: &[(f64, f64)], n_std: f64, n_points: usize) -> Option<Ellipse> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / nf;
    let my = points.iter().map(|p| p.1).sum::<f64>() / nf;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let cov = Matrix2::new(sxx, sxy, sxy, syy) / (nf - 1.0);
    if cov.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let eigen = SymmetricEigen::new(cov);
    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let major_vec = eigen.eigenvectors.column(major);
    let angle = major_vec[1].atan2(major_vec[0]).to_degrees();
    let width = 2.0 * n_std * eigen.eigenvalues[major].max(0.0).sqrt();
    let height = 2.0 * n_std * eigen.eigenvalues[minor].max(0.0).sqrt();

    let (sin, cos) = angle.to_radians().sin_cos();
    let boundary = (0..n_points)
        .map(|k| {
            let t = if n_points > 1 {
                2.0 * std::f64::consts::PI * k as f64 / (n_points - 1) as f64
            } else {
                0.0
            };
            let (ex, ey) = (width / 2.0 * t.cos(), height / 2.0 * t.sin());
            (cos * ex - sin * ey + mx, sin * ex + cos * ey + my)
        })
        .collect();

    Some(Ellipse {
        center: (mx, my),
        width,
        height,
        angle,
        boundary,
    })
}

/// One ellipse per group level, using default coverage and resolution.
///
/// Samples missing from the embedding or without a label are skipped.
pub fn group_ellipses(embedding: &Embedding, grouping: &Grouping) -> Vec<GroupEllipse> {
    grouping
        .groups()
        .into_iter()
        .map(|(group, members)| {
            let points: Vec<(f64, f64)> = members.iter().filter_map(|sid| embedding.point(sid)).collect();
            GroupEllipse {
                group,
                n_points: points.len(),
                ellipse: confidence_ellipse(&points, DEFAULT_N_STD, DEFAULT_N_POINTS),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordination::OrdinationMethod;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_aligned_ellipse() {
        // variance 4 along x, 1 along y, no covariance
        let points = [(2.0, 0.0), (-2.0, 0.0), (0.0, 1.0), (0.0, -1.0)];
        let e = confidence_ellipse(&points, 2.0, 100).unwrap();

        assert_relative_eq!(e.center.0, 0.0);
        assert_relative_eq!(e.center.1, 0.0);
        // var_x = 8/3, var_y = 2/3
        assert_relative_eq!(e.width, 4.0 * (8.0_f64 / 3.0).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(e.height, 4.0 * (2.0_f64 / 3.0).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(e.angle.to_radians().sin().abs(), 0.0, epsilon = 1e-10);
        assert_eq!(e.boundary.len(), 100);
        assert_relative_eq!(e.boundary[0].0, e.boundary[99].0, epsilon = 1e-10);
    }

    #[test]
    fn test_diagonal_ellipse_angle() {
        let points = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.1), (3.0, 2.9)];
        let e = confidence_ellipse(&points, 2.0, 50).unwrap();
        // major axis near 45 or -135 degrees
        let folded = e.angle.rem_euclid(180.0);
        assert!((folded - 45.0).abs() < 3.0, "angle {}", e.angle);
        assert!(e.width > e.height);
    }

    #[test]
    fn test_too_few_points() {
        assert!(confidence_ellipse(&[(0.0, 0.0), (1.0, 1.0)], 2.0, 100).is_none());
    }

    #[test]
    fn test_group_ellipses() {
        let embedding = Embedding {
            method: OrdinationMethod::Pcoa,
            sample_ids: vec!["A1", "A2", "A3", "B1", "B2"].into_iter().map(String::from).collect(),
            coords: vec![(0.0, 0.0), (1.0, 0.5), (0.5, 1.0), (5.0, 5.0), (6.0, 5.0)],
            stress: None,
            explained_variance: None,
            converged: true,
            notes: vec![],
        };
        let grouping = Grouping::from_pairs(
            "site",
            &[("A1", "a"), ("A2", "a"), ("A3", "a"), ("B1", "b"), ("B2", "b"), ("C1", "c")],
        );

        let ellipses = group_ellipses(&embedding, &grouping);
        assert_eq!(ellipses.len(), 3);
        assert!(ellipses[0].ellipse.is_some());
        assert_eq!(ellipses[1].n_points, 2);
        assert!(ellipses[1].ellipse.is_none());
        assert_eq!(ellipses[2].n_points, 0);
    }
}
