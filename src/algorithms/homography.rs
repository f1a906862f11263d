//! Planar projective transforms and the normalized DLT solver.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

pub type Point = Point2<f64>;

const SINGULAR_EPSILON: f64 = 1e-12;

/// A 3x3 projective transform mapping target-image pixel coordinates onto
/// reference-image pixel coordinates.
///
/// Construction goes through [`Homography::from_matrix`], which scales the
/// matrix so that `h33 = 1` and rejects singular matrices, so every value of
/// this type carries a usable inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    /// Wrap a raw matrix, returning `None` for non-finite or singular input.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let scale = if matrix[(2, 2)].abs() > SINGULAR_EPSILON {
            matrix[(2, 2)]
        } else {
            matrix.norm()
        };
        if scale.abs() <= SINGULAR_EPSILON {
            return None;
        }

        let forward = matrix / scale;
        if forward.determinant().abs() <= SINGULAR_EPSILON {
            return None;
        }
        let inverse = forward.try_inverse()?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return None;
        }

        Some(Self { forward, inverse })
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Option<Self> {
        Self::from_matrix(Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        ))
    }

    /// Pure translation by `(tx, ty)`.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            forward: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
            inverse: Matrix3::new(1.0, 0.0, -tx, 0.0, 1.0, -ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.forward;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    pub fn inverse(&self) -> Self {
        Self {
            forward: self.inverse,
            inverse: self.forward,
        }
    }

    /// Map a point; `None` when it lands on the line at infinity.
    pub fn apply(&self, point: &Point) -> Option<Point> {
        project(&self.forward, point)
    }

    /// Map a point through the inverse transform.
    pub fn apply_inverse(&self, point: &Point) -> Option<Point> {
        project(&self.inverse, point)
    }

    /// Euclidean distance between `H * target` and `reference`.
    pub fn transfer_error(&self, target: &Point, reference: &Point) -> f64 {
        match self.apply(target) {
            Some(mapped) => (mapped - reference).norm(),
            None => f64::INFINITY,
        }
    }

    /// Largest absolute difference between the normalized matrices.
    pub fn max_abs_difference(&self, other: &Homography) -> f64 {
        (self.forward - other.forward).abs().max()
    }
}

fn project(matrix: &Matrix3<f64>, point: &Point) -> Option<Point> {
    let v = matrix * Vector3::new(point.x, point.y, 1.0);
    if v.z.abs() <= SINGULAR_EPSILON {
        return None;
    }
    Some(Point::new(v.x / v.z, v.y / v.z))
}

/// Hartley normalization: move the centroid to the origin and scale so the
/// mean distance from it is sqrt(2).
fn normalization_transform(points: &[Point]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;

    let mean_distance = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_distance <= SINGULAR_EPSILON {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_distance;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Direct linear transform over four or more pairs, mapping `target[i]` onto
/// `reference[i]`. Least squares when more than four pairs are given.
pub fn fit_dlt(target: &[Point], reference: &[Point]) -> Option<Homography> {
    let n = target.len();
    if n < 4 || reference.len() != n {
        return None;
    }

    let t_target = normalization_transform(target)?;
    let t_reference = normalization_transform(reference)?;

    // The SVD below needs at least as many rows as unknowns.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (t, r)) in target.iter().zip(reference).enumerate() {
        let p = project(&t_target, t)?;
        let q = project(&t_reference, r)?;
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);

        let r0 = 2 * i;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_index, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(min_index);

    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let denormalized = t_reference.try_inverse()? * normalized * t_target;
    Homography::from_matrix(denormalized)
}
