//! Planar homography: normalized DLT and RANSAC.

use rand::Rng;

use crate::domain::error::DomainError;
use crate::domain::model::{Point, Rect};
use crate::domain::repository::Result;

type Matrix = [[f64; 3]; 3];

const EPSILON: f64 = 1e-12;

/// 3x3 projective transform from reference-map to screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: Matrix,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn from_matrix(m: Matrix) -> Self {
        Self { m }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::from_matrix([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]])
    }

    pub fn matrix(&self) -> &Matrix {
        &self.m
    }

    /// `None` when the point maps to infinity
    pub fn apply(&self, p: Point) -> Option<Point> {
        project(&self.m, p)
    }

    /// Map the top-left and bottom-right corners. Width and height keep
    /// their sign, so a flipping or collapsing transform yields a rectangle
    /// with non-positive extent.
    pub fn transform_rect(&self, rect: Rect) -> Option<Rect> {
        let tl = self.apply(Point::new(rect.x as f64, rect.y as f64))?;
        let br = self.apply(Point::new(rect.right() as f64, rect.bottom() as f64))?;
        let (x, y) = (tl.x.round(), tl.y.round());
        Some(Rect::new(
            x as i32,
            y as i32,
            (br.x.round() - x) as i32,
            (br.y.round() - y) as i32,
        ))
    }

    /// Least-squares estimate from `(reference, live)` pairs.
    pub fn estimate(pairs: &[(Point, Point)]) -> Result<Self> {
        if pairs.len() < 4 {
            return Err(DomainError::DegenerateEstimate(format!(
                "need 4 correspondences, got {}",
                pairs.len()
            )));
        }

        let src: Vec<Point> = pairs.iter().map(|(s, _)| *s).collect();
        let dst: Vec<Point> = pairs.iter().map(|(_, d)| *d).collect();
        let (t_src, t_dst) = match (normalizer(&src), normalizer(&dst)) {
            (Some(s), Some(d)) => (s, d),
            _ => return Err(DomainError::DegenerateEstimate("coincident points".into())),
        };

        // h33 fixed to 1: eight unknowns, two equations per pair
        let mut ata = [[0.0; 8]; 8];
        let mut atb = [0.0; 8];
        for (s, d) in src.iter().zip(&dst) {
            let a = apply_affine(&t_src, *s);
            let b = apply_affine(&t_dst, *d);
            let rows = [
                ([a.x, a.y, 1.0, 0.0, 0.0, 0.0, -b.x * a.x, -b.x * a.y], b.x),
                ([0.0, 0.0, 0.0, a.x, a.y, 1.0, -b.y * a.x, -b.y * a.y], b.y),
            ];
            for (row, rhs) in rows {
                for i in 0..8 {
                    atb[i] += row[i] * rhs;
                    for j in 0..8 {
                        ata[i][j] += row[i] * row[j];
                    }
                }
            }
        }

        let h = solve(ata, atb)
            .ok_or_else(|| DomainError::DegenerateEstimate("singular system".into()))?;
        let normalized = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]];
        let mut m = multiply(&multiply(&invert_normalizer(&t_dst), &normalized), &t_src);

        let scale = m[2][2];
        if scale.abs() < EPSILON {
            return Err(DomainError::DegenerateEstimate("h33 vanished".into()));
        }
        for row in m.iter_mut() {
            for v in row.iter_mut() {
                *v /= scale;
            }
        }
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DomainError::DegenerateEstimate("non-finite transform".into()));
        }
        Ok(Self { m })
    }

    /// Distance between `live` and the projection of `reference`
    pub fn reprojection_error(&self, reference: Point, live: Point) -> f64 {
        self.apply(reference)
            .map(|p| p.distance(&live))
            .unwrap_or(f64::INFINITY)
    }
}

/// Robust estimate: fit random 4-point samples, keep the model with the most
/// pairs within `threshold` pixels, then refit on those inliers.
pub fn ransac<R: Rng>(
    pairs: &[(Point, Point)],
    iterations: u32,
    threshold: f64,
    min_inliers: usize,
    rng: &mut R,
) -> Result<(Homography, Vec<usize>)> {
    if pairs.len() < 4 {
        return Err(DomainError::DegenerateEstimate(format!(
            "need 4 correspondences, got {}",
            pairs.len()
        )));
    }

    let inliers_of = |h: &Homography| -> Vec<usize> {
        pairs
            .iter()
            .enumerate()
            .filter(|(_, (s, d))| h.reprojection_error(*s, *d) < threshold)
            .map(|(i, _)| i)
            .collect()
    };

    let mut best: Option<(Homography, Vec<usize>)> = None;
    for _ in 0..iterations.max(1) {
        let sample: Vec<(Point, Point)> = rand::seq::index::sample(rng, pairs.len(), 4)
            .into_iter()
            .map(|i| pairs[i])
            .collect();
        let Ok(candidate) = Homography::estimate(&sample) else {
            continue;
        };
        let inliers = inliers_of(&candidate);
        if best.as_ref().map_or(true, |(_, b)| inliers.len() > b.len()) {
            let done = inliers.len() == pairs.len();
            best = Some((candidate, inliers));
            if done {
                break;
            }
        }
    }

    let Some((model, inliers)) = best else {
        return Err(DomainError::DegenerateEstimate("no sample produced a model".into()));
    };
    if inliers.len() < min_inliers.max(4) {
        return Err(DomainError::DegenerateEstimate(format!(
            "{} inliers, need {}",
            inliers.len(),
            min_inliers.max(4)
        )));
    }

    let subset: Vec<(Point, Point)> = inliers.iter().map(|&i| pairs[i]).collect();
    match Homography::estimate(&subset) {
        Ok(refined) => {
            let refined_inliers = inliers_of(&refined);
            if refined_inliers.len() >= inliers.len() {
                return Ok((refined, refined_inliers));
            }
            Ok((model, inliers))
        }
        Err(_) => Ok((model, inliers)),
    }
}

fn project(m: &Matrix, p: Point) -> Option<Point> {
    let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
    if w.abs() < EPSILON {
        return None;
    }
    Some(Point::new(
        (m[0][0] * p.x + m[0][1] * p.y + m[0][2]) / w,
        (m[1][0] * p.x + m[1][1] * p.y + m[1][2]) / w,
    ))
}

fn apply_affine(m: &Matrix, p: Point) -> Point {
    Point::new(
        m[0][0] * p.x + m[0][1] * p.y + m[0][2],
        m[1][0] * p.x + m[1][1] * p.y + m[1][2],
    )
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2)
fn normalizer(points: &[Point]) -> Option<Matrix> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean < EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean;
    Some([[s, 0.0, -s * cx], [0.0, s, -s * cy], [0.0, 0.0, 1.0]])
}

fn invert_normalizer(t: &Matrix) -> Matrix {
    let s = t[0][0];
    [
        [1.0 / s, 0.0, -t[0][2] / s],
        [0.0, 1.0 / s, -t[1][2] / s],
        [0.0, 0.0, 1.0],
    ]
}

fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: [[f64; 8]; 8], mut b: [f64; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..8 {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..8 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 8];
    for row in (0..8).rev() {
        let tail: f64 = (row + 1..8).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn close(a: Point, b: Point) -> bool {
        a.distance(&b) < 1e-6
    }

    #[test]
    fn test_identity_maps_rect_exactly() {
        let h = Homography::identity();
        for rect in [
            Rect::new(0, 0, 10, 10),
            Rect::new(-50, 30, 7, 200),
            Rect::new(1234, 987, 1, 1),
        ] {
            assert_eq!(h.transform_rect(rect), Some(rect));
        }
    }

    #[test]
    fn test_estimate_recovers_projective_transform() {
        let truth = Homography::from_matrix([
            [1.2, 0.1, 30.0],
            [-0.05, 0.9, -12.0],
            [0.0004, -0.0002, 1.0],
        ]);
        let corners = [
            (0.0, 0.0),
            (400.0, 10.0),
            (390.0, 300.0),
            (5.0, 310.0),
            (200.0, 150.0),
        ];
        let pairs: Vec<(Point, Point)> = corners
            .into_iter()
            .map(|(x, y)| {
                let p = Point::new(x, y);
                (p, truth.apply(p).unwrap())
            })
            .collect();

        let h = Homography::estimate(&pairs).unwrap();
        for (s, d) in &pairs {
            assert!(close(h.apply(*s).unwrap(), *d));
        }
        let probe = Point::new(123.0, 77.0);
        assert!(close(h.apply(probe).unwrap(), truth.apply(probe).unwrap()));
    }

    #[test]
    fn test_estimate_rejects_degenerate_input() {
        let p = Point::new(1.0, 1.0);
        assert!(matches!(
            Homography::estimate(&[(p, p), (p, p), (p, p)]),
            Err(DomainError::DegenerateEstimate(_))
        ));
        assert!(matches!(
            Homography::estimate(&[(p, p); 5]),
            Err(DomainError::DegenerateEstimate(_))
        ));
        // All on one line
        let line: Vec<_> = (0..6)
            .map(|i| {
                let q = Point::new(i as f64, 2.0 * i as f64);
                (q, q)
            })
            .collect();
        assert!(Homography::estimate(&line).is_err());
    }

    #[test]
    fn test_collapsed_transform_has_zero_width() {
        let squash = Homography::from_matrix([[0.0, 0.0, 100.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let rect = squash.transform_rect(Rect::new(10, 20, 30, 40)).unwrap();
        assert_eq!(rect.width, 0);
        assert_eq!(rect.height, 40);
        assert!(!rect.is_valid());
    }

    #[test]
    fn test_ransac_ignores_outliers() {
        let mut pairs: Vec<(Point, Point)> = (0..12)
            .map(|i| {
                let p = Point::new((i * 53 % 400) as f64, (i * 97 % 300) as f64);
                (p, p.offset(25.0, -40.0))
            })
            .collect();
        pairs.push((Point::new(10.0, 10.0), Point::new(900.0, 5.0)));
        pairs.push((Point::new(300.0, 20.0), Point::new(-400.0, 700.0)));

        let mut rng = StdRng::seed_from_u64(7);
        let (h, inliers) = ransac(&pairs, 200, 3.0, 4, &mut rng).unwrap();
        assert_eq!(inliers.len(), 12);
        assert!(close(h.apply(Point::new(0.0, 0.0)).unwrap(), Point::new(25.0, -40.0)));

        let few = &pairs[..3];
        assert!(ransac(few, 10, 3.0, 4, &mut rng).is_err());
    }
}
