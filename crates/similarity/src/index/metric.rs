//! Minkowski distance family

use ndarray::ArrayView1;

/// Minkowski distance with exponent `p` (p = 2 is Euclidean, p = 1 Manhattan)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinkowskiMetric {
    p: f64,
}

impl MinkowskiMetric {
    pub fn new(p: f64) -> Self {
        Self { p }
    }

    pub fn euclidean() -> Self {
        Self::new(2.0)
    }

    pub fn exponent(&self) -> f64 {
        self.p
    }

    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());

        if self.p == 1.0 {
            diffs.sum()
        } else if self.p == 2.0 {
            diffs.map(|d| d * d).sum::<f64>().sqrt()
        } else if self.p.is_infinite() {
            diffs.fold(0.0, f64::max)
        } else {
            diffs.map(|d| d.powf(self.p)).sum::<f64>().powf(1.0 / self.p)
        }
    }
}

impl Default for MinkowskiMetric {
    fn default() -> Self {
        Self::euclidean()
    }
}
