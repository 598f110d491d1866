//! A minimal fixed-binning histogram, just enough to exercise the
//! histogram-like action's merge and finalise steps. Real histogramming
//! (variable binning, weights, 2-D) is out of scope. This is a reference
//! "histogram object with in-place add" external collaborator, not a full
//! histogramming library.

use branch_core::{ColumnValue, Histogrammish};

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    low: f64,
    high: f64,
    bins: Vec<u64>,
    underflow: u64,
    overflow: u64,
}

impl Histogram1D {
    pub fn new(nbins: usize, low: f64, high: f64) -> Self {
        Self { low, high, bins: vec![0; nbins.max(1)], underflow: 0, overflow: 0 }
    }

    pub fn bin_counts(&self) -> &[u64] {
        &self.bins
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn total(&self) -> u64 {
        self.underflow + self.overflow + self.bins.iter().sum::<u64>()
    }
}

impl Histogrammish for Histogram1D {
    fn add(&mut self, value: &ColumnValue) {
        let Some(v) = value.as_f64() else { return };
        if v < self.low {
            self.underflow += 1;
            return;
        }
        if v >= self.high {
            self.overflow += 1;
            return;
        }
        let width = (self.high - self.low) / self.bins.len() as f64;
        let idx = (((v - self.low) / width) as usize).min(self.bins.len() - 1);
        self.bins[idx] += 1;
    }

    fn merge_from(&mut self, other: &Self) {
        for (a, b) in self.bins.iter_mut().zip(other.bins.iter()) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_into_the_right_bin() {
        let mut h = Histogram1D::new(4, 0.0, 8.0);
        for v in [0.5, 2.5, 7.9, -1.0, 100.0] {
            h.add(&ColumnValue::Float64(v));
        }
        assert_eq!(h.bin_counts(), &[1, 1, 0, 1]);
        assert_eq!(h.underflow(), 1);
        assert_eq!(h.overflow(), 1);
        assert_eq!(h.total(), 5);
    }

    #[test]
    fn merge_is_elementwise() {
        let mut a = Histogram1D::new(2, 0.0, 2.0);
        let mut b = Histogram1D::new(2, 0.0, 2.0);
        a.add(&ColumnValue::Float64(0.5));
        b.add(&ColumnValue::Float64(1.5));
        a.merge_from(&b);
        assert_eq!(a.bin_counts(), &[1, 1]);
    }
}
