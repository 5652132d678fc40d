//! Summary statistics over per-run throughputs.

use std::fmt;

/// Mean, median and extremes of a set of throughput samples, in elems/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub min: u64,
    pub max: u64,
}

impl Summary {
    /// Summarizes `samples`. Returns `None` for an empty slice.
    ///
    /// For an even number of samples the median is the average of the two
    /// middle values.
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let n = sorted.len();

        let sum: u128 = sorted.iter().map(|&s| u128::from(s)).sum();
        let mean = sum as f64 / n as f64;

        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
        } else {
            sorted[n / 2] as f64
        };

        Some(Self {
            mean,
            median,
            min,
            max,
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mean: {} elems/s", grouped(self.mean.round() as u64))?;
        writeln!(f, "Median: {} elems/s", grouped(self.median.round() as u64))?;
        writeln!(f, "Min: {} elems/s", grouped(self.min))?;
        write!(f, "Max: {} elems/s", grouped(self.max))
    }
}

/// Formats `value` with comma thousands separators.
fn grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
