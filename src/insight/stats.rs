/// Running mean/variance accumulator (Welford).
///
/// A constant input keeps `mean` exactly equal to that constant and `m2` at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Moments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Moments {
    pub fn from_values(values: &[f64]) -> Self {
        let mut moments = Self::default();
        for &v in values {
            moments.push(v);
        }
        moments
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Unbiased sample variance (n - 1 denominator). Zero below two samples.
    pub fn sample_variance(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => Some((self.m2 / (n - 1) as f64).max(0.0)),
        }
    }

    pub fn sample_std_dev(&self) -> Option<f64> {
        self.sample_variance().map(f64::sqrt)
    }
}

/// Trailing mean over at most `window` points ending at each index.
/// The window is truncated at the start of the series, never padded.
pub fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            Moments::from_values(&values[start..=i]).mean
        })
        .collect()
}
