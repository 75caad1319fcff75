//! Equi-width selectivity histograms
//!
//! [`IntHistogram`] splits a known inclusive `[min, max]` domain into
//! equal-width buckets; the top bucket also holds `max` itself.
//! [`StringHistogram`] maps strings onto an integer domain by their first
//! four bytes and delegates to an `IntHistogram`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::executor::predicate::Op;

/// Histogram over an INT column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntHistogram {
    min: i32,
    max: i32,
    width: f64,
    buckets: Vec<u64>,
    total: u64,
}

impl IntHistogram {
    /// `buckets` equal-width buckets spanning `[min, max]`
    pub fn new(buckets: usize, min: i32, max: i32) -> Result<Self> {
        if buckets == 0 {
            return Err(Error::InvalidArgument(
                "a histogram needs at least one bucket".to_string(),
            ));
        }
        if min > max {
            return Err(Error::InvalidArgument(format!(
                "histogram range [{}, {}] is empty",
                min, max
            )));
        }
        Ok(Self {
            min,
            max,
            width: (max as f64 - min as f64) / buckets as f64,
            buckets: vec![0; buckets],
            total: 0,
        })
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Number of values added
    pub fn total(&self) -> u64 {
        self.total
    }

    fn index(&self, v: i64) -> usize {
        let last = self.buckets.len() - 1;
        if v <= self.min as i64 {
            0
        } else if v >= self.max as i64 {
            last
        } else {
            (((v - self.min as i64) as f64 / self.width) as usize).min(last)
        }
    }

    /// Count `v`. Values outside `[min, max]` are dropped.
    pub fn add_value(&mut self, v: i32) {
        if v < self.min || v > self.max {
            warn!(value = v, min = self.min, max = self.max, "value outside histogram range");
            return;
        }
        let index = self.index(v as i64);
        self.buckets[index] += 1;
        self.total += 1;
    }

    /// Estimated fraction of values satisfying `value op v`, in `[0, 1]`.
    ///
    /// `Like` is estimated as equality.
    pub fn estimate_selectivity(&self, op: Op, v: i32) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let v = v as i64;
        let estimate = match op {
            Op::Equals | Op::Like => self.equals(v),
            Op::NotEquals => 1.0 - self.equals(v),
            Op::LessThan => self.less_than(v),
            Op::LessThanOrEq => self.less_than(v + 1),
            Op::GreaterThan => 1.0 - self.less_than(v + 1),
            Op::GreaterThanOrEq => 1.0 - self.less_than(v),
        };
        estimate.clamp(0.0, 1.0)
    }

    /// Bucket count spread over `floor(width) + 1` values
    fn equals(&self, v: i64) -> f64 {
        if v < self.min as i64 || v > self.max as i64 {
            return 0.0;
        }
        let count = self.buckets[self.index(v)] as f64;
        count / (self.width.floor() + 1.0) / self.total as f64
    }

    /// Full buckets below `v` plus a linear share of `v`'s own bucket
    fn less_than(&self, v: i64) -> f64 {
        if v <= self.min as i64 {
            return 0.0;
        }
        if v >= self.max as i64 {
            return 1.0;
        }
        let index = self.index(v);
        let below: u64 = self.buckets[..index].iter().sum();
        let left = self.min as f64 + index as f64 * self.width;
        let partial = (v as f64 - left) / self.width * self.buckets[index] as f64;
        (below as f64 + partial) / self.total as f64
    }

    /// Probability that two values drawn from the column land in the same
    /// bucket. Used as the selectivity of an equality against an unknown
    /// constant.
    pub fn avg_selectivity(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let n = self.total as f64;
        self.buckets
            .iter()
            .map(|&h| (h as f64 / n).powi(2))
            .sum()
    }
}

impl fmt::Display for IntHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.buckets.iter().enumerate() {
            let low = self.min as f64 + i as f64 * self.width;
            writeln!(f, "bucket {:>3} [{:.1}, {:.1}): {:04}", i, low, low + self.width, count)?;
        }
        Ok(())
    }
}

/// Histogram over a STRING column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringHistogram {
    inner: IntHistogram,
}

impl StringHistogram {
    pub fn new(buckets: usize) -> Result<Self> {
        Ok(Self {
            inner: IntHistogram::new(buckets, Self::min_val(), Self::max_val())?,
        })
    }

    /// Big-endian value of the first four bytes, zero padded
    fn prefix_value(s: &str) -> i64 {
        let bytes = s.as_bytes();
        (0..4).fold(0i64, |acc, i| {
            (acc << 8) | bytes.get(i).copied().unwrap_or(0) as i64
        })
    }

    fn min_val() -> i32 {
        0
    }

    fn max_val() -> i32 {
        // "zzzz" = 0x7a7a7a7a
        Self::prefix_value("zzzz") as i32
    }

    /// Map `s` onto the histogram's integer domain
    pub fn string_to_int(s: &str) -> i32 {
        Self::prefix_value(s).clamp(Self::min_val() as i64, Self::max_val() as i64) as i32
    }

    pub fn add_value(&mut self, s: &str) {
        self.inner.add_value(Self::string_to_int(s));
    }

    pub fn estimate_selectivity(&self, op: Op, s: &str) -> f64 {
        self.inner.estimate_selectivity(op, Self::string_to_int(s))
    }

    pub fn avg_selectivity(&self) -> f64 {
        self.inner.avg_selectivity()
    }

    pub fn total(&self) -> u64 {
        self.inner.total()
    }
}

impl fmt::Display for StringHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}
