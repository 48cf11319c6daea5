//! Summary statistics over a sample set.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of one sampling run. All durations are nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub repetitions: u64,
    pub average: f64,
    pub minimum: u64,
    pub maximum: u64,
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "repetitions : {}", self.repetitions)?;
        writeln!(f, "average time: {:.2} ns", self.average)?;
        writeln!(f, "min time    : {} ns", self.minimum)?;
        write!(f, "max time    : {} ns", self.maximum)
    }
}

/// Single pass over `samples` for sum, minimum and maximum.
///
/// The sum is accumulated in a u128, which cannot overflow for any slice of
/// u64 that fits in memory.
pub fn reduce(samples: &[u64]) -> Result<BenchmarkResult> {
    let (&first, rest) = samples.split_first().ok_or(BenchError::EmptySampleSet)?;

    let mut sum = u128::from(first);
    let mut min = first;
    let mut max = first;
    for &t in rest {
        sum += u128::from(t);
        min = min.min(t);
        max = max.max(t);
    }

    let count = samples.len() as u64;
    let average = (sum as f64 / count as f64).clamp(min as f64, max as f64);

    Ok(BenchmarkResult {
        repetitions: count,
        average,
        minimum: min,
        maximum: max,
    })
}
