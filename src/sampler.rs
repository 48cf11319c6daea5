//! Repetition sampler.
//!
//! Runs one probe back to back and keeps every duration in call order.
//! There is no warm-up phase and no outlier rejection: scheduler noise and
//! trap overhead both land in the sample set so the maximum stays honest.

use crate::error::{BenchError, Result};
use crate::timer::{self, CodeAddress, MemoryRange};

pub const DEFAULT_REPETITIONS: u64 = 100_000;

/// Nanosecond durations in the order they were measured.
pub type SampleSet = Vec<u64>;

/// What a single measurement does between its two timestamps.
#[derive(Debug, Clone, Copy)]
pub enum Probe<'a> {
    Execute(CodeAddress<'a>),
    ReadWord(MemoryRange<'a>),
    ReadPage(MemoryRange<'a>),
}

impl Probe<'_> {
    #[inline(always)]
    pub fn measure(&self) -> u64 {
        match *self {
            Probe::Execute(code) => timer::execute_and_time(code),
            Probe::ReadWord(range) => timer::read_word_and_time(range),
            Probe::ReadPage(range) => timer::read_page_and_time(range),
        }
    }

    /// Address the probe starts at.
    pub fn addr(&self) -> usize {
        match self {
            Probe::Execute(code) => code.addr(),
            Probe::ReadWord(range) | Probe::ReadPage(range) => range.addr(),
        }
    }
}

/// Measures `probe` exactly `repetitions` times.
pub fn sample(probe: Probe<'_>, repetitions: u64) -> Result<SampleSet> {
    if repetitions == 0 {
        return Err(BenchError::InvalidRepetitionCount(repetitions));
    }
    let capacity = usize::try_from(repetitions).map_err(|_| {
        BenchError::InvalidConfig(format!("{} repetitions do not fit in memory", repetitions))
    })?;

    // Sized up front so the loop never reallocates.
    let mut samples = Vec::with_capacity(capacity);
    for _ in 0..repetitions {
        samples.push(probe.measure());
    }
    Ok(samples)
}
