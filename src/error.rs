//! Error Types for bpbench
//!
//! A single error type covers every stage of a run, from the page-size
//! precondition through provisioning, sampling and teardown.

use std::fmt;

/// Unified error type for bpbench operations
#[derive(Debug, Clone, PartialEq)]
pub enum BenchError {
    /// The platform page size differs from the configured one
    UnsupportedPageSize { expected: usize, actual: usize },
    /// Requested region size is zero or not a page multiple
    InvalidSize { size: usize, page_size: usize },
    /// mmap refused the request
    AllocationFailed { size: usize, code: i32 },
    /// Pattern does not fit in the region
    PatternTooLarge { pattern_len: usize, region_size: usize },
    /// Zero repetitions requested
    InvalidRepetitionCount(u64),
    /// Reduction over no samples
    EmptySampleSet,
    /// munmap refused to release the region
    DeallocationFailed { code: i32 },
    /// sched_setaffinity refused to pin the thread
    AffinityFailed { core: usize, code: i32 },
    /// The trigger program could not be started
    TriggerLaunchFailed { program: String, code: Option<i32> },
    /// The trigger program did not exit in time and was killed
    TriggerTimedOut { program: String, waited_ms: u64 },
    /// dynasm could not produce the instruction sequence
    AssemblyFailed(String),
    /// Executed code returned something other than what it was assembled to return
    UnexpectedReturnValue { expected: u64, actual: u64 },
    /// Invalid configuration
    InvalidConfig(String),
}

impl BenchError {
    /// Whether the run may continue after this error.
    ///
    /// Only the trigger handshake is optional; everything else aborts.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BenchError::TriggerLaunchFailed { .. } | BenchError::TriggerTimedOut { .. }
        )
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::UnsupportedPageSize { expected, actual } => write!(
                f,
                "Unsupported pagesize: {}, expected {}",
                actual, expected
            ),
            BenchError::InvalidSize { size, page_size } => write!(
                f,
                "Invalid region size {} bytes: must be a positive multiple of {}",
                size, page_size
            ),
            BenchError::AllocationFailed { size, code } => write!(
                f,
                "mmap of {} bytes failed with error {} ({})",
                size,
                code,
                std::io::Error::from_raw_os_error(*code)
            ),
            BenchError::PatternTooLarge {
                pattern_len,
                region_size,
            } => write!(
                f,
                "Pattern of {} bytes does not fit in a {} byte region",
                pattern_len, region_size
            ),
            BenchError::InvalidRepetitionCount(n) => {
                write!(f, "Invalid repetition count {}: must be at least 1", n)
            }
            BenchError::EmptySampleSet => write!(f, "Cannot reduce an empty sample set"),
            BenchError::DeallocationFailed { code } => write!(
                f,
                "munmap failed with error {} ({})",
                code,
                std::io::Error::from_raw_os_error(*code)
            ),
            BenchError::AffinityFailed { core, code } => write!(
                f,
                "Pinning to core {} failed with error {} ({})",
                core,
                code,
                std::io::Error::from_raw_os_error(*code)
            ),
            BenchError::TriggerLaunchFailed { program, code } => match code {
                Some(code) => write!(f, "Failed to start trigger {} ({})", program, code),
                None => write!(f, "Failed to start trigger {}", program),
            },
            BenchError::TriggerTimedOut { program, waited_ms } => write!(
                f,
                "Trigger {} still running after {} ms, killed",
                program, waited_ms
            ),
            BenchError::AssemblyFailed(msg) => write!(f, "Assembly failed: {}", msg),
            BenchError::UnexpectedReturnValue { expected, actual } => write!(
                f,
                "Executed code returned {}, expected {}",
                actual, expected
            ),
            BenchError::InvalidConfig(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BenchError {}

/// Result type alias for bpbench operations
pub type Result<T> = std::result::Result<T, BenchError>;
