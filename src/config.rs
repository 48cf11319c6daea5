//! Run configuration.
//!
//! Page size and instruction encodings are ordinary values here rather than
//! process-wide constants, so tests can drive other sizes and patterns.

use crate::error::{BenchError, Result};
use crate::exec_memory::DEFAULT_PAGE_SIZE;
use crate::pattern::{InstructionPattern, InstructionSet};
use crate::sampler::DEFAULT_REPETITIONS;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default upper bound on the trigger handshake.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(300);

/// Where execution starts for a sampling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Straight at the return instruction the breakpoint is armed on
    Breakpoint,
    /// At the region base, sliding through the whole pattern
    Page,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Breakpoint => write!(f, "breakpoint"),
            Target::Page => write!(f, "page"),
        }
    }
}

/// What each measurement does with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMode {
    /// Call the target as code
    Exec,
    /// Load the machine word containing the target offset
    ReadWord,
    /// Load every word from the target offset to the end of the region
    ReadPage,
}

/// Which bytes go into the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    PageFill,
    LoadConstant(u16),
}

/// External program run before sampling so a debugger can be attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// `None` waits for the child indefinitely.
    pub timeout: Option<Duration>,
}

impl TriggerConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(DEFAULT_TRIGGER_TIMEOUT),
        }
    }
}

/// Configuration for one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Page size the run assumes; checked against the OS before mapping
    pub page_size: usize,
    /// Bytes to map; a positive multiple of `page_size`
    pub region_size: usize,
    /// Placement hint for the mapping
    pub address_hint: Option<usize>,
    pub isa: InstructionSet,
    pub pattern: PatternKind,
    pub repetitions: u64,
    pub targets: Vec<Target>,
    pub mode: ProbeMode,
    pub trigger: Option<TriggerConfig>,
    pub pin_core: Option<usize>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            region_size: DEFAULT_PAGE_SIZE,
            address_hint: None,
            isa: InstructionSet::native(),
            pattern: PatternKind::PageFill,
            repetitions: DEFAULT_REPETITIONS,
            targets: vec![Target::Breakpoint, Target::Page],
            mode: ProbeMode::Exec,
            trigger: None,
            pin_core: None,
        }
    }
}

impl BenchConfig {
    /// Catches settings that can never produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(BenchError::InvalidConfig(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }
        if self.region_size == 0 || self.region_size % self.page_size != 0 {
            return Err(BenchError::InvalidSize {
                size: self.region_size,
                page_size: self.page_size,
            });
        }
        if self.repetitions == 0 {
            return Err(BenchError::InvalidRepetitionCount(self.repetitions));
        }
        if self.mode == ProbeMode::Exec && self.isa != InstructionSet::native() {
            return Err(BenchError::InvalidConfig(format!(
                "cannot execute {} encodings on this host",
                self.isa.name
            )));
        }
        if self.targets.is_empty() {
            return Err(BenchError::InvalidConfig("no targets selected".to_string()));
        }
        if let Some(hint) = self.address_hint {
            if hint % self.page_size != 0 {
                return Err(BenchError::InvalidConfig(format!(
                    "address hint {:#x} is not page aligned",
                    hint
                )));
            }
        }
        Ok(())
    }

    /// Builds the instruction pattern the run writes.
    pub fn instruction_pattern(&self) -> Result<InstructionPattern> {
        match self.pattern {
            PatternKind::PageFill => Ok(InstructionPattern::page_fill(self.isa.clone())),
            PatternKind::LoadConstant(value) => InstructionPattern::load_constant(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.repetitions, 100_000);
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.targets, vec![Target::Breakpoint, Target::Page]);
    }

    #[test]
    fn test_rejects_bad_region_size() {
        let config = BenchConfig {
            region_size: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidSize { size: 100, .. })
        ));
    }

    #[test]
    fn test_rejects_zero_repetitions() {
        let config = BenchConfig {
            repetitions: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(BenchError::InvalidRepetitionCount(0))
        );
    }

    #[test]
    fn test_rejects_unaligned_hint() {
        let config = BenchConfig {
            address_hint: Some(0x2091a4f0001),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_foreign_isa_for_exec() {
        let foreign = if InstructionSet::native() == InstructionSet::x86_64() {
            InstructionSet::aarch64()
        } else {
            InstructionSet::x86_64()
        };
        let config = BenchConfig {
            isa: foreign.clone(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));

        // Reading foreign bytes never executes them.
        let config = BenchConfig {
            isa: foreign,
            mode: ProbeMode::ReadPage,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trigger_defaults_to_bounded_wait() {
        let trigger = TriggerConfig::new("TRIGGER");
        assert_eq!(trigger.timeout, Some(DEFAULT_TRIGGER_TIMEOUT));
    }
}
