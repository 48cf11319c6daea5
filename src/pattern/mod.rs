//! Instruction patterns written into an executable region.
//!
//! Two shapes are supported: a page-filling run of no-ops that ends in a
//! single return, and a short assembled sequence that ends in a return.
//! Either way the breakpoint offset lands on the first byte of that return.

pub mod aarch64;
pub mod x64;

use crate::error::{BenchError, Result};
use crate::exec_memory::ExecutableRegion;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("bpbench only supports x86_64 and aarch64");

/// No-op and return encodings for one instruction set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSet {
    pub name: &'static str,
    pub nop: Vec<u8>,
    pub ret: Vec<u8>,
}

impl InstructionSet {
    pub fn x86_64() -> Self {
        Self {
            name: "x86_64",
            nop: x64::NOP.to_vec(),
            ret: x64::RET.to_vec(),
        }
    }

    pub fn aarch64() -> Self {
        Self {
            name: "aarch64",
            nop: aarch64::NOP.to_vec(),
            ret: aarch64::RET.to_vec(),
        }
    }

    /// Encodings for the architecture this binary was built for.
    pub fn native() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self::x86_64()
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self::aarch64()
        }
    }
}

/// Code to place at the start of an executable region.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionPattern {
    /// No-ops up to the last instruction slot, which holds a return.
    PageFill(InstructionSet),
    /// Verbatim bytes ending in a return instruction.
    Sequence {
        bytes: Vec<u8>,
        ret_offset: usize,
        /// Value left in the return register, if the sequence produces one.
        value: Option<u64>,
    },
}

impl InstructionPattern {
    pub fn page_fill(isa: InstructionSet) -> Self {
        InstructionPattern::PageFill(isa)
    }

    /// Wraps caller-supplied bytes, which must end with `isa`'s return.
    pub fn sequence(bytes: Vec<u8>, isa: &InstructionSet) -> Result<Self> {
        if !bytes.ends_with(&isa.ret) {
            return Err(BenchError::InvalidConfig(format!(
                "sequence of {} bytes does not end with a {} return",
                bytes.len(),
                isa.name
            )));
        }
        let ret_offset = bytes.len() - isa.ret.len();
        Ok(InstructionPattern::Sequence {
            bytes,
            ret_offset,
            value: None,
        })
    }

    /// "Load constant, return" for the host architecture.
    pub fn load_constant(value: u16) -> Result<Self> {
        #[cfg(target_arch = "x86_64")]
        let (bytes, isa) = (x64::assemble_load_constant(value)?, InstructionSet::x86_64());
        #[cfg(target_arch = "aarch64")]
        let (bytes, isa) = (
            aarch64::assemble_load_constant(value)?,
            InstructionSet::aarch64(),
        );

        let mut pattern = Self::sequence(bytes, &isa)?;
        if let InstructionPattern::Sequence { value: v, .. } = &mut pattern {
            *v = Some(u64::from(value));
        }
        Ok(pattern)
    }

    /// Offset of the return instruction, the intended hardware breakpoint target.
    pub fn breakpoint_offset(&self, region_size: usize) -> usize {
        match self {
            InstructionPattern::PageFill(isa) => region_size.saturating_sub(isa.ret.len()),
            InstructionPattern::Sequence { ret_offset, .. } => *ret_offset,
        }
    }

    pub fn expected_value(&self) -> Option<u64> {
        match self {
            InstructionPattern::PageFill(_) => None,
            InstructionPattern::Sequence { value, .. } => *value,
        }
    }
}

/// Writes `pattern` at the region's base and flushes the instruction cache.
pub fn write(region: &mut ExecutableRegion, pattern: &InstructionPattern) -> Result<()> {
    let region_size = region.size();

    match pattern {
        InstructionPattern::PageFill(isa) => {
            if isa.ret.is_empty() || isa.nop.is_empty() || isa.ret.len() > region_size {
                return Err(BenchError::PatternTooLarge {
                    pattern_len: isa.ret.len(),
                    region_size,
                });
            }
            let ret_at = region_size - isa.ret.len();
            if ret_at % isa.nop.len() != 0 {
                return Err(BenchError::InvalidConfig(format!(
                    "{}-byte no-op does not tile {} bytes",
                    isa.nop.len(),
                    ret_at
                )));
            }

            let mem = region.bytes_mut();
            for slot in mem[..ret_at].chunks_exact_mut(isa.nop.len()) {
                slot.copy_from_slice(&isa.nop);
            }
            mem[ret_at..].copy_from_slice(&isa.ret);
        }
        InstructionPattern::Sequence { bytes, .. } => {
            if bytes.len() > region_size {
                return Err(BenchError::PatternTooLarge {
                    pattern_len: bytes.len(),
                    region_size,
                });
            }
            region.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        }
    }

    region.flush_icache();
    Ok(())
}
