use crate::error::{BenchError, Result};
use dynasmrt::{dynasm, x64::Assembler, DynasmApi};

pub const NOP: &[u8] = &[0x90];
pub const RET: &[u8] = &[0xC3];

/// `mov eax, value; ret`
///
/// The 32-bit move zero-extends into rax, so the whole return register holds `value`.
pub fn assemble_load_constant(value: u16) -> Result<Vec<u8>> {
    let mut ops = Assembler::new().map_err(|e| BenchError::AssemblyFailed(e.to_string()))?;

    dynasm!(ops
        ; .arch x64
        ; mov eax, value as i32
        ; ret
    );

    let buf = ops
        .finalize()
        .map_err(|_| BenchError::AssemblyFailed("x64 assembler finalize failed".to_string()))?;
    Ok(buf.to_vec())
}
