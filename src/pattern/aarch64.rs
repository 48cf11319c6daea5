use crate::error::{BenchError, Result};
use dynasmrt::{aarch64::Assembler, dynasm, DynasmApi};

// A64 instructions are little-endian 32-bit words.
pub const NOP: &[u8] = &[0x1f, 0x20, 0x03, 0xd5];
pub const RET: &[u8] = &[0xc0, 0x03, 0x5f, 0xd6];

/// `mov x0, value; ret`
pub fn assemble_load_constant(value: u16) -> Result<Vec<u8>> {
    let mut ops = Assembler::new().map_err(|e| BenchError::AssemblyFailed(e.to_string()))?;

    dynasm!(ops
        ; .arch aarch64
        ; mov x0, value as u64
        ; ret
    );

    let buf = ops
        .finalize()
        .map_err(|_| BenchError::AssemblyFailed("aarch64 assembler finalize failed".to_string()))?;
    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_constant_ends_with_ret() {
        let code = assemble_load_constant(7).unwrap();
        assert_eq!(code.len(), 8);
        assert_eq!(&code[4..], RET);
    }
}
