use crate::error::{BenchError, Result};
use std::io;
use std::ptr;
use tracing::{debug, warn};

/// Page size the breakpoint offset arithmetic is written against.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Native page size as reported by the OS.
pub fn system_page_size() -> usize {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(raw).unwrap_or(0)
}

/// Fails unless the platform page size equals `expected`.
pub fn check_page_size(expected: usize) -> Result<()> {
    let actual = system_page_size();
    if actual != expected {
        return Err(BenchError::UnsupportedPageSize { expected, actual });
    }
    Ok(())
}

/// An anonymous, private mapping that is readable, writable and executable
/// at the same time.
///
/// The region is unmapped exactly once: either through [`release`], which
/// reports munmap failures, or on drop if it was never released.
///
/// [`release`]: ExecutableRegion::release
pub struct ExecutableRegion {
    base: *mut u8,
    size: usize,
    released: bool,
}

impl ExecutableRegion {
    /// Maps `size` bytes with RWX permission.
    ///
    /// `preferred_address` is only a hint. If the kernel places the mapping
    /// elsewhere the OS-chosen address is kept.
    pub fn acquire(
        size: usize,
        preferred_address: Option<usize>,
        page_size: usize,
    ) -> Result<Self> {
        check_page_size(page_size)?;

        if size == 0 || size % page_size != 0 {
            return Err(BenchError::InvalidSize { size, page_size });
        }

        let hint = preferred_address.unwrap_or(0) as *mut libc::c_void;

        let base = unsafe {
            libc::mmap(
                hint,
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            let code = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(BenchError::AllocationFailed { size, code });
        }

        if let Some(wanted) = preferred_address {
            if base as usize != wanted {
                warn!(
                    "Address hint {:#x} not honored, using {:#x} instead",
                    wanted, base as usize
                );
            }
        }
        debug!("Mapped {} bytes at {:p}", size, base);

        Ok(ExecutableRegion {
            base: base as *mut u8,
            size,
            released: false,
        })
    }

    pub fn base_addr(&self) -> usize {
        self.base as usize
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Current contents of the region.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the mapping is live and readable for `size` bytes while
        // `self` exists, and all writes go through `bytes_mut`.
        unsafe { std::slice::from_raw_parts(self.base, self.size) }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `bytes`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.base, self.size) }
    }

    /// Flushes the instruction cache for the whole region so the CPU fetches
    /// the bytes that were just written.
    pub fn flush_icache(&self) {
        unsafe {
            #[cfg(target_arch = "x86_64")]
            {
                // x86 keeps the icache coherent; drain the store buffer.
                std::arch::asm!("mfence", options(nostack));
            }

            #[cfg(target_arch = "aarch64")]
            {
                // Clean D-cache to PoU, invalidate I-cache, then resync the pipeline.
                let start = self.base as usize;
                let end = start + self.size;
                let stride = 64;

                let mut addr = start;
                while addr < end {
                    std::arch::asm!("dc cvau, {0}", in(reg) addr);
                    addr += stride;
                }
                std::arch::asm!("dsb ish");

                addr = start;
                while addr < end {
                    std::arch::asm!("ic ivau, {0}", in(reg) addr);
                    addr += stride;
                }
                std::arch::asm!("dsb ish");
                std::arch::asm!("isb");
            }
        }
    }

    /// Returns the region to the OS.
    pub fn release(mut self) -> Result<()> {
        self.unmap()
    }

    fn unmap(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        // Never retried, even if munmap fails.
        self.released = true;
        let ret = unsafe { libc::munmap(self.base as *mut libc::c_void, self.size) };
        if ret != 0 {
            let code = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(BenchError::DeallocationFailed { code });
        }
        debug!("Unmapped {} bytes at {:p}", self.size, self.base);
        self.base = ptr::null_mut();
        Ok(())
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            warn!("Dropping executable region: {}", e);
        }
    }
}
