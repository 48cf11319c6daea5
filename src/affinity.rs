use crate::error::{BenchError, Result};

/// Pin the calling thread to one CPU core so every sample runs on the same
/// hardware breakpoint registers and caches.
#[cfg(target_os = "linux")]
pub fn pin_thread_to_core(core_id: usize) -> Result<()> {
    if core_id >= libc::CPU_SETSIZE as usize {
        return Err(BenchError::InvalidConfig(format!(
            "core {} is beyond CPU_SETSIZE",
            core_id
        )));
    }
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);

        // 0 means the calling thread
        let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset);
        if ret != 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(BenchError::AffinityFailed {
                core: core_id,
                code,
            });
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_thread_to_core(core_id: usize) -> Result<()> {
    Err(BenchError::InvalidConfig(format!(
        "pinning to core {} is only supported on Linux",
        core_id
    )))
}
