#[cfg(not(unix))]
compile_error!("bpbench needs a unix mmap");

pub mod affinity;
pub mod benchmark;
pub mod config;
pub mod error;
pub mod exec_memory;
pub mod pattern;
pub mod report;
pub mod sampler;
pub mod stats;
pub mod timer;
pub mod trigger;
