//! Lifecycle controller: provision, write, trigger, sample, reduce, report,
//! release.

use crate::affinity::pin_thread_to_core;
use crate::config::{BenchConfig, ProbeMode, Target};
use crate::error::{BenchError, Result};
use crate::exec_memory::{check_page_size, ExecutableRegion};
use crate::pattern::{self, InstructionPattern};
use crate::report::{RegionInfo, Reporter, RunReport, TargetResult};
use crate::sampler::{self, Probe};
use crate::stats;
use crate::timer::{self, CodeAddress, MemoryRange};
use crate::trigger::{run_trigger, HandshakeInfo};
use tracing::{debug, error, info, warn};

/// Runs one complete benchmark.
///
/// The region is released on every path once it has been acquired. If a
/// step fails and the release then fails too, the step's error is returned
/// and the release error is logged.
pub fn run_benchmark<R: Reporter>(config: &BenchConfig, reporter: &mut R) -> Result<RunReport> {
    config.validate()?;
    check_page_size(config.page_size)?;
    let pattern = config.instruction_pattern()?;

    let mut region =
        ExecutableRegion::acquire(config.region_size, config.address_hint, config.page_size)?;

    let outcome = measure(config, &pattern, &mut region, reporter);
    let released = region.release();

    let report = match (outcome, released) {
        (Ok(report), Ok(())) => report,
        (Ok(_), Err(e)) => return Err(e),
        (Err(e), Ok(())) => return Err(e),
        (Err(e), Err(release_err)) => {
            error!("Releasing region after failure: {}", release_err);
            return Err(e);
        }
    };

    reporter.on_finish(&report);
    Ok(report)
}

fn measure<R: Reporter>(
    config: &BenchConfig,
    pattern: &InstructionPattern,
    region: &mut ExecutableRegion,
    reporter: &mut R,
) -> Result<RunReport> {
    pattern::write(region, pattern)?;

    let bp_offset = pattern.breakpoint_offset(region.size());
    let info = RegionInfo {
        base_addr: region.base_addr(),
        breakpoint_addr: region.base_addr() + bp_offset,
        region_size: region.size(),
        pid: std::process::id(),
    };
    info!(
        "Region at {:#x} ({} bytes), breakpoint at {:#x}, pid {}",
        info.base_addr, info.region_size, info.breakpoint_addr, info.pid
    );
    reporter.on_region(&info);

    let region: &ExecutableRegion = region;

    if let Some(expected) = pattern.expected_value() {
        // SAFETY: offset 0 is the start of the sequence just written.
        let (_, actual) = match unsafe { CodeAddress::in_region(region, 0) } {
            Some(entry) => timer::execute_and_time_with_value(entry),
            None => return Err(BenchError::InvalidConfig("empty region".to_string())),
        };
        if actual != expected {
            return Err(BenchError::UnexpectedReturnValue { expected, actual });
        }
        debug!("Sequence returned {} as assembled", actual);
    }

    if let Some(trigger) = &config.trigger {
        let handshake = HandshakeInfo {
            pid: info.pid,
            base_addr: info.base_addr,
            breakpoint_addr: info.breakpoint_addr,
        };
        match run_trigger(trigger, &handshake) {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => warn!("{}; sampling without handshake", e),
            Err(e) => return Err(e),
        }
    }

    if let Some(core) = config.pin_core {
        match pin_thread_to_core(core) {
            Ok(()) => debug!("Pinned to core {}", core),
            Err(e) => warn!("{}", e),
        }
    }

    let mut results = Vec::with_capacity(config.targets.len());
    for &target in &config.targets {
        let offset = match target {
            Target::Breakpoint => bp_offset,
            Target::Page => 0,
        };
        let probe = build_probe(region, config.mode, offset)?;

        reporter.on_target_start(target, config.mode);
        debug!(
            "Sampling {} x {:?} at {:#x}",
            config.repetitions,
            config.mode,
            probe.addr()
        );

        let samples = sampler::sample(probe, config.repetitions)?;
        let result = stats::reduce(&samples)?;
        info!(
            "{}: avg {:.2} ns, min {} ns, max {} ns",
            target, result.average, result.minimum, result.maximum
        );

        let target_result = TargetResult {
            target,
            mode: config.mode,
            start_addr: probe.addr(),
            result,
        };
        reporter.on_result(&target_result);
        results.push(target_result);
    }

    Ok(RunReport {
        region: info,
        results,
    })
}

fn build_probe(region: &ExecutableRegion, mode: ProbeMode, offset: usize) -> Result<Probe<'_>> {
    let out_of_range = || {
        BenchError::InvalidConfig(format!(
            "offset {} outside {} byte region",
            offset,
            region.size()
        ))
    };
    if mode == ProbeMode::Exec {
        // SAFETY: `offset` is either the first instruction of the written
        // pattern or its trailing return.
        let code = unsafe { CodeAddress::in_region(region, offset) }.ok_or_else(out_of_range)?;
        return Ok(Probe::Execute(code));
    }

    let range = MemoryRange::from_offset(region, offset).ok_or_else(out_of_range)?;
    Ok(match mode {
        ProbeMode::ReadWord => Probe::ReadWord(range),
        _ => Probe::ReadPage(range),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternKind;
    use crate::exec_memory::system_page_size;
    use crate::report::NullReporter;

    fn config() -> BenchConfig {
        let page = system_page_size();
        BenchConfig {
            page_size: page,
            region_size: page,
            repetitions: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_both_targets_measured() {
        let report = run_benchmark(&config(), &mut NullReporter).unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].target, Target::Breakpoint);
        assert_eq!(report.results[0].start_addr, report.region.breakpoint_addr);
        assert_eq!(report.results[1].start_addr, report.region.base_addr);
        for r in &report.results {
            assert_eq!(r.result.repetitions, 200);
            assert!(r.result.minimum <= r.result.maximum);
        }
    }

    #[test]
    fn test_load_constant_pattern() {
        let config = BenchConfig {
            pattern: PatternKind::LoadConstant(7),
            ..config()
        };
        let report = run_benchmark(&config, &mut NullReporter).unwrap();
        let isa_ret = config.isa.ret.len();
        // The breakpoint sits on the sequence's trailing return.
        assert!(report.region.breakpoint_addr - report.region.base_addr < 16);
        assert!(report.region.breakpoint_addr - report.region.base_addr >= isa_ret);
    }

    #[test]
    fn test_read_modes() {
        for mode in [ProbeMode::ReadWord, ProbeMode::ReadPage] {
            let config = BenchConfig { mode, ..config() };
            let report = run_benchmark(&config, &mut NullReporter).unwrap();
            assert_eq!(report.results.len(), 2);
        }
    }

    #[test]
    fn test_invalid_size_before_mapping() {
        let config = BenchConfig {
            region_size: 100,
            ..config()
        };
        assert!(matches!(
            run_benchmark(&config, &mut NullReporter),
            Err(BenchError::InvalidSize { size: 100, .. })
        ));
    }

    #[test]
    fn test_missing_trigger_is_not_fatal() {
        let config = BenchConfig {
            trigger: Some(crate::config::TriggerConfig::new(
                "/nonexistent/bpbench-trigger-missing",
            )),
            targets: vec![Target::Breakpoint],
            ..config()
        };
        let report = run_benchmark(&config, &mut NullReporter).unwrap();
        assert_eq!(report.results.len(), 1);
    }
}
