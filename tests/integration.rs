use bpbench::benchmark::run_benchmark;
use bpbench::config::{BenchConfig, ProbeMode, Target, TriggerConfig};
use bpbench::error::BenchError;
use bpbench::exec_memory::{system_page_size, ExecutableRegion, DEFAULT_PAGE_SIZE};
use bpbench::pattern::{self, InstructionPattern, InstructionSet};
use bpbench::report::{ConsoleReporter, NullReporter};
use bpbench::sampler::{sample, Probe};
use bpbench::stats::reduce;
use bpbench::timer::CodeAddress;
use std::time::Duration;

fn page_config() -> BenchConfig {
    let page = system_page_size();
    BenchConfig {
        page_size: page,
        region_size: page,
        repetitions: 1000,
        ..Default::default()
    }
}

#[test]
fn breakpoint_offset_run_end_to_end() {
    // The default configuration assumes 4 KiB pages.
    if system_page_size() != DEFAULT_PAGE_SIZE {
        eprintln!("skipping: page size is {}", system_page_size());
        return;
    }

    let mut region = ExecutableRegion::acquire(4096, None, 4096).unwrap();
    let pattern = InstructionPattern::page_fill(InstructionSet::native());
    pattern::write(&mut region, &pattern).unwrap();

    let bp = pattern.breakpoint_offset(region.size());
    let code = unsafe { CodeAddress::in_region(&region, bp) }.unwrap();
    let samples = sample(Probe::Execute(code), 1000).unwrap();
    let result = reduce(&samples).unwrap();

    assert_eq!(result.repetitions, 1000);
    assert!(result.maximum >= result.minimum);
    region.release().unwrap();
}

#[test]
fn non_page_multiple_is_rejected() {
    let page = system_page_size();
    assert!(matches!(
        ExecutableRegion::acquire(100, None, page),
        Err(BenchError::InvalidSize { size: 100, .. })
    ));
}

#[test]
fn empty_sample_set_is_rejected() {
    assert_eq!(reduce(&[]), Err(BenchError::EmptySampleSet));
}

#[test]
fn breakpoint_is_cheaper_than_page_walk() {
    let page = system_page_size();
    let mut region = ExecutableRegion::acquire(page * 4, None, page).unwrap();
    let pattern = InstructionPattern::page_fill(InstructionSet::native());
    pattern::write(&mut region, &pattern).unwrap();

    let bp = pattern.breakpoint_offset(region.size());
    let at_ret = unsafe { CodeAddress::in_region(&region, bp) }.unwrap();
    let entry = unsafe { CodeAddress::in_region(&region, 0) }.unwrap();

    let short = reduce(&sample(Probe::Execute(at_ret), 2000).unwrap()).unwrap();
    let long = reduce(&sample(Probe::Execute(entry), 2000).unwrap()).unwrap();
    // Thousands of no-ops against a lone return; compare the quiet minima.
    assert!(short.minimum <= long.minimum);
}

#[test]
fn full_run_with_console_report() {
    let mut reporter = ConsoleReporter::new(Vec::new());
    let report = run_benchmark(&page_config(), &mut reporter).unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(
        report.region.breakpoint_addr,
        report.region.base_addr + report.region.region_size - InstructionSet::native().ret.len()
    );

    let text = String::from_utf8(reporter.into_inner()).unwrap();
    assert!(text.contains("Place the breakpoint here: "));
    assert!(text.contains(&format!("Process ID               : {}", std::process::id())));
    assert_eq!(text.matches("repetitions : 1000").count(), 2);
}

#[test]
fn trigger_runs_before_sampling() {
    let config = BenchConfig {
        trigger: Some(TriggerConfig {
            program: "true".to_string(),
            args: Vec::new(),
            timeout: Some(Duration::from_secs(10)),
        }),
        targets: vec![Target::Breakpoint],
        ..page_config()
    };
    let report = run_benchmark(&config, &mut NullReporter).unwrap();
    assert_eq!(report.results[0].result.repetitions, 1000);
}

#[test]
fn trigger_timeout_does_not_abort_run() {
    let config = BenchConfig {
        trigger: Some(TriggerConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            timeout: Some(Duration::from_millis(50)),
        }),
        targets: vec![Target::Page],
        repetitions: 10,
        ..page_config()
    };
    let report = run_benchmark(&config, &mut NullReporter).unwrap();
    assert_eq!(report.results.len(), 1);
}

#[test]
fn wrong_page_size_fails_before_mapping() {
    let config = BenchConfig {
        page_size: system_page_size() * 2,
        region_size: system_page_size() * 2,
        ..page_config()
    };
    match run_benchmark(&config, &mut NullReporter) {
        Err(BenchError::UnsupportedPageSize { expected, actual }) => {
            assert_eq!(expected, system_page_size() * 2);
            assert_eq!(actual, system_page_size());
        }
        other => panic!("expected UnsupportedPageSize, got {:?}", other),
    }
}

/// Lines of /proc/self/maps that start at `addr`.
#[cfg(target_os = "linux")]
fn mappings_at(addr: usize) -> Vec<String> {
    let prefix = format!("{:x}-", addr);
    std::fs::read_to_string("/proc/self/maps")
        .unwrap()
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

#[test]
#[cfg(target_os = "linux")]
fn failure_after_mapping_unmaps_region() {
    // Far from where the kernel places unhinted mappings, so parallel
    // tests do not land on it.
    let hint = 0x2091_a4f0_0000;
    assert!(mappings_at(hint).is_empty());

    // A 3-byte no-op cannot tile up to a 2-byte return, so writing the
    // pattern fails only after the region has been mapped.
    let config = BenchConfig {
        address_hint: Some(hint),
        isa: InstructionSet {
            name: "odd",
            nop: vec![0x0F, 0x1F, 0x00],
            ret: vec![0xC3, 0xC3],
        },
        mode: ProbeMode::ReadPage,
        ..page_config()
    };
    assert!(config.validate().is_ok());

    match run_benchmark(&config, &mut NullReporter) {
        Err(BenchError::InvalidConfig(msg)) => assert!(msg.contains("does not tile")),
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
    assert!(mappings_at(hint).is_empty(), "region left mapped after failure");

    // The hint is free again, so a fresh mapping gets it back.
    let page = system_page_size();
    let region = ExecutableRegion::acquire(page, Some(hint), page).unwrap();
    assert_eq!(region.base_addr(), hint);
    assert_eq!(mappings_at(hint).len(), 1);
    assert!(mappings_at(hint)[0].contains("rwxp"));
    region.release().unwrap();
    assert!(mappings_at(hint).is_empty());
}
