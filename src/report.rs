//! Console and JSON reporting.

use crate::config::{ProbeMode, Target};
use crate::stats::BenchmarkResult;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::warn;

/// Where the region ended up and where the breakpoint belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub base_addr: usize,
    pub breakpoint_addr: usize,
    pub region_size: usize,
    pub pid: u32,
}

/// Result for one target of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: Target,
    pub mode: ProbeMode,
    pub start_addr: usize,
    #[serde(flatten)]
    pub result: BenchmarkResult,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub region: RegionInfo,
    pub results: Vec<TargetResult>,
}

/// Receives progress from the lifecycle controller.
pub trait Reporter {
    /// Called once the region is mapped and written, before any trigger.
    fn on_region(&mut self, _region: &RegionInfo) {}
    fn on_target_start(&mut self, _target: Target, _mode: ProbeMode) {}
    fn on_result(&mut self, _result: &TargetResult) {}
    /// Called after the region is released.
    fn on_finish(&mut self, _report: &RunReport) {}
}

/// Reporter that discards everything.
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Plain-text lines in the format researchers grep for.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            warn!("Failed to write report: {}", e);
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_region(&mut self, region: &RegionInfo) {
        self.emit(&format!(
            "Memory page start address: {:#x}\n\
             Place the breakpoint here: {:#x}\n\
             Process ID               : {}",
            region.base_addr, region.breakpoint_addr, region.pid
        ));
    }

    fn on_target_start(&mut self, target: Target, mode: ProbeMode) {
        let line = match (mode, target) {
            (ProbeMode::Exec, Target::Breakpoint) => "Executing on page...",
            (ProbeMode::Exec, Target::Page) => "Executing whole page...",
            (ProbeMode::ReadWord, _) => "Reading one word...",
            (ProbeMode::ReadPage, _) => "Reading whole page...",
        };
        self.emit(line);
    }

    fn on_result(&mut self, result: &TargetResult) {
        self.emit(&result.result.to_string());
    }
}

/// Prints the whole run as one JSON document at the end.
///
/// The region lines still go out as soon as the region exists, on a
/// separate status stream, so the breakpoint can be armed during the
/// trigger handshake.
pub struct JsonReporter<W: Write, S: Write = io::Stderr> {
    out: W,
    status: ConsoleReporter<S>,
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self::with_status(out, io::stderr())
    }
}

impl<W: Write, S: Write> JsonReporter<W, S> {
    pub fn with_status(out: W, status: S) -> Self {
        Self {
            out,
            status: ConsoleReporter::new(status),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn into_parts(self) -> (W, S) {
        (self.out, self.status.into_inner())
    }
}

impl<W: Write, S: Write> Reporter for JsonReporter<W, S> {
    fn on_region(&mut self, region: &RegionInfo) {
        self.status.on_region(region);
    }

    fn on_finish(&mut self, report: &RunReport) {
        let written = serde_json::to_writer_pretty(&mut self.out, report)
            .map_err(io::Error::from)
            .and_then(|_| writeln!(self.out));
        if let Err(e) = written {
            warn!("Failed to write JSON report: {}", e);
        }
    }
}
