//! CLI argument parsing for Perfcap

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "perfcap")]
#[command(version)]
#[command(about = "Capture a perf call-graph profile of a running process", long_about = None)]
pub struct Cli {
    /// Process name fragment to profile (resolved via the process table, first match wins)
    #[arg(value_name = "PROCESS")]
    pub process: String,

    /// Sampling frequency in Hz passed to perf record
    #[arg(short = 'F', long = "frequency", value_name = "HZ", default_value = "999")]
    pub frequency: u32,

    /// Path where perf record writes the raw trace
    #[arg(long = "trace-file", value_name = "PATH", default_value = "perf.data")]
    pub trace_file: PathBuf,

    /// Path for the converted trace consumed by flame graph viewers
    #[arg(short = 'o', long = "output", value_name = "PATH", default_value = "/tmp/test.perf")]
    pub output: PathBuf,

    /// Run perf without sudo (requires perf_event_paranoid to allow it)
    #[arg(long = "no-sudo")]
    pub no_sudo: bool,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}
