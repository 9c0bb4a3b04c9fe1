//! Capture pipeline: resolve a process by name, profile it, reclaim the
//! trace file, and convert it for flame graph viewers.
//!
//! The pipeline is strictly sequential and short-circuits on the first
//! failing step. All interaction with the operating system goes through
//! the [`CaptureBackend`] trait so tests can substitute doubles.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while capturing a profile
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Process {0} not found.")]
    ProcessNotFound(String),

    #[error("process lookup failed: {0}")]
    Lookup(String),

    #[error("perf record exited with {status} (pid {pid})")]
    Profiler { pid: i32, status: ExitStatus },

    #[error("failed to reset ownership of {path}: {reason}")]
    Ownership { path: PathBuf, reason: String },

    #[error("perf script exited with {0}")]
    Converter(ExitStatus),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Configuration for a single capture run
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sampling frequency in Hz passed to perf record
    pub frequency: u32,
    /// Where perf record writes the raw trace
    pub trace_path: PathBuf,
    /// Where the converted trace is written
    pub output_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frequency: 999,
            trace_path: PathBuf::from("perf.data"),
            output_path: PathBuf::from("/tmp/test.perf"),
        }
    }
}

/// Outcome of a successful capture run
#[derive(Debug)]
pub struct CaptureReport {
    /// Process that was profiled
    pub pid: Pid,
    /// Converted trace ready for a flame graph viewer
    pub output_path: PathBuf,
}

/// Operating-system operations the pipeline depends on.
///
/// The real implementation shells out to pgrep, perf, and chown; tests
/// substitute a recording double to verify sequencing and short-circuiting.
pub trait CaptureBackend {
    /// Look up a running process whose command name matches `fragment`.
    /// Returns `None` when nothing matches; first match wins otherwise.
    fn resolve(&mut self, fragment: &str) -> Result<Option<Pid>>;

    /// Run the sampling profiler against `pid` until it exits or the
    /// operator interrupts it. Blocks for the whole capture.
    fn record(&mut self, pid: Pid, frequency: u32, trace_path: &Path) -> Result<()>;

    /// Hand the raw trace back to the invoking user after a privileged
    /// capture left it owned by root.
    fn reset_ownership(&mut self, trace_path: &Path) -> Result<()>;

    /// Convert the raw trace into per-sample text with pids embedded,
    /// overwriting `output_path`.
    fn convert(&mut self, trace_path: &Path, output_path: &Path) -> Result<()>;
}

/// Run the capture pipeline for a process-name fragment.
///
/// Steps run in order: resolve, record, reset ownership, convert. The
/// first failure aborts the run; in particular a fragment matching no
/// running process returns [`CaptureError::ProcessNotFound`] before any
/// file is touched.
pub fn run_capture<B: CaptureBackend>(
    backend: &mut B,
    fragment: &str,
    config: &CaptureConfig,
) -> Result<CaptureReport> {
    let pid = backend
        .resolve(fragment)?
        .ok_or_else(|| CaptureError::ProcessNotFound(fragment.to_string()))?;
    debug!(%pid, fragment, "resolved process");

    info!(%pid, frequency = config.frequency, "starting perf record");
    backend.record(pid, config.frequency, &config.trace_path)?;

    debug!(path = %config.trace_path.display(), "resetting trace ownership");
    backend.reset_ownership(&config.trace_path)?;

    debug!(output = %config.output_path.display(), "converting trace");
    backend.convert(&config.trace_path, &config.output_path)?;

    Ok(CaptureReport {
        pid,
        output_path: config.output_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend double that records the order of calls and can be told to
    /// fail at any step.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<String>,
        resolve_to: Option<i32>,
        fail_record: bool,
        fail_ownership: bool,
        fail_convert: bool,
    }

    impl CaptureBackend for RecordingBackend {
        fn resolve(&mut self, fragment: &str) -> Result<Option<Pid>> {
            self.calls.push(format!("resolve:{fragment}"));
            Ok(self.resolve_to.map(Pid::from_raw))
        }

        fn record(&mut self, pid: Pid, frequency: u32, _trace_path: &Path) -> Result<()> {
            self.calls.push(format!("record:{pid}:{frequency}"));
            if self.fail_record {
                return Err(CaptureError::Lookup("record failed".to_string()));
            }
            Ok(())
        }

        fn reset_ownership(&mut self, trace_path: &Path) -> Result<()> {
            self.calls.push("chown".to_string());
            if self.fail_ownership {
                return Err(CaptureError::Ownership {
                    path: trace_path.to_path_buf(),
                    reason: "permission denied".to_string(),
                });
            }
            Ok(())
        }

        fn convert(&mut self, _trace_path: &Path, _output_path: &Path) -> Result<()> {
            self.calls.push("convert".to_string());
            if self.fail_convert {
                return Err(CaptureError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    #[test]
    fn test_not_found_short_circuits() {
        let mut backend = RecordingBackend::default();
        let err = run_capture(&mut backend, "firefox", &CaptureConfig::default()).unwrap_err();

        assert!(matches!(err, CaptureError::ProcessNotFound(ref name) if name == "firefox"));
        assert_eq!(err.to_string(), "Process firefox not found.");
        // No capture, chown, or convert after a failed resolve
        assert_eq!(backend.calls, vec!["resolve:firefox"]);
    }

    #[test]
    fn test_record_receives_resolved_pid_and_frequency() {
        let mut backend = RecordingBackend {
            resolve_to: Some(4242),
            ..Default::default()
        };
        let config = CaptureConfig {
            frequency: 499,
            ..Default::default()
        };

        run_capture(&mut backend, "firefox", &config).unwrap();
        assert_eq!(backend.calls[1], "record:4242:499");
    }

    #[test]
    fn test_steps_run_in_order() {
        let mut backend = RecordingBackend {
            resolve_to: Some(100),
            ..Default::default()
        };

        run_capture(&mut backend, "nginx", &CaptureConfig::default()).unwrap();
        assert_eq!(
            backend.calls,
            vec!["resolve:nginx", "record:100:999", "chown", "convert"]
        );
    }

    #[test]
    fn test_record_failure_stops_pipeline() {
        let mut backend = RecordingBackend {
            resolve_to: Some(100),
            fail_record: true,
            ..Default::default()
        };

        let result = run_capture(&mut backend, "nginx", &CaptureConfig::default());
        assert!(result.is_err());
        assert_eq!(backend.calls, vec!["resolve:nginx", "record:100:999"]);
    }

    #[test]
    fn test_ownership_failure_skips_convert() {
        let mut backend = RecordingBackend {
            resolve_to: Some(100),
            fail_ownership: true,
            ..Default::default()
        };

        let result = run_capture(&mut backend, "nginx", &CaptureConfig::default());
        assert!(matches!(result, Err(CaptureError::Ownership { .. })));
        assert!(!backend.calls.contains(&"convert".to_string()));
    }

    #[test]
    fn test_convert_failure_is_surfaced() {
        let mut backend = RecordingBackend {
            resolve_to: Some(100),
            fail_convert: true,
            ..Default::default()
        };

        let result = run_capture(&mut backend, "nginx", &CaptureConfig::default());
        assert!(matches!(result, Err(CaptureError::Io(_))));
    }

    #[test]
    fn test_report_names_output_path() {
        let mut backend = RecordingBackend {
            resolve_to: Some(7),
            ..Default::default()
        };
        let config = CaptureConfig {
            output_path: PathBuf::from("/tmp/custom.perf"),
            ..Default::default()
        };

        let report = run_capture(&mut backend, "nginx", &config).unwrap();
        assert_eq!(report.pid, Pid::from_raw(7));
        assert_eq!(report.output_path, PathBuf::from("/tmp/custom.perf"));
    }

    #[test]
    fn test_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.frequency, 999);
        assert_eq!(config.trace_path, PathBuf::from("perf.data"));
        assert_eq!(config.output_path, PathBuf::from("/tmp/test.perf"));
    }
}
