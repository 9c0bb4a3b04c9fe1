//! System backend: real pgrep/perf/chown invocations.
//!
//! The capture runs perf under sudo so it can attach to arbitrary
//! processes, which leaves the raw trace owned by root. Ownership is
//! reset to the invoking user before conversion so the trace stays
//! usable without privileges afterwards.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::unistd::{chown, Gid, Pid, Uid};
use tracing::debug;

use crate::capture::{CaptureBackend, CaptureError, Result};

/// Backend that shells out to the system profiling tools
#[derive(Debug)]
pub struct SystemBackend {
    /// Prefix privileged steps with sudo
    elevate: bool,
}

impl SystemBackend {
    pub fn new(elevate: bool) -> Self {
        Self { elevate }
    }

    /// Build a command, prefixed with sudo when elevation is enabled
    fn privileged(&self, program: &str) -> Command {
        if self.elevate {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }
}

impl CaptureBackend for SystemBackend {
    fn resolve(&mut self, fragment: &str) -> Result<Option<Pid>> {
        let output = Command::new("pgrep")
            .arg(fragment)
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| CaptureError::Lookup(format!("failed to run pgrep: {e}")))?;

        // pgrep exits 1 when nothing matches
        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_pgrep_output(&stdout).map(Pid::from_raw))
    }

    fn record(&mut self, pid: Pid, frequency: u32, trace_path: &Path) -> Result<()> {
        // Blocks until the profiled process exits or the operator stops
        // perf with Ctrl-C
        let status = self
            .privileged("perf")
            .arg("record")
            .arg("-F")
            .arg(frequency.to_string())
            .arg("-g")
            .arg("-p")
            .arg(pid.to_string())
            .arg("-o")
            .arg(trace_path)
            .status()?;

        if !status.success() {
            return Err(CaptureError::Profiler {
                pid: pid.as_raw(),
                status,
            });
        }
        Ok(())
    }

    fn reset_ownership(&mut self, trace_path: &Path) -> Result<()> {
        let uid = Uid::current();
        let gid = Gid::current();
        debug!(%uid, %gid, path = %trace_path.display(), "chown trace file");

        if self.elevate {
            // The trace is root-owned after a sudo capture, so the chown
            // itself needs elevation too
            let status = self
                .privileged("chown")
                .arg(format!("{uid}:{gid}"))
                .arg(trace_path)
                .status()?;
            if !status.success() {
                return Err(CaptureError::Ownership {
                    path: trace_path.to_path_buf(),
                    reason: format!("chown exited with {status}"),
                });
            }
        } else {
            chown(trace_path, Some(uid), Some(gid)).map_err(|e| CaptureError::Ownership {
                path: trace_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn convert(&mut self, trace_path: &Path, output_path: &Path) -> Result<()> {
        // -F +pid keeps process identifiers on every sample, which the
        // Firefox Profiler needs to split threads
        let output = File::create(output_path)?;
        let status = Command::new("perf")
            .arg("script")
            .arg("-F")
            .arg("+pid")
            .arg("-i")
            .arg(trace_path)
            .stdout(Stdio::from(output))
            .status()?;

        if !status.success() {
            return Err(CaptureError::Converter(status));
        }
        Ok(())
    }
}

/// Parse pgrep output, taking the first matching pid
fn parse_pgrep_output(stdout: &str) -> Option<i32> {
    stdout.lines().next()?.trim().parse().ok()
}
