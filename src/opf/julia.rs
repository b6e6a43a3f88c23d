//! PandaModels.jl backend running in a `julia` child process.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{OpfBackend, OpfOptions, PmResult, SolveRequest};
use crate::error::SolverError;

const BACKEND: &str = "julia-pandamodels";
/// Exit code of the runner script when PandaModels is missing and may not be installed.
const EXIT_MISSING_PACKAGE: i32 = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs PandaModels through the `julia` executable.
#[derive(Debug, Clone, PartialEq)]
pub struct JuliaPandaModels {
    pub julia: Option<PathBuf>,
    pub auto_install: bool,
    pub dev_mode: bool,
}

impl Default for JuliaPandaModels {
    fn default() -> Self {
        Self::from_options(&OpfOptions::default())
    }
}

impl JuliaPandaModels {
    pub fn from_options(options: &OpfOptions) -> Self {
        Self {
            julia: options.julia.clone(),
            auto_install: options.auto_install,
            dev_mode: options.dev_mode,
        }
    }

    /// The configured executable if it exists, otherwise `julia` on `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        match &self.julia {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(_) => None,
            None => which::which("julia").ok(),
        }
    }

    /// Julia source that loads PandaModels, runs `entry_point` on `ARGS[1]`
    /// and writes JSON to `ARGS[2]`.
    fn script(&self, entry_point: &str) -> String {
        format!(
            r#"import Pkg
if Base.find_package("PandaModels") === nothing
    if !{auto_install}
        println(stderr, "PandaModels.jl is not installed")
        exit({missing})
    end
    @info "PandaModels.jl is not installed in julia. It is added now!"
    Pkg.Registry.update()
    Pkg.add("PandaModels")
    if {dev_mode}
        Pkg.resolve()
        Pkg.develop("PandaModels")
        Pkg.instantiate()
    end
    Pkg.build()
    Pkg.resolve()
end
if {dev_mode}
    Pkg.develop("PandaModels")
    Pkg.build()
    Pkg.resolve()
    Pkg.activate("PandaModels")
end
using PandaModels
result = PandaModels.{entry_point}(ARGS[1])
open(ARGS[2], "w") do io
    PandaModels.JSON.print(io, result)
end
"#,
            auto_install = self.auto_install,
            dev_mode = self.dev_mode,
            missing = EXIT_MISSING_PACKAGE,
        )
    }
}

/// Entry points are spliced into Julia source, so only plain identifiers are allowed.
fn validate_entry_point(entry_point: &str) -> Result<(), SolverError> {
    let mut chars = entry_point.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SolverError::InvalidRequest(format!(
            "'{entry_point}' is not a valid PandaModels entry point"
        )))
    }
}

/// Waits for `child`, killing it once `timeout` has passed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, SolverError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SolverError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn read_log(mut file: File) -> String {
    let mut s = String::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_string(&mut s);
    }
    s.trim().to_owned()
}

impl OpfBackend for JuliaPandaModels {
    fn name(&self) -> &str {
        BACKEND
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    fn solve(&self, request: &SolveRequest) -> Result<PmResult, SolverError> {
        validate_entry_point(&request.entry_point)?;
        let julia = self.locate().ok_or_else(|| SolverError::Unavailable {
            backend: BACKEND.into(),
            reason: "julia executable not found".into(),
        })?;

        let output = tempfile::Builder::new()
            .prefix("pm_to_pp_")
            .suffix(".json")
            .tempfile()?;
        // child output goes to files so a chatty runtime cannot block on a full pipe
        let stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;

        debug!(julia = %julia.display(), buffer = %request.buffer_file.display(), "starting julia");
        let mut child = Command::new(&julia)
            .arg("--startup-file=no")
            .arg("-e")
            .arg(self.script(&request.entry_point))
            .arg(&request.buffer_file)
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()?;

        let status = wait_with_timeout(&mut child, request.timeout)?;
        let log = read_log(stdout);
        if !log.is_empty() {
            debug!(output = %log, "julia stdout");
        }
        if !status.success() {
            let message = read_log(stderr);
            return Err(match status.code() {
                Some(EXIT_MISSING_PACKAGE) => SolverError::Unavailable {
                    backend: BACKEND.into(),
                    reason: message,
                },
                code => SolverError::Execution {
                    backend: BACKEND.into(),
                    exit_code: code,
                    message,
                },
            });
        }

        let result: PmResult = serde_json::from_reader(output.reopen()?)?;
        info!(status = %result.termination_status, "PandaModels finished");
        Ok(result)
    }
}
