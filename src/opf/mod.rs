//! Optimal power flow through an external PowerModels runtime.
//!
//! The network is written to a JSON buffer file, a backend solves it out of
//! process, and the result is read back into a copy of the network.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::SolverError;
use crate::io::pandapower::Network;

pub mod from_pm;
pub mod julia;
pub mod to_pm;

pub use from_pm::{PmResult, read_pm_results_to_net};
pub use julia::JuliaPandaModels;
pub use to_pm::{PmLookup, convert_to_pm_structure};

/// Settings of an optimal power flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpfOptions {
    /// Path of the `julia` executable; looked up on `PATH` when unset.
    pub julia: Option<PathBuf>,
    /// PandaModels function called with the buffer file.
    pub entry_point: String,
    /// PowerModels formulation.
    pub model: String,
    pub solver: String,
    pub timeout_secs: u64,
    pub delete_buffer_file: bool,
    /// Where to write the buffer file. A given path is never deleted.
    pub buffer_file: Option<PathBuf>,
    /// Install PandaModels when it is missing.
    pub auto_install: bool,
    pub dev_mode: bool,
}

impl Default for OpfOptions {
    fn default() -> Self {
        Self {
            julia: None,
            entry_point: "run_powermodels_opf".into(),
            model: "ACPPowerModel".into(),
            solver: "ipopt".into(),
            timeout_secs: 600,
            delete_buffer_file: true,
            buffer_file: None,
            auto_install: true,
            dev_mode: false,
        }
    }
}

/// What a backend needs to run one optimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveRequest {
    pub buffer_file: PathBuf,
    pub entry_point: String,
    pub timeout: Duration,
}

/// An external runtime able to solve a PowerModels buffer file.
pub trait OpfBackend {
    fn name(&self) -> &str;

    /// Whether the runtime can be started at all.
    fn is_available(&self) -> bool;

    fn solve(&self, request: &SolveRequest) -> Result<PmResult, SolverError>;
}

/// The buffer file of one run. A temporary file is removed when this is dropped.
enum BufferFile {
    Temp(NamedTempFile),
    Kept(PathBuf),
}

impl BufferFile {
    fn path(&self) -> &Path {
        match self {
            BufferFile::Temp(f) => f.path(),
            BufferFile::Kept(p) => p,
        }
    }
}

fn write_buffer(pm: &serde_json::Value, options: &OpfOptions) -> Result<BufferFile, SolverError> {
    if let Some(path) = &options.buffer_file {
        fs::write(path, serde_json::to_vec(pm)?)?;
        return Ok(BufferFile::Kept(path.clone()));
    }
    let mut tmp = tempfile::Builder::new()
        .prefix("pp_to_pm_")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer(&mut tmp, pm)?;
    tmp.flush()?;
    if options.delete_buffer_file {
        Ok(BufferFile::Temp(tmp))
    } else {
        let (_, path) = tmp.keep().map_err(|e| e.error)?;
        Ok(BufferFile::Kept(path))
    }
}

/// Solves an optimal power flow of `net` with `backend` and returns the network with results.
///
/// The buffer file is removed on every exit path unless a path was given in
/// `options` or `delete_buffer_file` is false.
pub fn run_pm(
    net: &Network,
    backend: &dyn OpfBackend,
    options: &OpfOptions,
) -> Result<Network, SolverError> {
    if !backend.is_available() {
        return Err(SolverError::Unavailable {
            backend: backend.name().to_owned(),
            reason: "runtime not found".into(),
        });
    }
    let (pm, lookup) = convert_to_pm_structure(net, options)?;
    let buffer = write_buffer(&pm, options)?;
    debug!(path = %buffer.path().display(), "the json file for converted net is stored");

    let request = SolveRequest {
        buffer_file: buffer.path().to_path_buf(),
        entry_point: options.entry_point.clone(),
        timeout: Duration::from_secs(options.timeout_secs),
    };
    let result = backend.solve(&request)?;

    let mut solved = net.clone();
    read_pm_results_to_net(&mut solved, &lookup, &result)?;
    if matches!(buffer, BufferFile::Temp(_)) {
        debug!(path = %buffer.path().display(), "the json file for converted net is deleted");
    }
    Ok(solved)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::io::pypsa::from_pypsa;
    use crate::testcases::build_pypsa_test_net;

    /// Records the buffer file it was handed and answers with a canned result.
    struct FakeBackend {
        available: bool,
        fail: bool,
        seen: RefCell<Option<PathBuf>>,
    }

    impl FakeBackend {
        fn new(available: bool, fail: bool) -> Self {
            Self {
                available,
                fail,
                seen: RefCell::new(None),
            }
        }

        fn seen(&self) -> PathBuf {
            self.seen.borrow().clone().unwrap()
        }
    }

    impl OpfBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn solve(&self, request: &SolveRequest) -> Result<PmResult, SolverError> {
            *self.seen.borrow_mut() = Some(request.buffer_file.clone());
            let pm: serde_json::Value = serde_json::from_slice(&fs::read(&request.buffer_file)?)?;
            assert_eq!(pm["bus"].as_object().unwrap().len(), 3);
            if self.fail {
                return Err(SolverError::Execution {
                    backend: "fake".into(),
                    exit_code: Some(1),
                    message: "boom".into(),
                });
            }
            Ok(serde_json::from_value(json!({
                "termination_status": "LOCALLY_SOLVED",
                "solve_time": 0.1,
                "objective": 0.1,
                "solution": {
                    "baseMVA": 1.0,
                    "per_unit": true,
                    "bus": {
                        "1": {"vm": 1.02, "va": 0.0},
                        "2": {"vm": 1.03, "va": -2.6},
                        "3": {"vm": 1.07, "va": -2.62}
                    },
                    "gen": {"1": {"pg": -0.1, "qg": -0.05}}
                }
            }))?)
        }
    }

    fn test_net() -> Network {
        let mut pnet = build_pypsa_test_net();
        pnet.calculate_dependent_values().unwrap();
        from_pypsa(&pnet).unwrap()
    }

    #[test]
    fn test_results_are_read_back() {
        let net = test_net();
        let backend = FakeBackend::new(true, false);
        let solved = run_pm(&net, &backend, &OpfOptions::default()).unwrap();
        assert!(net.res_bus.is_empty());
        assert_eq!(solved.res_bus.len(), 3);
        assert_eq!(solved.res_bus[2].vm_pu, 1.07);
        assert!((solved.res_bus[1].va_degree - (-2.6f64).to_degrees()).abs() < 1e-12);
        assert_eq!(solved.res_ext_grid[0].p_mw, -0.1);
        // temporary buffer is gone once the run is over
        assert!(!backend.seen().exists());
    }

    #[test]
    fn test_unavailable_backend_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");
        let options = OpfOptions {
            buffer_file: Some(path.clone()),
            ..Default::default()
        };
        let backend = FakeBackend::new(false, false);
        let err = run_pm(&test_net(), &backend, &options).unwrap_err();
        assert!(matches!(err, SolverError::Unavailable { ref backend, .. } if backend == "fake"));
        assert!(!path.exists());
        assert!(backend.seen.borrow().is_none());
    }

    #[test]
    fn test_failed_run_removes_temp_buffer() {
        let backend = FakeBackend::new(true, true);
        let err = run_pm(&test_net(), &backend, &OpfOptions::default()).unwrap_err();
        assert!(matches!(err, SolverError::Execution { exit_code: Some(1), .. }));
        let seen = backend.seen();
        assert!(seen.file_name().unwrap().to_string_lossy().starts_with("pp_to_pm_"));
        assert!(!seen.exists());
    }

    #[test]
    fn test_given_buffer_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");
        let options = OpfOptions {
            buffer_file: Some(path.clone()),
            ..Default::default()
        };
        let backend = FakeBackend::new(true, true);
        assert!(run_pm(&test_net(), &backend, &options).is_err());
        assert_eq!(backend.seen(), path);
        assert!(path.exists());
    }

    #[test]
    fn test_keep_buffer_file() {
        let options = OpfOptions {
            delete_buffer_file: false,
            ..Default::default()
        };
        let backend = FakeBackend::new(true, false);
        run_pm(&test_net(), &backend, &options).unwrap();
        let seen = backend.seen();
        assert!(seen.exists());
        fs::remove_file(seen).unwrap();
    }
}
