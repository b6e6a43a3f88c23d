//! TOML configuration of the binary and of library runs.
//!
//! ```toml
//! [powerflow]
//! max_iteration = 100
//! tolerance_mva = 1e-8
//!
//! [verify]
//! abs = 1e-8
//! rel = 1e-5
//!
//! [opf]
//! entry_point = "run_powermodels_opf"
//! timeout_secs = 600
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::basic::system::PowerFlowOptions;
use crate::error::IoError;
use crate::opf::OpfOptions;
use crate::verify::Tolerance;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub powerflow: PowerFlowOptions,
    pub verify: Tolerance,
    pub opf: OpfOptions,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, IoError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, IoError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}
