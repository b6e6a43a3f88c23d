mod basic;
pub mod config;
pub mod error;
pub mod io;
pub mod opf;
pub mod testcases;
pub mod verify;

pub use basic::system;

pub mod prelude {
    use crate::basic;
    pub use crate::io::{pandapower, pypsa};
    pub use basic::system::{PFNetwork, PowerFlowOptions, PowerFlowResult, RunPF};

    pub use crate::config::Config;
    pub use crate::error::{ConvertError, Error, IoError, PowerFlowError, SolverError, VerifyError};
    pub use crate::opf::{JuliaPandaModels, OpfBackend, OpfOptions, run_pm};
    pub use crate::verify::{Tolerance, check_results_equal};
}
