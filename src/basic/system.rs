use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::basic::newtonpf::newton_pf;
use crate::error::PowerFlowError;

pub mod admittance;
pub use admittance::*;

/// Represents a branch with admittance and port information.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AdmittanceBranch {
    /// The admittance value of the branch.
    pub y: Admittance,
    /// The port information of the branch.
    pub port: Port2,
    /// base voltage for per-unit values
    pub v_base: f64,
}

/// A two-winding transformer with a complex ratio on the high voltage side.
///
/// The series admittance sits on the low voltage side, the magnetising
/// admittance on the high voltage terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerBranch {
    /// Series admittance referred to the low voltage side.
    pub y: Admittance,
    /// Magnetising admittance referred to the low voltage side.
    pub y_mag: Admittance,
    /// Off-nominal ratio magnitude in per unit.
    pub tap: f64,
    /// Phase shift from the high to the low voltage side in radians.
    pub shift: f64,
    /// High voltage bus position.
    pub hv_bus: usize,
    /// Low voltage bus position.
    pub lv_bus: usize,
    /// base voltage for per-unit values
    pub v_base: f64,
}

impl TransformerBranch {
    /// Complex ratio `tap * exp(j * shift)`.
    pub fn ratio(&self) -> Complex64 {
        Complex64::from_polar(self.tap, self.shift)
    }
}

/// Represents a node with specified power and bus information in a power system.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PQNode {
    /// The complex power consumed at the node in MVA.
    pub s: Complex64,
    /// The bus position of the node.
    pub bus: usize,
}

/// Represents a node with specified active power, voltage, and bus information in a power system.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PVNode {
    /// The active power injected at the node in MW.
    pub p: f64,
    /// The voltage magnitude at the node.
    pub v: f64,
    /// The bus position of the node.
    pub bus: usize,
}

/// Represents an external grid node with voltage, phase, and bus information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtGridNode {
    /// The voltage magnitude at the external grid node.
    pub v: f64,
    /// The phase angle at the external grid node in radians.
    pub phase: f64,
    /// The bus position of the external grid node.
    pub bus: usize,
}

impl Default for ExtGridNode {
    /// Creates a default external grid node with voltage set to 1.0.
    fn default() -> Self {
        Self {
            v: 1.0,
            phase: Default::default(),
            bus: Default::default(),
        }
    }
}

/// A bus of the power flow model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PFBus {
    /// Identifier of the bus in the model it was built from.
    pub id: i64,
    /// Nominal voltage in kV.
    pub vn_kv: f64,
}

/// Numerical settings of the Newton-Raphson power flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PowerFlowOptions {
    /// Iteration limit.
    pub max_iteration: usize,
    /// Largest acceptable power mismatch in MVA.
    pub tolerance_mva: f64,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            max_iteration: 100,
            tolerance_mva: 1e-8,
        }
    }
}

/// A power flow network: base power, buses, PQ/PV/slack nodes and branches.
///
/// Buses are addressed by position; every node and branch refers to positions in `buses`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PFNetwork {
    /// The base power of the network.
    pub s_base: f64,
    /// The list of buses in the network.
    pub buses: Vec<PFBus>,
    /// The list of PQ nodes in the network.
    pub pq_loads: Vec<PQNode>,
    /// The list of PV nodes in the network.
    pub pv_nodes: Vec<PVNode>,
    /// The slack nodes of the network.
    pub ext: Vec<ExtGridNode>,
    /// The list of branches with admittance and port information in the network.
    pub y_br: Vec<AdmittanceBranch>,
    /// Transformers, which need an asymmetric stamp once they shift phase.
    pub trafos: Vec<TransformerBranch>,
}

/// Solved bus voltages in per unit, by bus position.
#[derive(Debug, Clone)]
pub struct PowerFlowResult {
    pub v: DVector<Complex64>,
    pub iterations: usize,
}

/// Creates the incidence matrix of the power flow network.
fn create_incidence_mat(nodes: usize, y_br: &[AdmittanceBranch]) -> CooMatrix<Complex64> {
    let mut incidence_matrix = CooMatrix::new(nodes, y_br.len());
    for (idx, i) in y_br.iter().enumerate() {
        if i.port[0] >= 0 {
            incidence_matrix.push(i.port[0] as usize, idx, Complex64::one());
        }
        if i.port[1] >= 0 {
            incidence_matrix.push(i.port[1] as usize, idx, -Complex64::one());
        }
    }
    incidence_matrix
}

/// Creates the nodal admittance matrix of the symmetric branches as `A * diag(y) * A^T`.
fn create_ybus(
    s_base: f64,
    incidence_matrix: &CooMatrix<Complex64>,
    admits: &[AdmittanceBranch],
) -> CsrMatrix<Complex64> {
    let mut diag_admit = CsrMatrix::identity(admits.len());
    diag_admit
        .values_mut()
        .iter_mut()
        .zip(admits)
        .for_each(|(x, br)| *x = br.y.0 * (br.v_base * br.v_base) / s_base);

    let incidence_matrix = CsrMatrix::from(incidence_matrix);
    &incidence_matrix * &(&diag_admit * &incidence_matrix.transpose())
}

/// Adds the two-port stamps of the transformers to a dense admittance matrix.
fn stamp_transformers(ybus: &mut DMatrix<Complex64>, s_base: f64, trafos: &[TransformerBranch]) {
    for t in trafos {
        let scale = t.v_base * t.v_base / s_base;
        let y = t.y.0 * scale;
        let n = t.ratio();
        let (f, l) = (t.hv_bus, t.lv_bus);
        ybus[(f, f)] += (y + t.y_mag.0 * scale) / n.norm_sqr();
        ybus[(f, l)] -= y / n.conj();
        ybus[(l, f)] -= y / n;
        ybus[(l, l)] += y;
    }
}

/// A trait for running power flow analysis.
pub trait RunPF {
    /// Creates the nodal admittance matrix (Ybus) of the power flow network in per unit.
    fn create_y_bus(&self) -> DMatrix<Complex64>;

    /// Creates the nodal power injection vector (Sbus) of the power flow network in per unit.
    fn create_s_bus(&self) -> DVector<Complex64>;

    /// Creates the initial voltage vector (V_init) of the power flow network.
    fn create_v_init(&self) -> DVector<Complex64>;

    /// Runs the power flow analysis.
    fn run_pf(&self, options: &PowerFlowOptions) -> Result<PowerFlowResult, PowerFlowError>;
}

impl PFNetwork {
    /// Bus positions of slack buses, deduplicated.
    pub fn slack_buses(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.ext.iter().map(|e| e.bus).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Splits non-slack buses into PV and PQ positions.
    pub fn bus_types(&self) -> (Vec<usize>, Vec<usize>) {
        let slack = self.slack_buses();
        let mut is_pv = vec![false; self.buses.len()];
        for node in &self.pv_nodes {
            is_pv[node.bus] = true;
        }
        let mut pv = Vec::new();
        let mut pq = Vec::new();
        for i in 0..self.buses.len() {
            if slack.binary_search(&i).is_ok() {
                continue;
            }
            if is_pv[i] { pv.push(i) } else { pq.push(i) }
        }
        (pv, pq)
    }

    /// Initial angles from the slack buses, walking through transformer phase shifts.
    ///
    /// Starting every bus at zero would put the low voltage side of a
    /// 150 degree transformer far from the solution.
    fn initial_angles(&self) -> Vec<f64> {
        let n = self.buses.len();
        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for br in &self.y_br {
            if br.port[0] >= 0 && br.port[1] >= 0 {
                let (a, b) = (br.port[0] as usize, br.port[1] as usize);
                adjacency[a].push((b, 0.0));
                adjacency[b].push((a, 0.0));
            }
        }
        for t in &self.trafos {
            adjacency[t.hv_bus].push((t.lv_bus, -t.shift));
            adjacency[t.lv_bus].push((t.hv_bus, t.shift));
        }

        let mut angle = vec![0.0; n];
        let mut seen = vec![false; n];
        let mut queue = VecDeque::new();
        for e in &self.ext {
            if !seen[e.bus] {
                seen[e.bus] = true;
                angle[e.bus] = e.phase;
                queue.push_back(e.bus);
            }
        }
        while let Some(bus) = queue.pop_front() {
            for &(next, delta) in &adjacency[bus] {
                if !seen[next] {
                    seen[next] = true;
                    angle[next] = angle[bus] + delta;
                    queue.push_back(next);
                }
            }
        }
        angle
    }
}

impl RunPF for PFNetwork {
    fn create_y_bus(&self) -> DMatrix<Complex64> {
        let nodes = self.buses.len();
        let incidence_matrix = create_incidence_mat(nodes, &self.y_br);
        let ybus = create_ybus(self.s_base, &incidence_matrix, &self.y_br);
        let mut ybus = DMatrix::from(&ybus);
        stamp_transformers(&mut ybus, self.s_base, &self.trafos);
        ybus
    }

    fn create_s_bus(&self) -> DVector<Complex64> {
        let nodes = self.buses.len();
        let mut sbus = DVector::zeros(nodes);
        for i in &self.pq_loads {
            sbus[i.bus] -= i.s;
        }
        for i in &self.pv_nodes {
            sbus[i.bus] += Complex64::new(i.p, 0.0);
        }

        let divider = 1.0 / self.s_base;
        sbus.apply(|x| (*x) *= divider);

        sbus
    }

    fn create_v_init(&self) -> DVector<Complex64> {
        let angle = self.initial_angles();
        let mut vbus =
            DVector::from_fn(self.buses.len(), |i, _| Complex64::from_polar(1.0, angle[i]));
        for i in &self.pv_nodes {
            vbus[i.bus] = Complex64::from_polar(i.v, angle[i.bus]);
        }
        for e in &self.ext {
            vbus[e.bus] = Complex64::from_polar(e.v, e.phase);
        }

        vbus
    }

    fn run_pf(&self, options: &PowerFlowOptions) -> Result<PowerFlowResult, PowerFlowError> {
        if self.ext.is_empty() {
            return Err(PowerFlowError::NoSlack);
        }
        let (pv, pq) = self.bus_types();
        let ybus = self.create_y_bus();
        let sbus = self.create_s_bus();
        let v_init = self.create_v_init();
        let tol = options.tolerance_mva / self.s_base;
        let (v, iterations) =
            newton_pf(&ybus, &sbus, &v_init, &pv, &pq, tol, options.max_iteration)?;
        Ok(PowerFlowResult { v, iterations })
    }
}

impl PowerFlowResult {
    /// Complex power injected at every bus in MVA.
    pub fn s_injection(&self, ybus: &DMatrix<Complex64>, s_base: f64) -> DVector<Complex64> {
        let i = ybus * &self.v;
        self.v.zip_map(&i, |v, i| v * i.conj() * s_base)
    }
}
