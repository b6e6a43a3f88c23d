//! Reading a PowerModels result back into the network's result tables.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;

use super::to_pm::{PmGenSource, PmLookup};
use crate::error::SolverError;
use crate::io::pandapower::{Network, ResBus, ResInjection};

/// Termination statuses that carry a usable solution.
const ACCEPTED: [&str; 4] = [
    "LOCALLY_SOLVED",
    "OPTIMAL",
    "ALMOST_LOCALLY_SOLVED",
    "ALMOST_OPTIMAL",
];

fn status_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    Ok(match val {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PmBusSolution {
    pub vm: f64,
    /// Radians.
    pub va: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PmGenSolution {
    pub pg: f64,
    #[serde(default)]
    pub qg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PmSolution {
    pub bus: HashMap<String, PmBusSolution>,
    pub r#gen: HashMap<String, PmGenSolution>,
    #[serde(rename = "baseMVA")]
    pub base_mva: Option<f64>,
    pub per_unit: Option<bool>,
}

/// The result dictionary written by PowerModels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PmResult {
    #[serde(deserialize_with = "status_string")]
    pub termination_status: String,
    #[serde(default)]
    pub solve_time: f64,
    #[serde(default)]
    pub objective: Option<f64>,
    #[serde(default)]
    pub solution: PmSolution,
}

impl PmResult {
    pub fn is_success(&self) -> bool {
        ACCEPTED.contains(&self.termination_status.as_str())
    }
}

/// Writes bus voltages and generator set points of `result` into the result tables of `net`.
///
/// Bus powers follow the load convention, as after a power flow.
pub fn read_pm_results_to_net(
    net: &mut Network,
    lookup: &PmLookup,
    result: &PmResult,
) -> Result<(), SolverError> {
    if !result.is_success() {
        return Err(SolverError::Infeasible(result.termination_status.clone()));
    }
    info!(
        status = %result.termination_status,
        solve_time = result.solve_time,
        objective = ?result.objective,
        "optimal power flow finished"
    );
    net.clear_results();
    // solutions already in MW are returned with per_unit = false
    let base = if result.solution.per_unit == Some(false) { 1.0 } else { net.sn_mva };

    let mut bus_power: HashMap<i64, (f64, f64)> = HashMap::new();
    for l in net.load.iter().filter(|l| l.in_service) {
        let e = bus_power.entry(l.bus).or_default();
        e.0 += l.p_mw * l.scaling;
        e.1 += l.q_mvar * l.scaling;
    }
    for s in net.sgen.iter().filter(|s| s.in_service) {
        let e = bus_power.entry(s.bus).or_default();
        e.0 -= s.p_mw * s.scaling;
        e.1 -= s.q_mvar * s.scaling;
    }

    let mut ext = HashMap::new();
    let mut gens = HashMap::new();
    for (k, source) in lookup.r#gen.iter().enumerate() {
        let sol = result
            .solution
            .r#gen
            .get(&(k + 1).to_string())
            .ok_or_else(|| SolverError::MalformedResult(format!("no solution for gen {}", k + 1)))?;
        let (p, q) = (sol.pg * base, sol.qg * base);
        let bus = match source {
            PmGenSource::ExtGrid(i) => {
                ext.insert(*i, (p, q));
                net.ext_grid.iter().find(|e| e.index == *i).map(|e| e.bus)
            }
            PmGenSource::Gen(i) => {
                gens.insert(*i, (p, q));
                net.r#gen.iter().find(|g| g.index == *i).map(|g| g.bus)
            }
        };
        if let Some(bus) = bus {
            let e = bus_power.entry(bus).or_default();
            e.0 -= p;
            e.1 -= q;
        }
    }

    let mut res_bus = Vec::with_capacity(net.bus.len());
    for bus in &net.bus {
        let row = match lookup.bus.iter().position(|&b| b == bus.index) {
            Some(k) => {
                let sol = result
                    .solution
                    .bus
                    .get(&(k + 1).to_string())
                    .ok_or_else(|| {
                        SolverError::MalformedResult(format!("no solution for bus {}", k + 1))
                    })?;
                let (p, q) = bus_power.get(&bus.index).copied().unwrap_or_default();
                ResBus {
                    index: bus.index,
                    vm_pu: sol.vm,
                    va_degree: sol.va.to_degrees(),
                    p_mw: p,
                    q_mvar: q,
                }
            }
            None => ResBus {
                index: bus.index,
                vm_pu: f64::NAN,
                va_degree: f64::NAN,
                p_mw: 0.0,
                q_mvar: 0.0,
            },
        };
        res_bus.push(row);
    }
    net.res_bus = res_bus;

    let nan = (f64::NAN, f64::NAN);
    net.res_ext_grid = net
        .ext_grid
        .iter()
        .map(|e| {
            let (p_mw, q_mvar) = ext.get(&e.index).copied().unwrap_or(nan);
            ResInjection { index: e.index, p_mw, q_mvar }
        })
        .collect();
    net.res_gen = net
        .r#gen
        .iter()
        .map(|g| {
            let (p_mw, q_mvar) = gens.get(&g.index).copied().unwrap_or(nan);
            ResInjection { index: g.index, p_mw, q_mvar }
        })
        .collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pandapower::*;

    fn net_and_lookup() -> (Network, PmLookup) {
        let mut net = create_empty_network();
        let a = create_bus(&mut net, 0.4, None);
        let b = create_bus(&mut net, 0.4, None);
        create_ext_grid(&mut net, a, 1.0, None);
        create_load(&mut net, b, 0.1, 0.02, None);
        let lookup = PmLookup {
            bus: vec![a, b],
            r#gen: vec![PmGenSource::ExtGrid(0)],
        };
        (net, lookup)
    }

    const RESULT: &str = r#"{
        "termination_status": "LOCALLY_SOLVED",
        "solve_time": 0.12,
        "objective": 0.101,
        "solution": {
            "baseMVA": 1.0,
            "per_unit": true,
            "bus": {"1": {"vm": 1.0, "va": 0.0}, "2": {"vm": 0.97, "va": -0.01}},
            "gen": {"1": {"pg": 0.101, "qg": 0.021}}
        }
    }"#;

    #[test]
    fn test_read_results() {
        let (mut net, lookup) = net_and_lookup();
        let result: PmResult = serde_json::from_str(RESULT).unwrap();
        read_pm_results_to_net(&mut net, &lookup, &result).unwrap();
        assert_eq!(net.res_bus[1].vm_pu, 0.97);
        assert!((net.res_bus[1].va_degree - (-0.01f64).to_degrees()).abs() < 1e-12);
        assert_eq!(net.res_bus[1].p_mw, 0.1);
        assert!((net.res_bus[0].p_mw + 0.101).abs() < 1e-12);
        assert_eq!(net.res_ext_grid[0].p_mw, 0.101);
    }

    #[test]
    fn test_infeasible() {
        let (mut net, lookup) = net_and_lookup();
        let result: PmResult =
            serde_json::from_str(r#"{"termination_status": "LOCALLY_INFEASIBLE"}"#).unwrap();
        assert!(matches!(
            read_pm_results_to_net(&mut net, &lookup, &result),
            Err(SolverError::Infeasible(s)) if s == "LOCALLY_INFEASIBLE"
        ));
    }

    #[test]
    fn test_missing_bus_solution() {
        let (mut net, lookup) = net_and_lookup();
        let result: PmResult = serde_json::from_str(
            r#"{"termination_status": "OPTIMAL", "solution": {"gen": {"1": {"pg": 0.1, "qg": 0.0}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            read_pm_results_to_net(&mut net, &lookup, &result),
            Err(SolverError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_numeric_status() {
        let result: PmResult = serde_json::from_str(r#"{"termination_status": 4}"#).unwrap();
        assert_eq!(result.termination_status, "4");
        assert!(!result.is_success());
    }
}
