//! Power flow on a [`Network`] and extraction of its result tables.

use num_complex::Complex64;
use tracing::debug;

use super::file_io::*;
use super::network_converter::BusPositions;
use crate::basic::system::*;
use crate::error::PowerFlowError;

/// Runs a Newton-Raphson power flow and writes `res_bus`, `res_ext_grid` and `res_gen`.
///
/// Existing results are cleared first, so a failed run leaves the result tables empty.
/// Returns the number of iterations used.
pub fn runpp(net: &mut Network, options: &PowerFlowOptions) -> Result<usize, PowerFlowError> {
    net.clear_results();
    let pf = PFNetwork::try_from(&*net)?;
    let res = pf.run_pf(options)?;
    debug!(iterations = res.iterations, buses = pf.buses.len(), "power flow converged");

    let ybus = pf.create_y_bus();
    let s_inj = res.s_injection(&ybus, pf.s_base);
    let positions = BusPositions::new(&net.bus);
    extract_res_bus(net, &positions, &res, &s_inj)?;
    extract_res_injections(net, &pf, &positions, &s_inj)?;
    Ok(res.iterations)
}

fn extract_res_bus(
    net: &mut Network,
    positions: &BusPositions,
    res: &PowerFlowResult,
    s_inj: &nalgebra::DVector<Complex64>,
) -> Result<(), PowerFlowError> {
    let mut rows = Vec::with_capacity(net.bus.len());
    for bus in &net.bus {
        let row = match positions.get("bus", bus.index)? {
            Some(p) => ResBus {
                index: bus.index,
                vm_pu: res.v[p].norm(),
                va_degree: res.v[p].arg().to_degrees(),
                p_mw: -s_inj[p].re,
                q_mvar: -s_inj[p].im,
            },
            None => ResBus {
                index: bus.index,
                vm_pu: f64::NAN,
                va_degree: f64::NAN,
                p_mw: 0.0,
                q_mvar: 0.0,
            },
        };
        rows.push(row);
    }
    net.res_bus = rows;
    Ok(())
}

/// Splits the power a bus must supply between the units that balance it.
///
/// Slack units (ext grids and slack generators) share what is left at their bus
/// equally; voltage controlled generators at non-slack buses share the reactive power.
fn extract_res_injections(
    net: &mut Network,
    pf: &PFNetwork,
    positions: &BusPositions,
    s_inj: &nalgebra::DVector<Complex64>,
) -> Result<(), PowerFlowError> {
    let n = pf.buses.len();
    // generation required at each bus on top of the fixed PQ injections
    let mut balance: Vec<Complex64> = s_inj.iter().copied().collect();
    for node in &pf.pq_loads {
        balance[node.bus] += node.s;
    }
    let mut slack_units = vec![0usize; n];
    for e in &pf.ext {
        slack_units[e.bus] += 1;
    }
    let mut pv_units = vec![0usize; n];
    for node in &pf.pv_nodes {
        if slack_units[node.bus] > 0 {
            balance[node.bus] -= Complex64::new(node.p, 0.0);
        } else {
            pv_units[node.bus] += 1;
        }
    }

    let mut res_ext_grid = Vec::with_capacity(net.ext_grid.len());
    for e in &net.ext_grid {
        let s = match positions.get("ext_grid", e.bus)? {
            Some(p) if e.in_service => balance[p] / slack_units[p] as f64,
            _ => Complex64::new(f64::NAN, f64::NAN),
        };
        res_ext_grid.push(ResInjection { index: e.index, p_mw: s.re, q_mvar: s.im });
    }

    let mut res_gen = Vec::with_capacity(net.r#gen.len());
    for g in &net.r#gen {
        let row = match positions.get("gen", g.bus)? {
            Some(p) if g.in_service && g.slack => {
                let s = balance[p] / slack_units[p] as f64;
                ResInjection { index: g.index, p_mw: s.re, q_mvar: s.im }
            }
            Some(p) if g.in_service && slack_units[p] == 0 => ResInjection {
                index: g.index,
                p_mw: g.p_mw * g.scaling,
                q_mvar: balance[p].im / pv_units[p] as f64,
            },
            Some(_) if g.in_service => ResInjection {
                index: g.index,
                p_mw: g.p_mw * g.scaling,
                q_mvar: 0.0,
            },
            _ => ResInjection { index: g.index, p_mw: f64::NAN, q_mvar: f64::NAN },
        };
        res_gen.push(row);
    }

    net.res_ext_grid = res_ext_grid;
    net.res_gen = res_gen;
    Ok(())
}
