//! Newton-Raphson power flow on the PyPSA-style model.

use std::collections::HashMap;

use num_complex::Complex64;
use tracing::debug;

use super::network::{BusesT, SourceNetwork};
use crate::basic::system::*;
use crate::error::{ConvertError, Result};

/// System base of the source side in MVA.
const S_BASE: f64 = 1.0;

fn position(
    pos: &HashMap<&str, usize>,
    element: &'static str,
    name: &str,
    bus: &str,
) -> std::result::Result<usize, ConvertError> {
    pos.get(bus).copied().ok_or_else(|| ConvertError::MissingReference {
        element,
        name: name.to_owned(),
        bus: bus.to_owned(),
    })
}

impl SourceNetwork {
    /// Builds the power flow model. Line and transformer parameters must already be set,
    /// see [`SourceNetwork::calculate_dependent_values`].
    pub fn to_pf_network(&self) -> std::result::Result<PFNetwork, ConvertError> {
        let pos: HashMap<&str, usize> = self
            .buses
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();
        let buses: Vec<PFBus> = self
            .buses
            .iter()
            .enumerate()
            .map(|(i, b)| PFBus { id: i as i64, vn_kv: b.v_nom })
            .collect();

        let mut y_br = Vec::new();
        for l in &self.lines {
            let f = position(&pos, "line", &l.name, &l.bus0)?;
            let t = position(&pos, "line", &l.name, &l.bus1)?;
            let v_base = buses[f].vn_kv;
            if l.g != 0.0 || l.b != 0.0 {
                let half = Admittance(0.5 * Complex64::new(l.g, l.b));
                y_br.push(AdmittanceBranch { y: half, port: Port2::shunt(f), v_base });
                y_br.push(AdmittanceBranch { y: half, port: Port2::shunt(t), v_base });
            }
            y_br.push(AdmittanceBranch {
                y: Admittance(1.0 / Complex64::new(l.r, l.x)),
                port: Port2::series(f, t),
                v_base,
            });
        }

        let mut trafos = Vec::new();
        for tr in &self.transformers {
            let hv = position(&pos, "transformer", &tr.name, &tr.bus0)?;
            let lv = position(&pos, "transformer", &tr.name, &tr.bus1)?;
            let v_base = buses[lv].vn_kv;
            let per_siemens = tr.s_nom / (v_base * v_base);
            trafos.push(TransformerBranch {
                y: Admittance(per_siemens / Complex64::new(tr.r, tr.x)),
                y_mag: Admittance(Complex64::new(tr.g, tr.b) * per_siemens),
                tap: tr.tap_ratio,
                shift: tr.phase_shift.to_radians(),
                hv_bus: hv,
                lv_bus: lv,
                v_base,
            });
        }

        let mut pq_loads = Vec::new();
        for load in &self.loads {
            let bus = position(&pos, "load", &load.name, &load.bus)?;
            let s = -load.sign * Complex64::new(load.p_set, load.q_set);
            pq_loads.push(PQNode { s, bus });
        }

        let mut ext = Vec::new();
        let mut pv_nodes = Vec::new();
        for g in &self.generators {
            let bus = position(&pos, "generator", &g.name, &g.bus)?;
            let v = self.buses[bus].v_mag_pu_set;
            match g.control.as_str() {
                "Slack" => ext.push(ExtGridNode { v, phase: 0.0, bus }),
                "PV" => pv_nodes.push(PVNode { p: g.p_set, v, bus }),
                "PQ" => pq_loads.push(PQNode { s: -Complex64::new(g.p_set, g.q_set), bus }),
                other => {
                    return Err(ConvertError::UnsupportedControl {
                        name: g.name.clone(),
                        control: other.to_owned(),
                    });
                }
            }
        }

        Ok(PFNetwork {
            s_base: S_BASE,
            buses,
            pq_loads,
            pv_nodes,
            ext,
            y_br,
            trafos,
        })
    }

    /// Solves the network and stores bus voltages in `buses_t` for the snapshot "now".
    ///
    /// Returns the number of Newton iterations.
    pub fn pf(&mut self, options: &PowerFlowOptions) -> Result<usize> {
        self.buses_t = None;
        let pf = self.to_pf_network()?;
        let res = pf.run_pf(options)?;
        debug!(
            iterations = res.iterations,
            buses = self.buses.len(),
            "source power flow converged"
        );

        let mut out = BusesT::default();
        for (bus, v) in self.buses.iter().zip(res.v.iter()) {
            out.v_mag_pu.insert(bus.name.clone(), v.norm());
            out.v_ang.insert(bus.name.clone(), v.arg());
        }
        self.buses_t = Some(out);
        Ok(res.iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pypsa::network::*;

    #[test]
    fn test_load_sign_convention() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 0.4));
        net.loads.push(Load::new("consumer", "a", 0.1, 0.02));
        net.loads.push(Load::new("producer", "a", 0.2, 0.07).with_sign(1.0));
        let pf = net.to_pf_network().unwrap();
        assert_eq!(pf.pq_loads[0].s, Complex64::new(0.1, 0.02));
        assert_eq!(pf.pq_loads[1].s, Complex64::new(-0.2, -0.07));
    }

    #[test]
    fn test_missing_bus() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 0.4));
        net.lines.push(Line::new("l", "a", "nowhere").with_impedance(0.1, 0.1, 1.0));
        let err = net.to_pf_network().unwrap_err();
        assert!(matches!(err, ConvertError::MissingReference { element: "line", .. }));
    }

    #[test]
    fn test_pf_fills_results() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 0.4).with_v_mag_pu_set(1.02));
        net.buses.push(Bus::new("b", 0.4));
        net.lines.push(Line::new("l", "a", "b").with_impedance(0.01, 0.005, 0.1));
        net.generators.push(Generator::new("grid", "a", "Slack"));
        net.loads.push(Load::new("load", "b", 0.05, 0.0));
        net.pf(&PowerFlowOptions::default()).unwrap();
        let res = net.buses_t.as_ref().unwrap();
        assert!((res.v_mag_pu["a"] - 1.02).abs() < 1e-12);
        assert!(res.v_mag_pu["b"] < 1.02);
        assert!(res.v_ang["b"] < 0.0);
    }

    #[test]
    fn test_unsupported_control() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 0.4));
        net.generators.push(Generator::new("g", "a", "Droop"));
        assert!(matches!(
            net.to_pf_network(),
            Err(ConvertError::UnsupportedControl { .. })
        ));
    }
}
