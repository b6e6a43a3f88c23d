use std::collections::HashMap;
use std::f64::consts::PI;

use num_complex::Complex64;

use super::file_io::*;
use crate::basic::system::*;
use crate::error::PowerFlowError;

/// Maps pandapower bus indices of in-service buses to power flow positions.
pub(crate) struct BusPositions {
    pos: HashMap<i64, usize>,
    out_of_service: Vec<i64>,
}

impl BusPositions {
    pub(crate) fn new(bus: &[Bus]) -> Self {
        let pos = bus
            .iter()
            .filter(|b| b.in_service)
            .enumerate()
            .map(|(p, b)| (b.index, p))
            .collect();
        let out_of_service = bus.iter().filter(|b| !b.in_service).map(|b| b.index).collect();
        Self { pos, out_of_service }
    }

    /// `Ok(None)` when the bus exists but is out of service.
    pub(crate) fn get(
        &self,
        element: &'static str,
        bus: i64,
    ) -> Result<Option<usize>, PowerFlowError> {
        match self.pos.get(&bus) {
            Some(&p) => Ok(Some(p)),
            None if self.out_of_service.contains(&bus) => Ok(None),
            None => Err(PowerFlowError::UnknownBus { element, bus }),
        }
    }
}

/// Converts a line to its equivalent admittance branches.
fn line_to_admit(
    wbase: f64,
    v_base: f64,
    from: usize,
    to: usize,
    line: &Line,
) -> Vec<AdmittanceBranch> {
    let parallel = line.parallel.max(1) as f64;
    let mut out = Vec::with_capacity(3);

    let b = wbase * 1e-9 * line.c_nf_per_km * line.length_km * parallel;
    let g = line.g_us_per_km * 1e-6 * line.length_km * parallel;
    if b != 0.0 || g != 0.0 {
        let half = Admittance(0.5 * Complex64::new(g, b));
        out.push(AdmittanceBranch { y: half, port: Port2::shunt(from), v_base });
        out.push(AdmittanceBranch { y: half, port: Port2::shunt(to), v_base });
    }

    let z = Complex64::new(line.r_ohm_per_km, line.x_ohm_per_km) * line.length_km / parallel;
    out.push(AdmittanceBranch {
        y: Admittance(1.0 / z),
        port: Port2::series(from, to),
        v_base,
    });
    out
}

/// Off-nominal tap magnitude and extra phase shift in degrees.
fn tap_adjustment(item: &Transformer) -> (f64, f64) {
    let steps = item.tap_pos.unwrap_or(0.0) - item.tap_neutral.unwrap_or(0.0);
    let mut tap_m = 1.0 + steps * 0.01 * item.tap_step_percent.unwrap_or(0.0);
    let mut shift = if item.tap_phase_shifter {
        steps * item.tap_step_degree.unwrap_or(0.0)
    } else {
        0.0
    };
    if item.tap_side.as_deref() == Some("lv") {
        tap_m = 1.0 / tap_m;
        shift = -shift;
    }
    (tap_m, shift)
}

/// Converts a transformer to its equivalent branch on the low voltage base.
fn trafo_to_branch(item: &Transformer, hv: (usize, f64), lv: (usize, f64)) -> TransformerBranch {
    let v_base = lv.1;
    let parallel = item.parallel.max(1) as f64;
    let zbase = v_base * v_base / item.sn_mva;

    let z = zbase * item.vk_percent * 0.01;
    let re = zbase * item.vkr_percent * 0.01;
    let im = (z * z - re * re).max(0.0).sqrt();
    let y = parallel / Complex64::new(re, im);

    let gm = item.pfe_kw * 0.001 / item.sn_mva;
    let i0 = item.i0_percent * 0.01;
    let bm = (i0 * i0 - gm * gm).max(0.0).sqrt();
    let y_mag = Complex64::new(gm, -bm) * parallel / zbase;

    let (tap_m, tap_shift) = tap_adjustment(item);
    let nominal = (item.vn_hv_kv / hv.1) / (item.vn_lv_kv / lv.1);

    TransformerBranch {
        y: Admittance(y),
        y_mag: Admittance(y_mag),
        tap: tap_m * nominal,
        shift: (item.shift_degree + tap_shift).to_radians(),
        hv_bus: hv.0,
        lv_bus: lv.0,
        v_base,
    }
}

/// Converts a shunt to its equivalent admittance.
fn shunt_to_admit(item: &Shunt, bus: usize, bus_vn: f64) -> AdmittanceBranch {
    let v_base = if item.vn_kv > 0.0 { item.vn_kv } else { bus_vn };
    let y = Complex64::new(item.p_mw, -item.q_mvar) * item.step as f64 / (v_base * v_base);
    AdmittanceBranch {
        y: Admittance(y),
        port: Port2::shunt(bus),
        v_base,
    }
}

impl TryFrom<&Network> for PFNetwork {
    type Error = PowerFlowError;

    /// Builds the power flow model from the in-service part of a network.
    fn try_from(net: &Network) -> Result<Self, Self::Error> {
        let positions = BusPositions::new(&net.bus);
        let buses: Vec<PFBus> = net
            .bus
            .iter()
            .filter(|b| b.in_service)
            .map(|b| PFBus { id: b.index, vn_kv: b.vn_kv })
            .collect();
        let wbase = net.f_hz * 2.0 * PI;

        let mut y_br = Vec::new();
        for line in net.line.iter().filter(|l| l.in_service) {
            let from = positions.get("line", line.from_bus)?;
            let to = positions.get("line", line.to_bus)?;
            if let (Some(f), Some(t)) = (from, to) {
                y_br.extend(line_to_admit(wbase, buses[f].vn_kv, f, t, line));
            }
        }
        for shunt in net.shunt.iter().filter(|s| s.in_service) {
            if let Some(p) = positions.get("shunt", shunt.bus)? {
                y_br.push(shunt_to_admit(shunt, p, buses[p].vn_kv));
            }
        }

        let mut trafos = Vec::new();
        for t in net.trafo.iter().filter(|t| t.in_service) {
            let hv = positions.get("trafo", t.hv_bus)?;
            let lv = positions.get("trafo", t.lv_bus)?;
            if let (Some(h), Some(l)) = (hv, lv) {
                trafos.push(trafo_to_branch(t, (h, buses[h].vn_kv), (l, buses[l].vn_kv)));
            }
        }

        let mut pq_loads = Vec::new();
        for load in net.load.iter().filter(|l| l.in_service) {
            if let Some(bus) = positions.get("load", load.bus)? {
                let s = Complex64::new(load.p_mw, load.q_mvar) * load.scaling;
                pq_loads.push(PQNode { s, bus });
            }
        }
        for sgen in net.sgen.iter().filter(|s| s.in_service) {
            if let Some(bus) = positions.get("sgen", sgen.bus)? {
                let s = -Complex64::new(sgen.p_mw, sgen.q_mvar) * sgen.scaling;
                pq_loads.push(PQNode { s, bus });
            }
        }

        let mut ext = Vec::new();
        for e in net.ext_grid.iter().filter(|e| e.in_service) {
            if let Some(bus) = positions.get("ext_grid", e.bus)? {
                ext.push(ExtGridNode {
                    v: e.vm_pu,
                    phase: e.va_degree.to_radians(),
                    bus,
                });
            }
        }

        let mut pv_nodes = Vec::new();
        for g in net.r#gen.iter().filter(|g| g.in_service) {
            if let Some(bus) = positions.get("gen", g.bus)? {
                if g.slack {
                    ext.push(ExtGridNode { v: g.vm_pu, phase: 0.0, bus });
                } else {
                    pv_nodes.push(PVNode { p: g.p_mw * g.scaling, v: g.vm_pu, bus });
                }
            }
        }

        Ok(Self {
            s_base: net.sn_mva,
            buses,
            pq_loads,
            pv_nodes,
            ext,
            y_br,
            trafos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pandapower::create::*;

    #[test]
    fn test_line_admittance() {
        let line = Line {
            length_km: 0.5,
            r_ohm_per_km: 0.2,
            x_ohm_per_km: 0.4,
            c_nf_per_km: 100.0,
            parallel: 2,
            ..Default::default()
        };
        let br = line_to_admit(2.0 * PI * 50.0, 20.0, 0, 1, &line);
        assert_eq!(br.len(), 3);
        // two circuits in parallel halve the impedance
        let z = 1.0 / br[2].y.0;
        assert!((z - Complex64::new(0.05, 0.1)).norm() < 1e-12);
        // 100 nF/km * 0.5 km * 2 circuits, split between both ends
        let b = 2.0 * PI * 50.0 * 100e-9 * 0.5 * 2.0 * 0.5;
        assert!((br[0].y.0.im - b).abs() < 1e-15);
        assert_eq!(br[0].port, Port2::shunt(0));
    }

    #[test]
    fn test_trafo_branch() {
        let mut net = create_empty_network();
        let hv = create_bus(&mut net, 20.0, None);
        let lv = create_bus(&mut net, 0.4, None);
        create_transformer(&mut net, hv, lv, "0.4 MVA 20/0.4 kV").unwrap();
        let br = trafo_to_branch(&net.trafo[0], (0, 20.0), (1, 0.4));
        let zbase = 0.4 * 0.4 / 0.4;
        let z = 1.0 / br.y.0;
        assert!((z.norm() - 0.06 * zbase).abs() < 1e-12);
        assert!((z.re - 0.01425 * zbase).abs() < 1e-12);
        assert!((br.tap - 1.0).abs() < 1e-12);
        assert!((br.shift - 150f64.to_radians()).abs() < 1e-12);
        assert!(br.y_mag.0.im < 0.0);
    }

    #[test]
    fn test_tap_lv_side() {
        let t = Transformer {
            tap_pos: Some(2.0),
            tap_neutral: Some(0.0),
            tap_step_percent: Some(2.5),
            tap_side: Some("lv".into()),
            ..Default::default()
        };
        let (tap_m, shift) = tap_adjustment(&t);
        assert!((tap_m - 1.0 / 1.05).abs() < 1e-12);
        assert_eq!(shift, 0.0);
    }

    #[test]
    fn test_out_of_service_and_unknown_bus() {
        let mut net = create_empty_network();
        let a = create_bus(&mut net, 0.4, None);
        let b = create_bus(&mut net, 0.4, None);
        create_ext_grid(&mut net, a, 1.0, None);
        create_load(&mut net, b, 0.01, 0.0, None);
        net.bus[1].in_service = false;
        let pf = PFNetwork::try_from(&net).unwrap();
        assert_eq!(pf.buses.len(), 1);
        assert!(pf.pq_loads.is_empty());

        create_load(&mut net, 42, 0.01, 0.0, None);
        assert!(matches!(
            PFNetwork::try_from(&net),
            Err(PowerFlowError::UnknownBus { element: "load", bus: 42 })
        ));
    }

    #[test]
    fn test_shunt_consumes_rated_power() {
        let s = Shunt {
            q_mvar: 0.1,
            vn_kv: 20.0,
            ..Default::default()
        };
        let br = shunt_to_admit(&s, 0, 20.0);
        // S = V^2 * conj(y) at rated voltage
        let s_mva = br.y.0.conj() * 20.0 * 20.0;
        assert!((s_mva - Complex64::new(0.0, 0.1)).norm() < 1e-12);
    }
}
