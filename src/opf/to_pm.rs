//! Conversion of a [`Network`] into the PowerModels.jl data dictionary.
//!
//! Everything is written in per unit on `sn_mva` with 1-based string keys.

use std::collections::HashMap;
use std::f64::consts::PI;

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::OpfOptions;
use crate::error::SolverError;
use crate::io::pandapower::Network;

/// Large bound used where the network carries no limit.
const NO_LIMIT: f64 = 1e9;

#[derive(Serialize)]
struct PmBus {
    index: usize,
    bus_i: usize,
    bus_type: i32,
    vm: f64,
    va: f64,
    vmin: f64,
    vmax: f64,
    base_kv: f64,
    zone: i64,
    area: i64,
    name: String,
}

#[derive(Serialize)]
struct PmGen {
    index: usize,
    gen_bus: usize,
    gen_status: i32,
    pg: f64,
    qg: f64,
    pmin: f64,
    pmax: f64,
    qmin: f64,
    qmax: f64,
    vg: f64,
    mbase: f64,
    model: i32,
    ncost: i32,
    cost: Vec<f64>,
}

#[derive(Serialize)]
struct PmLoad {
    index: usize,
    load_bus: usize,
    status: i32,
    pd: f64,
    qd: f64,
}

#[derive(Serialize)]
struct PmBranch {
    index: usize,
    f_bus: usize,
    t_bus: usize,
    br_status: i32,
    br_r: f64,
    br_x: f64,
    g_fr: f64,
    b_fr: f64,
    g_to: f64,
    b_to: f64,
    tap: f64,
    shift: f64,
    transformer: bool,
    rate_a: f64,
    angmin: f64,
    angmax: f64,
}

#[derive(Serialize)]
struct PmShunt {
    index: usize,
    shunt_bus: usize,
    status: i32,
    gs: f64,
    bs: f64,
}

/// The network element behind a PowerModels generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmGenSource {
    ExtGrid(i64),
    Gen(i64),
}

/// Maps PowerModels keys back to network indices. Position `k` holds key `k + 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PmLookup {
    pub bus: Vec<i64>,
    pub r#gen: Vec<PmGenSource>,
}

fn table<T: Serialize>(rows: Vec<T>) -> Result<Value, SolverError> {
    let mut map = Map::with_capacity(rows.len());
    for (k, row) in rows.into_iter().enumerate() {
        map.insert((k + 1).to_string(), serde_json::to_value(row)?);
    }
    Ok(Value::Object(map))
}

/// Builds the PowerModels dictionary of the in-service part of `net`.
pub fn convert_to_pm_structure(
    net: &Network,
    options: &OpfOptions,
) -> Result<(Value, PmLookup), SolverError> {
    let base = net.sn_mva;
    let mut lookup = PmLookup::default();
    let mut pm_bus: HashMap<i64, usize> = HashMap::new();
    let mut vn: HashMap<i64, f64> = HashMap::new();
    for b in net.bus.iter().filter(|b| b.in_service) {
        lookup.bus.push(b.index);
        pm_bus.insert(b.index, lookup.bus.len());
        vn.insert(b.index, b.vn_kv);
    }
    let resolve = |element: &str, bus: i64| -> Result<Option<usize>, SolverError> {
        match pm_bus.get(&bus) {
            Some(&k) => Ok(Some(k)),
            None if net.bus.iter().any(|b| b.index == bus) => Ok(None),
            None => Err(SolverError::InvalidRequest(format!(
                "{element} references unknown bus index {bus}"
            ))),
        }
    };

    let mut bus_type = vec![1; lookup.bus.len()];
    let mut gens = Vec::new();
    for e in net.ext_grid.iter().filter(|e| e.in_service) {
        let Some(k) = resolve("ext_grid", e.bus)? else { continue };
        bus_type[k - 1] = 3;
        gens.push(PmGen {
            index: gens.len() + 1,
            gen_bus: k,
            gen_status: 1,
            pg: 0.0,
            qg: 0.0,
            pmin: e.min_p_mw.unwrap_or(-NO_LIMIT) / base,
            pmax: e.max_p_mw.unwrap_or(NO_LIMIT) / base,
            qmin: e.min_q_mvar.unwrap_or(-NO_LIMIT) / base,
            qmax: e.max_q_mvar.unwrap_or(NO_LIMIT) / base,
            vg: e.vm_pu,
            mbase: base,
            model: 2,
            ncost: 2,
            cost: vec![1.0, 0.0],
        });
        lookup.r#gen.push(PmGenSource::ExtGrid(e.index));
    }
    for g in net.r#gen.iter().filter(|g| g.in_service) {
        let Some(k) = resolve("gen", g.bus)? else { continue };
        if bus_type[k - 1] != 3 {
            bus_type[k - 1] = if g.slack { 3 } else { 2 };
        }
        let p = g.p_mw * g.scaling;
        gens.push(PmGen {
            index: gens.len() + 1,
            gen_bus: k,
            gen_status: 1,
            pg: p / base,
            qg: 0.0,
            pmin: g.min_p_mw.unwrap_or(p) / base,
            pmax: g.max_p_mw.unwrap_or(p) / base,
            qmin: g.min_q_mvar.unwrap_or(-NO_LIMIT) / base,
            qmax: g.max_q_mvar.unwrap_or(NO_LIMIT) / base,
            vg: g.vm_pu,
            mbase: g.sn_mva.unwrap_or(base),
            model: 2,
            ncost: 2,
            cost: vec![1.0, 0.0],
        });
        lookup.r#gen.push(PmGenSource::Gen(g.index));
    }

    // static generators enter as negative loads
    let mut loads = Vec::new();
    let fixed = net
        .load
        .iter()
        .filter(|l| l.in_service)
        .map(|l| ("load", l.bus, l.p_mw * l.scaling, l.q_mvar * l.scaling))
        .chain(
            net.sgen
                .iter()
                .filter(|s| s.in_service)
                .map(|s| ("sgen", s.bus, -s.p_mw * s.scaling, -s.q_mvar * s.scaling)),
        );
    for (element, bus, p, q) in fixed {
        let Some(k) = resolve(element, bus)? else { continue };
        loads.push(PmLoad {
            index: loads.len() + 1,
            load_bus: k,
            status: 1,
            pd: p / base,
            qd: q / base,
        });
    }

    let omega = 2.0 * PI * net.f_hz;
    let mut branches = Vec::new();
    for l in net.line.iter().filter(|l| l.in_service) {
        let (Some(f), Some(t)) = (resolve("line", l.from_bus)?, resolve("line", l.to_bus)?) else {
            continue;
        };
        let v = vn[&l.from_bus];
        let zbase = v * v / base;
        let parallel = l.parallel.max(1) as f64;
        let b = omega * 1e-9 * l.c_nf_per_km * l.length_km * parallel * zbase;
        let g = 1e-6 * l.g_us_per_km * l.length_km * parallel * zbase;
        branches.push(PmBranch {
            index: branches.len() + 1,
            f_bus: f,
            t_bus: t,
            br_status: 1,
            br_r: l.r_ohm_per_km * l.length_km / parallel / zbase,
            br_x: l.x_ohm_per_km * l.length_km / parallel / zbase,
            g_fr: g / 2.0,
            b_fr: b / 2.0,
            g_to: g / 2.0,
            b_to: b / 2.0,
            tap: 1.0,
            shift: 0.0,
            transformer: false,
            rate_a: l.max_i_ka * v * 3f64.sqrt() * parallel * l.df / base,
            angmin: -2.0 * PI,
            angmax: 2.0 * PI,
        });
    }
    for tr in net.trafo.iter().filter(|t| t.in_service) {
        let (Some(f), Some(t)) = (resolve("trafo", tr.hv_bus)?, resolve("trafo", tr.lv_bus)?) else {
            continue;
        };
        let parallel = tr.parallel.max(1) as f64;
        // per unit on the transformer rating, then on the system base
        let ratio = base / tr.sn_mva;
        let vk = tr.vk_percent / 100.0;
        let r = tr.vkr_percent / 100.0;
        let x = (vk * vk - r * r).max(0.0).sqrt();
        let gm = tr.pfe_kw / 1000.0 / tr.sn_mva;
        let i0 = tr.i0_percent / 100.0;
        let bm = (i0 * i0 - gm * gm).max(0.0).sqrt();
        let steps = tr.tap_pos.unwrap_or(0.0) - tr.tap_neutral.unwrap_or(0.0);
        let mut tap = 1.0 + steps * tr.tap_step_percent.unwrap_or(0.0) / 100.0;
        if tr.tap_side.as_deref() == Some("lv") {
            tap = 1.0 / tap;
        }
        let nominal = (tr.vn_hv_kv / vn[&tr.hv_bus]) / (tr.vn_lv_kv / vn[&tr.lv_bus]);
        branches.push(PmBranch {
            index: branches.len() + 1,
            f_bus: f,
            t_bus: t,
            br_status: 1,
            br_r: r * ratio / parallel,
            br_x: x * ratio / parallel,
            g_fr: gm / ratio * parallel,
            b_fr: -bm / ratio * parallel,
            g_to: 0.0,
            b_to: 0.0,
            tap: tap * nominal,
            shift: tr.shift_degree.to_radians(),
            transformer: true,
            rate_a: tr.sn_mva * parallel * tr.df / base,
            angmin: -2.0 * PI,
            angmax: 2.0 * PI,
        });
    }

    let mut shunts = Vec::new();
    for s in net.shunt.iter().filter(|s| s.in_service) {
        let Some(k) = resolve("shunt", s.bus)? else { continue };
        shunts.push(PmShunt {
            index: shunts.len() + 1,
            shunt_bus: k,
            status: 1,
            gs: s.p_mw * s.step as f64 / base,
            bs: -s.q_mvar * s.step as f64 / base,
        });
    }

    let buses: Vec<PmBus> = net
        .bus
        .iter()
        .filter(|b| b.in_service)
        .enumerate()
        .map(|(i, b)| PmBus {
            index: i + 1,
            bus_i: i + 1,
            bus_type: bus_type[i],
            vm: 1.0,
            va: 0.0,
            vmin: b.min_vm_pu.unwrap_or(0.0),
            vmax: b.max_vm_pu.unwrap_or(2.0),
            base_kv: b.vn_kv,
            zone: b.zone.unwrap_or(1),
            area: 1,
            name: b.name.clone().unwrap_or_default(),
        })
        .collect();

    let pm = json!({
        "name": net.name.clone().unwrap_or_default(),
        "baseMVA": base,
        "per_unit": true,
        "source_type": "pandapower",
        "source_version": "2.0.0",
        "multinetwork": false,
        "bus": table(buses)?,
        "gen": table(gens)?,
        "load": table(loads)?,
        "branch": table(branches)?,
        "shunt": table(shunts)?,
        "dcline": {},
        "storage": {},
        "switch": {},
        "pm_model": options.model,
        "pm_solver": options.solver,
        "pm_log_level": 0,
        "pm_time_limits": options.timeout_secs as f64,
        "correct_pm_network_data": true,
        "silence": true,
    });
    Ok((pm, lookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pandapower::*;

    fn feeder() -> Network {
        let mut net = create_empty_network();
        let mv = create_bus(&mut net, 20.0, Some("MV".into()));
        let lv = create_bus(&mut net, 0.4, Some("LV".into()));
        let lv2 = create_bus(&mut net, 0.4, Some("LV2".into()));
        create_transformer(&mut net, mv, lv, "0.4 MVA 20/0.4 kV").unwrap();
        create_line(&mut net, lv, lv2, 0.1, "NAYY 4x50 SE").unwrap();
        create_ext_grid(&mut net, mv, 1.02, None);
        create_load(&mut net, lv2, 0.1, 0.0, None);
        create_sgen(&mut net, lv2, 0.2, 0.07, None);
        net
    }

    #[test]
    fn test_pm_structure() {
        let (pm, lookup) = convert_to_pm_structure(&feeder(), &OpfOptions::default()).unwrap();
        assert_eq!(lookup.bus, vec![0, 1, 2]);
        assert_eq!(lookup.r#gen, vec![PmGenSource::ExtGrid(0)]);
        assert_eq!(pm["bus"]["1"]["bus_type"], 3);
        assert_eq!(pm["bus"]["3"]["bus_type"], 1);
        assert_eq!(pm["branch"].as_object().unwrap().len(), 2);
        assert_eq!(pm["branch"]["2"]["transformer"], true);
        assert_eq!(pm["load"]["2"]["pd"], -0.2);
        assert_eq!(pm["pm_model"], "ACPPowerModel");
        // 0.642 ohm/km * 0.1 km on a 0.16 ohm base
        let br_r = pm["branch"]["1"]["br_r"].as_f64().unwrap();
        assert!((br_r - 0.0642 / 0.16).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_service_bus_dropped() {
        let mut net = feeder();
        net.bus[2].in_service = false;
        let (pm, lookup) = convert_to_pm_structure(&net, &OpfOptions::default()).unwrap();
        assert_eq!(lookup.bus, vec![0, 1]);
        assert_eq!(pm["branch"].as_object().unwrap().len(), 1);
        assert_eq!(pm["load"].as_object().unwrap().len(), 0);
    }

    #[test]
    fn test_unknown_bus() {
        let mut net = feeder();
        net.load[0].bus = 99;
        assert!(matches!(
            convert_to_pm_structure(&net, &OpfOptions::default()),
            Err(SolverError::InvalidRequest(_))
        ));
    }
}
