//! Conversion of a PyPSA-style [`SourceNetwork`] into a pandapower-style [`Network`].
//!
//! Buses are converted first, then the bus lookup is built, then every element
//! that refers to a bus. Any error aborts the conversion.

use tracing::{debug, warn};

use super::lookup::BusLookup;
use super::network::SourceNetwork;
use crate::error::ConvertError;
use crate::io::pandapower::*;

/// Converts a source network into a new target network.
pub fn from_pypsa(pnet: &SourceNetwork) -> Result<Network, ConvertError> {
    let mut net = create_empty_network();
    net.f_hz = pnet.f_nom;

    convert_buses(pnet, &mut net);
    let lookup = BusLookup::from_network(&net)?;
    convert_lines(pnet, &mut net, &lookup)?;
    convert_ext_grids(pnet, &mut net, &lookup)?;
    convert_trafos(pnet, &mut net, &lookup)?;
    convert_loads(pnet, &mut net, &lookup)?;
    convert_gens(pnet, &mut net, &lookup)?;

    debug!(
        bus = net.bus.len(),
        line = net.line.len(),
        trafo = net.trafo.len(),
        load = net.load.len(),
        sgen = net.sgen.len(),
        gens = net.r#gen.len(),
        ext_grid = net.ext_grid.len(),
        "converted network"
    );
    Ok(net)
}

/// Appends one in-service bus per source bus, in source order.
pub fn convert_buses(pnet: &SourceNetwork, net: &mut Network) {
    for b in &pnet.buses {
        create_bus(net, b.v_nom, Some(b.name.clone()));
    }
}

/// Lines carry their per-km parameters; capacitance, conductance and rating are not converted.
pub fn convert_lines(
    pnet: &SourceNetwork,
    net: &mut Network,
    lookup: &BusLookup,
) -> Result<(), ConvertError> {
    let mut index = net.line.iter().map(|l| l.index + 1).max().unwrap_or(0);
    for l in &pnet.lines {
        let from_bus = lookup.resolve("line", &l.name, &l.bus0)?;
        let to_bus = lookup.resolve("line", &l.name, &l.bus1)?;
        if !(l.length.is_finite() && l.length > 0.0) {
            return Err(ConvertError::InvalidLineLength {
                name: l.name.clone(),
                length: l.length,
            });
        }
        if !(l.num_parallel >= 1.0 && l.num_parallel.fract() == 0.0) {
            return Err(ConvertError::InvalidParallel {
                name: l.name.clone(),
                num_parallel: l.num_parallel,
            });
        }
        net.line.push(Line {
            index,
            name: Some(l.name.clone()),
            from_bus,
            to_bus,
            length_km: l.length,
            r_ohm_per_km: l.r / l.length,
            x_ohm_per_km: l.x / l.length,
            c_nf_per_km: 0.0,
            g_us_per_km: 0.0,
            max_i_ka: 1.0,
            parallel: l.num_parallel as i32,
            df: l.terrain_factor,
            in_service: true,
            ..Default::default()
        });
        index += 1;
    }
    Ok(())
}

/// Every slack generator becomes an external grid at its bus' voltage setpoint.
pub fn convert_ext_grids(
    pnet: &SourceNetwork,
    net: &mut Network,
    lookup: &BusLookup,
) -> Result<(), ConvertError> {
    for g in pnet.generators.iter().filter(|g| g.control == "Slack") {
        let bus = lookup.resolve("generator", &g.name, &g.bus)?;
        let vm_pu = setpoint(pnet, "generator", &g.name, &g.bus)?;
        create_ext_grid(net, bus, vm_pu, Some(g.name.clone()));
    }
    Ok(())
}

/// Typed transformers are created from the standard type catalog.
///
/// Untyped rows are skipped; typed rows off their neutral tap are rejected.
pub fn convert_trafos(
    pnet: &SourceNetwork,
    net: &mut Network,
    lookup: &BusLookup,
) -> Result<(), ConvertError> {
    for t in &pnet.transformers {
        if t.type_.is_empty() {
            warn!(transformer = %t.name, "skipping transformer without standard type");
            continue;
        }
        if t.tap_position != 0.0 {
            return Err(ConvertError::UnsupportedTransformer {
                name: t.name.clone(),
                tap_position: t.tap_position,
            });
        }
        let hv_bus = lookup.resolve("transformer", &t.name, &t.bus0)?;
        let lv_bus = lookup.resolve("transformer", &t.name, &t.bus1)?;
        let index = create_transformer(net, hv_bus, lv_bus, &t.type_)?;
        if let Some(row) = net.trafo.iter_mut().find(|r| r.index == index) {
            row.name = Some(t.name.clone());
        }
    }
    Ok(())
}

/// Loads with `sign <= 0` become loads, the rest static generators.
pub fn convert_loads(
    pnet: &SourceNetwork,
    net: &mut Network,
    lookup: &BusLookup,
) -> Result<(), ConvertError> {
    for l in &pnet.loads {
        let bus = lookup.resolve("load", &l.name, &l.bus)?;
        if l.sign <= 0.0 {
            create_load(net, bus, l.p_set, l.q_set, Some(l.name.clone()));
        } else if l.sign > 0.0 {
            create_sgen(net, bus, l.p_set, l.q_set, Some(l.name.clone()));
        } else {
            return Err(ConvertError::InvalidSign {
                name: l.name.clone(),
                sign: l.sign,
            });
        }
    }
    Ok(())
}

/// Non-slack generators: PV to `gen`, PQ to `sgen`.
pub fn convert_gens(
    pnet: &SourceNetwork,
    net: &mut Network,
    lookup: &BusLookup,
) -> Result<(), ConvertError> {
    for g in pnet.generators.iter().filter(|g| g.control != "Slack") {
        let bus = lookup.resolve("generator", &g.name, &g.bus)?;
        match g.control.as_str() {
            "PV" => {
                let vm_pu = setpoint(pnet, "generator", &g.name, &g.bus)?;
                create_gen(net, bus, g.p_set, vm_pu, Some(g.name.clone()));
            }
            "PQ" => {
                create_sgen(net, bus, g.p_set, g.q_set, Some(g.name.clone()));
            }
            other => {
                return Err(ConvertError::UnsupportedControl {
                    name: g.name.clone(),
                    control: other.to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn setpoint(
    pnet: &SourceNetwork,
    element: &'static str,
    name: &str,
    bus: &str,
) -> Result<f64, ConvertError> {
    pnet.bus(bus)
        .map(|b| b.v_mag_pu_set)
        .ok_or_else(|| ConvertError::MissingReference {
            element,
            name: name.to_owned(),
            bus: bus.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pypsa::network::{Bus, Generator, Line, Load, Transformer};

    fn two_buses() -> SourceNetwork {
        let mut pnet = SourceNetwork::new();
        pnet.buses.push(Bus::new("MV bus", 20.0).with_v_mag_pu_set(1.02));
        pnet.buses.push(Bus::new("LV bus", 0.4));
        pnet
    }

    #[test]
    fn test_buses_keep_order() {
        let net = from_pypsa(&two_buses()).unwrap();
        assert_eq!(net.bus.len(), 2);
        assert_eq!(net.bus[1].name.as_deref(), Some("LV bus"));
        assert_eq!(net.bus[1].vn_kv, 0.4);
        assert!(net.bus.iter().all(|b| b.in_service));
    }

    #[test]
    fn test_line_per_km() {
        let mut pnet = two_buses();
        pnet.buses.push(Bus::new("LV2 bus", 0.4));
        pnet.lines.push(Line::new("cable", "LV bus", "LV2 bus").with_impedance(0.5, 0.2, 2.0));
        let net = from_pypsa(&pnet).unwrap();
        let l = &net.line[0];
        assert_eq!((l.from_bus, l.to_bus), (1, 2));
        assert_eq!(l.r_ohm_per_km, 0.25);
        assert_eq!(l.x_ohm_per_km, 0.1);
        assert_eq!(l.length_km, 2.0);
        assert_eq!((l.c_nf_per_km, l.g_us_per_km, l.max_i_ka), (0.0, 0.0, 1.0));
    }

    #[test]
    fn test_zero_length_line() {
        let mut pnet = two_buses();
        pnet.lines.push(Line::new("stub", "MV bus", "LV bus").with_impedance(0.5, 0.2, 0.0));
        assert!(matches!(
            from_pypsa(&pnet),
            Err(ConvertError::InvalidLineLength { length, .. }) if length == 0.0
        ));
    }

    #[test]
    fn test_slack_takes_bus_setpoint() {
        let mut pnet = two_buses();
        pnet.generators.push(Generator::new("grid", "MV bus", "Slack"));
        pnet.generators.push(Generator::new("backup", "LV bus", "Slack"));
        let net = from_pypsa(&pnet).unwrap();
        assert_eq!(net.ext_grid.len(), 2);
        assert_eq!(net.ext_grid[0].vm_pu, 1.02);
        assert_eq!(net.ext_grid[1].vm_pu, 1.0);
        assert_eq!(net.ext_grid[1].bus, 1);
    }

    #[test]
    fn test_tapped_transformer_rejected() {
        let mut pnet = two_buses();
        pnet.transformers.push(
            Transformer::new("t", "MV bus", "LV bus")
                .with_type("0.4 MVA 20/0.4 kV")
                .with_tap_position(1.0),
        );
        assert!(matches!(
            from_pypsa(&pnet),
            Err(ConvertError::UnsupportedTransformer { .. })
        ));
    }

    #[test]
    fn test_generator_controls() {
        let mut pnet = two_buses();
        pnet.generators.push(Generator::new("pv", "LV bus", "PV").with_setpoint(0.1, 0.0));
        pnet.generators.push(Generator::new("pq", "LV bus", "PQ").with_setpoint(0.1, 0.05));
        let net = from_pypsa(&pnet).unwrap();
        assert_eq!(net.r#gen.len(), 1);
        assert_eq!(net.sgen.len(), 1);
        assert_eq!(net.sgen[0].q_mvar, 0.05);

        pnet.generators.push(Generator::new("odd", "LV bus", "Droop"));
        assert!(matches!(from_pypsa(&pnet), Err(ConvertError::UnsupportedControl { .. })));
    }

    #[test]
    fn test_line_to_unknown_bus() {
        let mut pnet = two_buses();
        pnet.lines.push(Line::new("l", "MV bus", "ghost").with_impedance(0.5, 0.2, 1.0));
        let err = from_pypsa(&pnet).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingReference { element: "line", ref name, ref bus }
                if name == "l" && bus == "ghost"
        ));
    }

    #[test]
    fn test_fractional_parallel_rejected() {
        let mut pnet = two_buses();
        let mut l = Line::new("l", "MV bus", "LV bus").with_impedance(0.5, 0.2, 1.0);
        l.num_parallel = 1.5;
        pnet.lines.push(l);
        assert!(matches!(
            from_pypsa(&pnet),
            Err(ConvertError::InvalidParallel { num_parallel, .. }) if num_parallel == 1.5
        ));

        pnet.lines[0].num_parallel = 2.0;
        assert_eq!(from_pypsa(&pnet).unwrap().line[0].parallel, 2);
    }

    #[test]
    fn test_load_partition() {
        let mut pnet = two_buses();
        pnet.loads.push(Load::new("consumer", "LV bus", 0.1, 0.0).with_sign(-1.0));
        pnet.loads.push(Load::new("zero", "LV bus", 0.2, 0.0).with_sign(0.0));
        pnet.loads.push(Load::new("producer", "MV bus", 0.3, 0.0).with_sign(2.0));
        let net = from_pypsa(&pnet).unwrap();
        assert_eq!(net.load.len(), 2);
        assert_eq!(net.sgen.len(), 1);

        let mut names: Vec<_> = net
            .load
            .iter()
            .filter_map(|l| l.name.as_deref())
            .chain(net.sgen.iter().filter_map(|s| s.name.as_deref()))
            .collect();
        names.sort_unstable();
        assert_eq!(names, ["consumer", "producer", "zero"]);
        assert_eq!(net.sgen[0].name.as_deref(), Some("producer"));
        assert_eq!(net.sgen[0].bus, 0);
    }

    #[test]
    fn test_nan_sign() {
        let mut pnet = two_buses();
        pnet.loads.push(Load::new("x", "LV bus", 0.1, 0.0).with_sign(f64::NAN));
        assert!(matches!(from_pypsa(&pnet), Err(ConvertError::InvalidSign { .. })));
    }
}
