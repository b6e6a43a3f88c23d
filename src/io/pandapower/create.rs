//! Element constructors for [`Network`], mirroring pandapower's `create_*` helpers.
//!
//! Each constructor appends one row and returns its index, which is one past
//! the largest index in the table.

use super::file_io::*;
use super::std_types::{line_std_type, trafo_std_type};
use crate::error::ConvertError;

fn next_index(indices: impl Iterator<Item = i64>) -> i64 {
    indices.max().map_or(0, |i| i + 1)
}

/// Creates an empty network at 50 Hz on a 1 MVA base.
pub fn create_empty_network() -> Network {
    Network::default()
}

/// Appends a bus and returns its index.
pub fn create_bus(net: &mut Network, vn_kv: f64, name: Option<String>) -> i64 {
    let index = next_index(net.bus.iter().map(|b| b.index));
    net.bus.push(Bus {
        index,
        name,
        vn_kv,
        ..Default::default()
    });
    index
}

/// Appends a line built from a standard type.
pub fn create_line(
    net: &mut Network,
    from_bus: i64,
    to_bus: i64,
    length_km: f64,
    std_type: &str,
) -> Result<i64, ConvertError> {
    let t = line_std_type(std_type).ok_or_else(|| ConvertError::UnknownStdType {
        kind: "line",
        name: std_type.to_owned(),
    })?;
    let index = next_index(net.line.iter().map(|l| l.index));
    net.line.push(Line {
        index,
        std_type: Some(std_type.to_owned()),
        from_bus,
        to_bus,
        length_km,
        r_ohm_per_km: t.r_ohm_per_km,
        x_ohm_per_km: t.x_ohm_per_km,
        c_nf_per_km: t.c_nf_per_km,
        max_i_ka: t.max_i_ka,
        type_: Some(t.type_.to_owned()),
        ..Default::default()
    });
    Ok(index)
}

/// Appends a two-winding transformer built from a standard type, at its neutral tap.
pub fn create_transformer(
    net: &mut Network,
    hv_bus: i64,
    lv_bus: i64,
    std_type: &str,
) -> Result<i64, ConvertError> {
    let t = trafo_std_type(std_type).ok_or_else(|| ConvertError::UnknownStdType {
        kind: "transformer",
        name: std_type.to_owned(),
    })?;
    let index = next_index(net.trafo.iter().map(|t| t.index));
    net.trafo.push(Transformer {
        index,
        std_type: Some(std_type.to_owned()),
        hv_bus,
        lv_bus,
        sn_mva: t.sn_mva,
        vn_hv_kv: t.vn_hv_kv,
        vn_lv_kv: t.vn_lv_kv,
        vk_percent: t.vk_percent,
        vkr_percent: t.vkr_percent,
        pfe_kw: t.pfe_kw,
        i0_percent: t.i0_percent,
        shift_degree: t.shift_degree,
        tap_side: Some(t.tap_side.to_owned()),
        tap_neutral: Some(t.tap_neutral),
        tap_min: Some(t.tap_min),
        tap_max: Some(t.tap_max),
        tap_step_percent: Some(t.tap_step_percent),
        tap_step_degree: Some(t.tap_step_degree),
        tap_pos: Some(t.tap_neutral),
        tap_phase_shifter: t.tap_phase_shifter,
        ..Default::default()
    });
    Ok(index)
}

/// Appends an external grid (slack) at `bus`.
pub fn create_ext_grid(net: &mut Network, bus: i64, vm_pu: f64, name: Option<String>) -> i64 {
    let index = next_index(net.ext_grid.iter().map(|e| e.index));
    net.ext_grid.push(ExtGrid {
        index,
        name,
        bus,
        vm_pu,
        ..Default::default()
    });
    index
}

/// Appends a constant power load.
pub fn create_load(
    net: &mut Network,
    bus: i64,
    p_mw: f64,
    q_mvar: f64,
    name: Option<String>,
) -> i64 {
    let index = next_index(net.load.iter().map(|l| l.index));
    net.load.push(Load {
        index,
        name,
        bus,
        p_mw,
        q_mvar,
        ..Default::default()
    });
    index
}

/// Appends a static generator.
pub fn create_sgen(
    net: &mut Network,
    bus: i64,
    p_mw: f64,
    q_mvar: f64,
    name: Option<String>,
) -> i64 {
    let index = next_index(net.sgen.iter().map(|s| s.index));
    net.sgen.push(SGen {
        index,
        name,
        bus,
        p_mw,
        q_mvar,
        ..Default::default()
    });
    index
}

/// Appends a voltage controlled generator.
pub fn create_gen(net: &mut Network, bus: i64, p_mw: f64, vm_pu: f64, name: Option<String>) -> i64 {
    let index = next_index(net.r#gen.iter().map(|g| g.index));
    net.r#gen.push(Gen {
        index,
        name,
        bus,
        p_mw,
        vm_pu,
        ..Default::default()
    });
    index
}

/// Appends a shunt at `bus`; `p_mw` and `q_mvar` are consumed at rated voltage per step.
pub fn create_shunt(net: &mut Network, bus: i64, p_mw: f64, q_mvar: f64) -> i64 {
    let index = next_index(net.shunt.iter().map(|s| s.index));
    let vn_kv = net
        .bus
        .iter()
        .find(|b| b.index == bus)
        .map_or(0.0, |b| b.vn_kv);
    net.shunt.push(Shunt {
        index,
        bus,
        p_mw,
        q_mvar,
        vn_kv,
        ..Default::default()
    });
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_max() {
        let mut net = create_empty_network();
        assert_eq!(create_bus(&mut net, 20.0, None), 0);
        net.bus[0].index = 5;
        assert_eq!(create_bus(&mut net, 0.4, None), 6);
        assert_eq!(net.f_hz, 50.0);
        assert_eq!(net.sn_mva, 1.0);
    }

    #[test]
    fn test_create_transformer_from_std_type() {
        let mut net = create_empty_network();
        let hv = create_bus(&mut net, 20.0, None);
        let lv = create_bus(&mut net, 0.4, None);
        let t = create_transformer(&mut net, hv, lv, "0.4 MVA 20/0.4 kV").unwrap();
        let trafo = &net.trafo[t as usize];
        assert_eq!(trafo.sn_mva, 0.4);
        assert_eq!(trafo.vk_percent, 6.0);
        assert_eq!(trafo.tap_pos, Some(0.0));
        assert_eq!(trafo.shift_degree, 150.0);
    }

    #[test]
    fn test_unknown_std_type() {
        let mut net = create_empty_network();
        let err = create_transformer(&mut net, 0, 1, "1 GVA").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownStdType { kind: "transformer", .. }));
        assert!(net.trafo.is_empty());
        assert!(create_line(&mut net, 0, 1, 1.0, "copper wire").is_err());
    }
}
