//! Built-in standard types of the pandapower-style network.

/// Electrical parameters of a line standard type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStdType {
    pub c_nf_per_km: f64,
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub max_i_ka: f64,
    /// `"cs"` for cables, `"ol"` for overhead lines.
    pub type_: &'static str,
}

/// Parameters of a two-winding transformer standard type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafoStdType {
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    pub pfe_kw: f64,
    pub i0_percent: f64,
    pub shift_degree: f64,
    pub tap_side: &'static str,
    pub tap_neutral: f64,
    pub tap_min: f64,
    pub tap_max: f64,
    pub tap_step_percent: f64,
    pub tap_step_degree: f64,
    pub tap_phase_shifter: bool,
}

const fn cable(c: f64, r: f64, x: f64, max_i: f64) -> LineStdType {
    LineStdType {
        c_nf_per_km: c,
        r_ohm_per_km: r,
        x_ohm_per_km: x,
        max_i_ka: max_i,
        type_: "cs",
    }
}

const fn overhead(c: f64, r: f64, x: f64, max_i: f64) -> LineStdType {
    LineStdType {
        type_: "ol",
        ..cable(c, r, x, max_i)
    }
}

#[allow(clippy::too_many_arguments)]
const fn trafo(
    sn: f64,
    hv: f64,
    lv: f64,
    vk: f64,
    vkr: f64,
    pfe: f64,
    i0: f64,
    tap_range: f64,
    tap_step: f64,
) -> TrafoStdType {
    TrafoStdType {
        sn_mva: sn,
        vn_hv_kv: hv,
        vn_lv_kv: lv,
        vk_percent: vk,
        vkr_percent: vkr,
        pfe_kw: pfe,
        i0_percent: i0,
        shift_degree: 150.0,
        tap_side: "hv",
        tap_neutral: 0.0,
        tap_min: -tap_range,
        tap_max: tap_range,
        tap_step_percent: tap_step,
        tap_step_degree: 0.0,
        tap_phase_shifter: false,
    }
}

static LINE_TYPES: &[(&str, LineStdType)] = &[
    ("NAYY 4x50 SE", cable(210.0, 0.642, 0.083, 0.142)),
    ("NAYY 4x120 SE", cable(264.0, 0.225, 0.08, 0.242)),
    ("NAYY 4x150 SE", cable(261.0, 0.208, 0.08, 0.27)),
    ("NA2XS2Y 1x95 RM/25 12/20 kV", cable(216.0, 0.313, 0.132, 0.252)),
    ("NA2XS2Y 1x240 RM/25 12/20 kV", cable(304.0, 0.122, 0.112, 0.421)),
    ("149-AL1/24-ST1A 20.0", overhead(10.0, 0.194, 0.315, 0.47)),
    ("243-AL1/39-ST1A 110.0", overhead(9.0, 0.1188, 0.39, 0.645)),
];

static TRAFO_TYPES: &[(&str, TrafoStdType)] = &[
    ("0.25 MVA 20/0.4 kV", trafo(0.25, 20.0, 0.4, 6.0, 1.44, 0.8, 0.32, 2.0, 2.5)),
    ("0.4 MVA 20/0.4 kV", trafo(0.4, 20.0, 0.4, 6.0, 1.425, 1.35, 0.3375, 2.0, 2.5)),
    ("0.63 MVA 20/0.4 kV", trafo(0.63, 20.0, 0.4, 6.0, 1.206, 1.65, 0.2619, 2.0, 2.5)),
    ("25 MVA 110/20 kV", trafo(25.0, 110.0, 20.0, 12.0, 0.41, 14.0, 0.07, 9.0, 1.5)),
    ("40 MVA 110/20 kV", trafo(40.0, 110.0, 20.0, 16.2, 0.34375, 18.0, 0.05, 9.0, 1.5)),
    ("63 MVA 110/20 kV", trafo(63.0, 110.0, 20.0, 18.0, 0.32, 22.0, 0.04, 9.0, 1.5)),
];

/// Looks up a line standard type by name.
pub fn line_std_type(name: &str) -> Option<&'static LineStdType> {
    LINE_TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
}

/// Looks up a transformer standard type by name.
pub fn trafo_std_type(name: &str) -> Option<&'static TrafoStdType> {
    TRAFO_TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
}

/// Names of all transformer standard types.
pub fn trafo_std_type_names() -> impl Iterator<Item = &'static str> {
    TRAFO_TYPES.iter().map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let t = trafo_std_type("0.4 MVA 20/0.4 kV").unwrap();
        assert_eq!(t.sn_mva, 0.4);
        assert_eq!(t.tap_min, -2.0);
        assert_eq!(t.shift_degree, 150.0);
        assert_eq!(line_std_type("149-AL1/24-ST1A 20.0").unwrap().type_, "ol");
        assert!(trafo_std_type("nope").is_none());
        assert_eq!(trafo_std_type_names().count(), 6);
    }
}
