//! Line and transformer type catalog of the PyPSA-style model.

/// Per-length parameters of a line type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineType {
    pub f_nom: f64,
    /// Ohm per km.
    pub r_per_length: f64,
    /// Ohm per km.
    pub x_per_length: f64,
    /// nF per km.
    pub c_per_length: f64,
    /// kA.
    pub i_nom: f64,
    pub mounting: &'static str,
}

/// Nameplate parameters of a transformer type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformerType {
    pub f_nom: f64,
    pub s_nom: f64,
    pub v_nom_0: f64,
    pub v_nom_1: f64,
    /// Short circuit voltage in percent.
    pub vsc: f64,
    /// Real part of the short circuit voltage in percent.
    pub vscr: f64,
    /// Iron losses in kW.
    pub pfe: f64,
    /// No load current in percent.
    pub i0: f64,
    /// Degrees.
    pub phase_shift: f64,
    /// 0 for the primary winding, 1 for the secondary.
    pub tap_side: u8,
    pub tap_neutral: f64,
    pub tap_min: f64,
    pub tap_max: f64,
    /// Percent per step.
    pub tap_step: f64,
}

const fn line(r: f64, x: f64, c: f64, i_nom: f64, mounting: &'static str) -> LineType {
    LineType {
        f_nom: 50.0,
        r_per_length: r,
        x_per_length: x,
        c_per_length: c,
        i_nom,
        mounting,
    }
}

#[allow(clippy::too_many_arguments)]
const fn transformer(
    s_nom: f64,
    v0: f64,
    v1: f64,
    vsc: f64,
    vscr: f64,
    pfe: f64,
    i0: f64,
    taps: f64,
    tap_step: f64,
) -> TransformerType {
    TransformerType {
        f_nom: 50.0,
        s_nom,
        v_nom_0: v0,
        v_nom_1: v1,
        vsc,
        vscr,
        pfe,
        i0,
        phase_shift: 150.0,
        tap_side: 0,
        tap_neutral: 0.0,
        tap_min: -taps,
        tap_max: taps,
        tap_step,
    }
}

static LINE_TYPES: &[(&str, LineType)] = &[
    ("NAYY 4x50 SE", line(0.642, 0.083, 210.0, 0.142, "ug")),
    ("NAYY 4x120 SE", line(0.225, 0.08, 264.0, 0.242, "ug")),
    ("NAYY 4x150 SE", line(0.208, 0.08, 261.0, 0.27, "ug")),
    ("NA2XS2Y 1x95 RM/25 12/20 kV", line(0.313, 0.132, 216.0, 0.252, "ug")),
    ("NA2XS2Y 1x240 RM/25 12/20 kV", line(0.122, 0.112, 304.0, 0.421, "ug")),
    ("149-AL1/24-ST1A 20.0", line(0.194, 0.315, 10.0, 0.47, "ol")),
    ("243-AL1/39-ST1A 110.0", line(0.1188, 0.39, 9.0, 0.645, "ol")),
];

static TRANSFORMER_TYPES: &[(&str, TransformerType)] = &[
    ("0.25 MVA 20/0.4 kV", transformer(0.25, 20.0, 0.4, 6.0, 1.44, 0.8, 0.32, 2.0, 2.5)),
    ("0.4 MVA 20/0.4 kV", transformer(0.4, 20.0, 0.4, 6.0, 1.425, 1.35, 0.3375, 2.0, 2.5)),
    ("0.63 MVA 20/0.4 kV", transformer(0.63, 20.0, 0.4, 6.0, 1.206, 1.65, 0.2619, 2.0, 2.5)),
    ("25 MVA 110/20 kV", transformer(25.0, 110.0, 20.0, 12.0, 0.41, 14.0, 0.07, 9.0, 1.5)),
    ("40 MVA 110/20 kV", transformer(40.0, 110.0, 20.0, 16.2, 0.34375, 18.0, 0.05, 9.0, 1.5)),
    ("63 MVA 110/20 kV", transformer(63.0, 110.0, 20.0, 18.0, 0.32, 22.0, 0.04, 9.0, 1.5)),
];

pub fn line_type(name: &str) -> Option<&'static LineType> {
    LINE_TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
}

pub fn transformer_type(name: &str) -> Option<&'static TransformerType> {
    TRANSFORMER_TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
}
