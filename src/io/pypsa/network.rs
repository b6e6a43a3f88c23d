use std::collections::HashMap;
use std::f64::consts::PI;

use super::std_types::{line_type, transformer_type};
use crate::error::ConvertError;

/// A bus of the PyPSA-style model, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub name: String,
    /// Nominal voltage in kV.
    pub v_nom: f64,
    /// Voltage magnitude setpoint in per unit, used by slack and PV generators.
    pub v_mag_pu_set: f64,
    /// "PQ", "PV" or "Slack".
    pub control: String,
}

impl Bus {
    pub fn new(name: impl Into<String>, v_nom: f64) -> Self {
        Self {
            name: name.into(),
            v_nom,
            v_mag_pu_set: 1.0,
            control: "PQ".into(),
        }
    }

    pub fn with_v_mag_pu_set(mut self, v: f64) -> Self {
        self.v_mag_pu_set = v;
        self
    }
}

/// A line; `r`, `x` in ohm and `g`, `b` in siemens for the whole length.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Line type name, empty for explicit parameters.
    pub type_: String,
    /// km.
    pub length: f64,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub num_parallel: f64,
    pub terrain_factor: f64,
    pub s_nom: f64,
}

impl Line {
    pub fn new(name: impl Into<String>, bus0: impl Into<String>, bus1: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            type_: String::new(),
            length: 1.0,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            num_parallel: 1.0,
            terrain_factor: 1.0,
            s_nom: 0.0,
        }
    }

    pub fn with_type(mut self, type_: impl Into<String>, length: f64) -> Self {
        self.type_ = type_.into();
        self.length = length;
        self
    }

    pub fn with_impedance(mut self, r: f64, x: f64, length: f64) -> Self {
        self.r = r;
        self.x = x;
        self.length = length;
        self
    }
}

/// A two-winding transformer from `bus0` (primary) to `bus1` (secondary).
///
/// `r`, `x`, `g`, `b` are per unit on `s_nom`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Transformer type name, empty for explicit parameters.
    pub type_: String,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    /// MVA.
    pub s_nom: f64,
    pub tap_ratio: f64,
    pub tap_position: f64,
    /// Degrees.
    pub phase_shift: f64,
}

impl Transformer {
    pub fn new(name: impl Into<String>, bus0: impl Into<String>, bus1: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            type_: String::new(),
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            s_nom: 0.0,
            tap_ratio: 1.0,
            tap_position: 0.0,
            phase_shift: 0.0,
        }
    }

    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = type_.into();
        self
    }

    pub fn with_impedance(mut self, r: f64, x: f64, s_nom: f64) -> Self {
        self.r = r;
        self.x = x;
        self.s_nom = s_nom;
        self
    }

    pub fn with_tap_position(mut self, tap_position: f64) -> Self {
        self.tap_position = tap_position;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    /// "Slack", "PV" or "PQ".
    pub control: String,
    /// MW.
    pub p_set: f64,
    /// Mvar.
    pub q_set: f64,
}

impl Generator {
    pub fn new(
        name: impl Into<String>,
        bus: impl Into<String>,
        control: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            control: control.into(),
            p_set: 0.0,
            q_set: 0.0,
        }
    }

    pub fn with_setpoint(mut self, p_set: f64, q_set: f64) -> Self {
        self.p_set = p_set;
        self.q_set = q_set;
        self
    }
}

/// A fixed power element; with `sign = -1` it consumes `p_set`, with `sign = 1` it injects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub name: String,
    pub bus: String,
    pub p_set: f64,
    pub q_set: f64,
    pub sign: f64,
}

impl Load {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_set: f64, q_set: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            p_set,
            q_set,
            sign: -1.0,
        }
    }

    pub fn with_sign(mut self, sign: f64) -> Self {
        self.sign = sign;
        self
    }
}

/// Per-bus results of the snapshot "now".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusesT {
    pub v_mag_pu: HashMap<String, f64>,
    /// Radians.
    pub v_ang: HashMap<String, f64>,
}

/// A PyPSA-style network: name-keyed component tables in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNetwork {
    pub buses: Vec<Bus>,
    pub lines: Vec<Line>,
    pub transformers: Vec<Transformer>,
    pub generators: Vec<Generator>,
    pub loads: Vec<Load>,
    /// Hz.
    pub f_nom: f64,
    /// Solved results, absent until a power flow ran or results were loaded.
    pub buses_t: Option<BusesT>,
}

impl Default for SourceNetwork {
    fn default() -> Self {
        Self {
            buses: Vec::new(),
            lines: Vec::new(),
            transformers: Vec::new(),
            generators: Vec::new(),
            loads: Vec::new(),
            f_nom: 50.0,
            buses_t: None,
        }
    }
}

impl SourceNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.name == name)
    }

    /// Fills line and transformer parameters from their types.
    ///
    /// Rows without a type keep their explicit parameters.
    pub fn calculate_dependent_values(&mut self) -> Result<(), ConvertError> {
        let omega = 2.0 * PI * self.f_nom;
        for l in self.lines.iter_mut().filter(|l| !l.type_.is_empty()) {
            let t = line_type(&l.type_).ok_or_else(|| ConvertError::UnknownStdType {
                kind: "line",
                name: l.type_.clone(),
            })?;
            l.r = t.r_per_length * l.length / l.num_parallel;
            l.x = t.x_per_length * l.length / l.num_parallel;
            l.b = omega * t.c_per_length * 1e-9 * l.length * l.num_parallel;
            l.g = 0.0;
        }

        for tr in self.transformers.iter_mut().filter(|t| !t.type_.is_empty()) {
            let t = transformer_type(&tr.type_).ok_or_else(|| ConvertError::UnknownStdType {
                kind: "transformer",
                name: tr.type_.clone(),
            })?;
            tr.s_nom = t.s_nom;
            tr.r = t.vscr / 100.0;
            tr.x = ((t.vsc / 100.0).powi(2) - tr.r.powi(2)).max(0.0).sqrt();
            tr.g = t.pfe / (1000.0 * t.s_nom);
            tr.b = -((t.i0 / 100.0).powi(2) - tr.g.powi(2)).max(0.0).sqrt();
            tr.phase_shift = t.phase_shift;
            let ratio = 1.0 + (tr.tap_position - t.tap_neutral) * t.tap_step / 100.0;
            tr.tap_ratio = if t.tap_side == 0 { ratio } else { 1.0 / ratio };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependent_values() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 0.4));
        net.buses.push(Bus::new("b", 0.4));
        net.lines.push(Line::new("l", "a", "b").with_type("NAYY 4x50 SE", 0.1));
        net.calculate_dependent_values().unwrap();
        let l = &net.lines[0];
        assert!((l.r - 0.0642).abs() < 1e-15);
        assert!((l.x - 0.0083).abs() < 1e-15);
        assert!(l.b > 0.0);
    }

    #[test]
    fn test_transformer_type() {
        let mut net = SourceNetwork::new();
        net.transformers.push(
            Transformer::new("t", "a", "b")
                .with_type("0.4 MVA 20/0.4 kV")
                .with_tap_position(1.0),
        );
        net.calculate_dependent_values().unwrap();
        let t = &net.transformers[0];
        assert_eq!(t.s_nom, 0.4);
        assert!(((t.r * t.r + t.x * t.x).sqrt() - 0.06).abs() < 1e-12);
        // i0 equals the iron loss share for this type, so no magnetising susceptance is left
        assert!(t.b <= 0.0);
        assert!((t.tap_ratio - 1.025).abs() < 1e-12);
        assert_eq!(t.phase_shift, 150.0);
    }

    #[test]
    fn test_unknown_type() {
        let mut net = SourceNetwork::new();
        net.lines.push(Line::new("l", "a", "b").with_type("wet string", 1.0));
        assert!(matches!(
            net.calculate_dependent_values(),
            Err(ConvertError::UnknownStdType { kind: "line", .. })
        ));
    }
}
