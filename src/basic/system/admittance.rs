use derive_more::{Deref, From};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Represents an admittance value in Siemens.
///
/// `Admittance` is a wrapper around a complex number representing the admittance value.
#[derive(Clone, Copy, Default, PartialEq, Debug, Deref, From, Serialize, Deserialize)]
pub struct Admittance(pub Complex64);

/// Represents a two-terminal port.
///
/// Each entry is a bus position in the power flow model, or [`GND`] for the reference node.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deref, From, Serialize, Deserialize)]
pub struct Port2(pub [i64; 2]);

/// Represents the ground node in the network.
pub const GND: i64 = -1;

impl Port2 {
    /// A port between a bus and ground.
    pub fn shunt(bus: usize) -> Self {
        Port2([bus as i64, GND])
    }

    /// A port between two buses.
    pub fn series(from: usize, to: usize) -> Self {
        Port2([from as i64, to as i64])
    }
}
