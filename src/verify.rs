//! Comparison of solved source and target models, bus by bus.

use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};

use crate::error::VerifyError;
use crate::io::pandapower::Network;
use crate::io::pypsa::SourceNetwork;

/// `|a - b| <= abs + rel * |b|`, with `b` the target value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { abs: 1e-8, rel: 1e-5 }
    }
}

impl Tolerance {
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.abs + self.rel * b.abs()
    }
}

/// Angle difference in degrees folded into (-180, 180].
fn angle_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// One aligned pair of bus results.
#[derive(Debug, Clone, PartialEq)]
pub struct BusComparison {
    pub bus: String,
    pub source_vm_pu: f64,
    pub target_vm_pu: f64,
    pub source_va_degree: f64,
    pub target_va_degree: f64,
}

/// Aligns source results with the target bus table by bus name.
pub fn compare_bus_results(
    pnet: &SourceNetwork,
    net: &Network,
) -> Result<Vec<BusComparison>, VerifyError> {
    let source = pnet.buses_t.as_ref().ok_or(VerifyError::MissingResults("source"))?;
    if net.res_bus.is_empty() {
        return Err(VerifyError::MissingResults("target"));
    }

    let mut out = Vec::with_capacity(net.bus.len());
    for bus in &net.bus {
        let name = bus.name.clone().unwrap_or_else(|| bus.index.to_string());
        let target = net.res_bus_at(bus.index).ok_or(VerifyError::MissingResults("target"))?;
        let (Some(vm), Some(va)) = (source.v_mag_pu.get(&name), source.v_ang.get(&name)) else {
            return Err(VerifyError::MissingBus(name));
        };
        out.push(BusComparison {
            bus: name,
            source_vm_pu: *vm,
            target_vm_pu: target.vm_pu,
            source_va_degree: va.to_degrees(),
            target_va_degree: target.va_degree,
        });
    }
    Ok(out)
}

/// Checks that voltage magnitudes and angles agree at every target bus.
///
/// Reports the first bus that diverges.
pub fn check_results_equal(
    pnet: &SourceNetwork,
    net: &Network,
    tol: &Tolerance,
) -> Result<(), VerifyError> {
    for c in compare_bus_results(pnet, net)? {
        if !tol.is_close(c.source_vm_pu, c.target_vm_pu) {
            return Err(VerifyError::ResultMismatch {
                delta: c.source_vm_pu - c.target_vm_pu,
                bus: c.bus,
                quantity: "vm_pu",
                source_value: c.source_vm_pu,
                target_value: c.target_vm_pu,
            });
        }
        let delta = angle_delta(c.source_va_degree, c.target_va_degree);
        if delta.abs() > tol.abs + tol.rel * c.target_va_degree.abs() || delta.is_nan() {
            return Err(VerifyError::ResultMismatch {
                bus: c.bus,
                quantity: "va_degree",
                source_value: c.source_va_degree,
                target_value: c.target_va_degree,
                delta,
            });
        }
    }
    Ok(())
}

#[derive(Tabled)]
#[allow(non_snake_case)]
struct ComparisonRow {
    Bus: String,
    Vm_source: String,
    Vm_target: String,
    Va_source: String,
    Va_target: String,
}

/// Renders the aligned results as a text table.
pub fn comparison_table(rows: &[BusComparison]) -> String {
    let rows = rows.iter().map(|c| ComparisonRow {
        Bus: c.bus.clone(),
        Vm_source: format!("{:.8}", c.source_vm_pu),
        Vm_target: format!("{:.8}", c.target_vm_pu),
        Va_source: format!("{:.6}", c.source_va_degree),
        Va_target: format!("{:.6}", c.target_va_degree),
    });
    Table::new(rows).with(Style::markdown()).to_string()
}
