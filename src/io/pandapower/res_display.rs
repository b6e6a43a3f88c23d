use std::fmt;

use tabled::{Table, Tabled, settings::Style};

use super::file_io::Network;

/// A wrapper around a float that limits the number of decimal places when printed.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

/// Table row for display Bus results.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct BusResTable {
    pub(crate) Bus: i64,
    pub(crate) Name: String,
    pub(crate) Vm: FloatWrapper,
    pub(crate) Va: FloatWrapper,
    pub(crate) P_mw: FloatWrapper,
    pub(crate) Q_mvar: FloatWrapper,
}

/// Renders the bus results of a network as a text table.
pub fn res_bus_table(net: &Network) -> String {
    let rows: Vec<BusResTable> = net
        .res_bus
        .iter()
        .map(|r| BusResTable {
            Bus: r.index,
            Name: net
                .bus
                .iter()
                .find(|b| b.index == r.index)
                .and_then(|b| b.name.clone())
                .unwrap_or_default(),
            Vm: FloatWrapper::new(r.vm_pu, 6),
            Va: FloatWrapper::new(r.va_degree, 6),
            P_mw: FloatWrapper::new(r.p_mw, 4),
            Q_mvar: FloatWrapper::new(r.q_mvar, 4),
        })
        .collect();
    Table::new(rows).with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pandapower::{Bus, ResBus};

    #[test]
    fn test_res_bus_table() {
        let mut net = Network::default();
        net.bus.push(Bus {
            name: Some("MV bus".into()),
            vn_kv: 20.0,
            ..Default::default()
        });
        net.res_bus.push(ResBus {
            index: 0,
            vm_pu: 1.02,
            va_degree: 0.0,
            p_mw: -0.1,
            q_mvar: 0.0,
        });
        let text = res_bus_table(&net);
        assert!(text.contains("MV bus"));
        assert!(text.contains("1.020000"));
        assert!(text.contains("Q_mvar"));
    }
}
