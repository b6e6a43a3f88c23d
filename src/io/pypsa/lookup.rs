use std::collections::HashMap;

use crate::error::ConvertError;
use crate::io::pandapower::Network;

/// Bus name to bus index map of a target network.
///
/// Built once, after every bus has been converted, and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct BusLookup {
    map: HashMap<String, i64>,
}

impl BusLookup {
    /// Indexes the named buses of `net` in one pass.
    ///
    /// A name seen twice is rejected, since a later row would silently shadow
    /// the earlier one.
    pub fn from_network(net: &Network) -> Result<Self, ConvertError> {
        let mut map = HashMap::with_capacity(net.bus.len());
        for bus in &net.bus {
            let Some(name) = &bus.name else { continue };
            if map.insert(name.clone(), bus.index).is_some() {
                return Err(ConvertError::DuplicateBus(name.clone()));
            }
        }
        Ok(Self { map })
    }

    pub fn get(&self, bus: &str) -> Option<i64> {
        self.map.get(bus).copied()
    }

    /// Index of `bus`, or a missing reference error naming the element that asked for it.
    pub fn resolve(
        &self,
        element: &'static str,
        name: &str,
        bus: &str,
    ) -> Result<i64, ConvertError> {
        self.get(bus).ok_or_else(|| ConvertError::MissingReference {
            element,
            name: name.to_owned(),
            bus: bus.to_owned(),
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
