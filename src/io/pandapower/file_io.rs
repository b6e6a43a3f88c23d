use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;

use crate::error::IoError;

/// This module is used to parse and write pandapower network parameters

/// Deserializes an optional integer that pandas may have stored as a float.
fn from_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    Ok(val.as_f64().map(|n| n as i64))
}

/// Deserializes a name that pandas may have stored as a number.
fn from_str<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    match val {
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_parallel() -> i32 {
    1
}

/// Represents a bus in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Bus {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub vn_kv: f64,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(deserialize_with = "from_number")]
    pub zone: Option<i64>,
    #[serde(default = "default_true")]
    pub in_service: bool,
    pub max_vm_pu: Option<f64>,
    pub min_vm_pu: Option<f64>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            vn_kv: 0.0,
            type_: Some("b".into()),
            zone: None,
            in_service: true,
            max_vm_pu: None,
            min_vm_pu: None,
        }
    }
}

/// Represents a voltage controlled generator in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Gen {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub p_mw: f64,
    pub vm_pu: f64,
    pub sn_mva: Option<f64>,
    pub min_q_mvar: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub min_p_mw: Option<f64>,
    pub max_p_mw: Option<f64>,
    #[serde(default = "default_one")]
    pub scaling: f64,
    pub slack: bool,
    #[serde(default = "default_true")]
    pub in_service: bool,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub controllable: Option<bool>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            vm_pu: 1.0,
            sn_mva: None,
            min_q_mvar: None,
            max_q_mvar: None,
            min_p_mw: None,
            max_p_mw: None,
            scaling: 1.0,
            slack: false,
            in_service: true,
            type_: None,
            controllable: None,
        }
    }
}

/// Represents a load in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Load {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub const_z_percent: f64,
    pub const_i_percent: f64,
    pub sn_mva: Option<f64>,
    #[serde(default = "default_one")]
    pub scaling: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub controllable: Option<bool>,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            const_z_percent: 0.0,
            const_i_percent: 0.0,
            sn_mva: None,
            scaling: 1.0,
            in_service: true,
            type_: Some("wye".into()),
            controllable: None,
        }
    }
}

/// Represents a line in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Line {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub std_type: Option<String>,
    pub from_bus: i64,
    pub to_bus: i64,
    pub length_km: f64,
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub c_nf_per_km: f64,
    pub g_us_per_km: f64,
    pub max_i_ka: f64,
    #[serde(default = "default_one")]
    pub df: f64,
    #[serde(default = "default_parallel")]
    pub parallel: i32,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(default = "default_true")]
    pub in_service: bool,
    pub max_loading_percent: Option<f64>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            std_type: None,
            from_bus: 0,
            to_bus: 0,
            length_km: 0.0,
            r_ohm_per_km: 0.0,
            x_ohm_per_km: 0.0,
            c_nf_per_km: 0.0,
            g_us_per_km: 0.0,
            max_i_ka: 0.0,
            df: 1.0,
            parallel: 1,
            type_: None,
            in_service: true,
            max_loading_percent: None,
        }
    }
}

/// Represents a two-winding transformer in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Transformer {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub std_type: Option<String>,
    pub hv_bus: i64,
    pub lv_bus: i64,
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    pub pfe_kw: f64,
    pub i0_percent: f64,
    pub shift_degree: f64,
    pub tap_side: Option<String>,
    pub tap_neutral: Option<f64>,
    pub tap_min: Option<f64>,
    pub tap_max: Option<f64>,
    pub tap_step_percent: Option<f64>,
    pub tap_step_degree: Option<f64>,
    pub tap_pos: Option<f64>,
    pub tap_phase_shifter: bool,
    #[serde(default = "default_parallel")]
    pub parallel: i32,
    #[serde(default = "default_one")]
    pub df: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
    pub max_loading_percent: Option<f64>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            std_type: None,
            hv_bus: 0,
            lv_bus: 0,
            sn_mva: 0.0,
            vn_hv_kv: 0.0,
            vn_lv_kv: 0.0,
            vk_percent: 0.0,
            vkr_percent: 0.0,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            shift_degree: 0.0,
            tap_side: None,
            tap_neutral: None,
            tap_min: None,
            tap_max: None,
            tap_step_percent: None,
            tap_step_degree: None,
            tap_pos: None,
            tap_phase_shifter: false,
            parallel: 1,
            df: 1.0,
            in_service: true,
            max_loading_percent: None,
        }
    }
}

/// Represents an external grid in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExtGrid {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub vm_pu: f64,
    pub va_degree: f64,
    #[serde(default = "default_one")]
    pub slack_weight: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
    pub max_p_mw: Option<f64>,
    pub min_p_mw: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub min_q_mvar: Option<f64>,
}

impl Default for ExtGrid {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            vm_pu: 1.0,
            va_degree: 0.0,
            slack_weight: 1.0,
            in_service: true,
            max_p_mw: None,
            min_p_mw: None,
            max_q_mvar: None,
            min_q_mvar: None,
        }
    }
}

/// Represents a static generator in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SGen {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub sn_mva: Option<f64>,
    #[serde(default = "default_one")]
    pub scaling: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub current_source: bool,
    pub controllable: Option<bool>,
}

impl Default for SGen {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            sn_mva: None,
            scaling: 1.0,
            in_service: true,
            type_: Some("wye".into()),
            current_source: false,
            controllable: None,
        }
    }
}

/// Represents a shunt in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Shunt {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub q_mvar: f64,
    pub p_mw: f64,
    pub vn_kv: f64,
    pub step: i32,
    pub max_step: i32,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Default for Shunt {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            q_mvar: 0.0,
            p_mw: 0.0,
            vn_kv: 0.0,
            step: 1,
            max_step: 1,
            in_service: true,
        }
    }
}

/// Bus results of a power flow or optimal power flow.
///
/// `p_mw` and `q_mvar` follow the load convention: positive values are consumed at the bus.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ResBus {
    pub index: i64,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// Power results of an injecting element (ext grid or generator).
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ResInjection {
    pub index: i64,
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// A pandapower-style network: integer-indexed element tables plus result tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub name: Option<String>,
    pub f_hz: f64,
    pub sn_mva: f64,
    pub bus: Vec<Bus>,
    pub line: Vec<Line>,
    pub trafo: Vec<Transformer>,
    pub load: Vec<Load>,
    pub sgen: Vec<SGen>,
    pub r#gen: Vec<Gen>,
    pub ext_grid: Vec<ExtGrid>,
    pub shunt: Vec<Shunt>,
    pub res_bus: Vec<ResBus>,
    pub res_ext_grid: Vec<ResInjection>,
    pub res_gen: Vec<ResInjection>,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            name: None,
            f_hz: 50.0,
            sn_mva: 1.0,
            bus: Vec::new(),
            line: Vec::new(),
            trafo: Vec::new(),
            load: Vec::new(),
            sgen: Vec::new(),
            r#gen: Vec::new(),
            ext_grid: Vec::new(),
            shunt: Vec::new(),
            res_bus: Vec::new(),
            res_ext_grid: Vec::new(),
            res_gen: Vec::new(),
        }
    }
}

impl Network {
    /// Position of a bus index in the bus table.
    pub fn bus_position(&self, index: i64) -> Option<usize> {
        self.bus.iter().position(|b| b.index == index)
    }

    /// Result row of a bus index, if results are present.
    pub fn res_bus_at(&self, index: i64) -> Option<&ResBus> {
        self.res_bus.iter().find(|r| r.index == index)
    }

    /// Clears all result tables.
    pub fn clear_results(&mut self) {
        self.res_bus.clear();
        self.res_ext_grid.clear();
        self.res_gen.clear();
    }
}

const PANDAPOWER_VERSION: &str = "2.14.0";

/// Macro to read network tables from the `_object` map of a pandapower JSON file.
macro_rules! read_json_network {
    ($net:ident, $map:ident, { $($field:ident: $key:expr),* $(,)? }) => {
        $(
            if let Some(table) = load_pandapower_element_json(&$map, $key)? {
                $net.$field = table;
            }
        )*
    };
}

/// Macro to write network tables into the `_object` map of a pandapower JSON file.
macro_rules! write_json_network {
    ($net:ident, $map:ident, { $($field:ident: $key:expr),* $(,)? }) => {
        $(
            $map.insert($key.to_string(), dataframe_to_json(&$net.$field)?);
        )*
    };
}

fn load_json_from_str(file_content: &str) -> Result<Map<String, Value>, IoError> {
    let parsed: Value = serde_json::from_str(file_content)?;
    match parsed {
        Value::Object(obj) => Ok(obj),
        _ => Err(IoError::Malformed("expected a JSON object".into())),
    }
}

/// Reads one DataFrame stored in `split` orientation.
///
/// Returns `None` when the key is absent. Row indices come from the frame's
/// `index` array and fall back to the row position.
fn load_pandapower_element_json<T: DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<T>>, IoError> {
    let Some(element) = object
        .get(key)
        .and_then(|v| v.as_object())
        .and_then(|v| v.get("_object"))
    else {
        return Ok(None);
    };
    let frame = match element {
        Value::String(s) => load_json_from_str(s)?,
        Value::Object(m) => m.clone(),
        _ => return Err(IoError::Malformed(format!("table '{key}' is not a DataFrame"))),
    };

    let headers = frame
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| IoError::Malformed(format!("table '{key}' has no columns")))?;
    let rows = frame
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| IoError::Malformed(format!("table '{key}' has no data")))?;
    let index = frame.get("index").and_then(|v| v.as_array());

    let mut elements = Vec::with_capacity(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        let row = row
            .as_array()
            .ok_or_else(|| {
                IoError::Malformed(format!("row {pos} of table '{key}' is not an array"))
            })?;
        let mut obj: Map<String, Value> = headers
            .iter()
            .zip(row)
            .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v.clone())))
            .collect();
        let idx = index
            .and_then(|i| i.get(pos))
            .and_then(|v| v.as_i64())
            .unwrap_or(pos as i64);
        obj.insert("index".to_string(), Value::from(idx));

        elements.push(serde_json::from_value(Value::Object(obj))?);
    }
    Ok(Some(elements))
}

fn dtype_of(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int64",
        _ => "object",
    }
}

/// Writes a table as a pandas DataFrame in `split` orientation.
fn dataframe_to_json<T: Serialize + Default>(rows: &[T]) -> Result<Value, IoError> {
    let mut columns: Vec<String> = Vec::new();
    let mut dtype = Map::new();
    if let Value::Object(template) = serde_json::to_value(T::default())? {
        for (k, v) in template {
            if k != "index" {
                dtype.insert(k.clone(), Value::from(dtype_of(&v)));
                columns.push(k);
            }
        }
    }

    let mut index = Vec::with_capacity(rows.len());
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Object(mut obj) = serde_json::to_value(row)? else {
            return Err(IoError::Malformed("table rows must serialise to objects".into()));
        };
        index.push(obj.remove("index").unwrap_or(Value::Null));
        let values: Vec<Value> = columns
            .iter()
            .map(|c| obj.remove(c).unwrap_or(Value::Null))
            .collect();
        for (c, v) in columns.iter().zip(&values) {
            if !v.is_null() {
                dtype.insert(c.clone(), Value::from(dtype_of(v)));
            }
        }
        data.push(Value::Array(values));
    }

    let frame = json!({ "columns": columns, "index": index, "data": data });
    Ok(json!({
        "_module": "pandas.core.frame",
        "_class": "DataFrame",
        "_object": serde_json::to_string(&frame)?,
        "orient": "split",
        "dtype": dtype,
    }))
}

/// Parses a pandapower network from the contents of a pandapower JSON file.
pub fn load_pandapower_json_str(content: &str) -> Result<Network, IoError> {
    let map = load_json_from_str(content)?;
    let object = map
        .get("_object")
        .and_then(|v| v.as_object())
        .ok_or_else(|| IoError::Malformed("missing pandapowerNet '_object'".into()))?;

    let mut net = Network {
        bus: load_pandapower_element_json(object, "bus")?
            .ok_or_else(|| IoError::MissingTable("bus".into()))?,
        ..Default::default()
    };
    read_json_network!(net, object, {
        line: "line",
        trafo: "trafo",
        load: "load",
        sgen: "sgen",
        r#gen: "gen",
        ext_grid: "ext_grid",
        shunt: "shunt",
        res_bus: "res_bus",
        res_ext_grid: "res_ext_grid",
        res_gen: "res_gen",
    });
    if let Some(f) = object.get("f_hz").and_then(|v| v.as_f64()) {
        net.f_hz = f;
    }
    if let Some(s) = object.get("sn_mva").and_then(|v| v.as_f64()) {
        net.sn_mva = s;
    }
    net.name = object
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    Ok(net)
}

/// Loads a pandapower network from a JSON file.
pub fn load_pandapower_json(file_path: impl AsRef<Path>) -> Result<Network, IoError> {
    let content = fs::read_to_string(file_path)?;
    load_pandapower_json_str(&content)
}

/// Serialises a network into the pandapower JSON layout.
pub fn to_pandapower_json_string(net: &Network) -> Result<String, IoError> {
    let mut object = Map::new();
    write_json_network!(net, object, {
        bus: "bus",
        line: "line",
        trafo: "trafo",
        load: "load",
        sgen: "sgen",
        r#gen: "gen",
        ext_grid: "ext_grid",
        shunt: "shunt",
        res_bus: "res_bus",
        res_ext_grid: "res_ext_grid",
        res_gen: "res_gen",
    });
    object.insert("f_hz".into(), Value::from(net.f_hz));
    object.insert("sn_mva".into(), Value::from(net.sn_mva));
    object.insert("name".into(), Value::from(net.name.clone().unwrap_or_default()));
    object.insert("version".into(), Value::from(PANDAPOWER_VERSION));

    let root = json!({
        "_module": "pandapower.auxiliary",
        "_class": "pandapowerNet",
        "_object": object,
    });
    Ok(serde_json::to_string_pretty(&root)?)
}

/// Writes a network to a pandapower JSON file.
pub fn save_pandapower_json(net: &Network, file_path: impl AsRef<Path>) -> Result<(), IoError> {
    fs::write(file_path, to_pandapower_json_string(net)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUS_ONLY: &str = r#"{
        "_module": "pandapower.auxiliary",
        "_class": "pandapowerNet",
        "_object": {
            "bus": {
                "_module": "pandas.core.frame",
                "_class": "DataFrame",
                "_object": "{\"columns\":[\"name\",\"vn_kv\",\"type\",\"zone\",\"in_service\"],\"index\":[3,7],\"data\":[[\"a\",20.0,\"b\",null,true],[12,0.4,\"b\",1.0,false]]}",
                "orient": "split"
            },
            "f_hz": 60.0,
            "sn_mva": 100.0
        }
    }"#;

    #[test]
    fn test_load_json() {
        let net = load_pandapower_json_str(BUS_ONLY).unwrap();
        assert_eq!(net.bus.len(), 2);
        assert_eq!(net.bus[0].index, 3);
        assert_eq!(net.bus[1].index, 7);
        assert_eq!(net.bus[1].name.as_deref(), Some("12"));
        assert_eq!(net.bus[1].zone, Some(1));
        assert!(!net.bus[1].in_service);
        assert_eq!(net.f_hz, 60.0);
        assert_eq!(net.sn_mva, 100.0);
        assert!(net.line.is_empty());
    }

    #[test]
    fn test_missing_bus_table() {
        let err = load_pandapower_json_str(r#"{"_object": {"f_hz": 50.0}}"#).unwrap_err();
        assert!(matches!(err, IoError::MissingTable(t) if t == "bus"));
    }

    #[test]
    fn test_write_then_read() {
        let mut net = Network::default();
        net.bus.push(Bus {
            index: 0,
            name: Some("MV bus".into()),
            vn_kv: 20.0,
            ..Default::default()
        });
        net.bus.push(Bus {
            index: 1,
            name: Some("LV bus".into()),
            vn_kv: 0.4,
            ..Default::default()
        });
        net.line.push(Line {
            from_bus: 0,
            to_bus: 1,
            length_km: 0.1,
            r_ohm_per_km: 0.642,
            x_ohm_per_km: 0.083,
            ..Default::default()
        });
        net.res_bus.push(ResBus {
            index: 1,
            vm_pu: 0.98,
            va_degree: -150.2,
            ..Default::default()
        });

        let text = to_pandapower_json_string(&net).unwrap();
        let back = load_pandapower_json_str(&text).unwrap();
        assert_eq!(back, net);
    }

    #[test]
    fn test_dtype_inference() {
        let v = dataframe_to_json(&[Bus {
            vn_kv: 20.0,
            ..Default::default()
        }])
        .unwrap();
        assert_eq!(v["dtype"]["vn_kv"], "float64");
        assert_eq!(v["dtype"]["in_service"], "bool");
        assert_eq!(v["dtype"]["name"], "object");
        assert_eq!(v["orient"], "split");
    }
}
