//! PyPSA CSV folder layout: one file per component table, indexed by `name`,
//! plus optional per-snapshot bus results.

use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::network::*;
use crate::error::IoError;

const SNAPSHOT: &str = "now";

#[derive(Debug, Serialize, Deserialize)]
struct BusRow {
    name: String,
    v_nom: Option<f64>,
    v_mag_pu_set: Option<f64>,
    control: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LineRow {
    name: String,
    bus0: String,
    bus1: String,
    #[serde(rename = "type")]
    type_: Option<String>,
    length: Option<f64>,
    r: Option<f64>,
    x: Option<f64>,
    g: Option<f64>,
    b: Option<f64>,
    num_parallel: Option<f64>,
    terrain_factor: Option<f64>,
    s_nom: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransformerRow {
    name: String,
    bus0: String,
    bus1: String,
    #[serde(rename = "type")]
    type_: Option<String>,
    r: Option<f64>,
    x: Option<f64>,
    g: Option<f64>,
    b: Option<f64>,
    s_nom: Option<f64>,
    tap_ratio: Option<f64>,
    tap_position: Option<f64>,
    phase_shift: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeneratorRow {
    name: String,
    bus: String,
    control: Option<String>,
    p_set: Option<f64>,
    q_set: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadRow {
    name: String,
    bus: String,
    p_set: Option<f64>,
    q_set: Option<f64>,
    sign: Option<f64>,
}

impl From<BusRow> for Bus {
    fn from(r: BusRow) -> Self {
        Bus {
            v_mag_pu_set: r.v_mag_pu_set.unwrap_or(1.0),
            control: r.control.filter(|c| !c.is_empty()).unwrap_or_else(|| "PQ".into()),
            ..Bus::new(r.name, r.v_nom.unwrap_or(1.0))
        }
    }
}

impl From<LineRow> for Line {
    fn from(r: LineRow) -> Self {
        let d = Line::new(r.name, r.bus0, r.bus1);
        Line {
            type_: r.type_.unwrap_or_default(),
            length: r.length.unwrap_or(d.length),
            r: r.r.unwrap_or(d.r),
            x: r.x.unwrap_or(d.x),
            g: r.g.unwrap_or(d.g),
            b: r.b.unwrap_or(d.b),
            num_parallel: r.num_parallel.unwrap_or(d.num_parallel),
            terrain_factor: r.terrain_factor.unwrap_or(d.terrain_factor),
            s_nom: r.s_nom.unwrap_or(d.s_nom),
            ..d
        }
    }
}

impl From<TransformerRow> for Transformer {
    fn from(r: TransformerRow) -> Self {
        let d = Transformer::new(r.name, r.bus0, r.bus1);
        Transformer {
            type_: r.type_.unwrap_or_default(),
            r: r.r.unwrap_or(d.r),
            x: r.x.unwrap_or(d.x),
            g: r.g.unwrap_or(d.g),
            b: r.b.unwrap_or(d.b),
            s_nom: r.s_nom.unwrap_or(d.s_nom),
            tap_ratio: r.tap_ratio.unwrap_or(d.tap_ratio),
            tap_position: r.tap_position.unwrap_or(d.tap_position),
            phase_shift: r.phase_shift.unwrap_or(d.phase_shift),
            ..d
        }
    }
}

impl From<GeneratorRow> for Generator {
    fn from(r: GeneratorRow) -> Self {
        let control = r.control.filter(|c| !c.is_empty()).unwrap_or_else(|| "PQ".into());
        Generator::new(r.name, r.bus, control)
            .with_setpoint(r.p_set.unwrap_or(0.0), r.q_set.unwrap_or(0.0))
    }
}

impl From<LoadRow> for Load {
    fn from(r: LoadRow) -> Self {
        Load::new(r.name, r.bus, r.p_set.unwrap_or(0.0), r.q_set.unwrap_or(0.0))
            .with_sign(r.sign.unwrap_or(-1.0))
    }
}

/// Parses a CSV table after normalising Python's `True`/`False` literals.
fn parse_table<T: DeserializeOwned>(content: &str) -> Result<Vec<T>, IoError> {
    let content = content.replace("True", "true").replace("False", "false");
    let mut rdr = ReaderBuilder::new().from_reader(content.as_bytes());
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Reads one snapshot row of a `buses-<attr>.csv` series file.
///
/// The first column holds the snapshot name; the "now" row is used, or the
/// first row if there is none.
fn parse_series(content: &str) -> Result<HashMap<String, f64>, IoError> {
    let mut rdr = ReaderBuilder::new().from_reader(content.as_bytes());
    let headers = rdr.headers()?.clone();
    let mut chosen = None;
    for record in rdr.records() {
        let record = record?;
        let is_now = record.get(0) == Some(SNAPSHOT);
        if chosen.is_none() || is_now {
            chosen = Some(record);
        }
        if is_now {
            break;
        }
    }
    let Some(record) = chosen else {
        return Ok(HashMap::new());
    };

    let mut out = HashMap::with_capacity(headers.len().saturating_sub(1));
    for (bus, value) in headers.iter().zip(record.iter()).skip(1) {
        let v: f64 = value.trim().parse().map_err(|_| {
            IoError::Malformed(format!("value '{value}' for bus '{bus}' is not a number"))
        })?;
        out.insert(bus.to_owned(), v);
    }
    Ok(out)
}

/// Assembles a network from table contents fetched by file name.
fn load_tables<F>(mut read: F) -> Result<SourceNetwork, IoError>
where
    F: FnMut(&str) -> Result<Option<String>, IoError>,
{
    let buses = read("buses.csv")?.ok_or_else(|| IoError::MissingTable("buses.csv".into()))?;
    let mut net = SourceNetwork::new();
    net.buses = parse_table::<BusRow>(&buses)?.into_iter().map(Bus::from).collect();

    macro_rules! read_csv_network {
        ($($field:ident: $row:ty => $file:expr),* $(,)?) => {
            $(
                if let Some(content) = read($file)? {
                    net.$field = parse_table::<$row>(&content)?
                        .into_iter()
                        .map(Into::into)
                        .collect();
                }
            )*
        };
    }
    read_csv_network!(
        lines: LineRow => "lines.csv",
        transformers: TransformerRow => "transformers.csv",
        generators: GeneratorRow => "generators.csv",
        loads: LoadRow => "loads.csv",
    );

    let v_mag = read("buses-v_mag_pu.csv")?;
    let v_ang = read("buses-v_ang.csv")?;
    if let (Some(v_mag), Some(v_ang)) = (v_mag, v_ang) {
        net.buses_t = Some(BusesT {
            v_mag_pu: parse_series(&v_mag)?,
            v_ang: parse_series(&v_ang)?,
        });
    }
    debug!(
        buses = net.buses.len(),
        lines = net.lines.len(),
        transformers = net.transformers.len(),
        generators = net.generators.len(),
        loads = net.loads.len(),
        "loaded source network"
    );
    Ok(net)
}

/// Loads a network from a PyPSA CSV folder. Only `buses.csv` is required.
pub fn load_csv_folder(folder: impl AsRef<Path>) -> Result<SourceNetwork, IoError> {
    let folder = folder.as_ref();
    load_tables(|name| {
        let path = folder.join(name);
        if path.is_file() {
            Ok(Some(fs::read_to_string(path)?))
        } else {
            Ok(None)
        }
    })
}

/// Loads a network from a zip archive holding the CSV folder layout.
#[cfg(feature = "zip")]
pub fn load_csv_zip(path: impl AsRef<Path>) -> Result<SourceNetwork, IoError> {
    use std::io::Read;

    let f = fs::File::open(path)?;
    let mut zip = zip::ZipArchive::new(f)?;
    let mut map = HashMap::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_file() {
            let mut s = String::with_capacity(file.size() as usize);
            file.read_to_string(&mut s)?;
            let name = file.name().rsplit('/').next().unwrap_or_default().to_owned();
            map.insert(name, s);
        }
    }
    load_tables(|name| Ok(map.remove(name)))
}

fn write_table<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), IoError> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_series(path: &Path, buses: &[Bus], values: &HashMap<String, f64>) -> Result<(), IoError> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    let mut header = vec!["snapshot".to_string()];
    let mut row = vec![SNAPSHOT.to_string()];
    for b in buses {
        if let Some(v) = values.get(&b.name) {
            header.push(b.name.clone());
            row.push(v.to_string());
        }
    }
    wtr.write_record(&header)?;
    wtr.write_record(&row)?;
    wtr.flush()?;
    Ok(())
}

/// Writes a network in the PyPSA CSV folder layout; empty tables are skipped.
pub fn save_csv_folder(net: &SourceNetwork, folder: impl AsRef<Path>) -> Result<(), IoError> {
    let folder = folder.as_ref();
    fs::create_dir_all(folder)?;

    write_table(
        &folder.join("buses.csv"),
        net.buses.iter().map(|b| BusRow {
            name: b.name.clone(),
            v_nom: Some(b.v_nom),
            v_mag_pu_set: Some(b.v_mag_pu_set),
            control: Some(b.control.clone()),
        }),
    )?;
    if !net.lines.is_empty() {
        write_table(
            &folder.join("lines.csv"),
            net.lines.iter().map(|l| LineRow {
                name: l.name.clone(),
                bus0: l.bus0.clone(),
                bus1: l.bus1.clone(),
                type_: Some(l.type_.clone()),
                length: Some(l.length),
                r: Some(l.r),
                x: Some(l.x),
                g: Some(l.g),
                b: Some(l.b),
                num_parallel: Some(l.num_parallel),
                terrain_factor: Some(l.terrain_factor),
                s_nom: Some(l.s_nom),
            }),
        )?;
    }
    if !net.transformers.is_empty() {
        write_table(
            &folder.join("transformers.csv"),
            net.transformers.iter().map(|t| TransformerRow {
                name: t.name.clone(),
                bus0: t.bus0.clone(),
                bus1: t.bus1.clone(),
                type_: Some(t.type_.clone()),
                r: Some(t.r),
                x: Some(t.x),
                g: Some(t.g),
                b: Some(t.b),
                s_nom: Some(t.s_nom),
                tap_ratio: Some(t.tap_ratio),
                tap_position: Some(t.tap_position),
                phase_shift: Some(t.phase_shift),
            }),
        )?;
    }
    if !net.generators.is_empty() {
        write_table(
            &folder.join("generators.csv"),
            net.generators.iter().map(|g| GeneratorRow {
                name: g.name.clone(),
                bus: g.bus.clone(),
                control: Some(g.control.clone()),
                p_set: Some(g.p_set),
                q_set: Some(g.q_set),
            }),
        )?;
    }
    if !net.loads.is_empty() {
        write_table(
            &folder.join("loads.csv"),
            net.loads.iter().map(|l| LoadRow {
                name: l.name.clone(),
                bus: l.bus.clone(),
                p_set: Some(l.p_set),
                q_set: Some(l.q_set),
                sign: Some(l.sign),
            }),
        )?;
    }
    if let Some(res) = &net.buses_t {
        write_series(&folder.join("buses-v_mag_pu.csv"), &net.buses, &res.v_mag_pu)?;
        write_series(&folder.join("buses-v_ang.csv"), &net.buses, &res.v_ang)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_csv_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("buses.csv"),
            "name,v_nom,v_mag_pu_set,control\nMV bus,20,1.02,Slack\nLV bus,0.4,,\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("lines.csv"),
            "name,bus0,bus1,type,length,r,x\ncable,MV bus,LV bus,,2.0,0.5,0.2\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("loads.csv"),
            "name,bus,p_set,q_set,sign\nload,LV bus,0.1,0.0,-1\n",
        )
        .unwrap();

        let net = load_csv_folder(dir.path()).unwrap();
        assert_eq!(net.buses.len(), 2);
        assert_eq!(net.buses[0].v_mag_pu_set, 1.02);
        assert_eq!(net.buses[1].v_mag_pu_set, 1.0);
        assert_eq!(net.buses[1].control, "PQ");
        assert_eq!(net.lines[0].type_, "");
        assert_eq!(net.lines[0].num_parallel, 1.0);
        assert_eq!(net.loads[0].sign, -1.0);
        assert!(net.transformers.is_empty());
        assert!(net.buses_t.is_none());
    }

    #[test]
    fn test_missing_buses() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_csv_folder(dir.path()),
            Err(IoError::MissingTable(t)) if t == "buses.csv"
        ));
    }

    #[test]
    fn test_series_prefers_now() {
        let s = parse_series("snapshot,a,b\nearlier,0.9,0.8\nnow,1.0,0.99\n").unwrap();
        assert_eq!(s["a"], 1.0);
        assert_eq!(s["b"], 0.99);
        assert!(parse_series("snapshot,a\nnow,abc\n").is_err());
    }

    #[test]
    fn test_save_then_load() {
        let mut net = SourceNetwork::new();
        net.buses.push(Bus::new("a", 20.0).with_v_mag_pu_set(1.02));
        net.buses.push(Bus::new("b", 0.4));
        net.transformers.push(Transformer::new("t", "a", "b").with_type("0.4 MVA 20/0.4 kV"));
        net.generators.push(Generator::new("grid", "a", "Slack"));
        let mut res = BusesT::default();
        res.v_mag_pu.insert("a".into(), 1.02);
        res.v_mag_pu.insert("b".into(), 0.995);
        res.v_ang.insert("a".into(), 0.0);
        res.v_ang.insert("b".into(), -2.62);
        net.buses_t = Some(res);

        let dir = tempfile::tempdir().unwrap();
        save_csv_folder(&net, dir.path()).unwrap();
        let back = load_csv_folder(dir.path()).unwrap();
        assert_eq!(back, net);
    }
}
