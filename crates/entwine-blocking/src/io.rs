//! JSON Lines input and output.
//!
//! Records arrive one JSON object per line. The attribute schema is either
//! given explicitly or inferred from the first object's keys; every record
//! is flattened onto that schema, with absent or null fields read as empty
//! text. Output mirrors the format: one pair object per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use serde_json::{Map, Value};

use entwine_core::{EntwineError, Record, RecordCollection, Result};

use crate::graph::CandidateGraph;
use crate::topk::NeighborMap;

/// Field holding a record's identifier unless overridden.
pub const DEFAULT_ID_FIELD: &str = "id";

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EntwineError::NotFound(path.display().to_string()),
        _ => EntwineError::Io(e),
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reads a JSONL file into an attribute schema and its records.
///
/// With `attributes` unset, the schema is the first object's keys minus the
/// id field, sorted. Fields a record lacks are read as empty text.
pub fn read_records(
    path: &Path,
    id_field: &str,
    attributes: Option<&[String]>,
) -> Result<(Vec<String>, Vec<Record>)> {
    let reader = BufReader::new(open(path)?);
    let mut objects: Vec<(usize, Map<String, Value>)> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            EntwineError::InvalidFormat(format!("{}:{line_number}: {e}", path.display()))
        })?;
        match value {
            Value::Object(object) => objects.push((line_number, object)),
            _ => {
                return Err(EntwineError::InvalidFormat(format!(
                    "{}:{line_number}: expected a JSON object",
                    path.display()
                )))
            }
        }
    }

    let columns: Vec<String> = match attributes {
        Some(names) => names.to_vec(),
        None => {
            let (_, first) = objects.first().ok_or_else(|| {
                EntwineError::InvalidFormat(format!(
                    "{}: no records to infer attributes from",
                    path.display()
                ))
            })?;
            let mut keys: Vec<String> =
                first.keys().filter(|key| *key != id_field).cloned().collect();
            keys.sort_unstable();
            keys
        }
    };

    let mut records = Vec::with_capacity(objects.len());
    for (line_number, object) in objects {
        let id = object.get(id_field).map(scalar_text).unwrap_or_default();
        if id.is_empty() {
            return Err(EntwineError::InvalidFormat(format!(
                "{}:{line_number}: missing id field {id_field:?}",
                path.display()
            )));
        }
        let values = columns
            .iter()
            .map(|column| object.get(column).map(scalar_text).unwrap_or_default())
            .collect();
        records.push(Record::new(id, values));
    }
    Ok((columns, records))
}

/// Loads one or two JSONL files into a record collection.
///
/// A second path switches the collection to clean-clean resolution.
pub fn load_collection(
    path_1: &Path,
    path_2: Option<&Path>,
    id_field: &str,
    attributes_1: Option<&[String]>,
    attributes_2: Option<&[String]>,
) -> Result<RecordCollection> {
    let (columns_1, records_1) = read_records(path_1, id_field, attributes_1)?;
    match path_2 {
        None => RecordCollection::dirty(columns_1, records_1),
        Some(path_2) => {
            let (columns_2, records_2) = read_records(path_2, id_field, attributes_2)?;
            RecordCollection::clean_clean(columns_1, records_1, columns_2, records_2)
        }
    }
}

/// Writes a match graph as JSONL pairs, best first.
pub fn write_pairs(path: &Path, graph: &CandidateGraph) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for edge in graph.sorted_edges() {
        let line = serde_json::json!({
            "source": edge.source,
            "target": edge.target,
            "weight": edge.weight,
        });
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes pruned candidates as JSONL pairs in canonical order.
pub fn write_neighbor_pairs(path: &Path, neighbors: &NeighborMap) -> Result<()> {
    let mut pairs: Vec<(usize, usize)> = neighbors
        .iter()
        .flat_map(|(&id, set)| {
            set.iter().filter(move |&&n| id < n).map(move |&n| (id, n))
        })
        .collect();
    pairs.sort_unstable();
    pairs.dedup();

    let mut writer = BufWriter::new(File::create(path)?);
    for (source, target) in pairs {
        let line = serde_json::json!({ "source": source, "target": target });
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}
