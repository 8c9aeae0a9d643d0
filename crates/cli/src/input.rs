//! JSON input and output files
//!
//! Record files are JSON arrays. Each element is either a tagged record
//! (`{"resource": "product", "data": {...}}`) or a plain row, in which case
//! the resource comes from `--resource`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use domain::{FieldMappings, RecordData, ResourceKind, SourceRecord};

#[derive(Deserialize)]
#[serde(untagged)]
enum InputRow {
    Tagged(SourceRecord),
    Plain(RecordData),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid input", path.display()))
}

/// Load tagged records; untagged rows take `default_resource`
pub fn load_records(path: &Path, default_resource: Option<ResourceKind>) -> Result<Vec<SourceRecord>> {
    let rows: Vec<InputRow> = read_json(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            InputRow::Tagged(record) => Ok(record),
            InputRow::Plain(data) => match default_resource {
                Some(resource) => Ok(SourceRecord::new(resource, data)),
                None => bail!(
                    "row {index} in {} has no resource tag; pass --resource",
                    path.display()
                ),
            },
        })
        .collect()
}

/// Load plain rows; tagged records are unwrapped to their data
pub fn load_rows(path: &Path) -> Result<Vec<RecordData>> {
    let rows: Vec<InputRow> = read_json(path)?;
    Ok(rows
        .into_iter()
        .map(|row| match row {
            InputRow::Tagged(record) => record.data,
            InputRow::Plain(data) => data,
        })
        .collect())
}

pub fn load_mappings(path: &Path) -> Result<FieldMappings> {
    read_json(path)
}

/// Resources to migrate: the explicit list, else every kind present in the records
pub fn requested_resources(explicit: &[ResourceKind], records: &[SourceRecord]) -> Vec<ResourceKind> {
    let source: Vec<ResourceKind> = if explicit.is_empty() {
        records.iter().map(|r| r.resource).collect()
    } else {
        explicit.to_vec()
    };
    ResourceKind::ALL
        .into_iter()
        .filter(|kind| source.contains(kind))
        .collect()
}

/// Pretty JSON to `path`, or to stdout when no path is given
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
