//! crates/cardio_core/src/import/parser.rs
//!
//! Turns uploaded CSV or JSON text into `ProcessedPatient` staging records.

use std::collections::BTreeMap;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::Value;

use super::aliases::{self, Field, POSITIONAL_COLUMNS, STAGED_FIELDS};
use super::ImportError;
use crate::domain::ProcessedPatient;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Json,
}

impl ImportFormat {
    /// Picks the format from an uploaded file name (`.csv`, `.txt`, `.json`).
    pub fn from_file_name(name: &str) -> Result<Self, ImportError> {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(ImportError::UnsupportedFormat(name.to_string())),
        }
    }

    /// Guesses the format from the content itself, for pasted text.
    pub fn sniff(text: &str) -> Self {
        match text.trim_start_matches('\u{feff}').trim_start().chars().next() {
            Some('[') | Some('{') => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Parses `text` in the given format.
pub fn parse(text: &str, format: ImportFormat) -> Result<Vec<ProcessedPatient>, ImportError> {
    match format {
        ImportFormat::Csv => parse_csv(text),
        ImportFormat::Json => parse_json(text),
    }
}

/// Parses comma-separated text. A header row is optional; without one the
/// columns are read in the fixed positional order.
pub fn parse_csv(text: &str) -> Result<Vec<ProcessedPatient>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = reader
        .records()
        .filter(|row| match row {
            Ok(record) => record.iter().any(|cell| !cell.is_empty()),
            Err(_) => true,
        });

    let first = match rows.next() {
        Some(row) => row.map_err(|e| ImportError::Csv(e.to_string()))?,
        None => return Err(ImportError::Empty),
    };

    let (columns, pending_first) = match header_columns(&first) {
        Some(columns) => (columns, None),
        None => (
            POSITIONAL_COLUMNS.iter().copied().map(Some).collect(),
            Some(first),
        ),
    };

    let mut patients = Vec::new();
    let data = pending_first.into_iter().map(Ok).chain(rows);
    for row in data {
        let row = row.map_err(|e| ImportError::Csv(e.to_string()))?;
        let mut raw = BTreeMap::new();
        for (column, cell) in columns.iter().zip(row.iter()) {
            if let Some(field) = column {
                raw.insert(*field, cell.to_string());
            }
        }
        if let Some(patient) = assemble(raw) {
            patients.push(patient);
        }
    }

    tracing::debug!(count = patients.len(), "parsed CSV import");
    Ok(patients)
}

/// Maps a first row to fields if it looks like a header.
fn header_columns(row: &StringRecord) -> Option<Vec<Option<Field>>> {
    let columns: Vec<Option<Field>> = row.iter().map(aliases::resolve).collect();
    let resolved = columns.iter().filter(|c| c.is_some()).count();
    let non_empty = row.iter().filter(|c| !c.is_empty()).count();
    if resolved >= 2 || (resolved > 0 && resolved == non_empty) {
        Some(columns)
    } else {
        None
    }
}

/// Parses a JSON object or an array of objects. Nested objects are flattened
/// so `{"patient": {...}, "medical_record": {...}}` shapes are accepted too.
pub fn parse_json(text: &str) -> Result<Vec<ProcessedPatient>, ImportError> {
    let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|e| ImportError::Json(e.to_string()))?;

    let objects = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => return Err(ImportError::InvalidJsonShape),
    };

    let mut patients = Vec::new();
    for item in objects {
        let Value::Object(map) = item else {
            return Err(ImportError::InvalidJsonShape);
        };
        let mut raw = BTreeMap::new();
        flatten_into(&map, &mut raw);
        if let Some(patient) = assemble(raw) {
            patients.push(patient);
        }
    }

    tracing::debug!(count = patients.len(), "parsed JSON import");
    Ok(patients)
}

fn flatten_into(map: &serde_json::Map<String, Value>, raw: &mut BTreeMap<Field, String>) {
    for (key, value) in map {
        if let Value::Object(inner) = value {
            flatten_into(inner, raw);
            continue;
        }
        let Some(field) = aliases::resolve(key) else {
            continue;
        };
        let cell = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(true) => "si".to_string(),
            Value::Bool(false) => "no".to_string(),
            _ => continue,
        };
        // First occurrence wins when two aliases of the same field are present.
        raw.entry(field).or_insert(cell);
    }
}

/// Builds a staging record from resolved raw cells.
///
/// Returns `None` for rows that carry neither a name nor a birth date.
fn assemble(mut raw: BTreeMap<Field, String>) -> Option<ProcessedPatient> {
    let mut patient = ProcessedPatient::default();

    if let Some(full) = raw.remove(&Field::FullName) {
        raw.entry(Field::FirstName).or_insert(full);
    }

    for field in STAGED_FIELDS {
        let value = raw
            .get(&field)
            .map(|cell| aliases::normalize_value(field, cell))
            .unwrap_or_default();
        let value = if value.is_empty() {
            field.default_value().to_string()
        } else {
            value
        };
        field.set(&mut patient, value);
    }

    if patient.last_name.is_empty() {
        if let Some((first, rest)) = patient.first_name.split_once(char::is_whitespace) {
            let (first, rest) = (first.trim().to_string(), rest.trim().to_string());
            patient.first_name = first;
            patient.last_name = rest;
        }
    }

    if patient.first_name.is_empty() && patient.last_name.is_empty() && patient.birth_date.is_empty()
    {
        return None;
    }

    if patient.bmi.parse::<f64>().map_or(true, |b| b <= 0.0) {
        if let Some(bmi) = compute_bmi(&patient.weight, &patient.height) {
            patient.bmi = bmi;
        }
    }

    Some(patient)
}

/// Body mass index from kilograms and centimetres (metres accepted when < 3),
/// formatted to two decimals.
pub fn compute_bmi(weight: &str, height: &str) -> Option<String> {
    let weight: f64 = weight.trim().parse().ok()?;
    let height: f64 = height.trim().parse().ok()?;
    let metres = if height < 3.0 { height } else { height / 100.0 };
    if weight <= 0.0 || metres <= 0.0 {
        return None;
    }
    Some(format!("{:.2}", weight / (metres * metres)))
}
