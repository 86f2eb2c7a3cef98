//! crates/cardio_core/src/export.rs
//!
//! CSV exports of imported patients and of mass-prediction results.
//! Patient exports use the canonical headers, so they can be imported again.

use csv::Writer;

use crate::import::aliases::STAGED_FIELDS;
use crate::import::ScoredPatient;
use crate::domain::ProcessedPatient;

/// Header of the prediction export.
pub const PREDICTION_COLUMNS: [&str; 6] = [
    "nombre",
    "apellidos",
    "fecha_nacimiento",
    "riesgo",
    "probabilidad",
    "factores",
];

/// Separator used when joining contributing factors into one cell.
pub const FACTOR_SEPARATOR: &str = "; ";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer could not be flushed: {0}")]
    Flush(String),
    #[error("CSV output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Every staged field of every patient, one row each.
pub fn patients_to_csv(patients: &[ProcessedPatient]) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(STAGED_FIELDS.iter().map(|f| f.canonical()))?;
    for patient in patients {
        writer.write_record(STAGED_FIELDS.iter().map(|f| f.get(patient)))?;
    }
    finish(writer)
}

/// Name, birth date and the prediction of each scored patient.
pub fn predictions_to_csv(results: &[ScoredPatient]) -> Result<String, ExportError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(PREDICTION_COLUMNS)?;
    for scored in results {
        let prediction = &scored.prediction;
        let probability = format!("{:.1}", prediction.probability);
        let factors = prediction.factors.join(FACTOR_SEPARATOR);
        writer.write_record([
            scored.patient.first_name.as_str(),
            scored.patient.last_name.as_str(),
            scored.patient.birth_date.as_str(),
            prediction.risk_level.label(),
            probability.as_str(),
            factors.as_str(),
        ])?;
    }
    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PredictionResult, RiskLevel};
    use crate::import::parser::parse_csv;

    fn patient() -> ProcessedPatient {
        parse_csv("Juan Perez,12345678,1980-01-01,M,80,175,Bajo,HC1,2024-01-01")
            .unwrap()
            .remove(0)
    }

    #[test]
    fn patient_export_reimports_identically() {
        let original = vec![
            patient(),
            ProcessedPatient {
                first_name: "María José".into(),
                last_name: "O'Neill, Ruiz".into(),
                dni: "87654321".into(),
                ..patient()
            },
        ];
        let csv = patients_to_csv(&original).unwrap();
        assert!(csv.starts_with("nombre,apellidos,dni,fecha_nacimiento"));
        assert_eq!(parse_csv(&csv).unwrap(), original);
    }

    #[test]
    fn prediction_export_joins_factors() {
        let scored = ScoredPatient {
            patient: patient(),
            patient_id: Some("1".into()),
            prediction: PredictionResult {
                id: None,
                patient_id: None,
                medical_record_id: None,
                probability: 72.456,
                risk_level: RiskLevel::High,
                factors: vec!["Tabaquismo".into(), "Hipertensión".into()],
                recommendations: vec![],
                created_at: None,
            },
        };
        let csv = predictions_to_csv(&[scored]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("nombre,apellidos,fecha_nacimiento,riesgo,probabilidad,factores")
        );
        assert_eq!(
            lines.next(),
            Some("Juan,Perez,1980-01-01,Alto,72.5,Tabaquismo; Hipertensión")
        );
    }
}
