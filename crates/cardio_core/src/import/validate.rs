//! crates/cardio_core/src/import/validate.rs
//!
//! Per-record validation of staged import rows. Every rule is checked and all
//! violations are collected; nothing stops at the first failure.

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use super::aliases::Field;
use crate::domain::{ProcessedPatient, RiskLevel};

/// Length every national ID must have.
pub const DNI_LENGTH: usize = 8;

/// Identity used to key the validation report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordKey {
    pub dni: String,
    pub name: String,
}

impl RecordKey {
    pub fn of(patient: &ProcessedPatient) -> Self {
        Self {
            dni: patient.dni.clone(),
            name: patient.full_name(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dni = if self.dni.is_empty() { "sin DNI" } else { &self.dni };
        write!(f, "{} - {}", dni, self.name)
    }
}

/// One broken rule on one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Canonical column name of the offending field.
    pub field: &'static str,
    pub rule: Rule,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Required,
    Length { expected: usize, actual: usize },
    NotANumber,
    OutOfRange { min: f64, max: f64 },
    NotAllowed { allowed: Vec<&'static str> },
    InvalidDate,
    FutureDate,
    Duplicate,
}

/// All violations found for one staged record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReport {
    /// Position of the record in the parsed batch.
    pub index: usize,
    pub key: RecordKey,
    pub violations: Vec<Violation>,
}

/// Outcome of validating a whole batch. Only records with violations appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub records: Vec<RecordReport>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_violations(&self) -> usize {
        self.records.iter().map(|r| r.violations.len()).sum()
    }

    pub fn for_key(&self, key: &RecordKey) -> Option<&RecordReport> {
        self.records.iter().find(|r| &r.key == key)
    }
}

struct Range {
    field: Field,
    min: f64,
    max: f64,
    required: bool,
}

/// Plausible physiological ranges. Optional lab values left at the neutral
/// default (`0`) count as "not measured" and are not range-checked.
const RANGES: &[Range] = &[
    Range { field: Field::Weight, min: 20.0, max: 300.0, required: true },
    Range { field: Field::Height, min: 100.0, max: 250.0, required: true },
    Range { field: Field::Bmi, min: 10.0, max: 70.0, required: false },
    Range { field: Field::SystolicBp, min: 70.0, max: 250.0, required: false },
    Range { field: Field::DiastolicBp, min: 40.0, max: 150.0, required: false },
    Range { field: Field::TotalCholesterol, min: 100.0, max: 400.0, required: false },
    Range { field: Field::Hdl, min: 20.0, max: 100.0, required: false },
    Range { field: Field::Ldl, min: 30.0, max: 300.0, required: false },
    Range { field: Field::Triglycerides, min: 30.0, max: 1000.0, required: false },
    Range { field: Field::Glucose, min: 50.0, max: 500.0, required: false },
    Range { field: Field::Hba1c, min: 3.0, max: 15.0, required: false },
];

const SEX_VALUES: &[&str] = &["M", "F"];
const YES_NO: &[&str] = &["si", "no"];
const SMOKING_VALUES: &[&str] = &["si", "no", "ex"];
const ACTIVITY_VALUES: &[&str] = &["sedentario", "ligera", "moderada", "intensa"];

/// Checks one record against every rule. Pure: the same record always yields
/// the same list in the same order.
pub fn validate_record(patient: &ProcessedPatient, today: NaiveDate) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (field, label) in [(Field::FirstName, "nombre"), (Field::LastName, "apellidos")] {
        if field.get(patient).trim().is_empty() {
            violations.push(Violation {
                field: field.canonical(),
                rule: Rule::Required,
                message: format!("El campo {} es obligatorio", label),
            });
        }
    }

    let dni_len = patient.dni.chars().count();
    if dni_len != DNI_LENGTH {
        violations.push(Violation {
            field: Field::Dni.canonical(),
            rule: Rule::Length {
                expected: DNI_LENGTH,
                actual: dni_len,
            },
            message: format!("El DNI debe tener {} caracteres", DNI_LENGTH),
        });
    }

    check_birth_date(patient, today, &mut violations);

    for range in RANGES {
        check_range(patient, range, &mut violations);
    }

    check_allowed(patient, Field::Sex, SEX_VALUES, &mut violations);
    check_allowed(patient, Field::Smoking, SMOKING_VALUES, &mut violations);
    check_allowed(patient, Field::PhysicalActivity, ACTIVITY_VALUES, &mut violations);
    for flag in [Field::Diabetes, Field::Hypertension, Field::FamilyHistory] {
        check_allowed(patient, flag, YES_NO, &mut violations);
    }

    if !patient.risk.is_empty() && RiskLevel::parse(&patient.risk).is_none() {
        violations.push(Violation {
            field: Field::Risk.canonical(),
            rule: Rule::NotAllowed {
                allowed: vec!["Bajo", "Medio", "Alto"],
            },
            message: format!("Nivel de riesgo desconocido: {}", patient.risk),
        });
    }

    if !patient.record_date.is_empty() && parse_date(&patient.record_date).is_none() {
        violations.push(Violation {
            field: Field::RecordDate.canonical(),
            rule: Rule::InvalidDate,
            message: format!("Fecha de registro no válida: {}", patient.record_date),
        });
    }

    violations
}

/// Validates a whole batch, including the cross-record duplicate-DNI check.
pub fn validate_batch(patients: &[ProcessedPatient], today: NaiveDate) -> ValidationReport {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut records = Vec::new();

    for (index, patient) in patients.iter().enumerate() {
        let mut violations = validate_record(patient, today);

        if !patient.dni.is_empty() {
            if let Some(first) = seen.get(patient.dni.as_str()) {
                violations.push(Violation {
                    field: Field::Dni.canonical(),
                    rule: Rule::Duplicate,
                    message: format!("DNI duplicado (ya aparece en la fila {})", first + 1),
                });
            } else {
                seen.insert(patient.dni.as_str(), index);
            }
        }

        if !violations.is_empty() {
            records.push(RecordReport {
                index,
                key: RecordKey::of(patient),
                violations,
            });
        }
    }

    ValidationReport { records }
}

/// `validate_batch` against today's date.
pub fn validate_batch_now(patients: &[ProcessedPatient]) -> ValidationReport {
    validate_batch(patients, Utc::now().date_naive())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn check_birth_date(patient: &ProcessedPatient, today: NaiveDate, out: &mut Vec<Violation>) {
    let field = Field::BirthDate.canonical();
    if patient.birth_date.is_empty() {
        out.push(Violation {
            field,
            rule: Rule::Required,
            message: "La fecha de nacimiento es obligatoria".to_string(),
        });
        return;
    }
    match parse_date(&patient.birth_date) {
        None => out.push(Violation {
            field,
            rule: Rule::InvalidDate,
            message: format!("Fecha de nacimiento no válida: {}", patient.birth_date),
        }),
        Some(date) if date > today => out.push(Violation {
            field,
            rule: Rule::FutureDate,
            message: "La fecha de nacimiento no puede ser futura".to_string(),
        }),
        Some(_) => {}
    }
}

fn check_range(patient: &ProcessedPatient, range: &Range, out: &mut Vec<Violation>) {
    let raw = range.field.get(patient).trim();
    let field = range.field.canonical();
    let Ok(mut value) = raw.parse::<f64>() else {
        out.push(Violation {
            field,
            rule: Rule::NotANumber,
            message: format!("El campo {} debe ser numérico (valor: '{}')", field, raw),
        });
        return;
    };

    if value == 0.0 && !range.required {
        return;
    }
    if range.field == Field::Height && value > 0.0 && value < 3.0 {
        value *= 100.0;
    }
    if !value.is_finite() || value < range.min || value > range.max {
        out.push(Violation {
            field,
            rule: Rule::OutOfRange {
                min: range.min,
                max: range.max,
            },
            message: format!(
                "El campo {} debe estar entre {} y {} (valor: {})",
                field, range.min, range.max, raw
            ),
        });
    }
}

fn check_allowed(
    patient: &ProcessedPatient,
    field: Field,
    allowed: &[&'static str],
    out: &mut Vec<Violation>,
) {
    let value = field.get(patient);
    if !allowed.iter().any(|a| *a == value) {
        out.push(Violation {
            field: field.canonical(),
            rule: Rule::NotAllowed {
                allowed: allowed.to_vec(),
            },
            message: format!(
                "Valor no permitido para {}: '{}' (permitidos: {})",
                field.canonical(),
                value,
                allowed.join(", ")
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_patient() -> ProcessedPatient {
        ProcessedPatient {
            first_name: "Juan".into(),
            last_name: "Perez".into(),
            dni: "12345678".into(),
            birth_date: "1980-01-01".into(),
            sex: "M".into(),
            weight: "80".into(),
            height: "175".into(),
            bmi: "26.12".into(),
            systolic_bp: "130".into(),
            diastolic_bp: "85".into(),
            total_cholesterol: "210".into(),
            hdl: "45".into(),
            ldl: "130".into(),
            triglycerides: "150".into(),
            glucose: "95".into(),
            hba1c: "5.6".into(),
            smoking: "no".into(),
            physical_activity: "moderada".into(),
            diabetes: "no".into(),
            hypertension: "si".into(),
            family_history: "no".into(),
            risk: "Bajo".into(),
            clinical_history: "HC1".into(),
            record_date: "2024-01-01".into(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn valid_record_has_no_violations() {
        assert!(validate_record(&valid_patient(), today()).is_empty());
    }

    #[test]
    fn accumulates_every_violation() {
        let patient = ProcessedPatient {
            first_name: "".into(),
            dni: "123".into(),
            weight: "abc".into(),
            glucose: "900".into(),
            sex: "X".into(),
            ..valid_patient()
        };
        let violations = validate_record(&patient, today());
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["nombre", "dni", "peso", "glucosa", "sexo"]);
        assert!(matches!(
            violations[1].rule,
            Rule::Length { expected: 8, actual: 3 }
        ));
    }

    #[test]
    fn dni_length_is_checked_regardless_of_other_fields() {
        for dni in ["", "1234567", "123456789", "1234 5678"] {
            let patient = ProcessedPatient {
                dni: dni.into(),
                ..valid_patient()
            };
            assert!(validate_record(&patient, today())
                .iter()
                .any(|v| v.field == "dni"));
        }
    }

    #[test]
    fn unmeasured_labs_are_not_range_checked() {
        let patient = ProcessedPatient {
            glucose: "0".into(),
            hba1c: "0".into(),
            bmi: "0".into(),
            ..valid_patient()
        };
        assert!(validate_record(&patient, today()).is_empty());

        let no_weight = ProcessedPatient {
            weight: "0".into(),
            ..valid_patient()
        };
        assert_eq!(validate_record(&no_weight, today()).len(), 1);
    }

    #[test]
    fn height_in_metres_is_accepted() {
        let patient = ProcessedPatient {
            height: "1.75".into(),
            ..valid_patient()
        };
        assert!(validate_record(&patient, today()).is_empty());
    }

    #[test]
    fn birth_date_rules() {
        let future = ProcessedPatient {
            birth_date: "2030-01-01".into(),
            ..valid_patient()
        };
        assert_eq!(validate_record(&future, today())[0].rule, Rule::FutureDate);

        let garbage = ProcessedPatient {
            birth_date: "ayer".into(),
            ..valid_patient()
        };
        assert_eq!(validate_record(&garbage, today())[0].rule, Rule::InvalidDate);
    }

    #[test]
    fn batch_report_is_keyed_and_flags_duplicates() {
        let batch = vec![
            valid_patient(),
            ProcessedPatient {
                first_name: "Ana".into(),
                ..valid_patient()
            },
            ProcessedPatient {
                dni: "87654321".into(),
                ..valid_patient()
            },
        ];
        let report = validate_batch(&batch, today());
        assert_eq!(report.records.len(), 1);
        let entry = &report.records[0];
        assert_eq!(entry.index, 1);
        assert_eq!(entry.key.to_string(), "12345678 - Ana Perez");
        assert_eq!(entry.violations[0].rule, Rule::Duplicate);
        assert!(report.for_key(&RecordKey::of(&batch[1])).is_some());
    }

    #[test]
    fn validation_is_idempotent() {
        let patient = ProcessedPatient {
            dni: "1".into(),
            hdl: "500".into(),
            ..valid_patient()
        };
        assert_eq!(
            validate_record(&patient, today()),
            validate_record(&patient, today())
        );
    }
}
