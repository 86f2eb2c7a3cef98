//! crates/cardio_core/src/import/aliases.rs
//!
//! The alias table mapping source column/key names onto canonical staging
//! fields, plus the value normalization applied to each field on the way in.
//!
//! Header matching ignores case, accents, surrounding whitespace and the
//! difference between spaces, hyphens and underscores.

use chrono::NaiveDate;

use crate::domain::{ProcessedPatient, RiskLevel};

/// A canonical staging field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    FirstName,
    LastName,
    /// "First Last" in a single column; split during assembly.
    FullName,
    Dni,
    BirthDate,
    Sex,
    Weight,
    Height,
    Bmi,
    SystolicBp,
    DiastolicBp,
    TotalCholesterol,
    Hdl,
    Ldl,
    Triglycerides,
    Glucose,
    Hba1c,
    Smoking,
    PhysicalActivity,
    Diabetes,
    Hypertension,
    FamilyHistory,
    Risk,
    ClinicalHistory,
    RecordDate,
}

const ALIASES: &[(Field, &[&str])] = &[
    (Field::FirstName, &["nombre", "first_name", "firstname", "name", "nombres"]),
    (Field::LastName, &["apellidos", "apellido", "last_name", "lastname", "surname"]),
    (Field::FullName, &["nombre_completo", "full_name", "fullname", "paciente", "patient"]),
    (Field::Dni, &["dni", "nif", "documento", "national_id", "id_number", "document"]),
    (
        Field::BirthDate,
        &["fecha_nacimiento", "fecha_de_nacimiento", "nacimiento", "birth_date", "birthdate", "date_of_birth", "dob"],
    ),
    (Field::Sex, &["sexo", "genero", "sex", "gender"]),
    (Field::Weight, &["peso", "weight", "peso_kg", "weight_kg"]),
    (Field::Height, &["altura", "talla", "estatura", "height", "altura_cm", "height_cm"]),
    (Field::Bmi, &["imc", "bmi"]),
    (
        Field::SystolicBp,
        &["presion_sistolica", "sistolica", "pas", "systolic_bp", "systolic", "ta_sistolica"],
    ),
    (
        Field::DiastolicBp,
        &["presion_diastolica", "diastolica", "pad", "diastolic_bp", "diastolic", "ta_diastolica"],
    ),
    (
        Field::TotalCholesterol,
        &["colesterol", "colesterol_total", "cholesterol", "total_cholesterol"],
    ),
    (Field::Hdl, &["hdl", "colesterol_hdl", "hdl_cholesterol"]),
    (Field::Ldl, &["ldl", "colesterol_ldl", "ldl_cholesterol"]),
    (Field::Triglycerides, &["trigliceridos", "triglycerides", "tg"]),
    (Field::Glucose, &["glucosa", "glucose", "glucemia"]),
    (Field::Hba1c, &["hba1c", "hemoglobina_glicada", "glycated_hemoglobin", "a1c"]),
    (Field::Smoking, &["fumador", "tabaquismo", "smoking", "smoker", "tabaco"]),
    (
        Field::PhysicalActivity,
        &["actividad_fisica", "actividad", "physical_activity", "activity", "ejercicio"],
    ),
    (Field::Diabetes, &["diabetes", "diabetico"]),
    (Field::Hypertension, &["hipertension", "hypertension", "hta"]),
    (
        Field::FamilyHistory,
        &["antecedentes_familiares", "antecedentes", "family_history"],
    ),
    (Field::Risk, &["riesgo", "nivel_riesgo", "risk", "risk_level"]),
    (
        Field::ClinicalHistory,
        &["historia_clinica", "historia", "hc", "clinical_history", "medical_record_number", "mrn"],
    ),
    (
        Field::RecordDate,
        &["fecha_registro", "fecha", "fecha_consulta", "record_date", "date"],
    ),
];

/// Every field stored on a `ProcessedPatient`, in export order.
pub const STAGED_FIELDS: [Field; 24] = [
    Field::FirstName,
    Field::LastName,
    Field::Dni,
    Field::BirthDate,
    Field::Sex,
    Field::Weight,
    Field::Height,
    Field::Bmi,
    Field::SystolicBp,
    Field::DiastolicBp,
    Field::TotalCholesterol,
    Field::Hdl,
    Field::Ldl,
    Field::Triglycerides,
    Field::Glucose,
    Field::Hba1c,
    Field::Smoking,
    Field::PhysicalActivity,
    Field::Diabetes,
    Field::Hypertension,
    Field::FamilyHistory,
    Field::Risk,
    Field::ClinicalHistory,
    Field::RecordDate,
];

/// Column order assumed for CSV files without a header row.
pub const POSITIONAL_COLUMNS: [Field; 9] = [
    Field::FirstName,
    Field::Dni,
    Field::BirthDate,
    Field::Sex,
    Field::Weight,
    Field::Height,
    Field::Risk,
    Field::ClinicalHistory,
    Field::RecordDate,
];

/// Resolves a source header or JSON key to its canonical field.
pub fn resolve(header: &str) -> Option<Field> {
    let key = normalize_key(header);
    if key.is_empty() {
        return None;
    }
    ALIASES
        .iter()
        .find(|(_, names)| names.contains(&key.as_str()))
        .map(|(field, _)| *field)
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .map(fold_accent)
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'Á' | 'À' | 'Ä' => 'a',
        'é' | 'è' | 'ë' | 'É' | 'È' | 'Ë' => 'e',
        'í' | 'ì' | 'ï' | 'Í' | 'Ì' | 'Ï' => 'i',
        'ó' | 'ò' | 'ö' | 'Ó' | 'Ò' | 'Ö' => 'o',
        'ú' | 'ù' | 'ü' | 'Ú' | 'Ù' | 'Ü' => 'u',
        'ñ' | 'Ñ' => 'n',
        c => c,
    }
}

impl Field {
    /// Header written on export; always resolves back to the same field.
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::FirstName => "nombre",
            Self::LastName => "apellidos",
            Self::FullName => "nombre_completo",
            Self::Dni => "dni",
            Self::BirthDate => "fecha_nacimiento",
            Self::Sex => "sexo",
            Self::Weight => "peso",
            Self::Height => "altura",
            Self::Bmi => "imc",
            Self::SystolicBp => "presion_sistolica",
            Self::DiastolicBp => "presion_diastolica",
            Self::TotalCholesterol => "colesterol",
            Self::Hdl => "hdl",
            Self::Ldl => "ldl",
            Self::Triglycerides => "trigliceridos",
            Self::Glucose => "glucosa",
            Self::Hba1c => "hba1c",
            Self::Smoking => "fumador",
            Self::PhysicalActivity => "actividad_fisica",
            Self::Diabetes => "diabetes",
            Self::Hypertension => "hipertension",
            Self::FamilyHistory => "antecedentes_familiares",
            Self::Risk => "riesgo",
            Self::ClinicalHistory => "historia_clinica",
            Self::RecordDate => "fecha_registro",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Weight
                | Self::Height
                | Self::Bmi
                | Self::SystolicBp
                | Self::DiastolicBp
                | Self::TotalCholesterol
                | Self::Hdl
                | Self::Ldl
                | Self::Triglycerides
                | Self::Glucose
                | Self::Hba1c
        )
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Self::Diabetes | Self::Hypertension | Self::FamilyHistory)
    }

    /// Value used when the source leaves an optional field out.
    pub fn default_value(&self) -> &'static str {
        match self {
            f if f.is_numeric() => "0",
            Self::PhysicalActivity => "sedentario",
            Self::Smoking | Self::Diabetes | Self::Hypertension | Self::FamilyHistory => "no",
            _ => "",
        }
    }

    pub fn get<'a>(&self, p: &'a ProcessedPatient) -> &'a str {
        match self {
            Self::FirstName | Self::FullName => &p.first_name,
            Self::LastName => &p.last_name,
            Self::Dni => &p.dni,
            Self::BirthDate => &p.birth_date,
            Self::Sex => &p.sex,
            Self::Weight => &p.weight,
            Self::Height => &p.height,
            Self::Bmi => &p.bmi,
            Self::SystolicBp => &p.systolic_bp,
            Self::DiastolicBp => &p.diastolic_bp,
            Self::TotalCholesterol => &p.total_cholesterol,
            Self::Hdl => &p.hdl,
            Self::Ldl => &p.ldl,
            Self::Triglycerides => &p.triglycerides,
            Self::Glucose => &p.glucose,
            Self::Hba1c => &p.hba1c,
            Self::Smoking => &p.smoking,
            Self::PhysicalActivity => &p.physical_activity,
            Self::Diabetes => &p.diabetes,
            Self::Hypertension => &p.hypertension,
            Self::FamilyHistory => &p.family_history,
            Self::Risk => &p.risk,
            Self::ClinicalHistory => &p.clinical_history,
            Self::RecordDate => &p.record_date,
        }
    }

    pub fn set(&self, p: &mut ProcessedPatient, value: String) {
        let slot = match self {
            Self::FirstName | Self::FullName => &mut p.first_name,
            Self::LastName => &mut p.last_name,
            Self::Dni => &mut p.dni,
            Self::BirthDate => &mut p.birth_date,
            Self::Sex => &mut p.sex,
            Self::Weight => &mut p.weight,
            Self::Height => &mut p.height,
            Self::Bmi => &mut p.bmi,
            Self::SystolicBp => &mut p.systolic_bp,
            Self::DiastolicBp => &mut p.diastolic_bp,
            Self::TotalCholesterol => &mut p.total_cholesterol,
            Self::Hdl => &mut p.hdl,
            Self::Ldl => &mut p.ldl,
            Self::Triglycerides => &mut p.triglycerides,
            Self::Glucose => &mut p.glucose,
            Self::Hba1c => &mut p.hba1c,
            Self::Smoking => &mut p.smoking,
            Self::PhysicalActivity => &mut p.physical_activity,
            Self::Diabetes => &mut p.diabetes,
            Self::Hypertension => &mut p.hypertension,
            Self::FamilyHistory => &mut p.family_history,
            Self::Risk => &mut p.risk,
            Self::ClinicalHistory => &mut p.clinical_history,
            Self::RecordDate => &mut p.record_date,
        };
        *slot = value;
    }
}

/// Brings a raw cell into the canonical spelling for its field.
///
/// Unrecognised values are passed through (trimmed) so validation can report them.
/// Applying this twice yields the same result as applying it once.
pub fn normalize_value(field: Field, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }
    let folded: String = value.chars().map(fold_accent).collect::<String>().to_lowercase();

    match field {
        Field::Sex => match folded.as_str() {
            "m" | "h" | "male" | "hombre" | "masculino" | "varon" => "M".to_string(),
            "f" | "female" | "mujer" | "femenino" => "F".to_string(),
            _ => value.to_uppercase(),
        },
        Field::Diabetes | Field::Hypertension | Field::FamilyHistory => yes_no(&folded)
            .map(str::to_string)
            .unwrap_or(folded),
        Field::Smoking => match folded.as_str() {
            "ex" | "exfumador" | "ex_fumador" | "ex-fumador" | "former" | "former smoker" => {
                "ex".to_string()
            }
            "fumador" | "smoker" | "current" | "actual" => "si".to_string(),
            other => yes_no(other).map(str::to_string).unwrap_or(folded),
        },
        Field::PhysicalActivity => match folded.as_str() {
            "sedentario" | "sedentary" | "ninguna" | "none" => "sedentario".to_string(),
            "ligera" | "light" | "baja" | "low" => "ligera".to_string(),
            "moderada" | "moderate" | "media" => "moderada".to_string(),
            "intensa" | "intense" | "vigorous" | "alta" | "high" => "intensa".to_string(),
            _ => folded,
        },
        Field::Risk => RiskLevel::parse(value)
            .map(|r| r.label().to_string())
            .unwrap_or_else(|| value.to_string()),
        Field::BirthDate | Field::RecordDate => normalize_date(value),
        Field::Dni => value.to_uppercase(),
        f if f.is_numeric() => value.replace(',', "."),
        _ => value.to_string(),
    }
}

fn yes_no(folded: &str) -> Option<&'static str> {
    match folded {
        "si" | "s" | "yes" | "y" | "true" | "1" | "verdadero" => Some("si"),
        "no" | "n" | "false" | "0" | "falso" => Some("no"),
        _ => None,
    }
}

/// Accepts ISO dates (optionally with a time part) and `DD/MM/YYYY`; returns ISO.
fn normalize_date(value: &str) -> String {
    let date_part = value.split(['T', ' ']).next().unwrap_or(value);
    if let Ok(d) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    for fmt in ["%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    value.to_string()
}
