//! Dataset loading and cleaning
//!
//! Reads the hospital admissions CSV, checks the fixed column schema,
//! normalises categorical text and derives the length of stay.
//!
//! ```text
//! raw CSV row ──► RawRecord ──► PatientRow
//!   Name, Doctor, Hospital, Room Number        dropped
//!   Date of Admission, Discharge Date          ──► length_of_stay (days)
//!   categorical text                           ──► trimmed + lowercased
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ============================================================================
// SCHEMA
// ============================================================================

pub const COL_AGE: &str = "Age";
pub const COL_BILLING_AMOUNT: &str = "Billing Amount";
pub const COL_LENGTH_OF_STAY: &str = "Length of Stay";
pub const COL_ADMISSION_DATE: &str = "Date of Admission";
pub const COL_DISCHARGE_DATE: &str = "Discharge Date";

/// Columns that identify a patient or stay and never reach the model
pub const IDENTIFYING_COLUMNS: [&str; 4] = ["Name", "Doctor", "Hospital", "Room Number"];

/// Every column the dataset file must carry
pub const REQUIRED_COLUMNS: [&str; 15] = [
    "Name",
    COL_AGE,
    "Gender",
    "Blood Type",
    "Medical Condition",
    COL_ADMISSION_DATE,
    "Doctor",
    "Hospital",
    "Insurance Provider",
    COL_BILLING_AMOUNT,
    "Room Number",
    "Admission Type",
    COL_DISCHARGE_DATE,
    "Medication",
    "Test Results",
];

/// Categorical columns, in encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalColumn {
    Gender,
    BloodType,
    MedicalCondition,
    AdmissionType,
    InsuranceProvider,
    Medication,
    TestResults,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 7] = [
        CategoricalColumn::Gender,
        CategoricalColumn::BloodType,
        CategoricalColumn::MedicalCondition,
        CategoricalColumn::AdmissionType,
        CategoricalColumn::InsuranceProvider,
        CategoricalColumn::Medication,
        CategoricalColumn::TestResults,
    ];

    /// Header name in the dataset file
    pub fn name(self) -> &'static str {
        match self {
            CategoricalColumn::Gender => "Gender",
            CategoricalColumn::BloodType => "Blood Type",
            CategoricalColumn::MedicalCondition => "Medical Condition",
            CategoricalColumn::AdmissionType => "Admission Type",
            CategoricalColumn::InsuranceProvider => "Insurance Provider",
            CategoricalColumn::Medication => "Medication",
            CategoricalColumn::TestResults => "Test Results",
        }
    }
}

/// Lowercase + trim, shared by training rows and request input
pub fn normalize_category(value: &str) -> String {
    value.trim().to_lowercase()
}

// ============================================================================
// ROWS
// ============================================================================

/// Anything that can be projected onto the model's feature space
pub trait PatientFeatures {
    fn age(&self) -> f64;
    fn length_of_stay(&self) -> f64;
    /// Normalised category for `column`
    fn category(&self, column: CategoricalColumn) -> &str;
}

/// One CSV record as stored on disk. Identifying columns are validated
/// in the header but never deserialized.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "Age")]
    age: f64,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Blood Type")]
    blood_type: String,
    #[serde(rename = "Medical Condition")]
    medical_condition: String,
    #[serde(rename = "Date of Admission")]
    admission_date: String,
    #[serde(rename = "Insurance Provider")]
    insurance_provider: String,
    #[serde(rename = "Billing Amount")]
    billing_amount: f64,
    #[serde(rename = "Admission Type")]
    admission_type: String,
    #[serde(rename = "Discharge Date")]
    discharge_date: String,
    #[serde(rename = "Medication")]
    medication: String,
    #[serde(rename = "Test Results")]
    test_results: String,
}

/// A cleaned training row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRow {
    pub age: f64,
    pub gender: String,
    pub blood_type: String,
    pub medical_condition: String,
    pub admission_type: String,
    pub insurance_provider: String,
    pub medication: String,
    pub test_results: String,
    pub length_of_stay: i64,
    pub billing_amount: f64,
}

impl PatientFeatures for PatientRow {
    fn age(&self) -> f64 {
        self.age
    }

    fn length_of_stay(&self) -> f64 {
        self.length_of_stay as f64
    }

    fn category(&self, column: CategoricalColumn) -> &str {
        match column {
            CategoricalColumn::Gender => &self.gender,
            CategoricalColumn::BloodType => &self.blood_type,
            CategoricalColumn::MedicalCondition => &self.medical_condition,
            CategoricalColumn::AdmissionType => &self.admission_type,
            CategoricalColumn::InsuranceProvider => &self.insurance_provider,
            CategoricalColumn::Medication => &self.medication,
            CategoricalColumn::TestResults => &self.test_results,
        }
    }
}

impl RawRecord {
    /// `record` is the 1-based data record number, used in error messages
    fn clean(self, record: usize) -> Result<PatientRow> {
        let admitted = parse_date(&self.admission_date).ok_or_else(|| PipelineError::InvalidDate {
            column: COL_ADMISSION_DATE,
            value: self.admission_date.clone(),
            record,
        })?;
        let discharged = parse_date(&self.discharge_date).ok_or_else(|| PipelineError::InvalidDate {
            column: COL_DISCHARGE_DATE,
            value: self.discharge_date.clone(),
            record,
        })?;

        Ok(PatientRow {
            age: self.age,
            gender: normalize_category(&self.gender),
            blood_type: normalize_category(&self.blood_type),
            medical_condition: normalize_category(&self.medical_condition),
            admission_type: normalize_category(&self.admission_type),
            insurance_provider: normalize_category(&self.insurance_provider),
            medication: normalize_category(&self.medication),
            test_results: normalize_category(&self.test_results),
            length_of_stay: (discharged - admitted).num_days(),
            billing_amount: self.billing_amount,
        })
    }
}

/// Parse the date formats seen in admissions exports
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

// ============================================================================
// LOADING
// ============================================================================

/// Load and clean the dataset at `path`
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PatientRow>> {
    let path = path.as_ref();
    log::info!("Loading dataset from {}", path.display());
    let file = File::open(path)?;
    from_reader(file)
}

/// Load and clean a dataset from any CSV source
pub fn from_reader<R: Read>(reader: R) -> Result<Vec<PatientRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == required) {
            return Err(PipelineError::MissingColumn(required.to_string()));
        }
    }

    let mut rows = Vec::new();
    for (i, record) in csv_reader.deserialize::<RawRecord>().enumerate() {
        rows.push(record?.clean(i + 1)?);
    }

    if rows.is_empty() {
        return Err(PipelineError::EmptyDataset { stage: "loading" });
    }

    log::debug!("Parsed {} dataset rows", rows.len());
    Ok(rows)
}

// ============================================================================
// SPLITTING
// ============================================================================

/// Seeded shuffle split into (train, test). `test_fraction` must be in (0, 1).
pub fn train_test_split(
    rows: &[PatientRow],
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<PatientRow>, Vec<PatientRow>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test fraction must be between 0 and 1, got {}",
            test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..rows.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((rows.len() as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.min(rows.len().saturating_sub(1));
    let (test_idx, train_idx) = indices.split_at(n_test);

    let train = train_idx.iter().map(|&i| rows[i].clone()).collect();
    let test = test_idx.iter().map(|&i| rows[i].clone()).collect();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Name,Age,Gender,Blood Type,Medical Condition,Date of Admission,Doctor,Hospital,Insurance Provider,Billing Amount,Room Number,Admission Type,Discharge Date,Medication,Test Results";

    fn csv_with(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_clean_lowercases_and_derives_stay() {
        let data = csv_with(&[
            "Bobby JacksOn,30,Male,B-,Cancer,2024-01-31,Matthew Smith,Sons and Miller,Blue Cross,18856.28,328,Urgent,2024-02-02,Paracetamol,Normal",
        ]);

        let rows = from_reader(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.gender, "male");
        assert_eq!(row.blood_type, "b-");
        assert_eq!(row.medical_condition, "cancer");
        assert_eq!(row.insurance_provider, "blue cross");
        assert_eq!(row.admission_type, "urgent");
        assert_eq!(row.test_results, "normal");
        assert_eq!(row.length_of_stay, 2);
        assert_eq!(row.age, 30.0);
        assert!((row.billing_amount - 18856.28).abs() < 1e-9);
    }

    #[test]
    fn test_missing_column_is_named() {
        let data = "Name,Age,Gender\nAnn,30,Female";
        match from_reader(data.as_bytes()) {
            Err(PipelineError::MissingColumn(col)) => assert_eq!(col, "Blood Type"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date_reports_record() {
        let data = csv_with(&[
            "A,30,Male,B-,Cancer,2024-01-31,D,H,Aetna,100,1,Urgent,2024-02-02,Ibuprofen,Normal",
            "B,31,Male,B-,Cancer,yesterday,D,H,Aetna,100,1,Urgent,2024-02-02,Ibuprofen,Normal",
        ]);
        match from_reader(data.as_bytes()) {
            Err(PipelineError::InvalidDate { column, record, .. }) => {
                assert_eq!(column, COL_ADMISSION_DATE);
                assert_eq!(record, 2);
            }
            other => panic!("expected InvalidDate, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_age_is_fatal() {
        let data = csv_with(&[
            "A,thirty,Male,B-,Cancer,2024-01-31,D,H,Aetna,100,1,Urgent,2024-02-02,Ibuprofen,Normal",
        ]);
        assert!(matches!(from_reader(data.as_bytes()), Err(PipelineError::Csv(_))));
    }

    #[test]
    fn test_header_only_is_empty() {
        let data = csv_with(&[]);
        assert!(matches!(
            from_reader(data.as_bytes()),
            Err(PipelineError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_reordered_and_extra_columns() {
        let canonical = csv_with(&[
            "A,30,Male,B-,Cancer,2024-01-31,D,H,Aetna,100,1,Urgent,2024-02-02,Ibuprofen,Normal",
        ]);

        let mut header: Vec<&str> = HEADER.split(',').rev().collect();
        header.insert(0, "Extra");
        let mut values: Vec<&str> =
            "A,30,Male,B-,Cancer,2024-01-31,D,H,Aetna,100,1,Urgent,2024-02-02,Ibuprofen,Normal"
                .split(',')
                .rev()
                .collect();
        values.insert(0, "ignored");
        let shuffled = format!("{}\n{}", header.join(","), values.join(","));

        let expected = from_reader(canonical.as_bytes()).unwrap();
        let rows = from_reader(shuffled.as_bytes()).unwrap();
        assert_eq!(rows, expected);
        assert_eq!(rows[0].gender, "male");
        assert_eq!(rows[0].length_of_stay, 2);
        assert_eq!(rows[0].billing_amount, 100.0);
    }

    #[test]
    fn test_alternate_date_formats() {
        assert_eq!(parse_date("2024-03-05"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("03/05/2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("2024-03-05 10:30:00"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("5 March"), None);
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "{}",
            csv_with(&["A,40,Female,O+,Diabetes,2023-05-01,D,H,Medicare,2500.5,12,Elective,2023-05-11,Insulin,Abnormal"])
        )
        .unwrap();

        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows[0].length_of_stay, 10);
        assert_eq!(rows[0].category(CategoricalColumn::BloodType), "o+");
    }

    #[test]
    fn test_train_test_split_is_seeded() {
        let rows: Vec<PatientRow> = (0..10)
            .map(|i| PatientRow {
                age: i as f64,
                gender: "male".into(),
                blood_type: "a+".into(),
                medical_condition: "asthma".into(),
                admission_type: "urgent".into(),
                insurance_provider: "aetna".into(),
                medication: "aspirin".into(),
                test_results: "normal".into(),
                length_of_stay: 3,
                billing_amount: 100.0 * i as f64,
            })
            .collect();

        let (train_a, test_a) = train_test_split(&rows, 0.2, 7).unwrap();
        let (train_b, test_b) = train_test_split(&rows, 0.2, 7).unwrap();

        assert_eq!(train_a.len(), 8);
        assert_eq!(test_a.len(), 2);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert!(train_test_split(&rows, 1.0, 7).is_err());
    }
}
