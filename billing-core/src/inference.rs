//! Request-time input, vocabulary policy and estimates

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{normalize_category, CategoricalColumn, PatientFeatures};
use crate::error::{PipelineError, Result};

// ============================================================================
// INPUT
// ============================================================================

/// Form field names, as submitted by the prediction form
pub mod fields {
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const BLOOD: &str = "blood";
    pub const CONDITION: &str = "condition";
    pub const ADMISSION: &str = "admission";
    pub const INSURANCE: &str = "insurance";
    pub const MEDICATION: &str = "medication";
    pub const TEST: &str = "test";
    pub const STAY: &str = "stay";
}

/// A single patient record submitted for estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInput {
    pub age: i64,
    pub gender: String,
    pub blood_type: String,
    pub medical_condition: String,
    pub admission_type: String,
    pub insurance_provider: String,
    pub medication: String,
    pub test_results: String,
    pub length_of_stay: i64,
}

impl PatientInput {
    /// Parse from a flat field map. Every field is required; age and stay
    /// must be non-negative integers.
    pub fn from_fields(form: &HashMap<String, String>) -> Result<Self> {
        let text = |name: &str| -> Result<String> {
            form.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PipelineError::InvalidInput(format!("missing field `{}`", name)))
        };
        let integer = |name: &str| -> Result<i64> {
            let raw = text(name)?;
            let value: i64 = raw.parse().map_err(|_| {
                PipelineError::InvalidInput(format!("field `{}` must be an integer, got `{}`", name, raw))
            })?;
            if value < 0 {
                return Err(PipelineError::InvalidInput(format!("field `{}` must not be negative", name)));
            }
            Ok(value)
        };

        Ok(Self {
            age: integer(fields::AGE)?,
            gender: text(fields::GENDER)?,
            blood_type: text(fields::BLOOD)?,
            medical_condition: text(fields::CONDITION)?,
            admission_type: text(fields::ADMISSION)?,
            insurance_provider: text(fields::INSURANCE)?,
            medication: text(fields::MEDICATION)?,
            test_results: text(fields::TEST)?,
            length_of_stay: integer(fields::STAY)?,
        })
    }

    /// Copy with every categorical value lowercased, matching training data
    pub fn normalized(&self) -> Self {
        Self {
            age: self.age,
            gender: normalize_category(&self.gender),
            blood_type: normalize_category(&self.blood_type),
            medical_condition: normalize_category(&self.medical_condition),
            admission_type: normalize_category(&self.admission_type),
            insurance_provider: normalize_category(&self.insurance_provider),
            medication: normalize_category(&self.medication),
            test_results: normalize_category(&self.test_results),
            length_of_stay: self.length_of_stay,
        }
    }
}

impl PatientFeatures for PatientInput {
    fn age(&self) -> f64 {
        self.age as f64
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

// ============================================================================
// VOCABULARY POLICY
// ============================================================================

/// A categorical value never seen during training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnseenCategory {
    pub column: String,
    pub value: String,
}

/// What to do when a request carries an unseen category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyPolicy {
    /// Drop the indicator, log a warning, return the estimate with the list
    #[default]
    Warn,
    /// Fail the request
    Reject,
}

impl FromStr for VocabularyPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "warn" => Ok(VocabularyPolicy::Warn),
            "reject" => Ok(VocabularyPolicy::Reject),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown vocabulary policy `{}` (expected `warn` or `reject`)",
                other
            ))),
        }
    }
}

impl fmt::Display for VocabularyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VocabularyPolicy::Warn => write!(f, "warn"),
            VocabularyPolicy::Reject => write!(f, "reject"),
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Point estimate of a hospital bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub amount: f64,
    /// Categories dropped during alignment (empty unless policy is Warn)
    pub unseen: Vec<UnseenCategory>,
}

impl Estimate {
    /// Amount rounded to cents, as persisted
    pub fn amount_cents(&self) -> f64 {
        (self.amount * 100.0).round() / 100.0
    }

    /// Human-readable estimate for `name`, rounded half to even
    pub fn message(&self, name: &str) -> String {
        format!("Patient '{}', Estimated Bill: ₹{}", name, self.amount.round_ties_even() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn full_form() -> HashMap<String, String> {
        form(&[
            ("name", "Ann"),
            ("age", "42"),
            ("gender", "Female"),
            ("blood", "O+"),
            ("condition", "Diabetes"),
            ("admission", "Emergency"),
            ("insurance", "Cigna"),
            ("medication", "Lipitor"),
            ("test", "Normal"),
            ("stay", "7"),
        ])
    }

    #[test]
    fn test_from_fields() {
        let input = PatientInput::from_fields(&full_form()).unwrap();
        assert_eq!(input.age, 42);
        assert_eq!(input.length_of_stay, 7);
        assert_eq!(input.blood_type, "O+");
    }

    #[test]
    fn test_normalized_lowercases_categories() {
        let input = PatientInput::from_fields(&full_form()).unwrap().normalized();
        assert_eq!(input.gender, "female");
        assert_eq!(input.blood_type, "o+");
        assert_eq!(input.medical_condition, "diabetes");
        assert_eq!(input.category(CategoricalColumn::AdmissionType), "emergency");
    }

    #[test]
    fn test_non_numeric_age_rejected() {
        let mut f = full_form();
        f.insert("age".into(), "forty".into());
        let err = PatientInput::from_fields(&f).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("`age`"));
    }

    #[test]
    fn test_missing_stay_rejected() {
        let mut f = full_form();
        f.remove("stay");
        let err = PatientInput::from_fields(&f).unwrap_err();
        assert!(err.to_string().contains("missing field `stay`"));
    }

    #[test]
    fn test_negative_stay_rejected() {
        let mut f = full_form();
        f.insert("stay".into(), "-2".into());
        assert!(PatientInput::from_fields(&f).is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Reject".parse::<VocabularyPolicy>().unwrap(), VocabularyPolicy::Reject);
        assert_eq!("warn".parse::<VocabularyPolicy>().unwrap(), VocabularyPolicy::Warn);
        assert!("ignore".parse::<VocabularyPolicy>().is_err());
        assert_eq!(VocabularyPolicy::default(), VocabularyPolicy::Warn);
    }

    #[test]
    fn test_estimate_formatting() {
        let estimate = Estimate { amount: 25431.567, unseen: Vec::new() };
        assert_eq!(estimate.amount_cents(), 25431.57);
        assert_eq!(estimate.message("Ann"), "Patient 'Ann', Estimated Bill: ₹25432");
    }

    #[test]
    fn test_message_rounds_half_to_even() {
        let at = |amount: f64| Estimate { amount, unseen: Vec::new() }.message("x");
        assert_eq!(at(2.5), "Patient 'x', Estimated Bill: ₹2");
        assert_eq!(at(3.5), "Patient 'x', Estimated Bill: ₹4");
        assert_eq!(at(2.51), "Patient 'x', Estimated Bill: ₹3");
    }
}
