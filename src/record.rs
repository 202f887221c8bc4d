//! Single-patient input record as exchanged with front-ends.
//!
//! Field names mirror the training table headers exactly (note `Residence_type`), so a
//! record can be turned into a one-row [`FeatureTable`] and fed through the same
//! preprocessor that was fit on the training CSV.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::dataset::FeatureTable;

/// Column names in the order a [`Record`] is laid out.
pub const RECORD_FIELDS: [&str; 10] = [
    "age",
    "bmi",
    "avg_glucose_level",
    "gender",
    "ever_married",
    "Residence_type",
    "work_type",
    "smoking_status",
    "hypertension",
    "heart_disease",
];

/// Errors raised while building or validating a record.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    /// A categorical field received a value outside its vocabulary.
    #[error("invalid value {value:?} for {field}")]
    InvalidCategory { field: &'static str, value: String },
    /// A numeric field is negative or not finite.
    #[error("{field} must be a finite non-negative number (got {value})")]
    InvalidNumber { field: &'static str, value: f64 },
    /// A flag field received something other than 0/1/true/false.
    #[error("invalid flag {value:?} for {field} (expected 0/1)")]
    InvalidFlag { field: &'static str, value: String },
}

macro_rules! category {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every accepted value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Table spelling of this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = RecordError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(RecordError::InvalidCategory {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

category!(
    /// Patient gender. `Other` is accepted from callers and collapsed by cleaning.
    Gender, "gender" {
        Male => "Male",
        Female => "Female",
        Other => "Other",
    }
);

category!(
    EverMarried, "ever_married" {
        Yes => "Yes",
        No => "No",
    }
);

category!(
    ResidenceType, "Residence_type" {
        Urban => "Urban",
        Rural => "Rural",
    }
);

category!(
    /// Employment category. `Children` and `NeverWorked` collapse into `Other` when cleaned.
    WorkType, "work_type" {
        Private => "Private",
        SelfEmployed => "Self-employed",
        GovtJob => "Govt_job",
        Children => "children",
        NeverWorked => "Never_worked",
        Other => "Other",
    }
);

category!(
    SmokingStatus, "smoking_status" {
        FormerlySmoked => "formerly smoked",
        NeverSmoked => "never smoked",
        Smokes => "smokes",
        Unknown => "Unknown",
    }
);

/// One observation, as collected by a front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub age: u32,
    pub bmi: f64,
    pub avg_glucose_level: f64,
    pub gender: Gender,
    pub ever_married: EverMarried,
    #[serde(rename = "Residence_type")]
    pub residence_type: ResidenceType,
    pub work_type: WorkType,
    pub smoking_status: SmokingStatus,
    #[serde(with = "flag")]
    pub hypertension: bool,
    #[serde(with = "flag")]
    pub heart_disease: bool,
}

impl Record {
    /// Reject negative or non-finite measurements.
    pub fn validate(&self) -> Result<(), RecordError> {
        for (field, value) in [("bmi", self.bmi), ("avg_glucose_level", self.avg_glucose_level)] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecordError::InvalidNumber { field, value });
            }
        }
        Ok(())
    }

    /// Build a one-row table with columns in [`RECORD_FIELDS`] order.
    pub fn to_table(&self) -> FeatureTable {
        let row = vec![
            Some(self.age.to_string()),
            Some(self.bmi.to_string()),
            Some(self.avg_glucose_level.to_string()),
            Some(self.gender.as_str().to_string()),
            Some(self.ever_married.as_str().to_string()),
            Some(self.residence_type.as_str().to_string()),
            Some(self.work_type.as_str().to_string()),
            Some(self.smoking_status.as_str().to_string()),
            Some(flag_text(self.hypertension).to_string()),
            Some(flag_text(self.heart_disease).to_string()),
        ];
        FeatureTable::from_rows(
            RECORD_FIELDS.iter().map(|name| name.to_string()).collect(),
            vec![row],
        )
    }
}

/// Parse a 0/1 (or true/false, yes/no) flag as submitted by a form.
pub fn parse_flag(field: &'static str, value: &str) -> Result<bool, RecordError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(RecordError::InvalidFlag {
            field,
            value: value.to_string(),
        }),
    }
}

fn flag_text(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Serde adapter accepting booleans or the integers 0/1; always writes integers.
mod flag {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagRepr {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match FlagRepr::deserialize(deserializer)? {
            FlagRepr::Bool(value) => Ok(value),
            FlagRepr::Int(0) => Ok(false),
            FlagRepr::Int(1) => Ok(true),
            FlagRepr::Int(other) => Err(serde::de::Error::custom(format!(
                "expected 0 or 1, got {other}"
            ))),
            FlagRepr::Text(text) => {
                parse_flag("flag", &text).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            age: 67,
            bmi: 36.6,
            avg_glucose_level: 228.69,
            gender: Gender::Male,
            ever_married: EverMarried::Yes,
            residence_type: ResidenceType::Urban,
            work_type: WorkType::Private,
            smoking_status: SmokingStatus::FormerlySmoked,
            hypertension: false,
            heart_disease: true,
        }
    }

    #[test]
    fn deserializes_front_end_field_names_and_integer_flags() {
        let json = r#"{
            "age": 67, "bmi": 36.6, "avg_glucose_level": 228.69,
            "gender": "Male", "ever_married": "Yes", "Residence_type": "Urban",
            "work_type": "Private", "smoking_status": "formerly smoked",
            "hypertension": 0, "heart_disease": 1
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record, sample());
    }

    #[test]
    fn accepts_boolean_flags() {
        let json = r#"{
            "age": 67, "bmi": 36.6, "avg_glucose_level": 228.69,
            "gender": "Male", "ever_married": "Yes", "Residence_type": "Urban",
            "work_type": "Private", "smoking_status": "formerly smoked",
            "hypertension": false, "heart_disease": true
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert!(record.heart_disease);
        assert!(!record.hypertension);
    }

    #[test]
    fn rejects_out_of_range_flag() {
        let json = r#"{
            "age": 1, "bmi": 1.0, "avg_glucose_level": 1.0,
            "gender": "Male", "ever_married": "Yes", "Residence_type": "Urban",
            "work_type": "Private", "smoking_status": "smokes",
            "hypertension": 2, "heart_disease": 0
        }"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }

    #[test]
    fn serializes_flags_as_integers() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["hypertension"], 0);
        assert_eq!(value["heart_disease"], 1);
        assert_eq!(value["Residence_type"], "Urban");
    }

    #[test]
    fn table_follows_record_field_order() {
        let table = sample().to_table();
        assert_eq!(table.columns(), RECORD_FIELDS.map(String::from).as_slice());
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.cell(0, 6), Some("Private"));
        assert_eq!(table.cell(0, 9), Some("1"));
    }

    #[test]
    fn category_parsing_uses_table_spelling() {
        assert_eq!("Self-employed".parse::<WorkType>(), Ok(WorkType::SelfEmployed));
        assert_eq!("never smoked".parse::<SmokingStatus>(), Ok(SmokingStatus::NeverSmoked));
        assert!("self-employed".parse::<WorkType>().is_err());
    }

    #[test]
    fn validate_rejects_negative_bmi() {
        let mut record = sample();
        record.bmi = -1.0;
        assert!(matches!(
            record.validate(),
            Err(RecordError::InvalidNumber { field: "bmi", .. })
        ));
    }
}
