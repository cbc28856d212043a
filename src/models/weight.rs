//! Body weight progress entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::Result;

/// A dated weight reading. Duplicate dates are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WeightEntry {
    pub id: String,
    pub owner_id: String,
    /// Kilograms, always positive
    pub weight: f64,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// User-entered weight fields.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct WeightDraft {
    #[validate(range(exclusive_min = 0.0, message = "must be positive"))]
    pub weight: f64,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

impl WeightDraft {
    pub fn checked(mut self) -> Result<Self> {
        if !self.weight.is_finite() {
            return Err(crate::error::AppError::Validation(
                "weight: must be a finite number".to_string(),
            ));
        }
        self.validate().map_err(super::validation_error)?;
        self.notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(self)
    }
}

/// Insert payload for a weight entry.
#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub owner_id: String,
    pub draft: WeightDraft,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(weight: f64) -> WeightDraft {
        WeightDraft {
            weight,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        assert!(draft(0.0).checked().is_err());
        assert!(draft(-1.0).checked().is_err());
        assert!(draft(f64::NAN).checked().is_err());
        assert!(draft(72.5).checked().is_ok());
    }
}
