//! Class index to label mapping for the classifier heads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of gender classes.
pub const NUM_GENDER_CLASSES: usize = 2;
/// Number of five-year age buckets; the last bucket is open ended.
pub const NUM_AGE_CLASSES: usize = 20;

const AGE_BUCKET_YEARS: usize = 5;

/// Predicted gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Map a gender-head class index. Index 0 is `Male`, 1 is `Female`.
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(Gender::Male),
            1 => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age bucket predicted by the age head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgeRange(usize);

impl AgeRange {
    pub fn from_class(class: usize) -> Option<Self> {
        (class < NUM_AGE_CLASSES).then_some(AgeRange(class))
    }

    pub fn class(self) -> usize {
        self.0
    }

    /// Lower bound of the bucket in years.
    pub fn lower(self) -> usize {
        self.0 * AGE_BUCKET_YEARS
    }

    /// Inclusive upper bound, or `None` for the open-ended last bucket.
    pub fn upper(self) -> Option<usize> {
        (self.0 + 1 < NUM_AGE_CLASSES).then(|| self.lower() + AGE_BUCKET_YEARS - 1)
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper() {
            Some(upper) => write!(f, "{}-{}", self.lower(), upper),
            None => write!(f, "{}+", self.lower()),
        }
    }
}

/// Label for an age-head class index, e.g. `"50-54"` or `"95+"`.
///
/// Returns `None` for indices outside the age head.
pub fn class_to_age_range(class: usize) -> Option<String> {
    AgeRange::from_class(class).map(|range| range.to_string())
}
