//! Dashboard configuration.
//!
//! Stored as a JSON object on disk; every field is optional and falls back to
//! the defaults below:
//! ```json
//! {
//!   "first_subject": "math",
//!   "second_subject": "por",
//!   "subject_delimiter": ";",
//!   "attendance_delimiter": ",",
//!   "school_map": { "01M015": "GP", "01M019": "MS" },
//!   "grade_threshold": 10.0,
//!   "attendance_threshold": 0.9,
//!   "fallback_to_absences": true
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::risk::RiskThresholds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Name of the first subject; also the column suffix after merging.
    pub first_subject: String,
    pub second_subject: String,
    pub subject_delimiter: char,
    pub attendance_delimiter: char,
    /// Raw location code (`School DBN`) to canonical school label.
    pub school_map: BTreeMap<String, String>,
    pub grade_threshold: f64,
    pub attendance_threshold: f64,
    /// Derive attendance from absences for rows with no attendance match.
    pub fallback_to_absences: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let thresholds = RiskThresholds::default();
        Self {
            first_subject: "math".to_string(),
            second_subject: "por".to_string(),
            subject_delimiter: ';',
            attendance_delimiter: ',',
            school_map: [("01M015", "GP"), ("01M019", "MS")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            grade_threshold: thresholds.grade,
            attendance_threshold: thresholds.attendance,
            fallback_to_absences: true,
        }
    }
}

impl DashboardConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("parsing config '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.first_subject == self.second_subject {
            bail!(
                "subject names must differ, both are '{}'",
                self.first_subject
            );
        }
        for (name, d) in [
            ("subject_delimiter", self.subject_delimiter),
            ("attendance_delimiter", self.attendance_delimiter),
        ] {
            if !d.is_ascii() {
                bail!("{name} must be a single ASCII character, got '{d}'");
            }
        }
        Ok(())
    }

    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            grade: self.grade_threshold,
            attendance: self.attendance_threshold,
        }
    }

    pub fn subject_delimiter_byte(&self) -> u8 {
        self.subject_delimiter as u8
    }

    pub fn attendance_delimiter_byte(&self) -> u8 {
        self.attendance_delimiter as u8
    }
}
