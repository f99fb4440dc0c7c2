//! Turns raw answers into indicator values and decides which records can be scored.

use crate::config::ConfigError;
use crate::types::{Indicator, Record};
use std::ops::Range;
use thiserror::Error;

/// Maps a raw answer to an indicator value.
///
/// `y`, `Y` and `1` are yes; `n`, `N` and `0` are no; anything else, including blanks and
/// surrounding whitespace, is missing.
#[inline]
pub fn normalize_symbol(raw: &str) -> Indicator {
    match raw {
        "y" | "Y" | "1" => Indicator::Yes,
        "n" | "N" | "0" => Indicator::No,
        _ => Indicator::Missing,
    }
}

/// Normalizes one raw row. Position 0 is the identifier column and is always recorded as "no".
pub fn normalize_row<S: AsRef<str>>(id: impl Into<String>, raw: &[S]) -> Record {
    let values = raw
        .iter()
        .enumerate()
        .map(|(position, cell)| {
            if position == 0 {
                Indicator::No
            } else {
                normalize_symbol(cell.as_ref())
            }
        })
        .collect();
    Record::new(id, values)
}

/// Why a record was refused before scoring. The messages match the error log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Error in age indicator: Not Specified")]
    AgeNotSpecified,
    #[error("Error in sex indicator: Not Specified")]
    SexNotSpecified,
    #[error("Error in indicators: No symptoms specified")]
    NoSymptoms,
}

/// Positions of the demographic and symptom indicators inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorLayout {
    pub sex: Range<usize>,
    pub female: usize,
    pub age: Range<usize>,
    pub reproductive_age: Range<usize>,
    pub symptoms: Range<usize>,
}

impl Default for IndicatorLayout {
    fn default() -> Self {
        Self::interva5()
    }
}

impl IndicatorLayout {
    /// The layout of the standard 354-indicator InterVA5 questionnaire.
    pub fn interva5() -> Self {
        Self {
            sex: 3..5,
            female: 4,
            age: 5..12,
            reproductive_age: 16..19,
            symptoms: 20..328,
        }
    }

    /// Checks that every position fits inside records of `record_len` indicators.
    pub fn validate(&self, record_len: usize) -> Result<(), ConfigError> {
        let ranges = [
            ("sex", &self.sex),
            ("age", &self.age),
            ("reproductive age", &self.reproductive_age),
            ("symptom", &self.symptoms),
        ];
        for (name, range) in ranges {
            if range.start == 0 || range.is_empty() || range.end > record_len {
                return Err(ConfigError::Layout(format!(
                    "{name} indicators {}..{} do not fit records of length {record_len} (position 0 is the identifier)",
                    range.start, range.end
                )));
            }
        }
        if !self.sex.contains(&self.female) {
            return Err(ConfigError::Layout(format!(
                "female indicator {} lies outside the sex indicators {}..{}",
                self.female, self.sex.start, self.sex.end
            )));
        }
        Ok(())
    }

    /// A female record with at least one reproductive-age indicator answered yes.
    pub fn is_reproductive_female(&self, record: &Record) -> bool {
        record.get(self.female).is_yes() && record.count_yes(self.reproductive_age.clone()) > 0
    }

    /// Applies the admission checks in order; the first failure wins.
    pub fn admit(&self, record: &Record) -> Result<(), AdmissionError> {
        if record.count_yes(self.age.clone()) == 0 {
            return Err(AdmissionError::AgeNotSpecified);
        }
        if record.count_yes(self.sex.clone()) == 0 {
            return Err(AdmissionError::SexNotSpecified);
        }
        if record.count_yes(self.symptoms.clone()) == 0 {
            return Err(AdmissionError::NoSymptoms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(len: usize) -> Vec<String> {
        vec![String::new(); len]
    }

    #[test]
    fn symbols_normalize_to_three_values() {
        for yes in ["y", "Y", "1"] {
            assert_eq!(normalize_symbol(yes), Indicator::Yes);
        }
        for no in ["n", "N", "0"] {
            assert_eq!(normalize_symbol(no), Indicator::No);
        }
        for missing in ["", ".", "yes", " y", "2", "-"] {
            assert_eq!(normalize_symbol(missing), Indicator::Missing);
        }
    }

    #[test]
    fn identifier_position_is_forced_to_no() {
        let record = normalize_row("d1", &["y", "y", "n", "?"]);
        assert_eq!(record.id, "d1");
        assert_eq!(
            record.values,
            vec![Indicator::No, Indicator::Yes, Indicator::No, Indicator::Missing]
        );
    }

    #[test]
    fn admission_checks_run_in_order() {
        let layout = IndicatorLayout::interva5();
        let mut raw = blank(354);

        let record = normalize_row("a", &raw);
        assert_eq!(layout.admit(&record), Err(AdmissionError::AgeNotSpecified));
        assert_eq!(
            AdmissionError::AgeNotSpecified.to_string(),
            "Error in age indicator: Not Specified"
        );

        raw[7] = "y".to_string();
        let record = normalize_row("a", &raw);
        assert_eq!(layout.admit(&record), Err(AdmissionError::SexNotSpecified));

        raw[3] = "y".to_string();
        let record = normalize_row("a", &raw);
        assert_eq!(layout.admit(&record), Err(AdmissionError::NoSymptoms));
        assert_eq!(
            AdmissionError::NoSymptoms.to_string(),
            "Error in indicators: No symptoms specified"
        );

        raw[327] = "y".to_string();
        let record = normalize_row("a", &raw);
        assert_eq!(layout.admit(&record), Ok(()));
    }

    #[test]
    fn symptom_range_excludes_trailing_indicators() {
        let layout = IndicatorLayout::interva5();
        let mut raw = blank(354);
        raw[5] = "y".to_string();
        raw[3] = "y".to_string();
        raw[328] = "y".to_string();
        let record = normalize_row("a", &raw);
        assert_eq!(layout.admit(&record), Err(AdmissionError::NoSymptoms));
    }

    #[test]
    fn reproductive_female_needs_both_indicators() {
        let layout = IndicatorLayout::interva5();
        let mut raw = blank(354);
        raw[4] = "y".to_string();
        assert!(!layout.is_reproductive_female(&normalize_row("a", &raw)));
        raw[17] = "y".to_string();
        assert!(layout.is_reproductive_female(&normalize_row("a", &raw)));
        raw[4] = "n".to_string();
        assert!(!layout.is_reproductive_female(&normalize_row("a", &raw)));
    }

    #[test]
    fn layout_must_fit_the_record() {
        let layout = IndicatorLayout::interva5();
        assert!(layout.validate(354).is_ok());
        assert!(matches!(layout.validate(300), Err(ConfigError::Layout(_))));

        let bad = IndicatorLayout {
            female: 9,
            ..IndicatorLayout::interva5()
        };
        assert!(bad.validate(354).is_err());
    }
}
