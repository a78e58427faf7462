//! Per-tenant company settings and the financial year model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocIdError;

/// Month in which a financial year starts (April).
pub const FINANCIAL_YEAR_START_MONTH: u32 = 4;

pub const DEFAULT_COMPANY_CODE: &str = "GTPL";
pub const DEFAULT_BRANCH_CODE: &str = "AHM";
pub const DEFAULT_DEPARTMENT_CODE: &str = "GEN";

/// An April-to-March financial year, identified by the calendar year it
/// starts in. Displayed as two two-digit years, e.g. `25-26`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinancialYear {
    start_year: i32,
}

impl FinancialYear {
    #[must_use]
    pub fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    /// The financial year containing `date`: April onwards belongs to the
    /// year starting this calendar year, January to March to the previous.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        let start_year = if date.month() >= FINANCIAL_YEAR_START_MONTH {
            date.year()
        } else {
            date.year() - 1
        };
        Self { start_year }
    }

    #[must_use]
    pub fn start_year(self) -> i32 {
        self.start_year
    }

    /// Bucket label, e.g. `25-26`.
    #[must_use]
    pub fn label(self) -> String {
        format!(
            "{:02}-{:02}",
            self.start_year.rem_euclid(100),
            (self.start_year + 1).rem_euclid(100)
        )
    }
}

impl fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for FinancialYear {
    type Err = DocIdError;

    /// Parses a four-digit start year (`2025`) or a full span (`2025-26`).
    /// Two-digit labels are ambiguous about the century and are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let head = s.trim().split('-').next().unwrap_or_default();
        match head.parse::<i32>() {
            Ok(year) if head.len() == 4 => Ok(Self::starting(year)),
            _ => Err(DocIdError::InvalidConfig(format!(
                "financial year '{s}' must start with a four-digit year"
            ))),
        }
    }
}

/// Company-level settings for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySettings {
    pub company_code: String,
    pub branch_code: String,
    pub department_code: String,
    pub financial_year: FinancialYear,
    pub updated_at: DateTime<Utc>,
}

impl CompanySettings {
    /// Label of the current financial year bucket.
    #[must_use]
    pub fn financial_year_label(&self) -> String {
        self.financial_year.label()
    }

    /// Move the stored financial year forward if `today` falls in a later
    /// one. Returns `true` when the settings changed. Never moves backwards.
    pub fn roll_forward(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        let current = FinancialYear::containing(today);
        if current > self.financial_year {
            self.financial_year = current;
            self.updated_at = now;
            true
        } else {
            false
        }
    }
}

/// Default company/branch/department codes for newly created settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDefaults {
    pub company_code: String,
    pub branch_code: String,
    pub department_code: String,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            company_code: DEFAULT_COMPANY_CODE.to_string(),
            branch_code: DEFAULT_BRANCH_CODE.to_string(),
            department_code: DEFAULT_DEPARTMENT_CODE.to_string(),
        }
    }
}

impl SettingsDefaults {
    /// Fresh settings for `today` using these codes.
    #[must_use]
    pub fn settings_for(&self, today: NaiveDate, now: DateTime<Utc>) -> CompanySettings {
        CompanySettings {
            company_code: self.company_code.clone(),
            branch_code: self.branch_code.clone(),
            department_code: self.department_code.clone(),
            financial_year: FinancialYear::containing(today),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn april_starts_a_new_financial_year() {
        assert_eq!(FinancialYear::containing(date(2026, 3, 31)).label(), "25-26");
        assert_eq!(FinancialYear::containing(date(2026, 4, 1)).label(), "26-27");
        assert_eq!(FinancialYear::containing(date(2025, 12, 31)).label(), "25-26");
        assert_eq!(FinancialYear::containing(date(2025, 1, 15)).label(), "24-25");
    }

    #[test]
    fn label_wraps_at_century() {
        assert_eq!(FinancialYear::starting(2099).label(), "99-00");
        assert_eq!(FinancialYear::starting(2000).label(), "00-01");
    }

    #[test]
    fn parses_four_digit_years_only() {
        assert_eq!("2025".parse::<FinancialYear>().unwrap().start_year(), 2025);
        assert_eq!("2025-26".parse::<FinancialYear>().unwrap().label(), "25-26");
        assert!("25-26".parse::<FinancialYear>().is_err());
    }

    #[test]
    fn roll_forward_never_moves_backwards() {
        let now = Utc::now();
        let mut settings = SettingsDefaults::default().settings_for(date(2025, 5, 1), now);
        assert_eq!(settings.financial_year_label(), "25-26");

        assert!(!settings.roll_forward(date(2026, 3, 31), now));
        assert!(settings.roll_forward(date(2026, 4, 1), now));
        assert_eq!(settings.financial_year_label(), "26-27");

        settings.financial_year = FinancialYear::starting(2030);
        assert!(!settings.roll_forward(date(2026, 6, 1), now));
        assert_eq!(settings.financial_year.start_year(), 2030);
    }

    #[test]
    fn defaults_use_standard_codes() {
        let defaults = SettingsDefaults::default();
        assert_eq!(defaults.company_code, "GTPL");
        assert_eq!(defaults.branch_code, "AHM");
        assert_eq!(defaults.department_code, "GEN");
    }
}
