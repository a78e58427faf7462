//! Clock abstraction and the period resolver that picks a counter bucket.
//!
//! Core invariant: **the bucket depends only on the document type, the
//! tenant settings and the injected clock.** Nothing here touches storage.

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};

use crate::document_type::{DocumentTypeConfig, PeriodBasis, ResetPolicy};
use crate::settings::CompanySettings;

/// Bucket label for counters that never reset.
pub const GLOBAL_BUCKET: &str = "GLOBAL";

/// Source of "now" for period resolution and audit timestamps.
pub trait Clock: Send + Sync {
    /// Current instant, for audit fields.
    fn now(&self) -> DateTime<Utc>;

    /// Current local calendar date, for financial year and bucket decisions.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock frozen at one instant. Used by tests and replay tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Midnight UTC on the given date. Returns `None` for impossible dates.
    #[must_use]
    pub fn on(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self::at(date.and_hms_opt(0, 0, 0)?.and_utc()))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// The Period Resolver: maps a document type to the counter bucket it
/// draws from on `today`.
///
/// Rules, first match wins:
/// 1. reset policy `NEVER` → `GLOBAL`
/// 2. reset policy `MONTHLY` → `YYYY-MM`
/// 3. calendar-year document types → `YYYY`
/// 4. otherwise → the tenant's financial year label (`25-26`)
#[must_use]
pub fn resolve_bucket(
    config: &DocumentTypeConfig,
    settings: &CompanySettings,
    today: NaiveDate,
) -> String {
    match (config.reset_policy, config.period_basis) {
        (ResetPolicy::Never, _) => GLOBAL_BUCKET.to_string(),
        (ResetPolicy::Monthly, _) => format!("{:04}-{:02}", today.year(), today.month()),
        (ResetPolicy::Yearly, PeriodBasis::CalendarYear) => format!("{:04}", today.year()),
        (ResetPolicy::Yearly, PeriodBasis::FinancialYear) => settings.financial_year_label(),
    }
}

/// Value of the `{{YEAR}}` token for a document type.
#[must_use]
pub fn year_token(
    config: &DocumentTypeConfig,
    settings: &CompanySettings,
    today: NaiveDate,
) -> String {
    match config.period_basis {
        PeriodBasis::CalendarYear => format!("{:04}", today.year()),
        PeriodBasis::FinancialYear => settings.financial_year_label(),
    }
}

/// Value of the `{{MONTH}}` token.
#[must_use]
pub fn month_token(today: NaiveDate) -> String {
    format!("{:02}", today.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_type::default_for;
    use crate::settings::SettingsDefaults;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(key: &str) -> DocumentTypeConfig {
        DocumentTypeConfig::from_default(default_for(key).unwrap(), Utc::now())
    }

    fn settings_on(today: NaiveDate) -> CompanySettings {
        SettingsDefaults::default().settings_for(today, Utc::now())
    }

    #[test]
    fn never_resets_into_global_bucket() {
        let today = date(2025, 7, 1);
        let emp = config("EMP");
        assert_eq!(resolve_bucket(&emp, &settings_on(today), today), "GLOBAL");
    }

    #[test]
    fn yearly_financial_types_use_settings_label() {
        let today = date(2026, 2, 10);
        let job = config("JOB");
        assert_eq!(resolve_bucket(&job, &settings_on(today), today), "25-26");
    }

    #[test]
    fn calendar_year_types_ignore_financial_year() {
        let today = date(2026, 2, 10);
        let mut emp = config("EMP");
        emp.reset_policy = ResetPolicy::Yearly;
        assert_eq!(resolve_bucket(&emp, &settings_on(today), today), "2026");
        assert_eq!(year_token(&emp, &settings_on(today), today), "2026");
    }

    #[test]
    fn monthly_resets_by_calendar_month() {
        let today = date(2025, 4, 3);
        let mut off = config("OFF");
        off.reset_policy = ResetPolicy::Monthly;
        assert_eq!(resolve_bucket(&off, &settings_on(today), today), "2025-04");
    }

    #[test]
    fn bucket_follows_stored_settings_not_the_clock() {
        // Settings still on the previous year until the bootstrapper rolls them.
        let stale = settings_on(date(2025, 3, 31));
        let job = config("JOB");
        assert_eq!(resolve_bucket(&job, &stale, date(2025, 4, 1)), "24-25");
    }

    #[test]
    fn fixed_clock_reports_its_date() {
        let clock = FixedClock::on(2025, 4, 1).unwrap();
        assert_eq!(clock.today(), date(2025, 4, 1));
        assert_eq!(month_token(clock.today()), "04");
        assert!(FixedClock::on(2025, 2, 30).is_none());
    }
}
