//! FIPS 140-2 → 140-3 migration posture.
//!
//! CMVP moves 140-2 certificates to the historical list on 2026-09-21; the
//! urgency ladder below widens as that date approaches.

use super::{FipsStandard, detect};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const FIPS_140_2_SUNSET: (i32, u32, u32) = (2026, 9, 21);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationUrgency {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub current_standard: String,
    pub sunset_date: String,
    pub days_until_sunset: i64,
    pub migration_required: bool,
    pub migration_urgency: MigrationUrgency,
    pub recommended_action: String,
    pub alternative_backend: String,
}

pub fn sunset_date() -> DateTime<Utc> {
    let (y, m, d) = FIPS_140_2_SUNSET;
    let date = NaiveDate::from_ymd_opt(y, m, d)
        .expect("sunset date is a valid literal")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    Utc.from_utc_datetime(&date)
}

/// Migration status for the currently detected backend.
pub fn migration_status() -> MigrationStatus {
    let standard = detect().map(|b| b.fips_standard());
    migration_status_at(standard, Utc::now())
}

/// Pure mapping from (standard, now) to the migration ladder; split out so the
/// band edges are testable with a pinned clock.
pub fn migration_status_at(standard: Option<FipsStandard>, now: DateTime<Utc>) -> MigrationStatus {
    let sunset = sunset_date();
    let days_until_sunset = (sunset - now).num_days();
    let sunset_str = crate::utils::time::to_rfc3339(sunset);

    match standard {
        Some(FipsStandard::Fips140_3) => MigrationStatus {
            current_standard: FipsStandard::Fips140_3.to_string(),
            sunset_date: sunset_str,
            days_until_sunset,
            migration_required: false,
            migration_urgency: MigrationUrgency::None,
            recommended_action: "none: module already validated under FIPS 140-3".to_string(),
            alternative_backend: String::new(),
        },
        Some(FipsStandard::Fips140_2) => {
            let migration_urgency = if days_until_sunset > 180 {
                MigrationUrgency::Low
            } else if days_until_sunset > 90 {
                MigrationUrgency::Medium
            } else if days_until_sunset > 30 {
                MigrationUrgency::High
            } else {
                MigrationUrgency::Critical
            };
            let recommended_action = if days_until_sunset <= 0 {
                "FIPS 140-2 certificate is historical: upgrade to a 140-3 validated module now"
                    .to_string()
            } else {
                format!(
                    "plan upgrade to a FIPS 140-3 validated module ({days_until_sunset} days until the 140-2 sunset)"
                )
            };
            MigrationStatus {
                current_standard: FipsStandard::Fips140_2.to_string(),
                sunset_date: sunset_str,
                days_until_sunset,
                migration_required: true,
                migration_urgency,
                recommended_action,
                alternative_backend: "native-fips".to_string(),
            }
        }
        None => MigrationStatus {
            current_standard: "none".to_string(),
            sunset_date: sunset_str,
            days_until_sunset,
            migration_required: true,
            migration_urgency: MigrationUrgency::Critical,
            recommended_action: "no validated module detected: enable a FIPS backend".to_string(),
            alternative_backend: "boringcrypto".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at_days_before_sunset(days: i64) -> DateTime<Utc> {
        sunset_date() - Duration::days(days)
    }

    #[test]
    fn fips_140_3_needs_no_migration() {
        let status =
            migration_status_at(Some(FipsStandard::Fips140_3), at_days_before_sunset(400));
        assert!(!status.migration_required);
        assert_eq!(status.migration_urgency, MigrationUrgency::None);
    }

    #[test]
    fn urgency_ladder_bands() {
        let cases = [
            (365, MigrationUrgency::Low),
            (181, MigrationUrgency::Low),
            (180, MigrationUrgency::Medium),
            (91, MigrationUrgency::Medium),
            (90, MigrationUrgency::High),
            (31, MigrationUrgency::High),
            (30, MigrationUrgency::Critical),
            (1, MigrationUrgency::Critical),
        ];
        for (days, expected) in cases {
            let status =
                migration_status_at(Some(FipsStandard::Fips140_2), at_days_before_sunset(days));
            assert_eq!(
                status.migration_urgency, expected,
                "at {days} days before sunset"
            );
            assert!(status.migration_required);
        }
    }

    #[test]
    fn elapsed_sunset_is_critical_with_historical_action() {
        let status = migration_status_at(
            Some(FipsStandard::Fips140_2),
            sunset_date() + Duration::days(5),
        );
        assert_eq!(status.migration_urgency, MigrationUrgency::Critical);
        assert!(status.days_until_sunset < 0);
        assert!(status.recommended_action.contains("historical"));
    }

    #[test]
    fn no_backend_is_critical() {
        let status = migration_status_at(None, at_days_before_sunset(365));
        assert_eq!(status.migration_urgency, MigrationUrgency::Critical);
        assert!(status.migration_required);
    }

    #[test]
    fn sunset_date_serialization() {
        let status = migration_status_at(Some(FipsStandard::Fips140_3), Utc::now());
        assert_eq!(status.sunset_date, "2026-09-21T00:00:00Z");
    }
}
