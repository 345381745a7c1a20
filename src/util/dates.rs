use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Birthdate Parsing & Age Rules
// ============================================================================
//
// Participants must have a birthdate that parses and yields a non-negative
// age at the event's reference date. The reference date is the event start;
// when the event has no start date, today is used instead. The same rule is
// applied at order creation and at birthdate correction.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BirthdateError {
    #[error("birthdate is required")]
    Missing,

    #[error("'{0}' is not a valid date")]
    Unparseable(String),

    #[error("birthdate lies after the event date")]
    InFuture,
}

/// Age category shown to door staff when a ticket is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeCategory {
    Adult,
    Minor,
}

/// Resolve the date against which participant ages are computed.
pub fn reference_date(event_start: Option<DateTime<Utc>>, today: NaiveDate) -> NaiveDate {
    event_start.map(|dt| dt.date_naive()).unwrap_or(today)
}

/// Parse and validate a raw birthdate string against the reference date.
///
/// Accepts ISO dates (`2006-05-14`) and the dotted day-first form
/// (`14.05.2006`) used on paper forms.
pub fn parse_birthdate(raw: &str, reference: NaiveDate) -> Result<NaiveDate, BirthdateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BirthdateError::Missing);
    }

    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"))
        .map_err(|_| BirthdateError::Unparseable(raw.to_string()))?;

    if parsed > reference {
        return Err(BirthdateError::InFuture);
    }

    Ok(parsed)
}

/// Whole years between birthdate and the reference date.
pub fn age_on(birthdate: NaiveDate, reference: NaiveDate) -> i32 {
    let mut age = reference.year() - birthdate.year();
    if (reference.month(), reference.day()) < (birthdate.month(), birthdate.day()) {
        age -= 1;
    }
    age
}

pub fn age_category(birthdate: NaiveDate, reference: NaiveDate) -> AgeCategory {
    if age_on(birthdate, reference) >= 18 {
        AgeCategory::Adult
    } else {
        AgeCategory::Minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_iso_and_dotted() {
        let reference = date(2026, 6, 20);
        assert_eq!(
            parse_birthdate("2006-05-14", reference),
            Ok(date(2006, 5, 14))
        );
        assert_eq!(
            parse_birthdate(" 14.05.2006 ", reference),
            Ok(date(2006, 5, 14))
        );
    }

    #[test]
    fn test_rejects_empty_garbage_and_future() {
        let reference = date(2026, 6, 20);
        assert_eq!(parse_birthdate("", reference), Err(BirthdateError::Missing));
        assert_eq!(parse_birthdate("   ", reference), Err(BirthdateError::Missing));
        assert!(matches!(
            parse_birthdate("not-a-date", reference),
            Err(BirthdateError::Unparseable(_))
        ));
        assert_eq!(
            parse_birthdate("2030-01-01", reference),
            Err(BirthdateError::InFuture)
        );
    }

    #[test]
    fn test_age_counts_whole_years() {
        let birthdate = date(2008, 6, 21);
        assert_eq!(age_on(birthdate, date(2026, 6, 20)), 17);
        assert_eq!(age_on(birthdate, date(2026, 6, 21)), 18);
        assert_eq!(age_category(birthdate, date(2026, 6, 20)), AgeCategory::Minor);
        assert_eq!(age_category(birthdate, date(2026, 6, 21)), AgeCategory::Adult);
    }

    #[test]
    fn test_reference_date_falls_back_to_today() {
        let today = date(2026, 8, 7);
        assert_eq!(reference_date(None, today), today);

        let start = DateTime::parse_from_rfc3339("2026-06-20T19:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(reference_date(Some(start), today), date(2026, 6, 20));
    }
}
