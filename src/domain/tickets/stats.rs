use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::AttendanceRow;

// ============================================================================
// Live Attendance Projections
// ============================================================================
//
// Read-only aggregations over the participants of paid orders, feeding the
// check-in dashboard. Pure functions over rows the store already decoded;
// the service fetches, these compute.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ArrivalBucket {
    /// Hour bucket formatted as `YYYY-MM-DD HH:00`.
    pub hour: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveStats {
    pub total_tickets: u32,
    pub checked_in: u32,
    pub not_checked_in: u32,
    pub scans_last_minute: u32,
    pub arrival_distribution: Vec<ArrivalBucket>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresentEntry {
    pub name: String,
    pub ticket_number: u32,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingEntry {
    pub name: String,
    pub ticket_number: u32,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveList {
    /// Checked-in participants, most recent arrival first.
    pub present: Vec<PresentEntry>,
    /// Not-yet-arrived participants, alphabetical.
    pub missing: Vec<MissingEntry>,
    pub last_updated: DateTime<Utc>,
}

pub fn live_stats(rows: &[AttendanceRow], now: DateTime<Utc>) -> LiveStats {
    let total_tickets = rows.len() as u32;
    let checked_in = rows.iter().filter(|r| r.participant.redeemed).count() as u32;

    let one_minute_ago = now - Duration::minutes(1);
    let scans_last_minute = rows
        .iter()
        .filter(|r| r.participant.redeemed)
        .filter(|r| r.participant.redeemed_at.is_some_and(|at| at > one_minute_ago))
        .count() as u32;

    let twelve_hours_ago = now - Duration::hours(12);
    let mut buckets: BTreeMap<String, u32> = BTreeMap::new();
    for row in rows {
        if !row.participant.redeemed {
            continue;
        }
        let Some(at) = row.participant.redeemed_at else {
            continue;
        };
        if at <= twelve_hours_ago {
            continue;
        }
        *buckets.entry(at.format("%Y-%m-%d %H:00").to_string()).or_default() += 1;
    }

    LiveStats {
        total_tickets,
        checked_in,
        not_checked_in: total_tickets - checked_in,
        scans_last_minute,
        arrival_distribution: buckets
            .into_iter()
            .map(|(hour, count)| ArrivalBucket { hour, count })
            .collect(),
        last_updated: now,
    }
}

pub fn live_list(rows: &[AttendanceRow], now: DateTime<Utc>) -> LiveList {
    let mut present: Vec<PresentEntry> = rows
        .iter()
        .filter(|r| r.participant.redeemed)
        .map(|r| PresentEntry {
            name: r.participant.name.clone(),
            ticket_number: r.participant.ticket_number,
            checked_in_at: r.participant.redeemed_at,
            reference: r.payment_reference.clone(),
        })
        .collect();
    present.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));

    let mut missing: Vec<MissingEntry> = rows
        .iter()
        .filter(|r| !r.participant.redeemed)
        .map(|r| MissingEntry {
            name: r.participant.name.clone(),
            ticket_number: r.participant.ticket_number,
            reference: r.payment_reference.clone(),
        })
        .collect();
    missing.sort_by(|a, b| a.name.cmp(&b.name));

    LiveList {
        present,
        missing,
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Participant;
    use chrono::TimeZone;

    fn row(name: &str, ticket_number: u32, redeemed_at: Option<DateTime<Utc>>) -> AttendanceRow {
        let mut participant = Participant::new(
            name.to_string(),
            String::new(),
            String::new(),
            None,
            ticket_number,
        );
        if let Some(at) = redeemed_at {
            participant.redeemed = true;
            participant.redeemed_at = Some(at);
            participant.redeemed_by = Some("door@x.de".to_string());
        }
        AttendanceRow {
            participant,
            order_id: "o1".to_string(),
            payment_reference: "MAX001".to_string(),
            event_id: "ev1".to_string(),
        }
    }

    #[test]
    fn test_counts_and_rolling_minute() {
        let now = Utc.with_ymd_and_hms(2026, 6, 20, 22, 0, 0).unwrap();
        let rows = vec![
            row("A", 1, Some(now - Duration::seconds(30))),
            row("B", 2, Some(now - Duration::minutes(5))),
            row("C", 3, None),
            row("D", 4, None),
        ];

        let stats = live_stats(&rows, now);
        assert_eq!(stats.total_tickets, 4);
        assert_eq!(stats.checked_in, 2);
        assert_eq!(stats.not_checked_in, 2);
        assert_eq!(stats.scans_last_minute, 1);
    }

    #[test]
    fn test_arrival_histogram_buckets_by_hour_over_12h() {
        let now = Utc.with_ymd_and_hms(2026, 6, 20, 22, 30, 0).unwrap();
        let rows = vec![
            row("A", 1, Some(now - Duration::minutes(10))), // 22:00 bucket
            row("B", 2, Some(now - Duration::minutes(20))), // 22:00 bucket
            row("C", 3, Some(now - Duration::hours(2))),    // 20:00 bucket
            row("D", 4, Some(now - Duration::hours(13))),   // outside window
        ];

        let stats = live_stats(&rows, now);
        assert_eq!(stats.arrival_distribution.len(), 2);
        assert_eq!(stats.arrival_distribution[0].hour, "2026-06-20 20:00");
        assert_eq!(stats.arrival_distribution[0].count, 1);
        assert_eq!(stats.arrival_distribution[1].hour, "2026-06-20 22:00");
        assert_eq!(stats.arrival_distribution[1].count, 2);
    }

    #[test]
    fn test_live_list_ordering() {
        let now = Utc.with_ymd_and_hms(2026, 6, 20, 22, 0, 0).unwrap();
        let rows = vec![
            row("Zoe", 1, Some(now - Duration::minutes(30))),
            row("Anna", 2, Some(now - Duration::minutes(5))),
            row("Mia", 3, None),
            row("Ben", 4, None),
        ];

        let list = live_list(&rows, now);
        // Present: newest arrival first.
        assert_eq!(list.present[0].name, "Anna");
        assert_eq!(list.present[1].name, "Zoe");
        // Missing: alphabetical.
        assert_eq!(list.missing[0].name, "Ben");
        assert_eq!(list.missing[1].name, "Mia");
    }
}
