// ABOUTME: Maps raw device log rows onto the API's attendance record shape
// ABOUTME: Pure and deterministic, no timezone conversion is applied

use serde::{Deserialize, Serialize};

use crate::source::RawEvent;

pub const DAY_FORMAT: &str = "%d/%m/%Y";
pub const TIME_FORMAT: &str = "%H:%M";

/// One attendance record as the API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Employee code of the person who punched
    pub id: String,
    /// `dd/mm/yyyy`
    pub day: String,
    /// `HH:mm`, seconds dropped
    pub time: String,
    /// Passed through unchanged
    pub direction: String,
}

pub fn map_event(event: &RawEvent) -> WireRecord {
    WireRecord {
        id: event.employee_code.clone(),
        day: event.log_timestamp.format(DAY_FORMAT).to_string(),
        time: event.log_timestamp.format(TIME_FORMAT).to_string(),
        direction: event.direction.clone(),
    }
}

/// Order is preserved, so record `i` always describes event `i`.
pub fn map_batch(events: &[RawEvent]) -> Vec<WireRecord> {
    events.iter().map(map_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(code: &str, direction: &str, h: u32, m: u32, s: u32) -> RawEvent {
        RawEvent {
            source_id: "1".to_string(),
            employee_code: code.to_string(),
            log_timestamp: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
            direction: direction.to_string(),
        }
    }

    #[test]
    fn test_splits_day_and_time() {
        let record = map_event(&event("E042", "in", 8, 7, 0));
        assert_eq!(record.id, "E042");
        assert_eq!(record.day, "05/03/2024");
        assert_eq!(record.time, "08:07");
        assert_eq!(record.direction, "in");
    }

    #[test]
    fn test_seconds_are_truncated_not_rounded() {
        let record = map_event(&event("E1", "out", 23, 59, 59));
        assert_eq!(record.day, "05/03/2024");
        assert_eq!(record.time, "23:59");
    }

    #[test]
    fn test_unknown_direction_passes_through() {
        let record = map_event(&event("E1", "Break-Start", 12, 0, 0));
        assert_eq!(record.direction, "Break-Start");
        let empty = map_event(&event("E1", "", 12, 0, 0));
        assert_eq!(empty.direction, "");
    }

    #[test]
    fn test_same_event_same_record() {
        let raw = event("E9", "in", 9, 30, 15);
        assert_eq!(map_event(&raw), map_event(&raw.clone()));
    }

    #[test]
    fn test_batch_keeps_order() {
        let events = vec![event("A", "in", 8, 0, 0), event("B", "out", 7, 0, 0)];
        let records = map_batch(&events);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "A");
        assert_eq!(records[1].id, "B");
        assert!(map_batch(&[]).is_empty());
    }
}
