//! Bookable slots and the rules for laying them out.

use super::ServiceOffering;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_LABEL_LEN: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotWindowError {
    #[error("Slot start time must be before end time")]
    InvertedInterval,

    #[error("Slot label must be between 1 and 50 characters")]
    InvalidLabel,

    #[error("Slot length must be positive")]
    ZeroLength,

    #[error("No slot of the requested length fits between {start} and {end}")]
    EmptyRange { start: NaiveTime, end: NaiveTime },

    #[error("Slot is for {slot_date}, not {requested}")]
    DateMismatch {
        slot_date: NaiveDate,
        requested: NaiveDate,
    },

    #[error("A booking date is required for labeled slots")]
    MissingDate,
}

/// When a slot takes place.
///
/// Intervals belong to one service and must not overlap other intervals of
/// that service on the same day (touching ends are fine). Labels are
/// business-wide time-of-day names such as "10:00 AM" and must be unique per
/// business, ignoring case and surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotWindow {
    Interval {
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
    Labeled {
        label: String,
    },
}

impl SlotWindow {
    pub fn kind(&self) -> &'static str {
        match self {
            SlotWindow::Interval { .. } => "interval",
            SlotWindow::Labeled { .. } => "labeled",
        }
    }

    pub fn validate(&self) -> Result<(), SlotWindowError> {
        match self {
            SlotWindow::Interval {
                start_time,
                end_time,
                ..
            } => {
                if start_time >= end_time {
                    return Err(SlotWindowError::InvertedInterval);
                }
            }
            SlotWindow::Labeled { label } => {
                let len = label.trim().chars().count();
                if len == 0 || len > MAX_LABEL_LEN {
                    return Err(SlotWindowError::InvalidLabel);
                }
            }
        }
        Ok(())
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            SlotWindow::Interval { date, .. } => Some(*date),
            SlotWindow::Labeled { .. } => None,
        }
    }

    /// Key used for label uniqueness.
    pub fn normalized_label(&self) -> Option<String> {
        match self {
            SlotWindow::Labeled { label } => Some(label.trim().to_lowercase()),
            SlotWindow::Interval { .. } => None,
        }
    }

    /// Whether two windows cannot coexist under the same owner.
    pub fn conflicts_with(&self, other: &SlotWindow) -> bool {
        match (self, other) {
            (
                SlotWindow::Interval {
                    date: a_date,
                    start_time: a_start,
                    end_time: a_end,
                },
                SlotWindow::Interval {
                    date: b_date,
                    start_time: b_start,
                    end_time: b_end,
                },
            ) => a_date == b_date && a_start < b_end && b_start < a_end,
            (SlotWindow::Labeled { .. }, SlotWindow::Labeled { .. }) => {
                self.normalized_label() == other.normalized_label()
            }
            _ => false,
        }
    }

    /// First candidate that clashes with an existing window or with an earlier
    /// candidate, paired with what it clashes with.
    pub fn first_conflict<'a>(
        candidates: &'a [SlotWindow],
        existing: &'a [SlotWindow],
    ) -> Option<(&'a SlotWindow, &'a SlotWindow)> {
        for (i, candidate) in candidates.iter().enumerate() {
            if let Some(hit) = existing
                .iter()
                .chain(candidates[..i].iter())
                .find(|other| candidate.conflicts_with(other))
            {
                return Some((candidate, hit));
            }
        }
        None
    }

    /// Lay out back-to-back intervals of `slot_minutes` separated by
    /// `break_minutes`, all ending no later than `day_end`.
    pub fn generate(
        date: NaiveDate,
        day_start: NaiveTime,
        day_end: NaiveTime,
        slot_minutes: u32,
        break_minutes: u32,
    ) -> Result<Vec<SlotWindow>, SlotWindowError> {
        if slot_minutes == 0 {
            return Err(SlotWindowError::ZeroLength);
        }
        if day_start >= day_end {
            return Err(SlotWindowError::InvertedInterval);
        }

        let slot_len = TimeDelta::minutes(i64::from(slot_minutes));
        let gap = TimeDelta::minutes(i64::from(break_minutes));
        let mut windows = Vec::new();
        let mut cursor = day_start;

        loop {
            let (end, wrapped) = cursor.overflowing_add_signed(slot_len);
            if wrapped != 0 || end > day_end {
                break;
            }
            windows.push(SlotWindow::Interval {
                date,
                start_time: cursor,
                end_time: end,
            });
            let (next, wrapped) = end.overflowing_add_signed(gap);
            if wrapped != 0 || next >= day_end {
                break;
            }
            cursor = next;
        }

        if windows.is_empty() {
            return Err(SlotWindowError::EmptyRange {
                start: day_start,
                end: day_end,
            });
        }
        Ok(windows)
    }
}

impl fmt::Display for SlotWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotWindow::Interval {
                date,
                start_time,
                end_time,
            } => write!(
                f,
                "{} {}-{}",
                date,
                start_time.format("%H:%M"),
                end_time.format("%H:%M")
            ),
            SlotWindow::Labeled { label } => f.write_str(label.trim()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub id: Uuid,
    pub business_id: Uuid,
    pub service_id: Option<Uuid>,
    #[serde(flatten)]
    pub window: SlotWindow,
    pub is_booked: bool,
    pub booked_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl Slot {
    /// Whether a booking for `service` may take this slot. Business-wide
    /// labeled slots serve every service of that business.
    pub fn serves(&self, service: &ServiceOffering) -> bool {
        match self.service_id {
            Some(service_id) => service_id == service.id,
            None => self.business_id == service.business_id,
        }
    }

    /// The date a booking of this slot is for.
    pub fn booking_date(&self, requested: Option<NaiveDate>) -> Result<NaiveDate, SlotWindowError> {
        match (self.window.date(), requested) {
            (Some(slot_date), Some(requested)) if slot_date != requested => {
                Err(SlotWindowError::DateMismatch {
                    slot_date,
                    requested,
                })
            }
            (Some(slot_date), _) => Ok(slot_date),
            (None, Some(requested)) => Ok(requested),
            (None, None) => Err(SlotWindowError::MissingDate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn interval(start: NaiveTime, end: NaiveTime) -> SlotWindow {
        SlotWindow::Interval {
            date: day(),
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn overlapping_intervals_conflict() {
        let existing = interval(t(10, 30), t(11, 30));
        assert!(interval(t(10, 0), t(11, 0)).conflicts_with(&existing));
        assert!(interval(t(10, 45), t(11, 15)).conflicts_with(&existing));
    }

    #[test]
    fn touching_intervals_do_not_conflict() {
        let existing = interval(t(10, 0), t(11, 0));
        assert!(!interval(t(11, 0), t(12, 0)).conflicts_with(&existing));
        assert!(!interval(t(9, 0), t(10, 0)).conflicts_with(&existing));
    }

    #[test]
    fn intervals_on_other_days_do_not_conflict() {
        let other_day = SlotWindow::Interval {
            date: day().succ_opt().unwrap(),
            start_time: t(10, 0),
            end_time: t(11, 0),
        };
        assert!(!interval(t(10, 0), t(11, 0)).conflicts_with(&other_day));
    }

    #[test]
    fn labels_conflict_ignoring_case_and_whitespace() {
        let a = SlotWindow::Labeled {
            label: "10:00 AM".into(),
        };
        let b = SlotWindow::Labeled {
            label: "  10:00 am ".into(),
        };
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&interval(t(10, 0), t(11, 0))));
    }

    #[test]
    fn inverted_interval_rejected() {
        assert_eq!(
            interval(t(11, 0), t(10, 0)).validate(),
            Err(SlotWindowError::InvertedInterval)
        );
        assert_eq!(
            interval(t(10, 0), t(10, 0)).validate(),
            Err(SlotWindowError::InvertedInterval)
        );
    }

    #[test]
    fn generate_inserts_breaks() {
        let windows = SlotWindow::generate(day(), t(9, 0), t(12, 0), 60, 15).unwrap();
        assert_eq!(
            windows,
            vec![
                interval(t(9, 0), t(10, 0)),
                interval(t(10, 15), t(11, 15)),
            ]
        );
    }

    #[test]
    fn generate_rejects_range_shorter_than_slot() {
        assert!(matches!(
            SlotWindow::generate(day(), t(9, 0), t(9, 30), 60, 0),
            Err(SlotWindowError::EmptyRange { .. })
        ));
    }

    #[test]
    fn first_conflict_checks_within_batch() {
        let batch = vec![interval(t(9, 0), t(10, 0)), interval(t(9, 30), t(10, 30))];
        let (candidate, _) = SlotWindow::first_conflict(&batch, &[]).unwrap();
        assert_eq!(candidate, &batch[1]);
    }
}
