//! Bell schedule entries as owned by the schedule repository.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Time};

use crate::error::{ParseError, ParseResult};

/// `HH:MM:SS`, the time layout the controller firmware expects.
pub const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// `YYYY-MM-DD`, used for one-off (non-recurring) entries.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[cfg(feature = "serde")]
time::serde::format_description!(hms_format, Time, "[hour]:[minute]:[second]");

#[cfg(feature = "serde")]
time::serde::format_description!(ymd_format, Date, "[year]-[month]-[day]");

/// The fixed set of bell interval tags.
///
/// The tag names are part of the wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IntervalCategory {
    /// First period.
    First,
    /// Second period.
    Second,
    /// Third period.
    Third,
    /// Fourth period.
    Fourth,
    /// Fifth period.
    Fifth,
    /// Lunch break.
    Lunch,
    /// Short break between periods.
    Break,
    /// End of the school day.
    Dismissal,
    /// Anything else.
    Custom,
}

impl IntervalCategory {
    /// All nine categories in display order.
    pub const ALL: [IntervalCategory; 9] = [
        IntervalCategory::First,
        IntervalCategory::Second,
        IntervalCategory::Third,
        IntervalCategory::Fourth,
        IntervalCategory::Fifth,
        IntervalCategory::Lunch,
        IntervalCategory::Break,
        IntervalCategory::Dismissal,
        IntervalCategory::Custom,
    ];

    /// The wire tag for this category.
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            IntervalCategory::First => "first",
            IntervalCategory::Second => "second",
            IntervalCategory::Third => "third",
            IntervalCategory::Fourth => "fourth",
            IntervalCategory::Fifth => "fifth",
            IntervalCategory::Lunch => "lunch",
            IntervalCategory::Break => "break",
            IntervalCategory::Dismissal => "dismissal",
            IntervalCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for IntervalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for IntervalCategory {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let tag = s.trim().to_lowercase();
        IntervalCategory::ALL
            .into_iter()
            .find(|c| c.as_tag() == tag)
            .ok_or_else(|| ParseError::UnknownInterval(s.to_string()))
    }
}

/// A single bell ring scheduled on the controller.
///
/// Entries are plain values: the transmission core clones what it needs
/// when a send starts, so later edits never reach bytes already queued.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduleEntry {
    /// Repository-assigned identifier.
    pub id: String,
    /// Human label shown on the controller display.
    pub name: String,
    /// Time of day the bell rings.
    #[cfg_attr(feature = "serde", serde(with = "hms_format"))]
    pub time: Time,
    /// Calendar date, only for non-recurring entries.
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "ymd_format::option", skip_serializing_if = "Option::is_none")
    )]
    pub date: Option<Date>,
    /// Interval tag.
    pub interval_category: IntervalCategory,
    /// Whether the entry should ring at all.
    pub is_active: bool,
    /// Daily entry (true) or a one-off on `date` (false).
    pub is_recurring: bool,
}

impl ScheduleEntry {
    /// Create an active entry from its parts.
    ///
    /// `date` is kept as given; use [`ScheduleEntry::validate`] to reject a
    /// one-off entry without one.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        time: Time,
        date: Option<Date>,
        interval_category: IntervalCategory,
        is_recurring: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            time,
            date,
            interval_category,
            is_active: true,
            is_recurring,
        }
    }

    /// Create an active, recurring (daily) entry.
    pub fn recurring(
        id: impl Into<String>,
        name: impl Into<String>,
        time: Time,
        interval_category: IntervalCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            time,
            date: None,
            interval_category,
            is_active: true,
            is_recurring: true,
        }
    }

    /// Create an active, one-off entry on a specific date.
    pub fn on_date(
        id: impl Into<String>,
        name: impl Into<String>,
        time: Time,
        date: Date,
        interval_category: IntervalCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            time,
            date: Some(date),
            interval_category,
            is_active: true,
            is_recurring: false,
        }
    }

    /// Parse an entry from the textual forms used by editors and files.
    ///
    /// `time` must be `HH:MM:SS`; `date`, when given, `YYYY-MM-DD`.
    pub fn parse(
        id: impl Into<String>,
        name: impl Into<String>,
        time: &str,
        date: Option<&str>,
        interval: &str,
    ) -> ParseResult<Self> {
        let time = parse_time(time)?;
        let interval_category = interval.parse()?;
        let entry = match date {
            Some(d) => Self::on_date(id, name, time, parse_date(d)?, interval_category),
            None => Self::recurring(id, name, time, interval_category),
        };
        Ok(entry)
    }

    /// Builder-style toggle for `is_active`.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Check the recurring/date invariant.
    ///
    /// A recurring entry may carry a date (it is ignored downstream), but a
    /// non-recurring entry without one can never ring.
    pub fn validate(&self) -> ParseResult<()> {
        if !self.is_recurring && self.date.is_none() {
            return Err(ParseError::MissingDate {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// The time formatted as `HH:MM:SS`.
    #[must_use]
    pub fn time_string(&self) -> String {
        format_time(self.time)
    }

    /// The date formatted as `YYYY-MM-DD`, if present.
    #[must_use]
    pub fn date_string(&self) -> Option<String> {
        self.date.map(format_date)
    }
}

/// Parse an `HH:MM:SS` time of day.
pub fn parse_time(s: &str) -> ParseResult<Time> {
    Time::parse(s.trim(), TIME_FORMAT).map_err(|_| ParseError::InvalidTime(s.to_string()))
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> ParseResult<Date> {
    Date::parse(s.trim(), DATE_FORMAT).map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// Format a time as `HH:MM:SS`.
#[must_use]
pub fn format_time(time: Time) -> String {
    // The description only has numeric components, formatting cannot fail.
    time.format(TIME_FORMAT).unwrap_or_default()
}

/// Format a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_default()
}
