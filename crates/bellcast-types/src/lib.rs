//! Platform-agnostic types for bell controller schedules and devices.
//!
//! This crate provides the value types shared by the connectivity core
//! (bellcast-core) and front ends such as bellcast-cli.
//!
//! # Features
//!
//! - Schedule entries with the nine fixed interval tags
//! - Discovered-device descriptors keyed by `(transport, id)`
//! - Controller name hints used to prioritize scan results
//! - Error types for schedule parsing
//!
//! # Example
//!
//! ```
//! use bellcast_types::{IntervalCategory, ScheduleEntry};
//!
//! let entry = ScheduleEntry::parse("s1", "Period 1", "08:00:00", None, "first").unwrap();
//! assert_eq!(entry.interval_category, IntervalCategory::First);
//! assert!(entry.is_recurring);
//! ```

pub mod device;
pub mod error;
pub mod schedule;

pub use device::{
    DEFAULT_CONTROLLER_HINTS, DeviceDescriptor, SignalQuality, TransportKind,
    matches_controller_hint,
};
pub use error::{ParseError, ParseResult};
pub use schedule::{IntervalCategory, ScheduleEntry};

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    // --- ScheduleEntry parsing tests ---

    #[test]
    fn test_parse_recurring_entry() {
        let entry = ScheduleEntry::parse("s1", "Period 1", "08:15:00", None, "first").unwrap();

        assert_eq!(entry.id, "s1");
        assert_eq!(entry.time, time!(8:15:00));
        assert_eq!(entry.date, None);
        assert!(entry.is_recurring);
        assert!(entry.is_active);
        assert_eq!(entry.time_string(), "08:15:00");
    }

    #[test]
    fn test_parse_dated_entry() {
        let entry =
            ScheduleEntry::parse("s2", "Assembly", "10:30:05", Some("2026-03-02"), "custom")
                .unwrap();

        assert_eq!(entry.date, Some(date!(2026 - 03 - 02)));
        assert!(!entry.is_recurring);
        assert_eq!(entry.date_string().as_deref(), Some("2026-03-02"));
    }

    #[test]
    fn test_parse_rejects_bad_time() {
        let err = ScheduleEntry::parse("s1", "x", "8:15", None, "first").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime(_)));

        let err = ScheduleEntry::parse("s1", "x", "25:00:00", None, "first").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime(_)));
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        let err = ScheduleEntry::parse("s1", "x", "08:00:00", Some("02/03/2026"), "first")
            .unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_parse_rejects_unknown_interval() {
        let err = ScheduleEntry::parse("s1", "x", "08:00:00", None, "recess").unwrap_err();
        assert_eq!(err, ParseError::UnknownInterval("recess".to_string()));
    }

    #[test]
    fn test_validate_requires_date_for_one_off() {
        let mut entry = ScheduleEntry::recurring("s1", "x", time!(8:00:00), IntervalCategory::First);
        assert!(entry.validate().is_ok());

        entry.is_recurring = false;
        assert!(matches!(
            entry.validate(),
            Err(ParseError::MissingDate { ref id }) if id == "s1"
        ));
    }

    #[test]
    fn test_new_keeps_parts() {
        let entry = ScheduleEntry::new(
            "s3",
            "Exam",
            time!(9:45:00),
            Some(date!(2026 - 06 - 15)),
            IntervalCategory::Third,
            false,
        );
        assert!(entry.is_active);
        assert!(entry.validate().is_ok());
        assert_eq!(entry.date_string().as_deref(), Some("2026-06-15"));
    }

    // --- IntervalCategory tests ---

    #[test]
    fn test_interval_tags_round_trip_through_from_str() {
        for category in IntervalCategory::ALL {
            assert_eq!(category.as_tag().parse::<IntervalCategory>().unwrap(), category);
        }
        assert_eq!(IntervalCategory::ALL.len(), 9);
    }

    #[test]
    fn test_interval_from_str_is_case_insensitive() {
        assert_eq!(
            " Dismissal ".parse::<IntervalCategory>().unwrap(),
            IntervalCategory::Dismissal
        );
    }

    #[test]
    fn test_interval_serde_uses_wire_tags() {
        let json = serde_json::to_string(&IntervalCategory::Break).unwrap();
        assert_eq!(json, "\"break\"");
    }

    // --- ScheduleEntry serde tests ---

    #[test]
    fn test_schedule_entry_serde_uses_text_time_and_date() {
        let entry = ScheduleEntry::on_date(
            "s9",
            "Exam",
            time!(13:05:09),
            date!(2026 - 06 - 15),
            IntervalCategory::Third,
        );
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["time"], "13:05:09");
        assert_eq!(json["date"], "2026-06-15");
        assert_eq!(json["interval_category"], "third");

        let back: ScheduleEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_schedule_entry_deserialize_without_date() {
        let json = r#"{"id":"a","name":"Lunch","time":"12:00:00",
            "interval_category":"lunch","is_active":true,"is_recurring":true}"#;
        let entry: ScheduleEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.date, None);
        assert_eq!(entry.interval_category, IntervalCategory::Lunch);
    }

    // --- Device tests ---

    #[test]
    fn test_transport_alternate() {
        assert_eq!(TransportKind::LowEnergy.alternate(), TransportKind::ClassicSerial);
        assert_eq!(TransportKind::ClassicSerial.alternate(), TransportKind::LowEnergy);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("ble".parse::<TransportKind>().unwrap(), TransportKind::LowEnergy);
        assert_eq!("Classic".parse::<TransportKind>().unwrap(), TransportKind::ClassicSerial);
        assert!("wifi".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_descriptor_identity_includes_transport() {
        let le = DeviceDescriptor::new("A", "Bell", TransportKind::LowEnergy);
        let classic = DeviceDescriptor::new("A", "Bell", TransportKind::ClassicSerial);
        assert_ne!(le.key(), classic.key());
    }

    #[test]
    fn test_signal_quality_thresholds() {
        assert_eq!(SignalQuality::from_rssi(-45), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-70), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-80), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-95), SignalQuality::Poor);

        let d = DeviceDescriptor::new("A", "x", TransportKind::ClassicSerial);
        assert_eq!(d.signal_quality(), None);
    }

    #[test]
    fn test_controller_hints() {
        assert!(matches_controller_hint("HC-05 Bell", DEFAULT_CONTROLLER_HINTS));
        assert!(matches_controller_hint("hc-06", DEFAULT_CONTROLLER_HINTS));
        assert!(!matches_controller_hint("Unknown Device", DEFAULT_CONTROLLER_HINTS));
        assert!(!matches_controller_hint("anything", &[""]));
    }

    // --- Property tests ---

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_time_string_parses_back(h in 0u8..24, m in 0u8..60, s in 0u8..60) {
            let t = ::time::Time::from_hms(h, m, s).unwrap();
            let entry = ScheduleEntry::recurring("p", "p", t, IntervalCategory::First);
            let parsed = ScheduleEntry::parse("p", "p", &entry.time_string(), None, "first").unwrap();
            prop_assert_eq!(parsed.time, t);
        }

        #[test]
        fn prop_hint_match_ignores_case_and_position(
            prefix in "[a-z ]{0,8}",
            suffix in "[a-z ]{0,8}",
            upper in any::<bool>(),
        ) {
            let model = if upper { "HC-05" } else { "hc-05" };
            let name = format!("{prefix}{model}{suffix}");
            prop_assert!(matches_controller_hint(&name, DEFAULT_CONTROLLER_HINTS));
        }
    }
}
