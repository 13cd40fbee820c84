//! Temporal anomaly detection
//!
//! Parses the date/time text found in documents, resolves location mentions to
//! timezones and flags transactions whose local time falls outside business
//! hours.
//!
//! Date-only input resolves to 12:00 UTC on that date. Times without an offset
//! are taken as UTC.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::TemporalConfig;
use crate::error::{Error, Result};
use crate::models::{
    Anomaly, AnomalyEvidence, AnomalyType, Entity, EntityType, SkipReason, SkippedItem,
};
use crate::text::CharMap;

/// Date+time formats, tried in order after RFC 3339
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%b-%Y %H:%M",
];

/// Numeric date-only formats that chrono can parse directly
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d-%b-%Y"];

/// Ambiguous slash dates, day-first wins
const DMY_MDY_FORMATS: &[&str] = &["%d/%m/%Y", "%m/%d/%Y"];

fn cn_full_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]$").expect("valid regex")
    })
}

fn cn_month_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]$").expect("valid regex"))
}

fn cn_year_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})\s*年\s*(\d{1,2})\s*月$").expect("valid regex"))
}

fn slash_year_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})/(\d{1,2})$").expect("valid regex"))
}

/// Parse date/time text, using the current year for month-day forms
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    parse_time_in_year(text, Utc::now().year())
}

/// Parse date/time text with an explicit year for month-day forms (`3月4日`)
pub fn parse_time_in_year(text: &str, reference_year: i32) -> Result<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return Err(Error::Parse("empty date text".into()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(at_noon_utc(date));
        }
    }

    if let Some(caps) = cn_full_date().captures(s) {
        return ymd_from_captures(s, &caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = cn_month_day().captures(s) {
        return ymd_from_captures(s, &reference_year.to_string(), &caps[1], &caps[2]);
    }

    if let Some(caps) = slash_year_month()
        .captures(s)
        .or_else(|| cn_year_month().captures(s))
    {
        return ymd_from_captures(s, &caps[1], &caps[2], "1");
    }

    for fmt in DMY_MDY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(at_noon_utc(date));
        }
    }

    Err(Error::Parse(s.to_string()))
}

fn at_noon_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .expect("noon is a valid time of day")
        .and_utc()
}

fn ymd_from_captures(original: &str, year: &str, month: &str, day: &str) -> Result<DateTime<Utc>> {
    let parse_err = || Error::Parse(original.to_string());
    let year: i32 = year.parse().map_err(|_| parse_err())?;
    let month: u32 = month.parse().map_err(|_| parse_err())?;
    let day: u32 = day.parse().map_err(|_| parse_err())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(at_noon_utc)
        .ok_or_else(parse_err)
}

/// Location name to timezone lookup
///
/// Keys are matched case-insensitively after trimming.
#[derive(Debug, Clone)]
pub struct TimezoneTable {
    zones: HashMap<String, String>,
}

impl TimezoneTable {
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let zones = map
            .iter()
            .map(|(location, zone)| (normalize_location(location), zone.clone()))
            .collect();
        Self { zones }
    }

    /// Add or replace a location mapping
    pub fn insert(&mut self, location: &str, zone: &str) {
        self.zones
            .insert(normalize_location(location), zone.to_string());
    }

    /// Resolve a location mention to its timezone
    pub fn resolve(&self, location: &str) -> Result<Tz> {
        let zone = self
            .zones
            .get(&normalize_location(location))
            .ok_or_else(|| Error::UnknownTimezone(location.to_string()))?;
        zone.parse::<Tz>()
            .map_err(|e| Error::UnknownTimezone(format!("{} ({}): {}", location, zone, e)))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl Default for TimezoneTable {
    fn default() -> Self {
        Self::from_map(&TemporalConfig::default().timezones)
    }
}

fn normalize_location(location: &str) -> String {
    location.trim().to_lowercase()
}

/// Result of a temporal scan over one unit
#[derive(Debug, Clone, Default)]
pub struct TemporalScan {
    pub anomalies: Vec<Anomaly>,
    pub skipped: Vec<SkippedItem>,
}

/// Off-hours transaction detector
#[derive(Debug, Clone)]
pub struct TemporalDetector {
    config: TemporalConfig,
    timezones: TimezoneTable,
    reference_year: Option<i32>,
}

impl TemporalDetector {
    pub fn new(config: TemporalConfig) -> Self {
        let timezones = TimezoneTable::from_map(&config.timezones);
        Self {
            config,
            timezones,
            reference_year: None,
        }
    }

    pub fn with_timezones(config: TemporalConfig, timezones: TimezoneTable) -> Self {
        Self {
            config,
            timezones,
            reference_year: None,
        }
    }

    /// Pin the year used for month-day dates (defaults to the current year)
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    pub fn timezones(&self) -> &TimezoneTable {
        &self.timezones
    }

    /// Pair every DATE with every GEO entity and flag off-hours local times
    ///
    /// Unparseable dates and unresolvable locations are logged and returned as
    /// skipped items.
    pub fn detect_time_anomalies(&self, unit: &str, entities: &[Entity], text: &str) -> TemporalScan {
        let mut scan = TemporalScan::default();
        let year = self.reference_year.unwrap_or_else(|| Utc::now().year());
        let chars = CharMap::new(text);

        let mut dates = Vec::new();
        for entity in entities.iter().filter(|e| e.entity_type == EntityType::Date) {
            match parse_time_in_year(&entity.text, year) {
                Ok(ts) => dates.push((entity, ts)),
                Err(e) => {
                    warn!("Skipping unparseable date '{}' in {}: {}", entity.text, unit, e);
                    scan.skipped.push(SkippedItem::new(
                        unit,
                        &entity.text,
                        SkipReason::ParseError,
                        e.to_string(),
                    ));
                }
            }
        }

        let mut locations = Vec::new();
        for entity in entities.iter().filter(|e| e.entity_type == EntityType::Geo) {
            match self.timezones.resolve(&entity.text) {
                Ok(tz) => locations.push((entity, tz)),
                Err(e) => {
                    warn!("Skipping location '{}' in {}: {}", entity.text, unit, e);
                    scan.skipped.push(SkippedItem::new(
                        unit,
                        &entity.text,
                        SkipReason::UnknownTimezone,
                        e.to_string(),
                    ));
                }
            }
        }

        let hours = self.config.business_start_hour..self.config.business_end_hour;

        for (date, ts) in &dates {
            for (location, tz) in &locations {
                let local = ts.with_timezone(tz);
                if hours.contains(&local.hour()) {
                    continue;
                }

                let local_time = local.format("%Y-%m-%d %H:%M").to_string();
                debug!(
                    "Off-hours: {} @ {} is {} local",
                    date.text, location.text, local_time
                );

                scan.anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::TimeAnomaly,
                    description: format!(
                        "Off-hours transaction: {} @ {} (local time {})",
                        date.text, location.text, local_time
                    ),
                    involved: vec![date.text.clone(), location.text.clone()],
                    confidence: self.config.confidence,
                    context: chars
                        .window(date.start, date.end, self.config.context_window)
                        .to_string(),
                    evidence: AnomalyEvidence::OffHours {
                        timestamp: *ts,
                        local_time,
                        location: location.text.clone(),
                        timezone: tz.name().to_string(),
                    },
                });
            }
        }

        scan
    }
}

impl Default for TemporalDetector {
    fn default() -> Self {
        Self::new(TemporalConfig::default())
    }
}

/// Off-hours detection with default business hours and a given timezone table
pub fn detect_time_anomalies(
    entities: &[Entity],
    text: &str,
    timezones: &TimezoneTable,
) -> Vec<Anomaly> {
    TemporalDetector::with_timezones(TemporalConfig::default(), timezones.clone())
        .detect_time_anomalies("text", entities, text)
        .anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_at(text: &str, haystack: &str, entity_type: EntityType) -> Entity {
        let map = CharMap::new(haystack);
        let byte = haystack.find(text).unwrap();
        let (start, end) = map.span(byte, byte + text.len());
        Entity::new(text, entity_type, start, end).unwrap()
    }

    #[test]
    fn test_parse_iso_and_space_forms() {
        let ts = parse_time("2024-06-10 14:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-06-10T14:00:00+00:00");

        let ts = parse_time("2024-06-10T14:30").unwrap();
        assert_eq!(ts.minute(), 30);

        let ts = parse_time("2024-06-10T14:00:00+09:00").unwrap();
        assert_eq!(ts.hour(), 5);
    }

    #[test]
    fn test_date_only_is_noon_utc() {
        for input in ["2024-06-10", "2024/6/10", "2024.06.10", "2024年6月10日"] {
            let ts = parse_time(input).unwrap();
            assert_eq!(
                ts.to_rfc3339(),
                "2024-06-10T12:00:00+00:00",
                "input {}",
                input
            );
        }
    }

    #[test]
    fn test_month_day_uses_reference_year() {
        let ts = parse_time_in_year("3月4日", 2023).unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day(), ts.hour()), (2023, 3, 4, 12));
    }

    #[test]
    fn test_year_month_forms() {
        let ts = parse_time("2023/4").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2023, 4, 1));
        let ts = parse_time("2023年4月").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2023, 4, 1));
    }

    #[test]
    fn test_day_first_then_month_first() {
        let ts = parse_time("15/06/2024").unwrap();
        assert_eq!((ts.month(), ts.day()), (6, 15));

        // Day-first fails (month 15), month-first succeeds
        let ts = parse_time("06/15/2024").unwrap();
        assert_eq!((ts.month(), ts.day()), (6, 15));

        // Both valid: day-first wins
        let ts = parse_time("03/04/2024").unwrap();
        assert_eq!((ts.month(), ts.day()), (4, 3));
    }

    #[test]
    fn test_named_month() {
        let ts = parse_time("10-Jun-2024 14:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-06-10T14:00:00+00:00");
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_time("next Tuesday"), Err(Error::Parse(_))));
        assert!(matches!(parse_time(""), Err(Error::Parse(_))));
        assert!(matches!(parse_time("2024年2月30日"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_timezone_lookup_case_insensitive() {
        let table = TimezoneTable::default();
        assert_eq!(table.resolve("tokyo").unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(table.resolve(" Hong Kong ").unwrap(), chrono_tz::Asia::Hong_Kong);
        assert_eq!(table.resolve("北京").unwrap(), chrono_tz::Asia::Shanghai);
        assert!(matches!(
            table.resolve("Atlantis"),
            Err(Error::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_invalid_iana_name_is_unknown_timezone() {
        let mut table = TimezoneTable::default();
        table.insert("Gotham", "Gotham/Central");
        assert!(matches!(
            table.resolve("Gotham"),
            Err(Error::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_tokyo_late_evening_is_flagged() {
        let text = "Transfer at 2024-06-10 14:00 from the Tokyo branch.";
        let entities = vec![
            entity_at("2024-06-10 14:00", text, EntityType::Date),
            entity_at("Tokyo", text, EntityType::Geo),
        ];

        let anomalies = detect_time_anomalies(&entities, text, &TimezoneTable::default());
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.anomaly_type, AnomalyType::TimeAnomaly);
        assert_eq!(anomaly.confidence, 0.85);
        assert_eq!(anomaly.context, text);
        match &anomaly.evidence {
            AnomalyEvidence::OffHours {
                local_time,
                timezone,
                ..
            } => {
                assert_eq!(local_time, "2024-06-10 23:00");
                assert_eq!(timezone, "Asia/Tokyo");
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_business_hours_not_flagged() {
        // 14:00 UTC in June is 15:00 BST
        let text = "2024-06-10 14:00 London";
        let entities = vec![
            entity_at("2024-06-10 14:00", text, EntityType::Date),
            entity_at("London", text, EntityType::Geo),
        ];
        let anomalies = detect_time_anomalies(&entities, text, &TimezoneTable::default());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_business_hour_boundaries() {
        let table = TimezoneTable::default();

        // 00:00 UTC = 09:00 Tokyo, inside [9, 17)
        let text = "2024-06-10 00:00 Tokyo";
        let entities = vec![
            entity_at("2024-06-10 00:00", text, EntityType::Date),
            entity_at("Tokyo", text, EntityType::Geo),
        ];
        assert!(detect_time_anomalies(&entities, text, &table).is_empty());

        // 08:00 UTC = 17:00 Tokyo, outside [9, 17)
        let text = "2024-06-10 08:00 Tokyo";
        let entities = vec![
            entity_at("2024-06-10 08:00", text, EntityType::Date),
            entity_at("Tokyo", text, EntityType::Geo),
        ];
        assert_eq!(detect_time_anomalies(&entities, text, &table).len(), 1);
    }

    #[test]
    fn test_bad_items_are_skipped_not_fatal() {
        let text = "sometime soon in Atlantis, then 2024-06-10 14:00 in Tokyo";
        let entities = vec![
            entity_at("sometime soon", text, EntityType::Date),
            entity_at("Atlantis", text, EntityType::Geo),
            entity_at("2024-06-10 14:00", text, EntityType::Date),
            entity_at("Tokyo", text, EntityType::Geo),
        ];

        let scan = TemporalDetector::default().detect_time_anomalies("doc-1", &entities, text);
        assert_eq!(scan.anomalies.len(), 1);
        assert_eq!(scan.skipped.len(), 2);
        assert!(scan
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::ParseError && s.item == "sometime soon"));
        assert!(scan
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::UnknownTimezone && s.item == "Atlantis"));
    }

    #[test]
    fn test_context_window_uses_char_offsets() {
        let padding = "交".repeat(60);
        let text = format!("{}2024-06-10 14:00在东京{}", padding, padding);
        let entities = vec![
            entity_at("2024-06-10 14:00", &text, EntityType::Date),
            entity_at("东京", &text, EntityType::Geo),
        ];
        let anomalies = detect_time_anomalies(&entities, &text, &TimezoneTable::default());
        assert_eq!(anomalies.len(), 1);
        // 50 chars before + 16 chars of date + 50 chars after
        assert_eq!(anomalies[0].context.chars().count(), 116);
    }
}
