//! Resolution of logger timestamp strings into epoch seconds.
//!
//! Two encodings are accepted, tried in order:
//!
//! * ISO-8601 instants (`2022-02-12T07:30:00`, optionally with an offset).
//! * Bucketed ranges (`Saturday, 2/12/2022 - 7:00am - 8:00am`), which name an
//!   interval and resolve to its midpoint. A range whose end time-of-day is
//!   earlier than its start wraps past midnight.

use std::fmt;

use chords_ingest_parser::ParserAttempt;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Weekday};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
#[error("failed to parse timestamp '{raw}': {}", AttemptList(attempts))]
pub struct TimestampParseError {
    pub raw: String,
    pub attempts: Vec<ParserAttempt>,
}

struct AttemptList<'a>(&'a [ParserAttempt]);

impl fmt::Display for AttemptList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, attempt) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{attempt}")?;
        }
        Ok(())
    }
}

/// Inputs every format needs besides the raw string.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext {
    /// Year assumed when a bucketed range omits it.
    pub reference_year: i32,
    /// Zone attached to local times that carry no offset of their own.
    pub zone: Tz,
}

pub trait TimestampFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the mismatch reason when `raw` is not in this format.
    fn try_parse(&self, raw: &str, ctx: &ResolveContext) -> Result<DateTime<Tz>, String>;
}

pub struct TimestampResolver {
    formats: Vec<Box<dyn TimestampFormat>>,
}

impl Default for TimestampResolver {
    fn default() -> Self {
        Self::with_formats(vec![Box::new(IsoInstant), Box::new(BucketedRange)])
    }
}

impl fmt::Debug for TimestampResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampResolver")
            .field(
                "formats",
                &self.formats.iter().map(|fmt| fmt.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TimestampResolver {
    pub fn with_formats(formats: Vec<Box<dyn TimestampFormat>>) -> Self {
        Self { formats }
    }

    pub fn resolve(
        &self,
        raw: &str,
        reference_year: i32,
        zone: Tz,
    ) -> Result<f64, TimestampParseError> {
        self.resolve_datetime(raw, reference_year, zone)
            .map(|dt| epoch_seconds(&dt))
    }

    pub fn resolve_datetime(
        &self,
        raw: &str,
        reference_year: i32,
        zone: Tz,
    ) -> Result<DateTime<Tz>, TimestampParseError> {
        let ctx = ResolveContext {
            reference_year,
            zone,
        };
        let mut attempts = Vec::with_capacity(self.formats.len());

        for format in &self.formats {
            match format.try_parse(raw, &ctx) {
                Ok(dt) => return Ok(dt),
                Err(reason) => attempts.push(ParserAttempt::new(format.name(), reason)),
            }
        }

        error!(raw, "failed to parse timestamp");
        Err(TimestampParseError {
            raw: raw.to_string(),
            attempts,
        })
    }
}

/// Resolves `raw` with the default format list.
pub fn resolve(raw: &str, reference_year: i32, zone: Tz) -> Result<f64, TimestampParseError> {
    TimestampResolver::default().resolve(raw, reference_year, zone)
}

pub fn epoch_seconds<Z: TimeZone>(dt: &DateTime<Z>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

/// Attaches `zone` to a wall-clock time. Ambiguous times take the earlier
/// offset; times inside a DST gap move forward by an hour.
pub fn localize(zone: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, String> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
        .ok_or_else(|| format!("local time {naive} does not exist in {}", zone.name()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsoInstant;

impl IsoInstant {
    const NAME: &'static str = "ISO_INSTANT";

    const OFFSET_FORMATS: &'static [&'static str] =
        &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

    const LOCAL_FORMATS: &'static [&'static str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
}

impl TimestampFormat for IsoInstant {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn try_parse(&self, raw: &str, ctx: &ResolveContext) -> Result<DateTime<Tz>, String> {
        let trimmed = raw.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&ctx.zone));
        }
        for fmt in Self::OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
                return Ok(dt.with_timezone(&ctx.zone));
            }
        }
        for fmt in Self::LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return localize(&ctx.zone, naive);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return localize(&ctx.zone, date.and_time(NaiveTime::MIN));
        }

        Err(format!("'{trimmed}' is not an ISO-8601 date/time"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketedRange;

impl BucketedRange {
    const NAME: &'static str = "BUCKETED_RANGE";

    fn parse_day(segment: &str, reference_year: i32) -> Result<NaiveDate, String> {
        let (weekday, date) = segment
            .split_once(',')
            .ok_or_else(|| format!("'{}' lacks a '<weekday>, ' prefix", segment.trim()))?;

        let weekday = weekday.trim();
        weekday
            .parse::<Weekday>()
            .map_err(|_| format!("'{weekday}' is not a weekday"))?;

        let date = date.trim();
        let parts: Vec<&str> = date.split('/').map(str::trim).collect();
        let (month, day, year) = match parts.as_slice() {
            [month, day] => (*month, *day, reference_year),
            [month, day, year] => {
                let year = year
                    .parse::<i32>()
                    .map_err(|err| format!("invalid year in '{date}': {err}"))?;
                (*month, *day, year)
            }
            _ => return Err(format!("'{date}' is not M/D/Y or M/D")),
        };

        let month = month
            .parse::<u32>()
            .map_err(|err| format!("invalid month in '{date}': {err}"))?;
        let day = day
            .parse::<u32>()
            .map_err(|err| format!("invalid day in '{date}': {err}"))?;

        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| format!("'{date}' is not a calendar date in {year}"))
    }

    fn parse_clock(segment: &str) -> Result<NaiveTime, String> {
        let compact: String = segment.chars().filter(|c| !c.is_whitespace()).collect();
        NaiveTime::parse_from_str(&compact, "%I:%M%p")
            .map_err(|err| format!("'{}' is not a 12-hour time: {err}", segment.trim()))
    }
}

impl TimestampFormat for BucketedRange {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn try_parse(&self, raw: &str, ctx: &ResolveContext) -> Result<DateTime<Tz>, String> {
        let segments: Vec<&str> = raw.split('-').collect();
        let [day, start, end] = segments.as_slice() else {
            return Err(format!(
                "expected 3 '-' separated segments, found {}",
                segments.len()
            ));
        };

        let date = Self::parse_day(day, ctx.reference_year)?;
        let start_time = Self::parse_clock(start)?;
        let end_time = Self::parse_clock(end)?;

        let start = localize(&ctx.zone, date.and_time(start_time))?;
        let mut end = localize(&ctx.zone, date.and_time(end_time))?;
        if end < start {
            let next_day = date
                .succ_opt()
                .ok_or_else(|| format!("no day follows {date}"))?;
            end = localize(&ctx.zone, next_day.and_time(end_time))?;
        }

        let half = end.signed_duration_since(&start) / 2;
        Ok(start + half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_segment_without_year_uses_reference_year() {
        let date = BucketedRange::parse_day("Monday, 3/7 ", 2022).expect("date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 3, 7).unwrap());
    }

    #[test]
    fn day_segment_with_year_ignores_reference_year() {
        let date = BucketedRange::parse_day("Saturday, 2/12/2022 ", 1999).expect("date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 2, 12).unwrap());
    }

    #[test]
    fn day_segment_requires_weekday() {
        assert!(BucketedRange::parse_day("Someday, 2/12/2022", 2022).is_err());
        assert!(BucketedRange::parse_day("2/12/2022", 2022).is_err());
    }

    #[test]
    fn clock_accepts_case_and_spacing_variants() {
        let expected = NaiveTime::from_hms_opt(19, 5, 0).unwrap();
        assert_eq!(BucketedRange::parse_clock(" 7:05pm ").unwrap(), expected);
        assert_eq!(BucketedRange::parse_clock("07:05 PM").unwrap(), expected);
        assert!(BucketedRange::parse_clock("19:05").is_err());
    }

    #[test]
    fn gap_times_move_forward() {
        let zone = chrono_tz::US::Pacific;
        let naive = NaiveDate::from_ymd_opt(2022, 3, 13)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = localize(&zone, naive).expect("localized");
        assert_eq!(dt.naive_local().time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }
}
