//! Summaries computed from raw OpenWeather payloads.
//!
//! Payloads are kept as untyped JSON; each function checks only the fields it
//! reads and reports a [`WeatherError::Payload`] when one is missing.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::{Result, WeatherError};

#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    pub current: f64,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub low: f64,
    pub high: f64,
    /// Most common description that day.
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RainTotals {
    /// Millimetres per local calendar date, ascending.
    pub per_day: Vec<(NaiveDate, f64)>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Daylight {
    pub sunrise: DateTime<FixedOffset>,
    pub sunset: DateTime<FixedOffset>,
}

impl Daylight {
    pub fn length(&self) -> Duration {
        self.sunset - self.sunrise
    }
}

pub fn current_conditions(payload: &Value) -> Result<Conditions> {
    Ok(Conditions {
        location: str_at(payload, &["name"])?.to_string(),
        description: first_description(payload)?,
    })
}

pub fn temperature(payload: &Value) -> Result<Temperature> {
    Ok(Temperature {
        current: f64_at(payload, &["main", "temp"])?,
        low: f64_at(payload, &["main", "temp_min"])?,
        high: f64_at(payload, &["main", "temp_max"])?,
    })
}

/// One row per local calendar date in a forecast payload, sorted by date.
pub fn daily_forecast(payload: &Value) -> Result<Vec<DailySummary>> {
    struct Day {
        low: f64,
        high: f64,
        descriptions: Vec<String>,
    }

    let offset = forecast_offset(payload)?;
    let mut days: BTreeMap<NaiveDate, Day> = BTreeMap::new();

    for item in forecast_items(payload)? {
        let date = local_date(item, &offset)?;
        let low = f64_at(item, &["main", "temp_min"])?;
        let high = f64_at(item, &["main", "temp_max"])?;
        let description = first_description(item)?;

        days.entry(date)
            .and_modify(|d| {
                d.low = d.low.min(low);
                d.high = d.high.max(high);
                d.descriptions.push(description.clone());
            })
            .or_insert_with(|| Day { low, high, descriptions: vec![description] });
    }

    Ok(days
        .into_iter()
        .map(|(date, day)| DailySummary {
            date,
            low: day.low,
            high: day.high,
            description: most_common(&day.descriptions),
        })
        .collect())
}

/// Forecast rainfall from the `rain.3h` volumes. Slots without rain count as zero.
pub fn rain_totals(payload: &Value) -> Result<RainTotals> {
    let offset = forecast_offset(payload)?;
    let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for item in forecast_items(payload)? {
        let date = local_date(item, &offset)?;
        let volume = match item.get("rain").and_then(|r| r.get("3h")) {
            None | Some(Value::Null) => 0.0,
            Some(v) => v
                .as_f64()
                .ok_or_else(|| WeatherError::Payload("rain.3h is not a number".into()))?,
        };
        *per_day.entry(date).or_default() += volume;
    }

    let total = per_day.values().sum();
    Ok(RainTotals { per_day: per_day.into_iter().collect(), total })
}

/// Sunrise and sunset from a current-weather payload, shown in `tz` when given,
/// else in the payload's own UTC offset.
pub fn daylight(payload: &Value, tz: Option<Tz>) -> Result<Daylight> {
    let sunrise = timestamp(i64_at(payload, &["sys", "sunrise"])?)?;
    let sunset = timestamp(i64_at(payload, &["sys", "sunset"])?)?;

    let (sunrise, sunset) = match tz {
        Some(tz) => (
            sunrise.with_timezone(&tz).fixed_offset(),
            sunset.with_timezone(&tz).fixed_offset(),
        ),
        None => {
            let offset = payload_offset(payload.get("timezone"))?;
            (sunrise.with_timezone(&offset), sunset.with_timezone(&offset))
        }
    };

    Ok(Daylight { sunrise, sunset })
}

/// Parse an IANA timezone name such as `"Europe/London"`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| WeatherError::InvalidInput(format!("Unknown timezone '{name}'")))
}

fn forecast_items(payload: &Value) -> Result<&Vec<Value>> {
    payload
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| WeatherError::Payload("missing forecast list".into()))
}

fn forecast_offset(payload: &Value) -> Result<FixedOffset> {
    payload_offset(payload.get("city").and_then(|c| c.get("timezone")))
}

/// UTC offset in seconds as OpenWeather reports it; absent means UTC.
fn payload_offset(seconds: Option<&Value>) -> Result<FixedOffset> {
    let secs = match seconds {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .ok_or_else(|| WeatherError::Payload("timezone offset is not an integer".into()))?,
    };
    i32::try_from(secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| WeatherError::Payload(format!("timezone offset {secs} out of range")))
}

fn local_date(item: &Value, offset: &FixedOffset) -> Result<NaiveDate> {
    let dt = timestamp(i64_at(item, &["dt"])?)?;
    Ok(offset.from_utc_datetime(&dt.naive_utc()).date_naive())
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| WeatherError::Payload(format!("timestamp {secs} out of range")))
}

fn first_description(payload: &Value) -> Result<String> {
    payload
        .get("weather")
        .and_then(|w| w.get(0))
        .and_then(|w| w.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WeatherError::Payload("missing weather[0].description".into()))
}

// Ties go to whichever description appeared first.
fn most_common(items: &[String]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for item in items {
        let count = counts[item.as_str()];
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((item.as_str(), count));
        }
    }
    best.map(|(s, _)| s.to_string()).unwrap_or_default()
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter()
        .try_fold(payload, |v, key| v.get(key))
        .ok_or_else(|| WeatherError::Payload(format!("missing {}", path.join("."))))
}

fn f64_at(payload: &Value, path: &[&str]) -> Result<f64> {
    lookup(payload, path)?
        .as_f64()
        .ok_or_else(|| WeatherError::Payload(format!("{} is not a number", path.join("."))))
}

fn i64_at(payload: &Value, path: &[&str]) -> Result<i64> {
    lookup(payload, path)?
        .as_i64()
        .ok_or_else(|| WeatherError::Payload(format!("{} is not an integer", path.join("."))))
}

fn str_at<'a>(payload: &'a Value, path: &[&str]) -> Result<&'a str> {
    lookup(payload, path)?
        .as_str()
        .ok_or_else(|| WeatherError::Payload(format!("{} is not a string", path.join("."))))
}
