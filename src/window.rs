//! Resolution of the requested time window.
//!
//! Clients may pass `starttime`, `endtime` and `step`. Each is optional;
//! missing values are defaulted only after every supplied value has been
//! parsed, so a malformed field is always reported by name.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ParameterError, QueryParam};

/// Span used when either end of the window is missing.
pub const DEFAULT_SPAN_MINUTES: i64 = 5;

/// Step used when the client does not supply one.
pub const DEFAULT_STEP: Duration = Duration::from_secs(30);

const MIN_STEP: Duration = Duration::from_millis(1);

/// Raw window parameters as found in the request query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowParams {
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub step: Option<String>,
}

impl WindowParams {
    /// Picks the window parameters out of decoded query pairs. When a
    /// parameter is repeated, the first occurrence wins.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = WindowParams::default();
        for (key, value) in pairs {
            let slot = match key {
                "starttime" => &mut params.starttime,
                "endtime" => &mut params.endtime,
                "step" => &mut params.step,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub step: Duration,
}

impl TimeWindow {
    /// Resolves the window against the current wall clock.
    pub fn resolve(params: &WindowParams) -> Result<Self, ParameterError> {
        Self::resolve_at(params, Utc::now())
    }

    /// Resolves the window, using `now` wherever the current time is needed.
    pub fn resolve_at(params: &WindowParams, now: DateTime<Utc>) -> Result<Self, ParameterError> {
        let start = params
            .starttime
            .as_deref()
            .map(|raw| parse_timestamp(QueryParam::StartTime, raw))
            .transpose()?;

        let end = params
            .endtime
            .as_deref()
            .map(|raw| parse_timestamp(QueryParam::EndTime, raw))
            .transpose()?;

        let step = params.step.as_deref().map(parse_step).transpose()?;

        let span = chrono::Duration::minutes(DEFAULT_SPAN_MINUTES);
        let now: DateTime<FixedOffset> = now.into();
        let (start, end) = match (start, end) {
            (None, None) => (now - span, now),
            (None, Some(end)) => (end - span, end),
            (Some(start), None) => (start, now),
            (Some(start), Some(end)) => (start, end),
        };

        if end < start {
            return Err(ParameterError::EndBeforeStart {
                start: format_timestamp(&start),
                end: format_timestamp(&end),
            });
        }

        Ok(TimeWindow {
            start,
            end,
            step: step.unwrap_or(DEFAULT_STEP),
        })
    }

    pub fn start_param(&self) -> String {
        format_timestamp(&self.start)
    }

    pub fn end_param(&self) -> String {
        format_timestamp(&self.end)
    }

    pub fn step_param(&self) -> String {
        format_step(self.step)
    }
}

fn parse_timestamp(param: QueryParam, raw: &str) -> Result<DateTime<FixedOffset>, ParameterError> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| ParameterError::Unparsable {
        param,
        reason: format!("{} in {:?}", e, raw),
    })
}

fn parse_step(raw: &str) -> Result<Duration, ParameterError> {
    let unparsable = |reason: String| ParameterError::Unparsable {
        param: QueryParam::Step,
        reason,
    };

    let step = parse_duration(raw).map_err(unparsable)?;
    if step < MIN_STEP {
        return Err(unparsable(format!("step {:?} must be at least 1ms", raw)));
    }
    Ok(step)
}

/// Timestamps sent to the backend: RFC 3339 with millisecond precision.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats a step as a backend duration, e.g. `30s` or `1500ms`.
///
/// Steps with a sub-millisecond part are sent as fractional seconds.
pub fn format_step(step: Duration) -> String {
    let nanos = step.as_nanos();
    if nanos % 1_000_000_000 == 0 {
        format!("{}s", step.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", step.as_millis())
    } else {
        format!("{}", step.as_secs_f64())
    }
}

fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return None,
    };
    Some(nanos)
}

/// Parses a duration such as `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// The only unitless value accepted is `0`. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}", input);

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.starts_with('-') {
        return Err(format!("negative duration {:?}", input));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if !number.bytes().any(|b| b.is_ascii_digit()) || number.matches('.').count() > 1 {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(format!("missing unit in duration {:?}", input));
        }
        let nanos = unit_nanos(unit)
            .ok_or_else(|| format!("unknown unit {:?} in duration {:?}", unit, input))?;

        total_nanos += value * nanos;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
