//! `getCurrentDateTime`: the server clock, for time-sensitive answers.
//!
//! `timezone` takes an IANA zone name such as `America/New_York`, or a
//! fixed offset such as `+05:30` or `UTC-8`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Display;
use tracefold_core::error::ToolError;
use tracefold_core::tool::Tool;

pub struct GetCurrentDateTimeTool {
    clock: fn() -> DateTime<Utc>,
}

impl GetCurrentDateTimeTool {
    pub fn new() -> Self {
        Self { clock: Utc::now }
    }

    /// Use a fixed clock (tests, replays).
    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        Self { clock }
    }
}

impl Default for GetCurrentDateTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Format {
    #[default]
    Full,
    Date,
    Time,
    Iso,
}

#[derive(Deserialize)]
struct Args {
    timezone: Option<String>,
    format: Option<Format>,
}

/// A zone the tool can render in.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

fn parse_zone(zone: &str) -> Option<Zone> {
    match zone.trim().parse::<Tz>() {
        Ok(tz) => Some(Zone::Named(tz)),
        Err(_) => parse_offset(zone).map(Zone::Fixed),
    }
}

/// Parse `UTC`, `GMT`, `Z`, `+05:30`, `-0800`, `UTC+2`.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim();
    let rest = zone
        .strip_prefix("UTC")
        .or_else(|| zone.strip_prefix("GMT"))
        .unwrap_or(zone);
    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, digits) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 && digits.is_ascii() => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn render<Z: TimeZone>(now: DateTime<Z>, format: Format, suffix: &str) -> String
where
    Z::Offset: Display,
{
    match format {
        Format::Date => format!("Current date: {}{suffix}", now.format("%Y-%m-%d")),
        Format::Time => format!("Current time: {}{suffix}", now.format("%H:%M:%S")),
        // ISO output is rendered in UTC before zones are considered
        Format::Full | Format::Iso => format!(
            "Current date and time: {}{suffix}",
            now.format("%Y-%m-%d %H:%M:%S")
        ),
    }
}

#[async_trait]
impl Tool for GetCurrentDateTimeTool {
    fn name(&self) -> &str {
        "getCurrentDateTime"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Use this when the user asks for the current time or date, or when an answer depends on it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": ["string", "null"],
                    "description": "Optional IANA time zone such as 'America/New_York' or 'Asia/Tokyo', or a UTC offset such as '+05:30'. Defaults to server local time."
                },
                "format": {
                    "type": ["string", "null"],
                    "enum": ["full", "date", "time", "iso", null],
                    "description": "full (date and time), date, time, or iso. Default: full"
                }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: Args = if arguments.is_null() {
            Args {
                timezone: None,
                format: None,
            }
        } else {
            serde_json::from_value(arguments)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        let format = args.format.unwrap_or_default();
        let now = (self.clock)();

        if format == Format::Iso {
            return Ok(Value::String(format!(
                "Current date and time (ISO): {}",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            )));
        }

        let text = match args.timezone.as_deref().filter(|z| !z.is_empty()) {
            None => render(now.with_timezone(&Local), format, " (server local time)"),
            Some(zone) => {
                let parsed = parse_zone(zone).ok_or_else(|| {
                    ToolError::InvalidArguments(format!("unsupported timezone '{zone}'"))
                })?;
                let suffix = format!(" ({zone})");
                match parsed {
                    Zone::Named(tz) => render(now.with_timezone(&tz), format, &suffix),
                    Zone::Fixed(offset) => render(now.with_timezone(&offset), format, &suffix),
                }
            }
        };
        Ok(Value::String(text))
    }
}
