use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "goalpost-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "GOALPOST_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "GOALPOST_TIME_CONFIG";
const DEFAULT_TIMEZONE: &str = "UTC";

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Zone used for every "local time" question: bucketing completions,
/// rendering timestamps, resolving `today`.
pub fn local_timezone() -> &'static Tz {
  static LOCAL_TZ: OnceLock<Tz> =
    OnceLock::new();
  LOCAL_TZ.get_or_init(
    resolve_local_timezone
  )
}

#[must_use]
pub fn to_local_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(local_timezone())
    .date_naive()
}

#[must_use]
pub fn format_local_timestamp(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(local_timezone())
    .format("%a %b %d %Y %H:%M:%S")
    .to_string()
}

#[must_use]
pub fn month_name(
  month: u32
) -> Option<&'static str> {
  let idx = usize::try_from(month)
    .ok()?
    .checked_sub(1)?;
  MONTH_NAMES.get(idx).copied()
}

fn resolve_local_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_TIMEZONE,
    "DEFAULT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

pub(crate) fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured local timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a calendar date relative to `today`.
///
/// Accepts `today`, `tomorrow`, `yesterday`, weekday names (next
/// occurrence), `+Nd`/`-Nd`, `YYYY-MM-DD` and `M/D/YYYY`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return shift(today, 1);
    }
    | "yesterday" => {
      return shift(today, -1);
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, target
    ));
  }

  let rel_re =
    Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)d$")
      .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let signed = if caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-")
    {
      -num
    } else {
      num
    };
    return shift(today, signed);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  let us_re = Regex::new(
    r"^(?P<month>\d{1,2})/(?P<day>\d{1,2})/(?P<year>\d{4})$"
  )
  .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
  if let Some(caps) =
    us_re.captures(token)
  {
    let part = |name: &str| {
      caps
        .name(name)
        .map(|m| m.as_str())
        .unwrap_or_default()
    };
    let year: i32 = part("year")
      .parse()
      .context("invalid year")?;
    let month: u32 = part("month")
      .parse()
      .context("invalid month")?;
    let day: u32 = part("day")
      .parse()
      .context("invalid day")?;
    return NaiveDate::from_ymd_opt(
      year, month, day
    )
    .ok_or_else(|| {
      anyhow!(
        "not a calendar date: \
         {token}"
      )
    });
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nd/-Nd, YYYY-MM-DD, M/D/YYYY"
  })
}

fn shift(
  day: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  day
    .checked_add_signed(Duration::days(
      days
    ))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {day} \
         {days:+}d"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    month_name,
    parse_date,
    parse_timezone
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_relative_words() {
    let today = day(2024, 3, 15);
    assert_eq!(
      parse_date("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date("Yesterday", today)
        .expect("yesterday"),
      day(2024, 3, 14)
    );
    assert_eq!(
      parse_date("+20d", today)
        .expect("offset"),
      day(2024, 4, 4)
    );
    assert_eq!(
      parse_date("-15d", today)
        .expect("offset"),
      day(2024, 2, 29)
    );
  }

  #[test]
  fn weekday_is_next_occurrence() {
    // 2024-03-15 is a Friday
    let today = day(2024, 3, 15);
    assert_eq!(
      parse_date("friday", today)
        .expect("weekday"),
      day(2024, 3, 22)
    );
    assert_eq!(
      parse_date("mon", today)
        .expect("weekday"),
      day(2024, 3, 18)
    );
  }

  #[test]
  fn parses_absolute_formats() {
    let today = day(2024, 3, 15);
    assert_eq!(
      parse_date("2025-01-02", today)
        .expect("iso"),
      day(2025, 1, 2)
    );
    assert_eq!(
      parse_date("3/9/2024", today)
        .expect("us"),
      day(2024, 3, 9)
    );
    assert!(
      parse_date("2/30/2024", today)
        .is_err()
    );
    assert!(
      parse_date("someday", today)
        .is_err()
    );
  }

  #[test]
  fn month_names_are_one_based() {
    assert_eq!(
      month_name(1),
      Some("January")
    );
    assert_eq!(
      month_name(12),
      Some("December")
    );
    assert_eq!(month_name(0), None);
    assert_eq!(month_name(13), None);
  }

  #[test]
  fn rejects_unknown_timezone() {
    assert!(
      parse_timezone("Mars/Olympus", "test")
        .is_none()
    );
    assert!(
      parse_timezone(" Europe/Paris ", "test")
        .is_some()
    );
  }
}
