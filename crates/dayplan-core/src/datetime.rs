use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "DAYPLAN_TIMEZONE";

const ISO_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// Which wall clock "today" is read from.
///
/// Stored dates never carry a zone; the
/// zone only decides which calendar day
/// an instant belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
  Local,
  Named(Tz)
}

impl Zone {
  /// Resolves the zone from
  /// `$DAYPLAN_TIMEZONE`, then the
  /// configured value, then the system
  /// local zone.
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) =
        parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
      return Zone::Named(tz);
    }

    if let Some(raw) = configured
      && let Some(tz) =
        parse_timezone(raw, "rc.timezone")
    {
      return Zone::Named(tz);
    }

    Zone::Local
  }

  #[must_use]
  pub fn wall_clock(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDateTime {
    match self {
      | Zone::Local => {
        now
          .with_timezone(&Local)
          .naive_local()
      }
      | Zone::Named(tz) => {
        now.with_timezone(tz).naive_local()
      }
    }
  }

  #[must_use]
  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    self.wall_clock(now).date()
  }
}

fn parse_timezone(
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
        "configured timezone"
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

/// Formats a calendar day as
/// `YYYY-MM-DD` from its own fields.
#[must_use]
pub fn format_iso_date(
  date: NaiveDate
) -> String {
  date.format(ISO_DATE_FORMAT).to_string()
}

pub fn parse_iso_date(
  raw: &str
) -> anyhow::Result<NaiveDate> {
  let trimmed = raw.trim();
  let well_formed = trimmed.len() == 10
    && trimmed.char_indices().all(
      |(idx, ch)| {
        if idx == 4 || idx == 7 {
          ch == '-'
        } else {
          ch.is_ascii_digit()
        }
      }
    );
  if !well_formed {
    return Err(anyhow!(
      "expected YYYY-MM-DD, got: \
       {trimmed}"
    ));
  }

  NaiveDate::parse_from_str(
    trimmed,
    ISO_DATE_FORMAT
  )
  .with_context(|| {
    format!("invalid date: {trimmed}")
  })
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

/// Moves by whole months, clamping the
/// day to the target month's length.
#[must_use]
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

#[must_use]
pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

#[must_use]
pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

/// The Sunday on or before `day`.
#[must_use]
pub fn start_of_week(
  day: NaiveDate
) -> NaiveDate {
  let diff = day
    .weekday()
    .num_days_from_sunday()
    as i64;
  add_days(day, -diff)
}

/// `14:03:09`, the clock line of the
/// dashboard header.
#[must_use]
pub fn format_clock_time(
  wall: NaiveDateTime
) -> String {
  wall.format("%H:%M:%S").to_string()
}

/// `MON OCTOBER 19 2026`, the date line
/// of the dashboard header.
#[must_use]
pub fn format_clock_date(
  wall: NaiveDateTime
) -> String {
  wall
    .format("%a %B %d %Y")
    .to_string()
    .to_uppercase()
}

/// Resolves a user supplied day.
///
/// Accepts `YYYY-MM-DD`, `today`,
/// `tomorrow`, `yesterday`, `+Nd`/`-Nd`,
/// `+Nw`/`-Nw` and weekday names (the
/// next such day after `today`).
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(add_days(today, 1));
    }
    | "yesterday" => {
      return Ok(add_days(today, -1));
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative amount")
      })?
      .parse()
      .context(
        "invalid relative amount"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .unwrap_or("d");
    let days = match unit {
      | "w" => num.saturating_mul(7),
      | _ => num
    };
    let signed =
      if sign == "-" { -days } else { days };
    return Ok(add_days(today, signed));
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, weekday
    ));
  }

  parse_iso_date(token).map_err(|_| {
    anyhow!(
      "unrecognized date '{token}'; \
       use YYYY-MM-DD, today, \
       tomorrow, yesterday, +Nd, +Nw \
       or a weekday name"
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
    .num_days_from_sunday()
    as i64;
  let target_idx = target
    .num_days_from_sunday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}


pub mod iso_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso_date(*date)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso_date(&raw)
      .map_err(serde::de::Error::custom)
  }
}
