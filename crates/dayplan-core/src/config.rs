use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  warn
};

const RC_ENV_VAR: &str = "DAYPLANRC";
const RC_FILE_NAME: &str = ".dayplanrc";
const MAX_INCLUDE_DEPTH: usize = 8;

const DATA_LOCATION: &str =
  "data.location";
const COLOR: &str = "color";
const TIMEZONE: &str = "timezone";
const REDIRECT_DELAY_MS: &str =
  "redirect.delay.ms";
const CLOCK_TICK_MS: &str =
  "clock.tick.ms";

/// Every key the rc file may set, with
/// its default.
const KEYS: &[(&str, Option<&str>)] = &[
  (DATA_LOCATION, Some("~/.dayplan")),
  (COLOR, Some("on")),
  (TIMEZONE, None),
  (REDIRECT_DELAY_MS, Some("1500")),
  (CLOCK_TICK_MS, Some("1000"))
];

/// Effective settings: defaults, then
/// the rc file, then command-line
/// overrides.
#[derive(Debug, Clone)]
pub struct Config {
  values:  BTreeMap<String, String>,
  sources: Vec<PathBuf>
}

/// One meaningful line of an rc file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine {
  Set(String, String),
  Include(String)
}

impl Config {
  #[must_use]
  pub fn defaults() -> Self {
    let values = KEYS
      .iter()
      .filter_map(|(key, default)| {
        default.map(|value| {
          (
            key.to_string(),
            value.to_string()
          )
        })
      })
      .collect();
    Config {
      values,
      sources: vec![]
    }
  }

  /// Reads the rc file named by
  /// `explicit`, else `$DAYPLANRC`
  /// (`/dev/null` disables it), else
  /// `~/.dayplanrc` when present.
  #[tracing::instrument]
  pub fn load(
    explicit: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();
    match locate_rc(explicit)? {
      | Some(path) => {
        info!(rc = %path.display(), "reading rc file");
        cfg.read_rc(&path, 0)?;
      }
      | None => {
        debug!("no rc file; defaults only")
      }
    }
    Ok(cfg)
  }

  /// Applies `key=value` pairs; a
  /// leading `rc.` is optional.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key);
      self.set(key, value.trim(), "override");
    }
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&str, &str)>
  {
    self
      .values
      .iter()
      .map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Files read, includes last.
  pub fn sources(&self) -> &[PathBuf] {
    &self.sources
  }

  pub fn timezone(&self) -> Option<&str> {
    self
      .values
      .get(TIMEZONE)
      .map(String::as_str)
      .filter(|tz| !tz.is_empty())
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self.raw(COLOR)?;
    match raw.to_ascii_lowercase().as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | _ => {
        bail!("invalid {COLOR}: {raw}")
      }
    }
  }

  pub fn redirect_delay(
    &self
  ) -> anyhow::Result<Duration> {
    self.millis(REDIRECT_DELAY_MS)
  }

  /// Never zero.
  pub fn clock_tick(
    &self
  ) -> anyhow::Result<Duration> {
    let tick =
      self.millis(CLOCK_TICK_MS)?;
    if tick.is_zero() {
      bail!(
        "{CLOCK_TICK_MS} must be greater \
         than zero"
      );
    }
    Ok(tick)
  }

  /// `override_dir` wins over
  /// `data.location`.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> anyhow::Result<PathBuf> {
    match override_dir {
      | Some(dir) => Ok(dir.to_path_buf()),
      | None => {
        expand_home(self.raw(DATA_LOCATION)?)
      }
    }
  }

  fn raw(
    &self,
    key: &str
  ) -> anyhow::Result<&str> {
    self
      .values
      .get(key)
      .map(String::as_str)
      .ok_or_else(|| {
        anyhow!("{key} is not set")
      })
  }

  fn millis(
    &self,
    key: &str
  ) -> anyhow::Result<Duration> {
    let raw = self.raw(key)?;
    let ms: u64 =
      raw.parse().with_context(|| {
        format!(
          "invalid {key}: expected \
           milliseconds, got {raw}"
        )
      })?;
    Ok(Duration::from_millis(ms))
  }

  fn set(
    &mut self,
    key: &str,
    value: &str,
    origin: &str
  ) {
    if !KEYS.iter().any(|(k, _)| *k == key)
    {
      warn!(key, origin, "ignoring unknown setting");
      return;
    }
    debug!(key, value, origin, "setting");
    self
      .values
      .insert(key.to_string(), value.to_string());
  }

  fn read_rc(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      bail!(
        "rc includes nested deeper than \
         {MAX_INCLUDE_DEPTH} at {}",
        path.display()
      );
    }

    let text = fs::read_to_string(path)
      .with_context(|| {
        format!("cannot read {}", path.display())
      })?;
    let lines =
      parse_rc(&text).map_err(|(n, line)| {
        anyhow!(
          "{}:{n}: expected `key = value` \
           or `include <path>`, got {line:?}",
          path.display()
        )
      })?;
    self.sources.push(path.to_path_buf());

    let origin = path.display().to_string();
    for line in lines {
      match line {
        | RcLine::Set(key, value) => {
          self.set(&key, &value, &origin)
        }
        | RcLine::Include(target) => {
          let target = expand_home(&target)?;
          let target = match path.parent() {
            | Some(dir) if target.is_relative() => {
              dir.join(target)
            }
            | _ => target
          };
          if target.exists() {
            self.read_rc(&target, depth + 1)?;
          } else {
            warn!(include = %target.display(), "rc include missing; skipped");
          }
        }
      }
    }
    Ok(())
  }
}

/// Splits rc text into settings and
/// includes. `#` starts a comment. On
/// failure returns the 1-based line
/// number and its text.
fn parse_rc(
  text: &str
) -> Result<Vec<RcLine>, (usize, String)> {
  let mut out = Vec::new();
  for (idx, raw) in text.lines().enumerate() {
    let line = raw
      .split('#')
      .next()
      .unwrap_or_default()
      .trim();
    if line.is_empty() {
      continue;
    }

    if let Some(target) =
      line.strip_prefix("include ")
      && !target.trim().is_empty()
    {
      out.push(RcLine::Include(
        target.trim().to_string()
      ));
      continue;
    }

    match line.split_once('=') {
      | Some((key, value))
        if !key.trim().is_empty() =>
      {
        out.push(RcLine::Set(
          key.trim().to_string(),
          value.trim().to_string()
        ));
      }
      | _ => {
        return Err((idx + 1, raw.to_string()))
      }
    }
  }
  Ok(out)
}

fn locate_rc(
  explicit: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = explicit {
    return Ok(Some(path.to_path_buf()));
  }
  match std::env::var_os(RC_ENV_VAR) {
    | Some(raw) if raw == "/dev/null" => {
      Ok(None)
    }
    | Some(raw) => {
      Ok(Some(PathBuf::from(raw)))
    }
    | None => {
      let candidate =
        home()?.join(RC_FILE_NAME);
      Ok(candidate.exists().then_some(candidate))
    }
  }
}

fn home() -> anyhow::Result<PathBuf> {
  dirs::home_dir().ok_or_else(|| {
    anyhow!("cannot determine home directory")
  })
}

/// `~` and `~/...` resolve against the
/// home directory.
fn expand_home(
  raw: &str
) -> anyhow::Result<PathBuf> {
  if raw == "~" {
    return home();
  }
  match raw.strip_prefix("~/") {
    | Some(rest) => Ok(home()?.join(rest)),
    | None => Ok(PathBuf::from(raw))
  }
}
