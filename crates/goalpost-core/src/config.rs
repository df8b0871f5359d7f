use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

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

use crate::commands::known_command_names;
use crate::sorter::{
  DUE_DATE_CRITERION,
  SortCriterion
};

const RC_ENV_VAR: &str = "GOALPOSTRC";
const RC_FILE_NAME: &str = "goalpostrc";
const APP_DIR_NAME: &str = "goalpost";

/// Every key goalpost reads. Anything else in an rc file is ignored with a
/// warning.
pub const KNOWN_KEYS: [&str; 5] = [
  "color",
  "data.location",
  "default.command",
  "hooks",
  "sort.default"
];

#[derive(Debug, Clone)]
pub struct Config {
  values:           BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Strict on/off reading of a switch value.
#[must_use]
pub fn parse_switch(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

/// Rejects values goalpost could not act on.
pub fn check_setting(
  key: &str,
  value: &str
) -> anyhow::Result<()> {
  match key {
    | "color" | "hooks" => {
      if parse_switch(value).is_none() {
        bail!(
          "{key} must be on or off, \
           got {value:?}"
        );
      }
    }
    | "default.command" => {
      if !known_command_names()
        .iter()
        .any(|name| *name == value)
      {
        bail!(
          "default.command names an \
           unknown command: {value:?}"
        );
      }
    }
    | "sort.default" => {
      let is_tag = !value
        .chars()
        .any(char::is_whitespace);
      if !value.is_empty()
        && value != DUE_DATE_CRITERION
        && !is_tag
      {
        bail!(
          "sort.default must be \
           \"{DUE_DATE_CRITERION}\" or \
           a single tag, got {value:?}"
        );
      }
    }
    | "data.location" => {
      if value.is_empty() {
        bail!(
          "data.location cannot be \
           empty"
        );
      }
    }
    | _ => {}
  }
  Ok(())
}

impl Config {
  /// Built-in defaults with no rc file applied.
  pub fn defaults() -> Self {
    let values = [
      ("color", "on"),
      ("default.command", "list"),
      ("hooks", "on")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();

    Config {
      values,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();
    match find_rc_file(rc_override) {
      | Some(path) => {
        info!(goalpostrc = %path.display(), "loading goalpostrc");
        cfg.read_rc(&path)?;
      }
      | None => {
        debug!(
          "no goalpostrc found; using \
           defaults"
        );
      }
    }
    Ok(cfg)
  }

  /// Validated write of one setting. Unknown keys are skipped.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let key = key.trim();
    let value = value.trim();
    if !KNOWN_KEYS.contains(&key) {
      warn!(key, "ignoring unknown setting");
      return Ok(());
    }
    check_setting(key, value)?;
    debug!(key, value, "setting applied");
    self
      .values
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  /// Command-line overrides; a leading `rc.` on the key is optional.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key);
      self.set(key, &value).with_context(
        || {
          format!(
            "invalid override \
             rc.{key}={value}"
          )
        }
      )?;
    }
    Ok(())
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .values
      .get(key)
      .map(String::as_str)
  }

  pub fn color_enabled(&self) -> bool {
    self.switch("color", true)
  }

  pub fn hooks_enabled(&self) -> bool {
    self.switch("hooks", true)
  }

  pub fn default_command(
    &self
  ) -> &str {
    self
      .get("default.command")
      .unwrap_or("list")
  }

  /// `sort.default`, when set to a non-empty value.
  pub fn default_sort(
    &self
  ) -> Option<SortCriterion> {
    self
      .get("sort.default")
      .filter(|raw| !raw.is_empty())
      .map(SortCriterion::parse)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&str, &str)>
  {
    self
      .values
      .iter()
      .map(|(k, v)| {
        (k.as_str(), v.as_str())
      })
  }

  /// `--data` wins, then `data.location`, then the platform data dir.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> anyhow::Result<PathBuf> {
    if let Some(dir) = override_dir {
      return Ok(dir.to_path_buf());
    }
    if let Some(location) =
      self.get("data.location")
    {
      return Ok(home_relative(
        location
      ));
    }
    dirs::data_dir()
      .map(|dir| dir.join(APP_DIR_NAME))
      .ok_or_else(|| {
        anyhow!(
          "no platform data directory; \
           set data.location"
        )
      })
  }

  fn switch(
    &self,
    key: &str,
    fallback: bool
  ) -> bool {
    self
      .get(key)
      .and_then(parse_switch)
      .unwrap_or(fallback)
  }

  #[tracing::instrument(skip(self))]
  fn read_rc(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    if self
      .loaded_files
      .iter()
      .any(|seen| seen == path)
    {
      bail!(
        "{} is included more than once",
        path.display()
      );
    }
    let text = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self
      .loaded_files
      .push(path.to_path_buf());

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };
      match RcLine::parse(raw_line)
        .with_context(at)?
      {
        | RcLine::Blank => {}
        | RcLine::Include(target) => {
          let target =
            resolve_include(path, target);
          if target.exists() {
            self
              .read_rc(&target)
              .with_context(at)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
        | RcLine::Setting(key, value) => {
          self
            .set(key, value)
            .with_context(at)?;
        }
      }
    }
    Ok(())
  }
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str)
}

impl<'a> RcLine<'a> {
  fn parse(
    raw: &'a str
  ) -> anyhow::Result<Self> {
    let line = raw
      .split('#')
      .next()
      .unwrap_or_default()
      .trim();
    if line.is_empty() {
      return Ok(Self::Blank);
    }
    if let Some(target) =
      line.strip_prefix("include ")
    {
      let target = target.trim();
      if target.is_empty() {
        bail!("include needs a path");
      }
      return Ok(Self::Include(target));
    }
    let (key, value) =
      line.split_once('=').ok_or_else(
        || {
          anyhow!(
            "expected key=value, got \
             {line:?}"
          )
        }
      )?;
    let key = key.trim();
    if key.is_empty() {
      bail!("setting has an empty key");
    }
    Ok(Self::Setting(key, value.trim()))
  }
}

/// `--goalpostrc`, then `$GOALPOSTRC` (empty disables), then
/// `<config dir>/goalpost/goalpostrc`, then `~/.goalpostrc`.
fn find_rc_file(
  rc_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = rc_override {
    return Some(path.to_path_buf());
  }
  if let Ok(raw) =
    std::env::var(RC_ENV_VAR)
  {
    let raw = raw.trim();
    return (!raw.is_empty())
      .then(|| home_relative(raw));
  }

  let candidates = [
    dirs::config_dir().map(|dir| {
      dir
        .join(APP_DIR_NAME)
        .join(RC_FILE_NAME)
    }),
    dirs::home_dir().map(|home| {
      home.join(format!(
        ".{RC_FILE_NAME}"
      ))
    })
  ];
  candidates
    .into_iter()
    .flatten()
    .find(|path| path.is_file())
}

fn resolve_include(
  from: &Path,
  target: &str
) -> PathBuf {
  let target = home_relative(target);
  if target.is_absolute() {
    return target;
  }
  from
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(target)
}

fn home_relative(raw: &str) -> PathBuf {
  let rest = match raw {
    | "~" => Some(""),
    | _ => raw.strip_prefix("~/")
  };
  match (rest, dirs::home_dir()) {
    | (Some(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => PathBuf::from(raw)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_switch
  };
  use crate::sorter::SortCriterion;

  #[test]
  fn loads_rc_with_includes_and_comments()
   {
    let temp =
      tempdir().expect("tempdir");
    fs::write(
      temp.path().join("extra.rc"),
      "sort.default = Due Date\n"
    )
    .expect("write include");

    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# personal settings\n\
       color=off # no ansi\n\
       theme=dark\n\
       include extra.rc\n\
       include missing.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&rc))
      .expect("load rc");
    assert!(!cfg.color_enabled());
    assert!(cfg.hooks_enabled());
    assert_eq!(
      cfg.default_sort(),
      Some(SortCriterion::DueDate)
    );
    assert_eq!(
      cfg.default_command(),
      "list"
    );
    assert_eq!(cfg.get("theme"), None);
    assert_eq!(
      cfg.loaded_files.len(),
      2
    );
  }

  #[test]
  fn invalid_values_name_the_line() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(
      &rc,
      "hooks=on\ncolor=sometimes\n"
    )
    .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("bad color");
    let text = format!("{err:#}");
    assert!(text.contains("bad.rc:2"));
    assert!(
      text.contains("color must be on or off")
    );
  }

  #[test]
  fn include_cycle_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("loop.rc");
    fs::write(&rc, "include loop.rc\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }

  #[test]
  fn overrides_are_validated() {
    let mut cfg = Config::defaults();
    cfg
      .apply_overrides(vec![(
        "rc.sort.default".to_string(),
        "work".to_string()
      )])
      .expect("tag sort");
    assert_eq!(
      cfg.default_sort(),
      Some(SortCriterion::Tag(
        "work".to_string()
      ))
    );

    for (key, value) in [
      ("sort.default", "two words"),
      ("default.command", "frobnicate"),
      ("hooks", "maybe")
    ] {
      assert!(
        cfg
          .apply_overrides(vec![(
            key.to_string(),
            value.to_string()
          )])
          .is_err(),
        "{key}={value}"
      );
    }
  }

  #[test]
  fn data_dir_prefers_flag_then_setting()
   {
    let mut cfg = Config::defaults();
    cfg
      .set("data.location", "/srv/goals")
      .expect("set location");
    assert_eq!(
      cfg
        .data_dir(Some(Path::new("/tmp/x")))
        .expect("flag"),
      Path::new("/tmp/x")
    );
    assert_eq!(
      cfg.data_dir(None).expect("setting"),
      Path::new("/srv/goals")
    );
  }

  #[test]
  fn rc_lines_and_switches() {
    assert_eq!(
      RcLine::parse("  # note")
        .expect("blank"),
      RcLine::Blank
    );
    assert_eq!(
      RcLine::parse("include more.rc")
        .expect("include"),
      RcLine::Include("more.rc")
    );
    assert_eq!(
      RcLine::parse(" hooks = off ")
        .expect("setting"),
      RcLine::Setting("hooks", "off")
    );
    assert!(
      RcLine::parse("no equals sign")
        .is_err()
    );
    assert_eq!(
      parse_switch("YES"),
      Some(true)
    );
    assert_eq!(parse_switch("y"), None);
  }
}
