//! Run configuration: `configs/configs.json` plus interactive prompts.
//!
//! The file is optional. Missing or invalid values fall back to defaults and
//! prompts, never to an error. Each key falls back on its own, so one bad
//! value does not discard the rest of the file. Confirmed `api_url` and `app_location` are
//! written back; the token is only ever read.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, Select};
use indexmap::IndexMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use stanzakit::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::ui;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/configs.json";

/// Default request rate.
pub const DEFAULT_MAX_API_CALLS: u32 = 10;

const API_URL_PROMPT: &str = "API url (https://shc1.stackname.splunkcloud.com:8089, \
     https://(es-)stackname.splunkcloud.com:8089, http(s)://anyhost:8089)";

// ============================================================================
// File format
// ============================================================================

/// Contents of `configs.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Worker count and per-worker request rate
    pub max_api_calls_second: u32,
    /// Base URL of the management API
    pub api_url: String,
    /// Directory holding the apps
    pub app_location: String,
    /// Bearer token
    pub token: String,
    /// Verify TLS certificates
    pub verify_tls: bool,
    /// Conf type to endpoint overrides for metadata mode
    pub endpoints: IndexMap<String, String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            max_api_calls_second: DEFAULT_MAX_API_CALLS,
            api_url: String::new(),
            app_location: String::new(),
            token: String::new(),
            verify_tls: true,
            endpoints: IndexMap::new(),
        }
    }
}

impl ConfigFile {
    /// Load the file, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        let value = match Self::read(path) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{e:#}. Using default values.");
                return Self::default();
            }
        };

        let (config, problems) = Self::from_value(&value);
        for problem in &problems {
            log::warn!("{}: {problem}, {}", path.display(), problem.category().recovery());
        }
        config
    }

    fn read(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Configuration file '{}' not readable", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration in '{}'", path.display()))
    }

    /// Build the configuration from parsed JSON. Every key that is missing or
    /// has the wrong type keeps its default; the bad ones are returned.
    pub fn from_value(value: &Value) -> (Self, Vec<Error>) {
        let mut config = Self::default();
        let mut problems = Vec::new();
        let Some(object) = value.as_object() else {
            problems.push(Error::Config("top level is not a JSON object".to_string()));
            return (config, problems);
        };

        field(object, "max_api_calls_second", &mut config.max_api_calls_second, &mut problems);
        field(object, "api_url", &mut config.api_url, &mut problems);
        field(object, "app_location", &mut config.app_location, &mut problems);
        field(object, "token", &mut config.token, &mut problems);
        field(object, "verify_tls", &mut config.verify_tls, &mut problems);
        field(object, "endpoints", &mut config.endpoints, &mut problems);

        if config.max_api_calls_second == 0 {
            problems.push(Error::Config(
                "max_api_calls_second must be a positive integer".to_string(),
            ));
            config.max_api_calls_second = DEFAULT_MAX_API_CALLS;
        }
        (config, problems)
    }
}

/// Read one key into `slot`, leaving the default in place when it is absent
/// or does not fit.
fn field<T: DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
    slot: &mut T,
    problems: &mut Vec<Error>,
) {
    let Some(raw) = object.get(key) else {
        return;
    };
    match serde_json::from_value(raw.clone()) {
        Ok(value) => *slot = value,
        Err(e) => problems.push(Error::Config(format!("invalid {key} ({e})"))),
    }
}

/// Store `api_url` and `app_location` in the file, leaving every other key as
/// it was. Empty values are not stored. A missing file is created.
pub fn write_back(path: &Path, api_url: &str, app_location: &str) -> Result<()> {
    let mut value = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str::<Value>(&content)
            .unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };

    let Some(object) = value.as_object_mut() else {
        anyhow::bail!("'{}' does not hold a JSON object", path.display());
    };
    let mut changed = false;
    for (key, new) in [("api_url", api_url), ("app_location", app_location)] {
        if !new.is_empty() && object.get(key).and_then(|v| v.as_str()) != Some(new) {
            object.insert(key.to_string(), new.into());
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(&value)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Updated {}", path.display());
    Ok(())
}

// ============================================================================
// Prompts
// ============================================================================

/// Source of interactive answers.
pub trait Prompter {
    /// Yes/no question.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    /// Free text, optionally pre-filled.
    fn input(&self, prompt: &str, initial: &str) -> Result<String>;
    /// Hidden text.
    fn secret(&self, prompt: &str) -> Result<String>;
    /// Pick one item, returning its index.
    fn select(&self, prompt: &str, items: &[&str], default: usize) -> Result<usize>;
}

/// Terminal prompts.
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .context("Failed to read confirmation")
    }

    fn input(&self, prompt: &str, initial: &str) -> Result<String> {
        let value: String = Input::new()
            .with_prompt(prompt)
            .with_initial_text(initial)
            .interact_text()
            .with_context(|| format!("Failed to read {prompt}"))?;
        Ok(value.trim().to_string())
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .with_context(|| format!("Failed to read {prompt}"))
    }

    fn select(&self, prompt: &str, items: &[&str], default: usize) -> Result<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .context("Failed to read selection")
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// What a command needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needs {
    /// Only the app location
    Apps,
    /// API access, no apps
    Api,
    /// API access and the app location
    ApiAndApps,
}

impl Needs {
    fn api(self) -> bool {
        matches!(self, Needs::Api | Needs::ApiAndApps)
    }

    fn apps(self) -> bool {
        matches!(self, Needs::Apps | Needs::ApiAndApps)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the management API, no trailing slash
    pub api_url: String,
    /// Directory holding the apps, `~` expanded
    pub app_location: PathBuf,
    /// Bearer token
    pub token: String,
    /// Worker count and per-worker request rate
    pub max_api_calls_second: u32,
    /// Verify TLS certificates
    pub verify_tls: bool,
    /// Conf type to endpoint overrides
    pub endpoints: IndexMap<String, String>,
}

/// Read the file and ask for whatever is missing. The user confirms values
/// taken from the file and may replace them.
pub fn acquire(path: &Path, needs: Needs, prompter: &dyn Prompter) -> Result<Settings> {
    let file = ConfigFile::load(path);
    let mut api_url = file.api_url.trim().to_string();
    let mut location = file.app_location.trim().to_string();
    let mut token = file.token.trim().to_string();

    let not_provided = "Not provided by configs.json";
    ui::section("Configuration");
    if needs.api() {
        ui::kv("API URL", if api_url.is_empty() { not_provided } else { api_url.as_str() });
    }
    if needs.apps() {
        ui::kv("App location", if location.is_empty() { not_provided } else { location.as_str() });
    }
    if needs.api() {
        ui::kv("Token", if token.is_empty() { not_provided } else { "******" });
    }
    println!();

    let complete = (!needs.api() || (!api_url.is_empty() && !token.is_empty()))
        && (!needs.apps() || !location.is_empty());
    let reask = complete && !prompter.confirm("Are these values correct?", true)?;

    if needs.api() && (api_url.is_empty() || reask) {
        api_url = prompter.input(API_URL_PROMPT, &api_url)?;
    }
    if needs.apps() && (location.is_empty() || reask) {
        location = prompter.input("Apps location", &location)?;
    }
    if needs.api() && (token.is_empty() || reask) {
        token = prompter.secret("Authentication token")?;
    }

    if needs.api() {
        match stack_name(&api_url) {
            Some(stack) => log::info!("API url: {api_url} (stack {stack})"),
            None => ui::warn(&format!("Could not recognise API url '{api_url}', continuing")),
        }
    }

    if let Err(e) = write_back(path, &api_url, &location) {
        log::error!("Error updating {}: {e:#}", path.display());
    }

    Ok(Settings {
        api_url: api_url.trim_end_matches('/').to_string(),
        app_location: PathBuf::from(shellexpand::tilde(&location).as_ref()),
        token,
        max_api_calls_second: file.max_api_calls_second,
        verify_tls: file.verify_tls,
        endpoints: file.endpoints,
    })
}

// ============================================================================
// API URL check
// ============================================================================

static SEARCH_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(shc?\d+)\.([^./:]+)\.").unwrap());
static CLOUD_STACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([a-z\-]+)\.splunkcloud\.com").unwrap());
static ANY_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([^:/]+):\d+").unwrap());

/// Derive a stack name from an API URL:
/// `https://sh1.acme.splunkcloud.com:8089` is `sh1_acme`,
/// `https://acme.splunkcloud.com:8089` is `acme`, and
/// `https://host:8089` is `host`.
pub fn stack_name(api_url: &str) -> Option<String> {
    let capture = |re: &Regex| {
        re.captures(api_url).map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("_")
        })
    };

    capture(&SEARCH_HEAD)
        .or_else(|| capture(&CLOUD_STACK))
        .or_else(|| capture(&ANY_HOST))
}
