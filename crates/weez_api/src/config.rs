use crate::chat::{ChatClient, StreamOptions};
use crate::jobs::JobsClient;
use crate::poller::{PollOptions, DEFAULT_POLL_INTERVAL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "weez.json";
const APP_DIR: &str = "weez";

/// Settings shared by the chat and job clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Falls back to `api_base_url` when unset
    pub jobs_base_url: Option<String>,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: Option<u64>,
    /// Per-request limit for job status and trigger calls
    pub poll_request_timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
    pub stop_on_error: bool,
    /// Sent with every request, e.g. `{"authorization": "Bearer ${WEEZ_TOKEN}"}`
    pub request_headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: ChatClient::default_base_url(),
            jobs_base_url: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            poll_timeout_ms: None,
            poll_request_timeout_ms: None,
            stream_idle_timeout_ms: None,
            stop_on_error: false,
            request_headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load from an explicit path, or search the default locations.
    ///
    /// A missing file is an error only when the path was given explicitly;
    /// otherwise defaults are used.
    pub fn load(custom_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Configuration file not found: {}\nPlease ensure the path is correct.",
                    path.display()
                ));
            }
            return Self::load_from_file(path);
        }

        match Self::config_directories()
            .into_iter()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.exists())
        {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)?;
        let substituted = substitute_env_vars_in_value(raw)?;
        Ok(serde_json::from_value(substituted)?)
    }

    pub fn jobs_base_url(&self) -> &str {
        self.jobs_base_url.as_deref().unwrap_or(&self.api_base_url)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            stop_on_error: self.stop_on_error,
            idle_timeout: self.stream_idle_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions::default()
            .with_interval(Duration::from_millis(self.poll_interval_ms))
            .with_timeout(self.poll_timeout_ms.map(Duration::from_millis))
    }

    pub fn chat_client(&self) -> ChatClient {
        ChatClient::new(self.api_base_url.clone())
            .with_options(self.stream_options())
            .with_headers(self.request_headers.clone())
    }

    pub fn jobs_client(&self) -> Result<JobsClient> {
        let client = JobsClient::new(self.jobs_base_url().to_string())
            .with_headers(self.request_headers.clone());
        match self.poll_request_timeout_ms {
            Some(ms) => Ok(client.with_request_timeout(Duration::from_millis(ms))?),
            None => Ok(client),
        }
    }

    /// Directories searched for `weez.json`, ordered by priority
    pub fn config_directories() -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Ok(custom_dir) = std::env::var("WEEZ_CONFIG_DIR") {
            push_unique_dir(&mut dirs, PathBuf::from(custom_dir));
        }
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            push_unique_dir(&mut dirs, PathBuf::from(xdg_config).join(APP_DIR));
        }
        if let Some(home_dir) = dirs::home_dir() {
            push_unique_dir(&mut dirs, home_dir.join(".config").join(APP_DIR));
        }
        if let Some(system_config) = dirs::config_dir() {
            push_unique_dir(&mut dirs, system_config.join(APP_DIR));
        }
        if let Ok(current_dir) = std::env::current_dir() {
            push_unique_dir(&mut dirs, current_dir.join(APP_DIR));
        }

        dirs
    }
}

fn push_unique_dir(dirs: &mut Vec<PathBuf>, candidate: PathBuf) {
    if !dirs.iter().any(|existing| existing == &candidate) {
        dirs.push(candidate);
    }
}

/// Recursively substitute environment variables in JSON string values
fn substitute_env_vars_in_value(value: serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(
            substitute_env_vars_in_string(&s)?,
        )),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, val)| Ok((key, substitute_env_vars_in_value(val)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(serde_json::Value::Object),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(substitute_env_vars_in_value)
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        other => Ok(other),
    }
}

/// Replace `${VAR_NAME}` occurrences with the variable's value
fn substitute_env_vars_in_string(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let end = rest[start..].find('}').ok_or_else(|| {
            anyhow::anyhow!("Unclosed environment variable substitution: {input}")
        })?;
        let var_name = &rest[start + 2..start + end];
        let var_value = std::env::var(var_name)
            .with_context(|| format!("Environment variable not set: {var_name}"))?;

        result.push_str(&rest[..start]);
        result.push_str(&var_value);
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}
