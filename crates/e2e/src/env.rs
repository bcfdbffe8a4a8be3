//! Environment loading for the target portal
//!
//! Credentials and the base URL come from a `.env.<TEST_ENV>` file in the
//! working directory layered over the process environment. Values in the
//! file win. Every problem is collected before failing so a broken setup is
//! reported in one go.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::error::{E2eError, E2eResult};

/// Default environment name when `TEST_ENV` is unset
pub const DEFAULT_TEST_ENV: &str = "local";

/// Portal used when `BASE_URL` is not configured
pub const DEFAULT_BASE_URL: &str = "https://lbltc-2.azurewebsites.net";

const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$"));

/// Validated environment for a test run
#[derive(Clone)]
pub struct EnvConfig {
    pub username: String,
    pub password: String,
    pub wrong_password: String,
    pub base_url: Url,
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("wrong_password", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl EnvConfig {
    /// Load from `TEST_ENV` and the matching env file in the current directory
    pub fn load() -> E2eResult<Self> {
        let env_name = std::env::var("TEST_ENV").unwrap_or_else(|_| DEFAULT_TEST_ENV.to_string());
        let dir = std::env::current_dir()?;
        Self::load_from(&dir, &env_name)
    }

    /// Load `.env.<env_name>` from `dir`, layered over the process environment
    pub fn load_from(dir: &Path, env_name: &str) -> E2eResult<Self> {
        let env_file = env_file_path(dir, env_name);
        info!("Loading environment from: {}", env_file.display());

        let file_vars = if env_file.exists() {
            read_env_file(&env_file)?
        } else {
            debug!("No env file at {}, using process environment only", env_file.display());
            HashMap::new()
        };

        Self::from_lookup(|key| {
            file_vars
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Build and validate from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        let username = require(&lookup, "USERNAME", &mut problems);
        if !username.is_empty() {
            match is_email(&username) {
                Ok(true) => {}
                Ok(false) => problems.push("USERNAME must be a valid email".to_string()),
                Err(e) => problems.push(format!("USERNAME could not be validated: {}", e)),
            }
        }

        let password = require(&lookup, "PASSWORD", &mut problems);
        if !password.is_empty() && password.chars().count() < MIN_PASSWORD_LEN {
            problems.push(format!("PASSWORD must be at least {} characters", MIN_PASSWORD_LEN));
        }

        let wrong_password = require(&lookup, "WRONG_PASSWORD", &mut problems);

        let raw_url = lookup("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = match Url::parse(&raw_url) {
            Ok(url) if url.has_host() => Some(url),
            _ => {
                problems.push("BASE_URL must be a valid URL".to_string());
                None
            }
        };

        match base_url {
            Some(base_url) if problems.is_empty() => Ok(Self {
                username,
                password,
                wrong_password,
                base_url,
            }),
            _ => Err(E2eError::InvalidEnv(problems)),
        }
    }

    /// Join a path onto the base URL
    pub fn url(&self, path: &str) -> E2eResult<Url> {
        Ok(self.base_url.join(path)?)
    }
}

/// Path of the env file for a given environment name
pub fn env_file_path(dir: &Path, env_name: &str) -> PathBuf {
    dir.join(format!(".env.{}", env_name))
}

fn require<F>(lookup: &F, key: &str, problems: &mut Vec<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value,
        None => {
            problems.push(format!("{} is required", key));
            String::new()
        }
    }
}

fn is_email(value: &str) -> Result<bool, regex::Error> {
    match &*EMAIL_PATTERN {
        Ok(re) => Ok(re.is_match(value)),
        Err(e) => Err(e.clone()),
    }
}

/// Read `KEY=value` pairs from an env file without touching the process environment
pub fn read_env_file(path: &Path) -> E2eResult<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}
