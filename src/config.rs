//! Configuration through environment variables.

use std::{env::VarError, thread, time::Duration};

use anyhow::{Result, Context, anyhow, bail};


/// Get an env var as a String; decoding failures are reported as
/// errors.
pub fn getenv(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(s) => Ok(Some(s)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => bail!("{name:?} env var is not unicode"),
    }
}

pub fn parse_bool(name: &str, s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{name:?} env var: expecting a boolean, got {s:?}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address for `awidget serve`
    pub listen: String,
    /// Base URL the widget pipeline fetches from
    pub api_url: Option<String>,
    pub fetch_timeout: Duration,
    pub workers: usize,
    /// Where `api_access.log` goes; stderr without it.
    pub logdir: Option<String>,
    pub verbose: bool,
}

impl Config {
    /// `get` looks up a variable, the way `getenv` does.
    pub fn from_vars(get: impl Fn(&str) -> Result<Option<String>>) -> Result<Self> {
        let listen = get("AWIDGET_LISTEN")?.unwrap_or_else(|| "127.0.0.1:3000".into());
        let fetch_timeout = match get("AWIDGET_FETCH_TIMEOUT_MS")? {
            Some(s) => Duration::from_millis(s.trim().parse().with_context(
                || anyhow!("AWIDGET_FETCH_TIMEOUT_MS env var: {s:?}"))?),
            None => Duration::from_millis(30000),
        };
        let workers = match get("AWIDGET_WORKERS")? {
            Some(s) => {
                let n: usize = s.trim().parse().with_context(
                    || anyhow!("AWIDGET_WORKERS env var: {s:?}"))?;
                if n == 0 {
                    bail!("AWIDGET_WORKERS env var must be at least 1")
                }
                n
            }
            None => 4 * thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        let verbose = match get("AWIDGET_VERBOSE")? {
            Some(s) => parse_bool("AWIDGET_VERBOSE", &s)?,
            None => false,
        };
        Ok(Config {
            listen,
            api_url: get("AWIDGET_API_URL")?,
            fetch_timeout,
            workers,
            logdir: get("AWIDGET_LOGDIR")?,
            verbose,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(getenv)
    }
}
