//! Global flag parsing.
//!
//! Flags may appear anywhere on the command line; everything that is not a
//! recognised flag is left for the command matcher in `main`.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use pulse_core::config::ClientConfig;

/// Flags that override the loaded configuration for one invocation.
#[derive(Debug, Default, PartialEq)]
pub struct Overrides {
    pub relay: Option<String>,
    pub chunk_size: Option<usize>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub debug: bool,
    /// Share link to join instead of opening a new session.
    pub join: Option<String>,
}

impl Overrides {
    pub fn apply(&self, client: &mut ClientConfig) {
        if let Some(relay) = &self.relay {
            client.relay_url = relay.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            client.chunk_size = chunk_size;
        }
        if let Some(timeout) = self.timeout {
            client.timeout_secs = timeout.as_secs().max(1);
        }
        if let Some(retries) = self.retries {
            client.retries = retries;
        }
        if self.debug {
            client.debug = true;
        }
    }
}

#[derive(Debug)]
pub struct Parsed {
    pub overrides: Overrides,
    pub remaining: Vec<String>,
}

pub fn parse(args: &[String]) -> Result<Parsed> {
    let mut overrides = Overrides::default();
    let mut remaining = Vec::new();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--debug" => overrides.debug = true,
            "--relay" => {
                i += 1;
                overrides.relay = Some(value(args, i, "--relay")?.to_string());
            }
            "--join" => {
                i += 1;
                overrides.join = Some(value(args, i, "--join")?.to_string());
            }
            "--chunk-size" => {
                i += 1;
                let n: usize = value(args, i, "--chunk-size")?
                    .parse()
                    .context("--chunk-size must be a number of bytes")?;
                if n == 0 {
                    bail!("--chunk-size must be greater than zero");
                }
                overrides.chunk_size = Some(n);
            }
            "--timeout" => {
                i += 1;
                overrides.timeout = Some(parse_duration(value(args, i, "--timeout")?)?);
            }
            "--retries" => {
                i += 1;
                overrides.retries = Some(
                    value(args, i, "--retries")?
                        .parse()
                        .context("--retries must be a number")?,
                );
            }
            other => remaining.push(other.to_string()),
        }
        i += 1;
    }

    Ok(Parsed {
        overrides,
        remaining,
    })
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

/// `90`, `90s`, `500ms`, `5m` or `1h`. A bare number is seconds.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let n: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration: {text:?}"))?;

    let duration = match unit {
        "" | "s" => Duration::from_secs(n),
        "ms" => Duration::from_millis(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        _ => bail!("invalid duration unit in {text:?} (use ms, s, m or h)"),
    };
    if duration.is_zero() {
        bail!("duration must be greater than zero");
    }
    Ok(duration)
}
