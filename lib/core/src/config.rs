// Option strings handed over by the CLI: "key1=val1,key2=val2"

use crate::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Estimator options, keyed by option name
pub type Options = HashMap<String, String>;

pub const OPT_CONCURRENCY: &str = "concurrency";

pub fn parse_options(s: &str) -> Result<Options> {
    parse_options_with(s, ',')
}

/// Split `s` on `separator` into `key=value` pairs. Blank entries are skipped.
pub fn parse_options_with(s: &str, separator: char) -> Result<Options> {
    let mut options = Options::new();
    for entry in s.split(separator) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::InvalidConfig(format!("option {:?} is not of the form key=value", entry))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidConfig(format!("option {:?} has an empty key", entry)));
        }
        options.insert(key.to_string(), value.trim().to_string());
    }
    Ok(options)
}

/// Parse an optional typed option
pub fn parse_option<T>(options: &Options, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match options.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("option {}={:?}: {}", key, raw, e))),
    }
}

/// Parse a required option; absence fails with [`Error::MissingOption`]
pub fn require_option<'a>(options: &'a Options, key: &str) -> Result<&'a str> {
    options
        .get(key)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MissingOption(key.to_string()))
}

/// The `concurrency` option, which must be a positive integer
pub fn parse_concurrency(options: &Options) -> Result<Option<usize>> {
    match parse_option::<usize>(options, OPT_CONCURRENCY)? {
        Some(0) => Err(Error::InvalidConfig("concurrency must be positive".to_string())),
        other => Ok(other),
    }
}
