//! Log severity and per-scope level filtering.
//!
//! Log lines carry a scope: a component name ("connection", "control") or
//! a channel name. The remote controller can raise or lower the severity
//! threshold of any scope prefix at runtime through the `loglevel`
//! configuration command, so the chatty per-channel paths gate on
//! [`enabled`] before emitting their `tracing` events. Everything else
//! logs through plain `tracing` macros and is filtered by the subscriber
//! as usual.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use parking_lot::RwLock;
use thiserror::Error;

/// Severity of a log line, ordered from chattiest to most severe.
///
/// The numeric codes are the ones the wire protocol uses for the
/// `loglevel` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// The protocol-level numeric code.
    pub const fn code(self) -> u32 {
        match self {
            Severity::Trace => 0,
            Severity::Debug => 10,
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Fatal => 50,
        }
    }

    /// Map a numeric code to the enclosing severity band.
    pub fn from_code(code: u32) -> Severity {
        match code {
            0..=9 => Severity::Trace,
            10..=19 => Severity::Debug,
            20..=29 => Severity::Info,
            30..=39 => Severity::Warning,
            40..=49 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Error parsing a severity name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown severity name: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Severity, ParseSeverityError> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

fn registry() -> &'static RwLock<HashMap<String, Severity>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Severity>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Set the severity threshold for a scope prefix.
pub fn set_level(scope: &str, level: Severity) {
    registry().write().insert(scope.to_string(), level);
}

/// The effective threshold for a scope: the entry with the longest prefix
/// match wins; scopes with no matching entry default to `Info`.
pub fn level_for(scope: &str) -> Severity {
    let registry = registry().read();
    let mut level = Severity::Info;
    let mut longest = None;
    for (prefix, &entry) in registry.iter() {
        if scope.starts_with(prefix.as_str()) && longest.map_or(true, |l| prefix.len() >= l) {
            longest = Some(prefix.len());
            level = entry;
        }
    }
    level
}

/// Whether a line of the given severity should be emitted for a scope.
pub fn enabled(scope: &str, severity: Severity) -> bool {
    severity >= level_for(scope)
}

/// Install a `tracing` fmt subscriber honoring `RUST_LOG` (default
/// `info`). Safe to call repeatedly; only the first call takes effect.
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_codes() {
        assert_eq!(Severity::Trace.code(), 0);
        assert_eq!(Severity::Fatal.code(), 50);
        assert_eq!(Severity::from_code(20), Severity::Info);
        assert_eq!(Severity::from_code(35), Severity::Warning);
        assert_eq!(Severity::from_code(99), Severity::Fatal);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("TRACE".parse(), Ok(Severity::Trace));
        assert_eq!("warn".parse(), Ok(Severity::Warning));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Error > Severity::Info);
    }

    #[test]
    fn test_scope_prefix_match() {
        set_level("chan.alpha", Severity::Debug);
        set_level("chan", Severity::Error);

        // longest matching prefix wins
        assert_eq!(level_for("chan.alpha.sub"), Severity::Debug);
        assert_eq!(level_for("chan.beta"), Severity::Error);
        // unrelated scopes keep the default
        assert_eq!(level_for("other"), Severity::Info);

        assert!(enabled("chan.alpha", Severity::Debug));
        assert!(!enabled("chan.beta", Severity::Warning));
        assert!(enabled("other", Severity::Info));
    }
}
