// SPDX-License-Identifier: GPL-2.0-or-later

pub mod path;

pub use path::{ObjectPath, ParseObjectPathError};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, convert::TryFrom, ops::Deref, path::Path, str::FromStr, sync::Arc};
use thiserror::Error;

/// Configuration surface every component reads from. Implemented once by
/// `env::EnvConf` and by test fixtures that need a config without touching disk.
pub type DynEnvConfig = Box<dyn EnvConfig + Send + Sync>;

pub trait EnvConfig {
    fn listen_addr(&self) -> &str;
    fn max_manifest_segments(&self) -> usize;
    fn max_manifest_size(&self) -> ByteSize;
    fn min_segment_size(&self) -> ByteSize;
    fn max_get_time(&self) -> std::time::Duration;
    fn rate_limit_after_segment(&self) -> usize;
    fn rate_limit_segments_per_sec(&self) -> u32;
    fn max_buffered_delete_segments(&self) -> usize;
    fn storage_dir(&self) -> &Path;
    fn raw(&self) -> &str;
}

pub type ArcLogger = Arc<dyn ILogger + Send + Sync>;

pub trait ILogger {
    /// Send log.
    fn log(&self, _: LogEntry) {}
}

/// Log entry. See `log::LogEntryWithTime`.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub source: LogSource,
    pub message: LogMessage,
}

impl LogEntry {
    #[allow(clippy::unwrap_used, clippy::needless_pass_by_value)]
    #[must_use]
    pub fn new(level: LogLevel, source: &'static str, message: String) -> Self {
        let source: LogSource = source
            .to_owned()
            .try_into()
            .expect("source should be valid");
        let message = match LogMessage::try_from(message) {
            Ok(v) => v,
            Err(e) => LogMessage::try_from(format!("bad message: {e}"))
                .expect("error message should be a valid log message"),
        };
        Self {
            level,
            source,
            message,
        }
    }
}

/// Severity of the log message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Something requires attention.
    Error,

    /// Something may require attention.
    Warning,

    /// Standard information.
    Info,

    /// Verbose debugging information.
    Debug,
}

#[derive(Debug, Error)]
pub enum ParseLogLevelError {
    #[error("unknown log level: '{0}'")]
    UnknownLevel(String),
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogLevel::Error),
            "warning" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ParseLogLevelError::UnknownLevel(s.to_owned())),
        }
    }
}

#[macro_export]
macro_rules! impl_deserialize_try_from_and_display {
    ($type:ident) => {
        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                String::deserialize(deserializer)?
                    .try_into()
                    .map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub const LOG_SOURCE_MAX_LENGTH: usize = 8;

#[repr(transparent)]
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub struct LogSource(Cow<'static, str>);
impl_deserialize_try_from_and_display!(LogSource);

impl LogSource {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseLogSourceError {
    #[error("empty string")]
    Empty,

    #[error("invalid characters: '{0}'")]
    InvalidChars(String),

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for LogSource {
    type Error = ParseLogSourceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseLogSourceError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.chars().all(char::is_alphanumeric) {
            return Err(InvalidChars(s));
        }
        if s.len() > LOG_SOURCE_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(Cow::Owned(s)))
    }
}

impl TryFrom<&'static str> for LogSource {
    type Error = ParseLogSourceError;

    fn try_from(s: &'static str) -> Result<Self, Self::Error> {
        use ParseLogSourceError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.chars().all(char::is_alphanumeric) {
            return Err(InvalidChars(s.to_owned()));
        }
        if s.len() > LOG_SOURCE_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(Cow::Borrowed(s)))
    }
}

impl Deref for LogSource {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[repr(transparent)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LogMessage(String);
impl_deserialize_try_from_and_display!(LogMessage);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseLogMessageError {
    #[error("empty string")]
    Empty,

    #[error("too long")]
    TooLong,
}

const LOG_MESSAGE_MAX_LENGTH: usize = 1024 * 4;

impl TryFrom<String> for LogMessage {
    type Error = ParseLogMessageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(ParseLogMessageError::Empty);
        }
        if s.len() > LOG_MESSAGE_MAX_LENGTH {
            return Err(ParseLogMessageError::TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for LogMessage {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DummyLogger;

impl DummyLogger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(DummyLogger {})
    }
}

impl ILogger for DummyLogger {
    fn log(&self, _: LogEntry) {}
}

/// A closed byte interval `[start, end]`, always satisfying `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseByteRangeError {
    #[error("missing '-'")]
    MissingDash,

    #[error("invalid integer")]
    InvalidInteger,

    #[error("start after end")]
    StartAfterEnd,

    #[error("empty range")]
    Empty,

    #[error("range starts at or after segment size {0}")]
    StartBeyondSize(u64),
}

impl ByteRange {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Option<Self> {
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Parses the client-facing "M-N" / "M-" / "-N" textual form against a
    /// known total length, producing concrete endpoints.
    pub fn parse(s: &str, size: u64) -> Result<Self, ParseByteRangeError> {
        use ParseByteRangeError::*;
        let i = s.find('-').ok_or(MissingDash)?;
        let start_s = &s[..i];
        let end_s = &s[i + 1..];

        if start_s.is_empty() && end_s.is_empty() {
            return Err(Empty);
        }

        if start_s.is_empty() {
            // Suffix-length form: last N bytes.
            let n: u64 = end_s.parse().map_err(|_| InvalidInteger)?;
            let n = n.min(size);
            return Ok(Self {
                start: size.saturating_sub(n),
                end: size.saturating_sub(1),
            });
        }

        let start: u64 = start_s.parse().map_err(|_| InvalidInteger)?;
        if start >= size {
            return Err(StartBeyondSize(size));
        }

        let end = if end_s.is_empty() {
            size - 1
        } else {
            let e: u64 = end_s.parse().map_err(|_| InvalidInteger)?;
            e.min(size - 1)
        };

        if start > end {
            return Err(StartAfterEnd);
        }

        Ok(Self { start, end })
    }

    /// Renders back to the canonical "A-B" stored form.
    #[must_use]
    pub fn to_stored_string(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// Parses the canonical stored "A-B" form (both endpoints always concrete).
    pub fn parse_stored(s: &str) -> Option<Self> {
        let (a, b) = s.split_once('-')?;
        let start: u64 = a.parse().ok()?;
        let end: u64 = b.parse().ok()?;
        Self::new(start, end)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_message() {
        LogMessage::try_from("abc".to_owned()).unwrap();
        LogMessage::try_from("123".to_owned()).unwrap();
        LogMessage::try_from("a-a".to_owned()).unwrap();

        LogMessage::try_from(String::new()).unwrap_err();
    }

    #[test]
    fn test_byte_range_parse_start_end() {
        let r = ByteRange::parse("0-499", 1000).unwrap();
        assert_eq!((0, 499), (r.start(), r.end()));
    }

    #[test]
    fn test_byte_range_parse_start_only() {
        let r = ByteRange::parse("500-", 1000).unwrap();
        assert_eq!((500, 999), (r.start(), r.end()));
    }

    #[test]
    fn test_byte_range_parse_suffix() {
        let r = ByteRange::parse("-100", 1000).unwrap();
        assert_eq!((900, 999), (r.start(), r.end()));
    }

    #[test]
    fn test_byte_range_parse_clamps_end() {
        let r = ByteRange::parse("0-9999", 1000).unwrap();
        assert_eq!((0, 999), (r.start(), r.end()));
    }

    #[test]
    fn test_byte_range_parse_start_beyond_size() {
        assert_eq!(
            Err(ParseByteRangeError::StartBeyondSize(1000)),
            ByteRange::parse("1000-", 1000)
        );
    }

    #[test]
    fn test_byte_range_whole_object_round_trip() {
        let r = ByteRange::new(0, 999).unwrap();
        assert_eq!(Some(r), ByteRange::parse_stored(&r.to_stored_string()));
    }
}
