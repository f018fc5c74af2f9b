//! Key layout for usage counters.
//!
//! ```text
//! {prefix}__clients                          client index (list)
//! {prefix}__functions                        function index (list)
//! {prefix}__{client}__{service}__{method}    all-time counter
//! {prefix}__{client}__{service}__{method}__{MM_DD_HH}   hourly counter
//! ```
//!
//! The hourly label encodes month, day and hour only, so a label comes round
//! again a year later; hourly keys expire one day after their hour opens.

use chrono::{DateTime, Duration, DurationRound, Utc};

const CLIENT_INDEX: &str = "clients";
const FUNCTION_INDEX: &str = "functions";
const BUCKET_LABEL_FORMAT: &str = "%m_%d_%H";

/// Namespace and delimiter shared by every counter key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    delimiter: String,
}

impl KeySpace {
    #[must_use]
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: delimiter.into(),
        }
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push_str(&self.delimiter);
            key.push_str(part);
        }
        key
    }

    /// Key of the list of client identifiers ever recorded.
    #[must_use]
    pub fn client_index(&self) -> String {
        self.join(&[CLIENT_INDEX])
    }

    /// Key of the list of `service{d}method` pairs ever recorded.
    #[must_use]
    pub fn function_index(&self) -> String {
        self.join(&[FUNCTION_INDEX])
    }

    /// The function identifier stored in the function index.
    #[must_use]
    pub fn function(&self, service: &str, method: &str) -> String {
        format!("{service}{}{method}", self.delimiter)
    }

    /// All-time counter key for a client and function identifier.
    #[must_use]
    pub fn total(&self, client: &str, function: &str) -> String {
        self.join(&[client, function])
    }

    /// Hourly counter key for a client and function identifier.
    #[must_use]
    pub fn hourly(&self, client: &str, function: &str, label: &str) -> String {
        self.join(&[client, function, label])
    }
}

/// Label of the hour bucket containing `at`.
#[must_use]
pub fn bucket_label(at: DateTime<Utc>) -> String {
    at.format(BUCKET_LABEL_FORMAT).to_string()
}

/// Label of the bucket `hours_back` hours before the one containing `at`.
#[must_use]
pub fn bucket_label_back(at: DateTime<Utc>, hours_back: u32) -> String {
    bucket_label(at - Duration::hours(i64::from(hours_back)))
}

/// Expiry (Unix seconds) for the hourly counter whose bucket contains `at`:
/// the same hour on the following day.
#[must_use]
pub fn bucket_expiry(at: DateTime<Utc>) -> i64 {
    let hour_start = at.duration_trunc(Duration::hours(1)).unwrap_or(at);
    (hour_start + Duration::days(1)).timestamp()
}
