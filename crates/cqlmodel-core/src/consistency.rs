//! Consistency levels and per-call options.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The durability/visibility guarantee requested for one read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl ConsistencyLevel {
    /// Get the CQL name of this level.
    pub const fn as_cql(&self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cql())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ANY" => Ok(ConsistencyLevel::Any),
            "ONE" => Ok(ConsistencyLevel::One),
            "TWO" => Ok(ConsistencyLevel::Two),
            "THREE" => Ok(ConsistencyLevel::Three),
            "QUORUM" => Ok(ConsistencyLevel::Quorum),
            "ALL" => Ok(ConsistencyLevel::All),
            "LOCAL_QUORUM" => Ok(ConsistencyLevel::LocalQuorum),
            "EACH_QUORUM" => Ok(ConsistencyLevel::EachQuorum),
            "LOCAL_ONE" => Ok(ConsistencyLevel::LocalOne),
            "SERIAL" => Ok(ConsistencyLevel::Serial),
            "LOCAL_SERIAL" => Ok(ConsistencyLevel::LocalSerial),
            other => Err(Error::config(format!(
                "'{other}' is not a valid consistency level"
            ))),
        }
    }
}

/// Parse a per-table consistency map written as `"table1:QUORUM,table2:ONE"`.
///
/// Blank input yields an empty map.
pub fn parse_consistency_map(text: &str) -> Result<HashMap<String, ConsistencyLevel>> {
    let mut map = HashMap::new();
    for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((table, level)) = entry.split_once(':') else {
            return Err(Error::config(format!(
                "Invalid consistency map entry '{entry}', expected 'table:LEVEL'"
            )));
        };
        let table = table.trim();
        if table.is_empty() {
            return Err(Error::config(format!(
                "Invalid consistency map entry '{entry}', table name is blank"
            )));
        }
        map.insert(table.to_string(), level.parse()?);
    }
    Ok(map)
}

/// Per-call options.
///
/// Every field is either absent (defer to the configured default) or an
/// explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Options {
    consistency: Option<ConsistencyLevel>,
    ttl: Option<u32>,
    timestamp: Option<i64>,
}

impl Options {
    /// Options with every field absent.
    pub const fn none() -> Self {
        Self {
            consistency: None,
            ttl: None,
            timestamp: None,
        }
    }

    /// Start building options.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Options carrying only a consistency level.
    pub const fn with_consistency(level: ConsistencyLevel) -> Self {
        Self {
            consistency: Some(level),
            ttl: None,
            timestamp: None,
        }
    }

    /// The explicit consistency level, if any.
    pub const fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    /// The explicit time-to-live in seconds, if any.
    pub const fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    /// The explicit write timestamp in microseconds, if any.
    pub const fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Whether a consistency level was given explicitly.
    pub const fn has_consistency(&self) -> bool {
        self.consistency.is_some()
    }

    /// Copy of these options with the consistency level replaced.
    pub const fn duplicate_with_consistency(&self, level: ConsistencyLevel) -> Self {
        Self {
            consistency: Some(level),
            ttl: self.ttl,
            timestamp: self.timestamp,
        }
    }

    /// Copy of these options with a fresh write timestamp.
    pub const fn duplicate_with_new_timestamp(&self, timestamp: i64) -> Self {
        Self {
            consistency: self.consistency,
            ttl: self.ttl,
            timestamp: Some(timestamp),
        }
    }

    /// Copy of these options without a consistency level.
    pub const fn without_consistency(&self) -> Self {
        Self {
            consistency: None,
            ttl: self.ttl,
            timestamp: self.timestamp,
        }
    }
}

/// Builder for [`Options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the consistency level.
    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.options.consistency = Some(level);
        self
    }

    /// Set the time-to-live in seconds.
    pub fn ttl(mut self, seconds: u32) -> Self {
        self.options.ttl = Some(seconds);
        self
    }

    /// Set the write timestamp in microseconds.
    pub fn timestamp(mut self, micros: i64) -> Self {
        self.options.timestamp = Some(micros);
        self
    }

    /// Finish building.
    pub fn build(self) -> Options {
        self.options
    }
}
