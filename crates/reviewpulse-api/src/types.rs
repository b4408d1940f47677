use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Gerrit account as returned with `DETAILED_ACCOUNTS`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    #[serde(rename = "_account_id")]
    pub account_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// One entry of a change's message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMessageInfo {
    pub id: String,
    /// Absent for messages generated by the server itself
    #[serde(default)]
    pub author: Option<AccountInfo>,
    #[serde(with = "gerrit_timestamp")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    /// Set on messages posted by bots and automated tooling (`autogenerated:ci`)
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(rename = "_revision_number", default)]
    pub revision_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalInfo {
    #[serde(rename = "_account_id")]
    pub account_id: u64,
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default, with = "gerrit_timestamp::option")]
    pub date: Option<DateTime<Utc>>,
}

/// Label state with `DETAILED_LABELS`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelInfo {
    #[serde(default)]
    pub all: Vec<ApprovalInfo>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    #[serde(rename = "_number")]
    pub number: u32,
    #[serde(default, with = "gerrit_timestamp::option")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uploader: Option<AccountInfo>,
}

/// A change as returned by `GET /changes/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub id: String,
    #[serde(rename = "_number")]
    pub number: u64,
    pub project: String,
    pub branch: String,
    pub subject: String,
    pub status: String,
    pub owner: AccountInfo,
    #[serde(with = "gerrit_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "gerrit_timestamp")]
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChangeMessageInfo>,
    #[serde(default)]
    pub labels: HashMap<String, LabelInfo>,
    /// Keyed by reviewer state: `REVIEWER`, `CC`, `REMOVED`
    #[serde(default)]
    pub reviewers: HashMap<String, Vec<AccountInfo>>,
    #[serde(default)]
    pub revisions: HashMap<String, RevisionInfo>,
    #[serde(default)]
    pub current_revision: Option<String>,
}

/// Query options understood by `/changes/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    DetailedAccounts,
    DetailedLabels,
    Messages,
    CurrentRevision,
}

impl QueryOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOption::DetailedAccounts => "DETAILED_ACCOUNTS",
            QueryOption::DetailedLabels => "DETAILED_LABELS",
            QueryOption::Messages => "MESSAGES",
            QueryOption::CurrentRevision => "CURRENT_REVISION",
        }
    }
}

/// Gerrit timestamps look like `2024-01-31 12:00:00.000000000` and are always UTC
pub mod gerrit_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
    const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT).map(|naive| naive.and_utc())
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.format(WRITE_FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
