use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

pub type AccountId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            name: None,
            email: None,
            username: None,
        }
    }

    /// Best human-readable handle we have for this account
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

/// One entry of a change's message log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeMessage {
    pub id: String,
    /// Only messages generated by the server itself may lack an author
    pub author: Option<AccountId>,
    pub date: DateTime<Utc>,
    pub message: String,
    pub tag: Option<String>,
    pub revision_number: Option<u32>,
}

impl ChangeMessage {
    /// Tagged messages come from bots and CI, not from people
    pub fn is_robot(&self) -> bool {
        self.tag.as_deref().is_some_and(|tag| !tag.is_empty())
    }

    pub fn first_line(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub account: AccountId,
    pub value: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub votes: Vec<Vote>,
}

/// How a reviewer relates to a change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerState {
    Reviewer,
    Cc,
    Removed,
}

impl ReviewerState {
    pub fn from_gerrit(state: &str) -> Option<Self> {
        match state {
            "REVIEWER" => Some(ReviewerState::Reviewer),
            "CC" => Some(ReviewerState::Cc),
            "REMOVED" => Some(ReviewerState::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Revision {
    /// Sequential patch set number, starting at 1
    pub number: u32,
}

/// A change under review, as far as trending is concerned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub id: String,
    pub number: u64,
    pub project: String,
    pub branch: String,
    pub subject: String,
    pub owner: Account,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChangeMessage>,
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
    #[serde(default)]
    pub reviewers: BTreeMap<ReviewerState, Vec<Account>>,
    #[serde(default)]
    pub revisions: BTreeMap<String, Revision>,
    #[serde(default)]
    pub current_revision: Option<String>,
    /// Only meaningful right after a scoring pass
    #[serde(default)]
    pub trending_score: u32,
}

impl Change {
    /// Patch set number of the current revision, 0 when unknown
    pub fn current_patch_set(&self) -> u32 {
        self.current_revision
            .as_ref()
            .and_then(|rev| self.revisions.get(rev))
            .map(|rev| rev.number)
            .unwrap_or(0)
    }

    /// Messages written by people
    pub fn human_messages(&self) -> impl Iterator<Item = &ChangeMessage> {
        self.messages.iter().filter(|m| !m.is_robot())
    }

    /// Reviewers that are still attached to the change
    pub fn active_reviewer_count(&self) -> usize {
        self.reviewers
            .iter()
            .filter(|(state, _)| **state != ReviewerState::Removed)
            .map(|(_, accounts)| accounts.len())
            .sum()
    }

    /// Reject records the scorer cannot interpret
    pub fn validate(&self) -> Result<()> {
        if let Some(msg) = self.human_messages().find(|m| m.author.is_none()) {
            return Err(Error::MalformedChange {
                change: self.id.clone(),
                reason: format!("message {} has no author", msg.id),
            });
        }
        Ok(())
    }
}
