// Gerrit provider - bridges the REST client with the ChangeSource trait
use async_trait::async_trait;
use reviewpulse_api::{
    AccountInfo, ChangeInfo, ChangeMessageInfo, GerritClient, QueryOption,
};
use tracing::debug;

use crate::{
    models::{Account, Change, ChangeMessage, Label, ReviewerState, Revision, Vote},
    source::ChangeSource,
    Result,
};

/// Everything the scorer reads has to be requested explicitly
const TRENDING_OPTIONS: &[QueryOption] = &[
    QueryOption::DetailedAccounts,
    QueryOption::DetailedLabels,
    QueryOption::Messages,
    QueryOption::CurrentRevision,
];

pub struct GerritProvider {
    client: GerritClient,
}

impl GerritProvider {
    pub fn new(client: GerritClient) -> Self {
        Self { client }
    }

    /// Stable identifier for the signed-in account, e.g. `1000096@review.example.org`
    ///
    /// Anonymous sessions share the `anonymous@<host>` identity.
    pub async fn account_key(&self) -> Result<String> {
        let host = host_of(self.client.base_url());
        match self.client.get_self_account().await {
            Ok(account) => Ok(format!("{}@{}", account.account_id, host)),
            Err(reviewpulse_api::GerritError::AuthRequired) => {
                debug!("No credentials, using anonymous cache identity");
                Ok(format!("anonymous@{}", host))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ChangeSource for GerritProvider {
    async fn fetch_page(&self, query: &str, page_size: u32, offset: u32) -> Result<Vec<Change>> {
        let changes = self
            .client
            .query_changes(query, page_size, offset, TRENDING_OPTIONS)
            .await?;

        Ok(changes.into_iter().map(gerrit_to_change).collect())
    }
}

fn host_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

fn account_from(info: AccountInfo) -> Account {
    Account {
        id: info.account_id,
        name: info.name,
        email: info.email,
        username: info.username,
    }
}

fn message_from(info: ChangeMessageInfo) -> ChangeMessage {
    ChangeMessage {
        id: info.id,
        author: info.author.map(|a| a.account_id),
        date: info.date,
        message: info.message,
        tag: info.tag,
        revision_number: info.revision_number,
    }
}

/// Convert a Gerrit ChangeInfo into our internal Change model
fn gerrit_to_change(info: ChangeInfo) -> Change {
    let labels = info
        .labels
        .into_iter()
        .map(|(name, label)| {
            let votes = label
                .all
                .into_iter()
                .filter_map(|approval| {
                    approval.value.map(|value| Vote {
                        account: approval.account_id,
                        value,
                    })
                })
                .collect();
            (name, Label { votes })
        })
        .collect();

    let reviewers = info
        .reviewers
        .into_iter()
        .filter_map(|(state, accounts)| match ReviewerState::from_gerrit(&state) {
            Some(state) => Some((state, accounts.into_iter().map(account_from).collect())),
            None => {
                debug!("Ignoring unknown reviewer state {}", state);
                None
            }
        })
        .collect();

    let revisions = info
        .revisions
        .into_iter()
        .map(|(sha, rev)| (sha, Revision { number: rev.number }))
        .collect();

    Change {
        id: info.id,
        number: info.number,
        project: info.project,
        branch: info.branch,
        subject: info.subject,
        owner: account_from(info.owner),
        created: info.created,
        updated: info.updated,
        messages: info.messages.into_iter().map(message_from).collect(),
        labels,
        reviewers,
        revisions,
        current_revision: info.current_revision,
        trending_score: 0,
    }
}
