// Gerrit REST API client
pub mod gerrit;
pub mod retry;
pub mod types;

// Re-export common types
pub use gerrit::{Credentials, GerritClient, GerritError};
pub use retry::RetryConfig;
pub use types::{
    AccountInfo, ApprovalInfo, ChangeInfo, ChangeMessageInfo, LabelInfo, QueryOption,
    RevisionInfo,
};
