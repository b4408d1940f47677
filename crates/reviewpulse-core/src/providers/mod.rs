// Change sources backed by real review servers
pub mod gerrit;

pub use gerrit::GerritProvider;
