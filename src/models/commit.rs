use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A commit as delivered by the ledger reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Stable unique id (content hash)
    pub id: String,
    /// Commit time, unix seconds
    pub timestamp: i64,
    pub author: String,
    #[serde(default)]
    pub message: String,
    pub files: BTreeSet<String>,
}

impl Commit {
    pub fn new<I, S>(id: &str, timestamp: i64, author: &str, message: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.to_string(),
            timestamp,
            author: author.to_string(),
            message: message.to_string(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Reason this commit cannot be used by the engine, if any.
    pub fn validate(&self) -> Option<&'static str> {
        if self.id.trim().is_empty() {
            Some("missing commit id")
        } else if self.author.trim().is_empty() {
            Some("missing author")
        } else if self.files.is_empty() {
            Some("commit touches no files")
        } else {
            None
        }
    }
}

/// The indexed form of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDoc {
    pub id: String,
    pub timestamp: i64,
    pub author: String,
    pub message: String,
    pub files: Vec<String>,
    /// Dense embedding of the message; absent when the embedder failed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
}

impl CommitDoc {
    pub fn from_commit(commit: &Commit, embedding: Option<Vec<f32>>) -> Self {
        Self {
            id: commit.id.clone(),
            timestamp: commit.timestamp,
            author: commit.author.clone(),
            message: commit.message.clone(),
            files: commit.files.iter().cloned().collect(),
            embedding,
        }
    }
}

/// Commits read from a ledger source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerRead {
    /// Oldest first
    pub commits: Vec<Commit>,
    /// Entries dropped as malformed
    pub skipped: usize,
}
