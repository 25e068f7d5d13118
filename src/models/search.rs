use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::commit::CommitDoc;

/// The three retrieval methods fused by hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retriever {
    Lexical,
    Dense,
    Sparse,
}

impl Retriever {
    pub const ALL: [Retriever; 3] = [Self::Lexical, Self::Dense, Self::Sparse];
}

impl fmt::Display for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => write!(f, "lexical"),
            Self::Dense => write!(f, "dense"),
            Self::Sparse => write!(f, "sparse"),
        }
    }
}

/// One candidate returned by a single retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverHit {
    pub doc_id: String,
    /// 1-indexed position in the retriever's list
    pub rank: usize,
    pub raw_score: f64,
    /// Commit time of the document, used for tie-breaking
    pub timestamp: i64,
}

/// A retriever's ranked output, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub retriever: Retriever,
    pub hits: Vec<RetrieverHit>,
}

/// Ranks a fused document held in each retriever (absent = not returned).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributingRanks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<usize>,
}

impl ContributingRanks {
    pub fn get(&self, retriever: Retriever) -> Option<usize> {
        match retriever {
            Retriever::Lexical => self.lexical,
            Retriever::Dense => self.dense,
            Retriever::Sparse => self.sparse,
        }
    }

    fn slot(&mut self, retriever: Retriever) -> &mut Option<usize> {
        match retriever {
            Retriever::Lexical => &mut self.lexical,
            Retriever::Dense => &mut self.dense,
            Retriever::Sparse => &mut self.sparse,
        }
    }

    /// Record `rank` for `retriever`, keeping the best rank if already set.
    pub fn record(&mut self, retriever: Retriever, rank: usize) -> bool {
        let slot = self.slot(retriever);
        if slot.is_some_and(|existing| existing <= rank) {
            return false;
        }
        *slot = Some(rank);
        true
    }
}

/// A document after Reciprocal Rank Fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub doc_id: String,
    pub fused_score: f64,
    pub contributing_ranks: ContributingRanks,
    pub timestamp: i64,
}

/// A retriever that did not contribute to a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableRetriever {
    pub retriever: Retriever,
    pub reason: String,
}

/// Fused results plus degradation metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<FusedResult>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unavailable: Vec<UnavailableRetriever>,
}

/// A fused result enriched with the commit it refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCommit {
    #[serde(flatten)]
    pub fused: FusedResult,
    pub message: String,
    pub author: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCount {
    pub path: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: usize,
}

/// Response envelope for `search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub repo_id: String,
    pub results: Vec<RankedCommit>,
    /// Files most often touched by the returned commits
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub impacted_files: Vec<PathCount>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub top_authors: Vec<AuthorCount>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unavailable: Vec<UnavailableRetriever>,
}

/// A commit as listed by `history`, without its embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: i64,
    pub author: String,
    pub message: String,
    pub files: Vec<String>,
}

impl From<CommitDoc> for HistoryEntry {
    fn from(doc: CommitDoc) -> Self {
        Self {
            id: doc.id,
            timestamp: doc.timestamp,
            author: doc.author,
            message: doc.message,
            files: doc.files,
        }
    }
}

/// Response envelope for `history`: commits touching one file, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHistory {
    pub repo_id: String,
    pub file_path: String,
    pub commits: Vec<HistoryEntry>,
}
