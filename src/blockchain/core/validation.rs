use serde::{Deserialize, Serialize};
use std::fmt;

use super::chain::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// Recomputing the hash over the block's fields gives a different value.
    HashMismatch,
    /// `previous_hash` differs from the preceding block's stored hash.
    BrokenLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIssue {
    pub index: u64,
    pub kind: IssueKind,
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            IssueKind::HashMismatch => write!(f, "block {} hash mismatch", self.index),
            IssueKind::BrokenLink => write!(f, "block {} previous_hash mismatch", self.index),
        }
    }
}

/// Check every block after genesis against its own hash and its
/// predecessor's. Read-only; an empty result means the chain is intact.
pub fn validate_chain(chain: &[Block]) -> Vec<ChainIssue> {
    let mut issues = Vec::new();
    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        // A block that cannot be hashed cannot match its stored hash either.
        let recomputed = current.calculate_hash().ok();
        if recomputed.as_deref() != Some(current.hash.as_str()) {
            issues.push(ChainIssue {
                index: current.index,
                kind: IssueKind::HashMismatch,
            });
        }

        if current.previous_hash != previous.hash {
            issues.push(ChainIssue {
                index: current.index,
                kind: IssueKind::BrokenLink,
            });
        }
    }
    issues
}

pub fn is_chain_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_empty()
}
