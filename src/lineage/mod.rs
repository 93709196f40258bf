//! Token creation and provenance tracking.
//!
//! One registry owns every token record for the run, keyed by id; buffers
//! and ledgers refer to tokens by id only. Provenance therefore survives
//! buffer eviction and ledger truncation, and there is exactly one place a
//! token's lineage can live.

pub mod trace;

use crate::graph::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// A unique, stable identifier for a token within one run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One movement or consumption event in a token's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHop {
    pub tick: u64,
    pub node: NodeId,
    pub detail: String,
}

/// The full record of a token. Identity is immutable; only `history` grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub value: Value,
    pub created_at: u64,
    pub origin: NodeId,
    /// Tokens consumed to produce this one, in consumption order.
    pub sources: Vec<TokenId>,
    /// 0 for root tokens, max(sources) + 1 otherwise.
    pub generation: u32,
    /// The generation-0 ancestors this token ultimately derives from.
    /// Empty for root tokens (a root is its own ultimate source).
    pub ultimate_sources: Vec<TokenId>,
    pub history: Vec<TokenHop>,
}

/// The per-run token registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LineageTracker {
    records: HashMap<TokenId, TokenRecord>,
    next_id: u64,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token, deriving its lineage purely from the sources'
    /// previously recorded lineage. A source id with no record is treated
    /// as an ultimate source itself.
    pub fn create(
        &mut self,
        origin: &NodeId,
        value: Value,
        tick: u64,
        sources: &[TokenId],
    ) -> TokenId {
        let id = TokenId(self.next_id);
        self.next_id += 1;

        let generation = if sources.is_empty() {
            0
        } else {
            sources
                .iter()
                .map(|s| self.records.get(s).map(|r| r.generation).unwrap_or(0))
                .max()
                .unwrap_or(0)
                + 1
        };

        let mut ultimate = Vec::new();
        let mut seen = HashSet::new();
        for &source in sources {
            match self.records.get(&source) {
                Some(rec) if !rec.ultimate_sources.is_empty() => {
                    for &u in &rec.ultimate_sources {
                        if seen.insert(u) {
                            ultimate.push(u);
                        }
                    }
                }
                // Root token, or an id the registry never saw: the source
                // itself is the ultimate origin.
                _ => {
                    if seen.insert(source) {
                        ultimate.push(source);
                    }
                }
            }
        }

        self.records.insert(
            id,
            TokenRecord {
                id,
                value,
                created_at: tick,
                origin: origin.clone(),
                sources: sources.to_vec(),
                generation,
                ultimate_sources: ultimate,
                history: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&TokenRecord> {
        self.records.get(&id)
    }

    /// Appends to a token's movement history. Returns false for an unknown
    /// id so the caller can capture the defect instead of panicking.
    pub fn record_hop(&mut self, id: TokenId, tick: u64, node: &NodeId, detail: impl Into<String>) -> bool {
        match self.records.get_mut(&id) {
            Some(rec) => {
                rec.history.push(TokenHop {
                    tick,
                    node: node.clone(),
                    detail: detail.into(),
                });
                true
            }
            None => false,
        }
    }

    /// Every ancestor of the token (excluding itself), breadth-first.
    pub fn ancestry(&self, id: TokenId) -> Vec<TokenId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TokenId> = self
            .records
            .get(&id)
            .map(|r| r.sources.iter().copied().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                out.push(next);
                if let Some(rec) = self.records.get(&next) {
                    queue.extend(rec.sources.iter().copied());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.next_id = 0;
    }
}
