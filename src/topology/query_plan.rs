//! Per-request candidate ordering.
//!
//! A `QueryPlan` is an immutable snapshot of membership taken for one
//! request: active nodes first, quarantined nodes last, each group shuffled
//! independently so concurrent requests spread over the cluster instead of
//! hammering the same head of the list.

use crate::error::{ClientError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use url::Url;

/// Ordered iterator over candidate nodes for a single request.
///
/// Not thread-safe; a plan belongs to one request at a time.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    nodes: Vec<Url>,
    cursor: usize,
}

impl QueryPlan {
    /// Builds a plan with fresh shuffle entropy.
    pub fn new(active: &[Url], quarantined: &[Url]) -> Self {
        Self::shuffled(active, quarantined, &mut rand::rng())
    }

    /// Builds a plan with a caller-supplied shuffle seed, for reproducible
    /// orderings.
    pub fn with_seed(active: &[Url], quarantined: &[Url], seed: u64) -> Self {
        Self::shuffled(active, quarantined, &mut StdRng::seed_from_u64(seed))
    }

    fn shuffled<R: Rng + ?Sized>(active: &[Url], quarantined: &[Url], rng: &mut R) -> Self {
        let mut nodes = active.to_vec();
        nodes.shuffle(rng);
        let mut tail = quarantined.to_vec();
        tail.shuffle(rng);
        nodes.append(&mut tail);
        Self { nodes, cursor: 0 }
    }

    /// Total number of candidates in the plan.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Candidates not yet yielded.
    pub fn remaining(&self) -> usize {
        self.nodes.len() - self.cursor
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.nodes.len()
    }

    /// Yields the next candidate; fails with [`ClientError::Exhausted`]
    /// once all candidates have been yielded. Check `has_next` first.
    pub fn next(&mut self) -> Result<&Url> {
        if self.cursor >= self.nodes.len() {
            return Err(ClientError::Exhausted);
        }
        let node = &self.nodes[self.cursor];
        self.cursor += 1;
        Ok(node)
    }

    /// Rewinds the plan to its first candidate, keeping the ordering.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
