//! Token-budgeted compaction driven by TF-IDF importance scores.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;

use crate::tokens::{estimate_tokens, terms};

/// Anything the compressor can rank: a text body and a point in time.
pub trait Compactable {
    /// Text used for token estimation and scoring.
    fn text(&self) -> &str;

    /// Creation time used for recency ordering.
    fn timestamp(&self) -> SystemTime;
}

/// Summary of a single compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Messages handed to the compressor.
    pub input_messages: usize,
    /// Messages retained.
    pub output_messages: usize,
    /// Estimated tokens before compaction.
    pub input_tokens: usize,
    /// Estimated tokens after compaction.
    pub output_tokens: usize,
}

impl CompactionReport {
    /// Fraction of messages retained, `1.0` for an empty input.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.input_messages == 0 {
            1.0
        } else {
            self.output_messages as f64 / self.input_messages as f64
        }
    }
}

/// Compressor bound to a fixed token budget.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
/// use recall_compaction::{Compactable, ImportanceCompressor};
///
/// #[derive(Clone)]
/// struct Note(&'static str, u64);
///
/// impl Compactable for Note {
///     fn text(&self) -> &str { self.0 }
///     fn timestamp(&self) -> SystemTime { SystemTime::UNIX_EPOCH + Duration::from_secs(self.1) }
/// }
///
/// let notes = vec![Note("hello there", 1), Note("general kenobi", 2)];
/// let kept = ImportanceCompressor::new(1000).compress(&notes, 2);
/// assert_eq!(kept.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportanceCompressor {
    max_tokens: usize,
}

impl ImportanceCompressor {
    /// Creates a compressor with the given token budget.
    #[must_use]
    pub const fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Returns the configured token budget.
    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Compacts `messages`, always keeping the `min_keep` most recent ones.
    #[must_use]
    pub fn compress<T: Compactable + Clone>(&self, messages: &[T], min_keep: usize) -> Vec<T> {
        compress(messages, self.max_tokens, min_keep)
    }

    /// Same as [`compress`](Self::compress) but also reports what was dropped.
    #[must_use]
    pub fn compress_with_report<T: Compactable + Clone>(
        &self,
        messages: &[T],
        min_keep: usize,
    ) -> (Vec<T>, CompactionReport) {
        let input_tokens = total_tokens(messages);
        let kept = compress(messages, self.max_tokens, min_keep);
        let report = CompactionReport {
            input_messages: messages.len(),
            output_messages: kept.len(),
            input_tokens,
            output_tokens: total_tokens(&kept),
        };
        (kept, report)
    }
}

/// Reduces `messages` to fit `max_tokens`, preserving chronological order.
///
/// Inputs at or under budget, or no longer than `min_keep`, are returned
/// unchanged. Otherwise the `min_keep` most recent messages are reserved and
/// the remainder is admitted in descending score order until the first one
/// that would overflow the budget. The reserved set is never shrunk, so the
/// result may exceed `max_tokens` when the reserved messages alone do.
#[must_use]
pub fn compress<T: Compactable + Clone>(
    messages: &[T],
    max_tokens: usize,
    min_keep: usize,
) -> Vec<T> {
    if messages.len() <= min_keep {
        return messages.to_vec();
    }

    let costs: Vec<usize> = messages.iter().map(|m| estimate_tokens(m.text())).collect();
    if costs.iter().sum::<usize>() <= max_tokens {
        return messages.to_vec();
    }

    let scores = importance_scores(messages);

    let mut chronological: Vec<usize> = (0..messages.len()).collect();
    chronological.sort_by(|&a, &b| by_time(messages, a, b));

    let split = chronological.len() - min_keep;
    let mut selected: Vec<usize> = chronological[split..].to_vec();
    let mut used: usize = selected.iter().map(|&idx| costs[idx]).sum();

    let mut candidates: Vec<usize> = chronological[..split].to_vec();
    candidates.sort_unstable();
    candidates.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    for idx in candidates {
        if used + costs[idx] > max_tokens {
            break;
        }
        used += costs[idx];
        selected.push(idx);
    }

    selected.sort_by(|&a, &b| by_time(messages, a, b));

    debug!(
        fetched = messages.len(),
        kept = selected.len(),
        tokens = used,
        max_tokens,
        "compacted transcript"
    );

    selected.into_iter().map(|idx| messages[idx].clone()).collect()
}

fn by_time<T: Compactable>(messages: &[T], a: usize, b: usize) -> Ordering {
    messages[a]
        .timestamp()
        .cmp(&messages[b].timestamp())
        .then(a.cmp(&b))
}

fn total_tokens<T: Compactable>(messages: &[T]) -> usize {
    messages.iter().map(|m| estimate_tokens(m.text())).sum()
}

/// Sum of `tf * idf` over the distinct terms of each message.
#[allow(clippy::cast_precision_loss)]
fn importance_scores<T: Compactable>(messages: &[T]) -> Vec<f64> {
    let counts: Vec<(HashMap<&str, usize>, usize)> = messages
        .iter()
        .map(|m| {
            let tokens = terms(m.text());
            let total = tokens.len();
            let mut counts = HashMap::new();
            for term in tokens {
                *counts.entry(term).or_insert(0usize) += 1;
            }
            (counts, total)
        })
        .collect();

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for (term_counts, _) in &counts {
        for term in term_counts.keys() {
            *document_frequency.entry(*term).or_insert(0) += 1;
        }
    }

    let n = messages.len() as f64;
    counts
        .iter()
        .map(|(term_counts, total)| {
            if *total == 0 {
                return 0.0;
            }
            term_counts
                .iter()
                .map(|(term, count)| {
                    let tf = *count as f64 / *total as f64;
                    let idf = (n / document_frequency[term] as f64).ln();
                    tf * idf
                })
                .sum::<f64>()
        })
        .collect()
}
