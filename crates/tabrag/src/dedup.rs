//! Three-tier duplicate detection over chunks.
//!
//! Tier 1 is an exact hash over normalized text, tier 2 a shingle-based
//! fuzzy hash that catches reorderings and light edits, tier 3 a blended
//! similarity score. Cheaper tiers short-circuit the expensive one; a
//! tier-2 hash collision is only a candidate and is always confirmed by
//! the tier-3 score before two chunks are grouped.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::Chunk;

const SHINGLE_LEN: usize = 5;
const MAX_SHINGLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Keep the earliest member of each group.
    KeepFirst,
    /// Keep the member carrying the most metadata; ties go to input order.
    KeepBest,
    /// Keep the earliest member but absorb metadata its duplicates have
    /// and it lacks.
    Merge,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub kept: String,
    pub removed: String,
    pub score: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub input_count: usize,
    pub output_count: usize,
    pub pairs: Vec<DuplicatePair>,
}

/// Lowercase, punctuation-stripped, whitespace-collapsed form used by both
/// hash tiers and the similarity blend.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact-match hash: SHA-256 over the normalized text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fuzzy hash: the first `MAX_SHINGLES` of the sorted distinct 5-char
/// shingles, hashed. Insensitive to word order and to edits outside the
/// retained shingle set, so a collision is evidence, not proof.
pub fn fuzzy_hash(text: &str) -> String {
    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut shingles: BTreeSet<String> = BTreeSet::new();
    if chars.len() >= SHINGLE_LEN {
        for window in chars.windows(SHINGLE_LEN) {
            shingles.insert(window.iter().collect());
        }
    } else if !chars.is_empty() {
        shingles.insert(normalized.clone());
    }

    let mut hasher = Sha256::new();
    for shingle in shingles.into_iter().take(MAX_SHINGLES) {
        hasher.update(shingle.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn sequence_ratio(a: &str, b: &str) -> Option<f32> {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return None;
    }
    Some(1.0 - levenshtein(a, b) as f32 / max_len as f32)
}

fn jaccard_words(a: &str, b: &str) -> Option<f32> {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return None;
    }
    let intersection = set_a.intersection(&set_b).count();
    Some(intersection as f32 / union as f32)
}

fn tfidf_cosine(a: &str, b: &str) -> Option<f32> {
    fn count(text: &str) -> HashMap<&str, f32> {
        let mut counts: HashMap<&str, f32> = HashMap::new();
        for word in text.split_whitespace() {
            *counts.entry(word).or_insert(0.0) += 1.0;
        }
        counts
    }
    let tf_a = count(a);
    let tf_b = count(b);
    if tf_a.is_empty() || tf_b.is_empty() {
        return None;
    }

    // Smoothed idf over the two-document corpus keeps shared terms from
    // vanishing entirely.
    let idf = |word: &str| {
        let df = tf_a.contains_key(word) as u32 + tf_b.contains_key(word) as u32;
        (3.0 / (1.0 + df as f32)).ln() + 1.0
    };

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    let vocabulary: HashSet<&str> = tf_a.keys().chain(tf_b.keys()).copied().collect();
    for word in vocabulary {
        let w = idf(word);
        let wa = tf_a.get(word).copied().unwrap_or(0.0) * w;
        let wb = tf_b.get(word).copied().unwrap_or(0.0) * w;
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Blended similarity: the mean of whichever of the three metrics could
/// be computed. A metric that cannot produce a value is left out of the
/// mean rather than dragging it down. `None` only when all three fail.
pub fn similarity(a: &str, b: &str) -> Option<f32> {
    let a = normalize(a);
    let b = normalize(b);
    let metrics: Vec<f32> = [
        sequence_ratio(&a, &b),
        jaccard_words(&a, &b),
        tfidf_cosine(&a, &b),
    ]
    .into_iter()
    .flatten()
    .collect();
    if metrics.is_empty() {
        return None;
    }
    Some(metrics.iter().sum::<f32>() / metrics.len() as f32)
}

/// Outcome of a pairwise duplicate check: the verdict, the similarity
/// score backing it, and which tier decided.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub score: f32,
    pub reason: &'static str,
}

/// Pairwise three-tier duplicate check. Exact hash short-circuits at 1.0;
/// a fuzzy hash collision is confirmed against the blended score before it
/// counts; otherwise the blended score alone decides against `threshold`.
pub fn is_duplicate(a: &str, b: &str, threshold: f32) -> DuplicateVerdict {
    if content_hash(a) == content_hash(b) {
        return DuplicateVerdict {
            is_duplicate: true,
            score: 1.0,
            reason: "exact_match",
        };
    }
    let score = similarity(a, b).unwrap_or(0.0);
    if score >= threshold {
        let reason = if fuzzy_hash(a) == fuzzy_hash(b) {
            "fuzzy_match"
        } else {
            "similarity"
        };
        return DuplicateVerdict {
            is_duplicate: true,
            score,
            reason,
        };
    }
    DuplicateVerdict {
        is_duplicate: false,
        score,
        reason: "below_threshold",
    }
}

fn metadata_richness(chunk: &Chunk) -> usize {
    let mut fields = 0;
    if chunk.table_title.is_some() {
        fields += 1;
    }
    if !chunk.headers.is_empty() {
        fields += 1;
    }
    if !chunk.document_type.is_empty() {
        fields += 1;
    }
    if chunk.year.is_some() {
        fields += 1;
    }
    if chunk.embedding.is_some() {
        fields += 1;
    }
    fields += chunk.extra.len();
    fields
}

fn merge_group(group: Vec<Chunk>) -> Option<Chunk> {
    let mut iter = group.into_iter();
    let mut kept = iter.next()?;
    for other in iter {
        if kept.table_title.is_none() {
            kept.table_title = other.table_title;
        }
        if kept.headers.is_empty() {
            kept.headers = other.headers;
            kept.row_count = other.row_count;
        }
        if kept.document_type.is_empty() {
            kept.document_type = other.document_type;
        }
        if kept.year.is_none() {
            kept.year = other.year;
        }
        if kept.embedding.is_none() {
            kept.embedding = other.embedding;
        }
        for (key, value) in other.extra {
            kept.extra.entry(key).or_insert(value);
        }
    }
    Some(kept)
}

/// Partition chunks into duplicate groups and collapse each group per the
/// strategy. Non-duplicates pass through in input order; a group occupies
/// the position of its earliest member.
pub fn deduplicate_chunks(
    chunks: Vec<Chunk>,
    threshold: f32,
    strategy: DedupStrategy,
) -> (Vec<Chunk>, DedupReport) {
    let input_count = chunks.len();
    let mut groups: Vec<Vec<Chunk>> = Vec::new();
    let mut group_reasons: Vec<Vec<(String, f32, String)>> = Vec::new();
    let mut by_exact: HashMap<String, usize> = HashMap::new();
    let mut by_fuzzy: HashMap<String, usize> = HashMap::new();

    for chunk in chunks {
        let exact = content_hash(&chunk.text);
        if let Some(&idx) = by_exact.get(&exact) {
            group_reasons[idx].push((chunk.id.to_string(), 1.0, "exact_match".to_string()));
            groups[idx].push(chunk);
            continue;
        }

        let fuzzy = fuzzy_hash(&chunk.text);
        let mut joined = None;
        if let Some(&idx) = by_fuzzy.get(&fuzzy) {
            // A fuzzy collision is a candidate; the pairwise check confirms.
            let verdict = is_duplicate(&chunk.text, &groups[idx][0].text, threshold);
            if verdict.is_duplicate {
                joined = Some((idx, verdict.score, verdict.reason));
            }
        }
        if joined.is_none() {
            for (idx, group) in groups.iter().enumerate() {
                let verdict = is_duplicate(&chunk.text, &group[0].text, threshold);
                if verdict.is_duplicate {
                    joined = Some((idx, verdict.score, verdict.reason));
                    break;
                }
            }
        }

        match joined {
            Some((idx, score, reason)) => {
                group_reasons[idx].push((chunk.id.to_string(), score, reason.to_string()));
                groups[idx].push(chunk);
            }
            None => {
                by_exact.insert(exact, groups.len());
                by_fuzzy.insert(fuzzy, groups.len());
                groups.push(vec![chunk]);
                group_reasons.push(Vec::new());
            }
        }
    }

    let mut pairs = Vec::new();
    let mut output = Vec::with_capacity(groups.len());
    for (group, reasons) in groups.into_iter().zip(group_reasons) {
        let kept = match strategy {
            DedupStrategy::KeepFirst => match group.into_iter().next() {
                Some(chunk) => chunk,
                None => continue,
            },
            DedupStrategy::KeepBest => {
                // Strictly-greater keeps the earliest member on ties.
                let mut best: Option<(usize, Chunk)> = None;
                for candidate in group {
                    let richness = metadata_richness(&candidate);
                    if best.as_ref().map_or(true, |(r, _)| richness > *r) {
                        best = Some((richness, candidate));
                    }
                }
                match best {
                    Some((_, chunk)) => chunk,
                    None => continue,
                }
            }
            DedupStrategy::Merge => match merge_group(group) {
                Some(chunk) => chunk,
                None => continue,
            },
        };
        for (removed, score, reason) in reasons {
            if removed != kept.id.to_string() {
                pairs.push(DuplicatePair {
                    kept: kept.id.to_string(),
                    removed,
                    score,
                    reason,
                });
            }
        }
        output.push(kept);
    }

    if !pairs.is_empty() {
        debug!(
            input = input_count,
            output = output.len(),
            duplicates = pairs.len(),
            "collapsed duplicate chunks"
        );
    }

    let report = DedupReport {
        input_count,
        output_count: output.len(),
        pairs,
    };
    (output, report)
}
