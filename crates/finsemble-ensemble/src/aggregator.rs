//! Consensus aggregation across engine runs.
//!
//! The aggregator owns every [`CandidateExtraction`] for the duration of one
//! job. It groups candidates by fuzzy field identity, normalizes each raw
//! value, and elects a consensus value per field by counting the distinct
//! engines behind each normalized value. Ties are broken by the highest
//! engine-local confidence, then by fixed engine priority. Aggregation is
//! commutative over the received candidate set, so engine completion order
//! never changes the result.

use finsemble_core::normalize::normalize_value;
use finsemble_core::similarity::{key_similarity, MATCH_THRESHOLD};
use finsemble_core::{CandidateExtraction, EngineId, FieldConsensus, FieldKey, FieldValue};
use finsemble_engines::EngineRun;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One field after aggregation: the persisted consensus plus the transient
/// per-engine candidate set retained for the comparison matrix and the
/// explanation view.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedField {
    /// Field identity the group was keyed on (first spelling seen).
    pub key: FieldKey,
    /// Reconciled consensus record.
    pub consensus: FieldConsensus,
    /// Every label spelling observed for this field across engines.
    pub label_variations: BTreeSet<String>,
    /// All candidates in the group, in engine-priority order.
    pub candidates: Vec<CandidateExtraction>,
}

/// Reconcile all engine runs for one document into per-field consensus.
///
/// `total_engines` is the number of runs handed in, which is the number of
/// engines that *attempted* the document. Failed and timed-out runs carry no
/// candidates but still widen the denominator: their silence counts against
/// agreement.
///
/// Output is sorted by canonical field key, so downstream consumers see a
/// stable order regardless of engine completion order.
#[must_use]
pub fn aggregate(runs: &[EngineRun]) -> Vec<AggregatedField> {
    let total_engines = runs.len();

    let mut groups: Vec<(FieldKey, Vec<CandidateExtraction>)> = Vec::new();
    for run in runs {
        for candidate in &run.candidates {
            match matching_group(&groups, &candidate.field_key) {
                Some(idx) => groups[idx].1.push(candidate.clone()),
                None => groups.push((candidate.field_key.clone(), vec![candidate.clone()])),
            }
        }
    }
    log::debug!(
        "aggregated {} candidate groups from {total_engines} engine runs",
        groups.len()
    );

    let mut fields: Vec<AggregatedField> = groups
        .into_iter()
        .filter_map(|(key, candidates)| reconcile(key, candidates, total_engines))
        .collect();
    fields.sort_by(|a, b| a.consensus.field_key.cmp(&b.consensus.field_key));
    fields
}

/// Index of the group whose key best matches `key`, if any clears the
/// similarity bar. Exact key equality short-circuits.
fn matching_group(
    groups: &[(FieldKey, Vec<CandidateExtraction>)],
    key: &FieldKey,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, (seen, _)) in groups.iter().enumerate() {
        if seen == key {
            return Some(idx);
        }
        let sim = key_similarity(key, seen);
        if sim >= MATCH_THRESHOLD && best.map_or(true, |(_, b)| sim > b) {
            best = Some((idx, sim));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Elect the consensus value within one group and build the field record.
fn reconcile(
    key: FieldKey,
    mut candidates: Vec<CandidateExtraction>,
    total_engines: usize,
) -> Option<AggregatedField> {
    // One vote per engine per value: an engine emitting the same field twice
    // (duplicate lines) must not outvote the rest of the ensemble.
    let mut buckets: Vec<ValueBucket> = Vec::new();
    for candidate in &candidates {
        let value = normalize_value(&candidate.raw_value);
        match buckets.iter_mut().find(|b| b.value == value) {
            Some(bucket) => bucket.absorb(candidate),
            None => buckets.push(ValueBucket::seed(value, candidate)),
        }
    }

    let winner = buckets.iter().max_by(|a, b| {
        a.engines
            .len()
            .cmp(&b.engines.len())
            .then_with(|| {
                a.best
                    .local_confidence
                    .partial_cmp(&b.best.local_confidence)
                    .unwrap_or(Ordering::Equal)
            })
            // Lower priority number wins, so reverse the comparison.
            .then_with(|| b.best.engine.priority().cmp(&a.best.engine.priority()))
            // Full ties fall back to value ordering, keeping the winner
            // independent of candidate arrival order.
            .then_with(|| b.value.to_string().cmp(&a.value.to_string()))
    })?;

    let contributing = winner.engines.clone();
    let dissenting: BTreeSet<EngineId> = candidates
        .iter()
        .map(|c| c.engine)
        .filter(|e| !contributing.contains(e))
        .collect();
    let label_variations: BTreeSet<String> =
        candidates.iter().map(|c| c.raw_label.clone()).collect();

    let consensus = FieldConsensus::new(
        key.canonical(),
        winner.value.clone(),
        contributing.len(),
        total_engines,
        contributing,
        dissenting,
        winner.value.clone(),
        winner.best.engine,
    );

    candidates.sort_by_key(|c| c.engine.priority());
    Some(AggregatedField {
        key,
        consensus,
        label_variations,
        candidates,
    })
}

/// All support observed for one normalized value within a group.
struct ValueBucket {
    value: FieldValue,
    engines: BTreeSet<EngineId>,
    /// Strongest candidate backing this value; supplies `final_engine`.
    best: CandidateExtraction,
}

impl ValueBucket {
    fn seed(value: FieldValue, candidate: &CandidateExtraction) -> Self {
        let mut engines = BTreeSet::new();
        engines.insert(candidate.engine);
        Self {
            value,
            engines,
            best: candidate.clone(),
        }
    }

    fn absorb(&mut self, candidate: &CandidateExtraction) {
        self.engines.insert(candidate.engine);
        let stronger = candidate.local_confidence > self.best.local_confidence
            || (candidate.local_confidence == self.best.local_confidence
                && candidate.engine.priority() < self.best.engine.priority());
        if stronger {
            self.best = candidate.clone();
        }
    }
}
