//! Side-by-side engine comparison matrix.
//!
//! A pure read view over the aggregation output: one row per field, one
//! column per engine, holding the raw value each engine reported. Built
//! from the candidate set the aggregator already retained, never from a
//! second extraction pass, so the matrix can never disagree with the stored
//! consensus.

use crate::aggregator::AggregatedField;
use finsemble_core::{EngineId, FieldValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// One field across all engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    /// Canonical field key.
    pub field_key: String,
    /// Raw value per engine; absent when the engine did not report the
    /// field. An engine with several candidates contributes its strongest.
    pub values: BTreeMap<EngineId, String>,
    /// The value consensus elected.
    pub consensus_value: FieldValue,
    /// Agreement percentage across attempted engines.
    pub agreement_percentage: f64,
}

/// The full per-engine-value comparison view for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMatrix {
    /// Rows in canonical field-key order.
    pub rows: Vec<MatrixRow>,
}

impl EngineMatrix {
    /// Project aggregated fields into the comparison view.
    #[must_use]
    pub fn project(fields: &[AggregatedField]) -> Self {
        let rows = fields
            .iter()
            .map(|field| {
                let mut values: BTreeMap<EngineId, (String, f64)> = BTreeMap::new();
                for candidate in &field.candidates {
                    let entry = values
                        .entry(candidate.engine)
                        .or_insert_with(|| (candidate.raw_value.clone(), candidate.local_confidence));
                    if candidate.local_confidence > entry.1 {
                        *entry = (candidate.raw_value.clone(), candidate.local_confidence);
                    }
                }
                MatrixRow {
                    field_key: field.consensus.field_key.clone(),
                    values: values.into_iter().map(|(e, (v, _))| (e, v)).collect(),
                    consensus_value: field.consensus.normalized_value.clone(),
                    agreement_percentage: field.consensus.agreement_percentage,
                }
            })
            .collect();
        Self { rows }
    }
}
