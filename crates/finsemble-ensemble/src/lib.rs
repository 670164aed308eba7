//! Ensemble aggregation and confidence scoring.
//!
//! This crate turns the per-engine candidate sets produced by
//! `finsemble-engines` into per-field consensus records and calibrated
//! confidence scores:
//!
//! | Module       | Responsibility                                         |
//! |--------------|--------------------------------------------------------|
//! | `aggregator` | fuzzy grouping, value reconciliation, consensus voting |
//! | `scorer`     | boost pipeline for field and metric confidence         |
//! | `matrix`     | per-engine comparison view over the aggregation output |

pub mod aggregator;
pub mod matrix;
pub mod scorer;

pub use aggregator::{aggregate, AggregatedField};
pub use matrix::{EngineMatrix, MatrixRow};
pub use scorer::{score_field, score_metric, FieldSignals, MetricContext};
