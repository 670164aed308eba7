//! Extraction engine adapters for the finsemble ensemble.
//!
//! Six independent strategies sit behind one [`EngineAdapter`] contract:
//!
//! | Engine | Strategy | Deterministic |
//! |--------|----------|---------------|
//! | [`TextPatternEngine`] | line regex over the text layer | yes |
//! | [`TableGeometryEngine`] | whitespace-gutter column parsing | yes |
//! | [`TableDetectEngine`] | delimiter sniffing + column classification | yes |
//! | [`OcrEngine::primary`] | OCR text layer with glyph repair | yes |
//! | [`OcrEngine::secondary`] | OCR text layer, wider glyph repair | yes |
//! | [`LayoutModelEngine`] | layout feature scoring | no |
//!
//! Adapters never fail hard: malformed input yields an [`EngineRun`] with an
//! empty candidate list and a diagnostic failure note. The pipeline runs all
//! of them concurrently and feeds their runs to the aggregator.

pub mod adapter;
pub mod layout_model;
pub mod ocr;
pub mod table_detect;
pub mod table_geometry;
pub mod text_pattern;
mod textutil;

pub use adapter::{EngineAdapter, EngineRun};
pub use layout_model::LayoutModelEngine;
pub use ocr::OcrEngine;
pub use table_detect::TableDetectEngine;
pub use table_geometry::TableGeometryEngine;
pub use text_pattern::TextPatternEngine;

use std::sync::Arc;

/// The full default ensemble, in fixed priority order.
#[must_use = "returns the engines the pipeline should run"]
pub fn default_engines() -> Vec<Arc<dyn EngineAdapter>> {
    vec![
        Arc::new(TextPatternEngine::new()),
        Arc::new(TableGeometryEngine::new()),
        Arc::new(TableDetectEngine::new()),
        Arc::new(OcrEngine::primary()),
        Arc::new(OcrEngine::secondary()),
        Arc::new(LayoutModelEngine::new()),
    ]
}
