//! Analysis layer: correlation arithmetic and the per-layer selection summary.
//!
//! ```text
//!   activations ──▶ condition_average ──▶ select_units ──▶ rdm_from_activations
//!                                                              │
//!   human RDM ──────────────────────────────▶ upper_tri ◀──────┘
//!                                                │
//!                                                ▼
//!                                             pearson ──▶ LayerSummary
//! ```

use thiserror::Error;

pub mod rdm;
pub mod selection;
pub mod stats;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("not enough data: {0}")]
    Insufficient(String),

    #[error("unit index {index} out of range for {units} units")]
    UnitOutOfRange { index: usize, units: usize },
}
