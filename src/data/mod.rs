//! Data layer: on-disk formats, core types, and file-level loading.
//!
//! Architecture:
//! ```text
//!  .mat (Level 5)        .npy
//!        │                 │
//!        ▼                 ▼
//!   ┌──────────┐     ┌──────────┐
//!   │   mat     │     │   npy     │  parse bytes → MatFile / NpyArray
//!   └──────────┘     └──────────┘
//!        │                 │
//!        └───────┬─────────┘
//!                ▼
//!         ┌──────────┐
//!         │  loader   │  path layout + context → RDMs, SFS results, activations
//!         └──────────┘
//! ```

pub mod loader;
pub mod mat;
pub mod model;
pub mod npy;
