//! Shared types and business arithmetic for the Retail Ledger platform
//!
//! This crate contains the domain models and the pure stock, billing and
//! payment calculations used by the backend and by the browser (via WASM).
//! Nothing in here performs I/O.

pub mod models;
pub mod numbering;
pub mod types;
pub mod validation;

pub use models::*;
pub use numbering::*;
pub use types::*;
pub use validation::*;
