//! # Data Farming Core
//!
//! Core data structures shared by every stage of a weekly reward round:
//! - `Address` / `Symbol` / `ChainId` - canonical identifiers
//! - Nested `chain → nft → lp` maps for stakes, volumes and rewards
//! - Input normalization (validation, USD conversion, swap-volume clamping)
//! - CSV formats for intermediates and outputs
//!
//! ## Data Flow
//!
//! ```text
//!   subgraph ──► nftvols / owners / symbols / vebals / allocations ──┐
//!                                                                     ├──► normalize ──► calculator
//!   rate APIs ──► rate-<symbol>                                       ┘
//! ```

pub mod csvs;
pub mod error;
pub mod normalize;
pub mod types;

pub use error::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{DfError, Result};
    pub use crate::normalize::{nftvols_to_usd, validate_allocations};
    pub use crate::types::*;
}
