//! The Repair stage: validator-error-driven corrections
//!
//! A fixed-point loop, bounded by 1–3 attempts per item. Each pass applies
//! Tier-1 (value-local, idempotent) rules first and Tier-2 (structural,
//! guarded) rules second, in deterministic `(instancePath, keyword)` order.
//! A pass that fails to strictly decrease the weighted error score is
//! reverted wholesale and the item is left as it was.

pub mod engine;
pub mod locate;
pub mod score;
pub mod tier1;
pub mod tier2;

pub use engine::{RepairAction, RepairOptions, RepairOutput, repair};
pub use score::{Scorer, weighted_score};
