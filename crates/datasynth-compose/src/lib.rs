//! The Compose stage: canonical AST → effective plan
//!
//! Compose walks the canonical tree once and precomputes everything the
//! generator and repair engine will ask about repeatedly: which property
//! names are legal where (the coverage index), which arrays owe witness
//! elements (the contains bag), and where internal references land. Fatal
//! findings abort the pipeline here rather than surfacing later as
//! confusing generation failures.

pub mod coverage;
pub mod plan;
pub mod walk;

pub use coverage::{CoverageIndex, NameDecider};
pub use plan::{ContainsBag, ContainsRequirement, MemoKey, Plan};
pub use walk::{ComposeContext, ComposeError, compose};
