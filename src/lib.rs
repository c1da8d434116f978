//! QuoteWise - LLM Response Normalization & Recovery Engine
//!
//! Turns unreliable model output into bounded, strictly-typed quoting data.
//! Sits between a quoting workflow and its LLM backend: it decides how long
//! an answer may be before the call goes out, and repairs whatever comes back
//! into typed task suggestions afterwards.
//!
//! ## Core Features
//!
//! - **Adaptive Budgets**: input length maps to deterministic sentence, word
//!   and token ceilings
//! - **Tiered JSON Recovery**: strict parse first, then progressively more
//!   aggressive repairs down to per-field regex extraction
//! - **Length Enforcement**: no recovered description ever exceeds its budget
//! - **Request Governance**: fixed-window rate limiting with a
//!   content-addressed result cache
//!
//! ## Quick Start
//!
//! ```ignore
//! use quotewise::{ResponseNormalizer, ExpectedShape, compute_array_budget};
//!
//! let budget = compute_array_budget("tile the bathroom floor", 3);
//! let normalizer = ResponseNormalizer::new();
//! let outcome = normalizer.normalize(&raw_response, &budget, &ExpectedShape::array(3));
//! if let Some(value) = outcome.value() {
//!     // bounded, typed task suggestions
//! }
//! ```
//!
//! ## Modules
//!
//! - [`budget`]: input-proportional length budgets
//! - [`recovery`]: tiered lenient parsing and text constraint enforcement
//! - [`governor`]: rate limiting and response caching around generation calls
//! - [`types`]: task, material and outcome types plus the error hierarchy

pub mod budget;
pub mod constants;
pub mod governor;
pub mod recovery;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Budgets
pub use budget::{BudgetProfile, LengthBudget, compute_array_budget, compute_budget};

// Error Types
pub use types::error::{GenerationError, GovernError, QuoteError, Result};

// Domain Types
pub use types::{
    ExpectedShape, FieldKind, FieldSpec, LaborBasis, Material, ParseOutcome, RecoveredValue,
    TaskSchema, TaskSuggestion,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use recovery::{LenientParser, RepairTier, ResponseNormalizer, enforce};

// =============================================================================
// Governance Re-exports
// =============================================================================

pub use governor::{GovernorConfig, GovernorStats, RequestGovernor};
