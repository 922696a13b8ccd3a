//! Blockwise Core Library
//!
//! This crate provides the rule model and the matching engine for the
//! Blockwise content blocker.
//!
//! # Architecture
//!
//! A rule list is held by a [`Matcher`] together with a [`MatchIndex`] that
//! shortlists candidate rules per request, so a page load with dozens of
//! sub-resources never scans every rule for every request.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hash functions for domain and token keys
//! - `psl`: eTLD+1 extraction and host suffix walking
//! - `url`: Fast URL helpers without allocations
//! - `rule`: Parsed rules and compiled patterns
//! - `index`: Candidate index over a rule list
//! - `matcher`: Request and element hiding queries
//! - `types`: Shared type definitions

pub mod hash;
pub mod index;
pub mod matcher;
pub mod psl;
pub mod rule;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use index::{IndexStats, MatchIndex};
pub use matcher::{HidingSelectors, Matcher, PageFlags};
pub use psl::{get_etld1, is_third_party};
pub use rule::{DomainRestrictions, Pattern, PatternProgram, Rule, RuleOptions};
pub use types::{MatchDecision, MatchResult, RequestContext, RequestType, RuleFlags, RuleKind};
