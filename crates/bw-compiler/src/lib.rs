//! Blockwise Filter List Parser
//!
//! This crate turns Adblock Plus filter-list lines into [`bw_core::Rule`]
//! values. Lines that are not rules (comments, headers, unsupported syntax)
//! are skipped by [`parse_filter_list`] and reported by [`parse_rule`].

pub mod parser;

pub use parser::{compile_pattern, parse_filter_list, parse_line, parse_rule, ParseError};
