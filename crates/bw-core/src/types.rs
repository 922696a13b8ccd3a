//! Core type definitions for Blockwise
//!
//! These types are shared by the parser, the index and the subscription
//! layer.

use crate::psl::is_third_party;
use crate::url::extract_host;

// =============================================================================
// Rule Kinds
// =============================================================================

/// What a rule does when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Plain network rule - blocks the request
    Block,
    /// Exception rule (@@...) - allows the request
    Exception,
    /// Element hiding rule (##selector)
    ElementHide,
    /// Element hiding exception (#@#selector)
    ElementHideException,
}

impl RuleKind {
    /// Network rules are matched against request URLs.
    #[inline]
    pub fn is_network(self) -> bool {
        matches!(self, Self::Block | Self::Exception)
    }

    /// Element hiding rules feed the user stylesheet.
    #[inline]
    pub fn is_css(self) -> bool {
        matches!(self, Self::ElementHide | Self::ElementHideException)
    }
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u16 {
        /// Pattern is a regex (/.../)
        const IS_REGEX = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 2;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 3;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 4;
        /// $document - whitelists a whole page when used on an exception
        const DOCUMENT = 1 << 5;
        /// $elemhide - switches element hiding off for a page
        const ELEMHIDE = 1 << 6;
        /// $generichide - switches domain-less hiding rules off for a page
        const GENERICHIDE = 1 << 7;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // top-level document
        const XMLHTTPREQUEST = 1 << 7;
        const OBJECT_SUBREQUEST = 1 << 8;
        const POPUP = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const FONT = 1 << 11;
        const MEDIA = 1 << 12;
        const PING = 1 << 13;

        /// All request types
        const ALL = 0x3FFF;
    }
}

impl RequestType {
    /// Parse from browser request type string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::DOCUMENT,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "object-subrequest" => Self::OBJECT_SUBREQUEST,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "popup" => Self::POPUP,
            "ping" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// URL of the top-level document, when known
    pub document_url: Option<&'a str>,
    /// Host of the top-level document
    pub document_domain: &'a str,
    /// Request type
    pub request_type: RequestType,
    /// Is this a third-party request?
    pub is_third_party: bool,
}

impl<'a> RequestContext<'a> {
    /// Build a context, deriving the document domain and the party from
    /// the two URLs.
    ///
    /// Without a document URL the request is treated as its own document
    /// and therefore first-party.
    pub fn new(url: &'a str, document_url: Option<&'a str>, request_type: RequestType) -> Self {
        let req_host = extract_host(url).unwrap_or("");
        let document_domain = document_url.and_then(extract_host).unwrap_or(req_host);
        let is_third_party = !document_domain.is_empty()
            && !req_host.is_empty()
            && is_third_party(document_domain, req_host);

        Self {
            url,
            document_url,
            document_domain,
            request_type,
            is_third_party,
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Request is allowed (no matching block rules, or exception matched)
    Allow,
    /// Request is blocked
    Block,
}

/// Result of matching a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    /// The final decision for this request
    pub decision: MatchDecision,
    /// Position of the rule that determined the decision
    pub rule: Option<usize>,
}

impl MatchResult {
    pub fn allow(rule: usize) -> Self {
        Self { decision: MatchDecision::Allow, rule: Some(rule) }
    }

    pub fn block(rule: usize) -> Self {
        Self { decision: MatchDecision::Block, rule: Some(rule) }
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::Allow,
            rule: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_third_party() {
        let ctx = RequestContext::new(
            "https://cdn.tracker.net/track.js",
            Some("https://www.example.com/page"),
            RequestType::SCRIPT,
        );
        assert_eq!(ctx.document_domain, "www.example.com");
        assert!(ctx.is_third_party);

        let ctx = RequestContext::new(
            "https://static.example.com/app.js",
            Some("https://www.example.com/"),
            RequestType::SCRIPT,
        );
        assert!(!ctx.is_third_party);
    }

    #[test]
    fn test_context_without_document() {
        let ctx = RequestContext::new("https://example.com/", None, RequestType::DOCUMENT);
        assert_eq!(ctx.document_domain, "example.com");
        assert!(!ctx.is_third_party);
    }

    #[test]
    fn test_request_type_from_str() {
        assert_eq!(RequestType::from_str("main_frame"), RequestType::DOCUMENT);
        assert_eq!(RequestType::from_str("xhr"), RequestType::XMLHTTPREQUEST);
        assert_eq!(RequestType::from_str("beacon"), RequestType::OTHER);
    }
}
