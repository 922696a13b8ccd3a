//! Core Matching Engine
//!
//! This is the hot path - every request goes through here. The index
//! shortlists candidates, and each candidate is verified against the full
//! rule before it counts.

use std::collections::BTreeSet;

use crate::index::{IndexStats, MatchIndex};
use crate::rule::Rule;
use crate::types::{MatchResult, RequestContext, RuleFlags, RuleKind};

/// Maximum selectors per CSS rule in a generated stylesheet.
pub const SELECTORS_PER_CSS_RULE: usize = 1000;

// =============================================================================
// Matcher
// =============================================================================

/// Ordered rule list plus its index.
///
/// The index always describes the current rule positions: every method that
/// changes the sequence rebuilds it, while enable/disable only flips the
/// rule's flag.
#[derive(Debug, Default, Clone)]
pub struct Matcher {
    rules: Vec<Rule>,
    index: MatchIndex,
}

/// Page-level switches found for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFlags {
    /// `@@...$document` - nothing on the page is blocked
    pub document: bool,
    /// `@@...$elemhide` - no element hiding on the page
    pub elemhide: bool,
    /// `@@...$generichide` - no domain-less element hiding on the page
    pub generichide: bool,
}

impl PageFlags {
    pub fn merge(&mut self, other: PageFlags) {
        self.document |= other.document;
        self.elemhide |= other.elemhide;
        self.generichide |= other.generichide;
    }
}

/// Selectors collected for one document domain.
///
/// Exceptions are kept apart so results from several rule lists can be
/// merged before they are applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HidingSelectors {
    pub selectors: BTreeSet<String>,
    pub exceptions: BTreeSet<String>,
}

impl HidingSelectors {
    pub fn merge(&mut self, other: HidingSelectors) {
        self.selectors.extend(other.selectors);
        self.exceptions.extend(other.exceptions);
    }

    /// Selectors that survive the exceptions, in sorted order.
    pub fn resolve(&self) -> Vec<&str> {
        self.selectors
            .iter()
            .filter(|selector| !self.exceptions.contains(*selector))
            .map(String::as_str)
            .collect()
    }

    /// Render as CSS hiding every surviving selector.
    ///
    /// Selectors are grouped into rules of at most
    /// [`SELECTORS_PER_CSS_RULE`] each; an empty set renders as "".
    pub fn style_sheet(&self) -> String {
        let selectors = self.resolve();
        let mut css = String::new();
        for chunk in selectors.chunks(SELECTORS_PER_CSS_RULE) {
            css.push_str(&chunk.join(","));
            css.push_str("{display:none !important;}\n");
        }
        css
    }
}

impl Matcher {
    /// Create a matcher over `rules`, building the index.
    pub fn new(rules: Vec<Rule>) -> Self {
        let index = MatchIndex::build(&rules);
        Self { rules, index }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, offset: usize) -> Option<&Rule> {
        self.rules.get(offset)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Swap in a whole new rule list.
    pub fn replace_rules(&mut self, rules: Vec<Rule>) {
        self.index = MatchIndex::build(&rules);
        self.rules = rules;
    }

    /// Append a rule and return its position.
    pub fn push(&mut self, rule: Rule) -> usize {
        self.rules.push(rule);
        self.rebuild();
        self.rules.len() - 1
    }

    /// Remove the rule at `offset`.
    pub fn remove(&mut self, offset: usize) -> Option<Rule> {
        if offset >= self.rules.len() {
            return None;
        }
        let rule = self.rules.remove(offset);
        self.rebuild();
        Some(rule)
    }

    /// Put `rule` at `offset`, returning the rule it replaced.
    pub fn replace(&mut self, offset: usize, rule: Rule) -> Option<Rule> {
        let slot = self.rules.get_mut(offset)?;
        let old = std::mem::replace(slot, rule);
        self.rebuild();
        Some(old)
    }

    /// Set `enabled` on every rule whose filter is `filter`.
    /// Returns how many rules carry that filter.
    pub fn set_enabled_by_filter(&mut self, filter: &str, enabled: bool) -> usize {
        let mut count = 0;
        for rule in self.rules.iter_mut().filter(|rule| rule.filter == filter) {
            rule.set_enabled(enabled);
            count += 1;
        }
        count
    }

    fn rebuild(&mut self) {
        self.index = MatchIndex::build(&self.rules);
    }

    // -------------------------------------------------------------------------
    // Network matching
    // -------------------------------------------------------------------------

    /// Match a request and return the decision.
    ///
    /// Precedence: page-level `$document` exception, then any exception,
    /// then any block rule; everything else is allowed.
    pub fn query(&self, ctx: &RequestContext<'_>) -> MatchResult {
        if let Some(document_url) = ctx.document_url {
            if let Some(id) = self.document_exception(document_url, ctx.document_domain, RuleFlags::DOCUMENT) {
                return MatchResult::allow(id);
            }
        }

        let candidates = self.sorted_candidates(ctx.url);

        if let Some(id) = self.first_match(&candidates, RuleKind::Exception, ctx) {
            return MatchResult::allow(id);
        }

        if let Some(id) = self.first_match(&candidates, RuleKind::Block, ctx) {
            return MatchResult::block(id);
        }

        MatchResult::default()
    }

    /// First enabled exception rule matching the request.
    pub fn find_exception(&self, ctx: &RequestContext<'_>) -> Option<usize> {
        self.first_match(&self.sorted_candidates(ctx.url), RuleKind::Exception, ctx)
    }

    /// First enabled block rule matching the request.
    pub fn find_block(&self, ctx: &RequestContext<'_>) -> Option<usize> {
        self.first_match(&self.sorted_candidates(ctx.url), RuleKind::Block, ctx)
    }

    /// First enabled exception carrying `flag` whose pattern matches the
    /// document itself.
    pub fn document_exception(&self, document_url: &str, document_domain: &str, flag: RuleFlags) -> Option<usize> {
        self.sorted_candidates(document_url).into_iter().find(|&id| {
            let rule = &self.rules[id];
            rule.enabled && rule.matches_document(document_url, document_domain, flag)
        })
    }

    /// Page-level switches for a document.
    pub fn page_flags(&self, document_url: &str, document_domain: &str) -> PageFlags {
        PageFlags {
            document: self.document_exception(document_url, document_domain, RuleFlags::DOCUMENT).is_some(),
            elemhide: self.document_exception(document_url, document_domain, RuleFlags::ELEMHIDE).is_some(),
            generichide: self
                .document_exception(document_url, document_domain, RuleFlags::GENERICHIDE)
                .is_some(),
        }
    }

    fn sorted_candidates(&self, url: &str) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .index
            .network_candidates(url)
            .into_iter()
            .map(|id| id as usize)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn first_match(&self, candidates: &[usize], kind: RuleKind, ctx: &RequestContext<'_>) -> Option<usize> {
        candidates.iter().copied().find(|&id| {
            let rule = &self.rules[id];
            rule.kind == kind && rule.enabled && rule.matches_request(ctx)
        })
    }

    // -------------------------------------------------------------------------
    // Element hiding
    // -------------------------------------------------------------------------

    /// Selectors and exception selectors of enabled rules that apply to
    /// `document_domain`.
    pub fn hiding_selectors(&self, document_domain: &str) -> HidingSelectors {
        self.hiding_selectors_with(document_domain, true)
    }

    /// Like [`Matcher::hiding_selectors`], optionally leaving out hiding
    /// rules without an included domain (`$generichide`).
    pub fn hiding_selectors_with(&self, document_domain: &str, include_generic: bool) -> HidingSelectors {
        let mut result = HidingSelectors::default();

        for (exceptions, target) in [(false, &mut result.selectors), (true, &mut result.exceptions)] {
            // Generic exceptions always apply; generichide only drops
            // generic hiding rules.
            let generic = include_generic || exceptions;
            for id in self.index.hiding_candidates(document_domain, exceptions, generic) {
                let rule = &self.rules[id as usize];
                if !rule.enabled || !rule.domains.applies_to(document_domain) {
                    continue;
                }
                if let Some(selector) = &rule.selector {
                    target.insert(selector.clone());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Atom, AnchorType, DomainRestrictions, Pattern, PatternProgram, RuleOptions, Segment};
    use crate::types::{MatchDecision, PartyMask, RequestType};

    fn network(filter: &str, kind: RuleKind, anchor: AnchorType, body: &str) -> Rule {
        let atoms = body
            .bytes()
            .map(|b| if b == b'^' { Atom::Separator } else { Atom::Byte(b) })
            .collect();
        Rule {
            filter: filter.to_string(),
            kind,
            pattern: Pattern::Wildcard(PatternProgram {
                anchor,
                right_anchor: false,
                match_case: false,
                segments: vec![Segment { atoms }],
            }),
            options: RuleOptions::default(),
            domains: DomainRestrictions::default(),
            selector: None,
            enabled: true,
        }
    }

    fn hide(filter: &str, kind: RuleKind, domains: &[&str], selector: &str) -> Rule {
        Rule {
            filter: filter.to_string(),
            kind,
            pattern: Pattern::None,
            options: RuleOptions::default(),
            domains: DomainRestrictions {
                included: domains.iter().map(|d| d.to_string()).collect(),
                excluded: Vec::new(),
            },
            selector: Some(selector.to_string()),
            enabled: true,
        }
    }

    fn ctx<'a>(url: &'a str, document: &'a str) -> RequestContext<'a> {
        RequestContext::new(url, Some(document), RequestType::SCRIPT)
    }

    #[test]
    fn test_block_and_default_allow() {
        let matcher = Matcher::new(vec![network("/ads/", RuleKind::Block, AnchorType::None, "/ads/")]);

        let result = matcher.query(&ctx("http://a.com/ads/x.js", "http://a.com/"));
        assert_eq!(result, MatchResult::block(0));

        let result = matcher.query(&ctx("http://a.com/news/x.js", "http://a.com/"));
        assert_eq!(result.decision, MatchDecision::Allow);
        assert_eq!(result.rule, None);
    }

    #[test]
    fn test_exception_wins() {
        let matcher = Matcher::new(vec![
            network("/ads/", RuleKind::Block, AnchorType::None, "/ads/"),
            network("@@||a.com^", RuleKind::Exception, AnchorType::Hostname, "a.com^"),
        ]);
        let result = matcher.query(&ctx("http://a.com/ads/x.js", "http://a.com/"));
        assert_eq!(result, MatchResult::allow(1));
    }

    #[test]
    fn test_disabled_rule_ignored() {
        let mut matcher = Matcher::new(vec![network("/ads/", RuleKind::Block, AnchorType::None, "/ads/")]);
        assert_eq!(matcher.set_enabled_by_filter("/ads/", false), 1);
        assert!(!matcher.query(&ctx("http://a.com/ads/x.js", "http://a.com/")).is_blocked());

        matcher.set_enabled_by_filter("/ads/", true);
        assert!(matcher.query(&ctx("http://a.com/ads/x.js", "http://a.com/")).is_blocked());
    }

    #[test]
    fn test_third_party_option() {
        let mut rule = network("/track.js$third-party", RuleKind::Block, AnchorType::None, "/track.js");
        rule.options.party = PartyMask::THIRD_PARTY;
        let matcher = Matcher::new(vec![rule]);

        assert!(matcher.query(&ctx("http://cdn.net/track.js", "http://a.com/")).is_blocked());
        assert!(!matcher.query(&ctx("http://a.com/track.js", "http://a.com/")).is_blocked());
    }

    #[test]
    fn test_document_exception() {
        let mut exception = network("@@||site.com^$document", RuleKind::Exception, AnchorType::Hostname, "site.com^");
        exception.options.flags = RuleFlags::DOCUMENT;
        exception.options.request_types = RequestType::DOCUMENT;
        let matcher = Matcher::new(vec![
            network("||ads.net^", RuleKind::Block, AnchorType::Hostname, "ads.net^"),
            exception,
        ]);

        assert_eq!(matcher.query(&ctx("http://ads.net/a.js", "http://site.com/")), MatchResult::allow(1));
        assert!(matcher.query(&ctx("http://ads.net/a.js", "http://other.com/")).is_blocked());

        let flags = matcher.page_flags("http://www.site.com/page", "www.site.com");
        assert!(flags.document);
        assert!(!flags.elemhide);
    }

    #[test]
    fn test_mutation_keeps_index_in_sync() {
        let mut matcher = Matcher::new(vec![network("/ads/", RuleKind::Block, AnchorType::None, "/ads/")]);
        let offset = matcher.push(network("/banner/", RuleKind::Block, AnchorType::None, "/banner/"));
        assert_eq!(offset, 1);
        assert_eq!(matcher.query(&ctx("http://a.com/banner/1.png", "http://a.com/")), MatchResult::block(1));

        matcher.remove(0);
        assert_eq!(matcher.query(&ctx("http://a.com/banner/1.png", "http://a.com/")), MatchResult::block(0));
        assert!(!matcher.query(&ctx("http://a.com/ads/1.png", "http://a.com/")).is_blocked());

        let old = matcher.replace(0, network("/ads/", RuleKind::Block, AnchorType::None, "/ads/"));
        assert_eq!(old.map(|r| r.filter), Some("/banner/".to_string()));
        assert!(matcher.query(&ctx("http://a.com/ads/1.png", "http://a.com/")).is_blocked());
        assert!(matcher.replace(5, network("x", RuleKind::Block, AnchorType::None, "x")).is_none());
    }

    #[test]
    fn test_hiding_selectors() {
        let matcher = Matcher::new(vec![
            hide("##.ad", RuleKind::ElementHide, &[], ".ad"),
            hide("example.com##.banner", RuleKind::ElementHide, &["example.com"], ".banner"),
            hide("example.com#@#.ad", RuleKind::ElementHideException, &["example.com"], ".ad"),
        ]);

        let result = matcher.hiding_selectors("www.example.com");
        assert_eq!(result.resolve(), vec![".banner"]);

        let result = matcher.hiding_selectors("other.com");
        assert_eq!(result.resolve(), vec![".ad"]);

        let result = matcher.hiding_selectors_with("www.example.com", false);
        assert_eq!(result.resolve(), vec![".banner"]);
    }

    #[test]
    fn test_style_sheet() {
        let mut selectors = HidingSelectors::default();
        assert_eq!(selectors.style_sheet(), "");

        selectors.selectors.insert(".b".into());
        selectors.selectors.insert(".a".into());
        assert_eq!(selectors.style_sheet(), ".a,.b{display:none !important;}\n");

        for i in 0..1500 {
            selectors.selectors.insert(format!(".s{i}"));
        }
        assert_eq!(selectors.style_sheet().lines().count(), 2);
    }
}
