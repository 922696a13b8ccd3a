//! Candidate index over a rule list
//!
//! The index never decides anything on its own: it shortlists rule
//! positions that could match, and the matcher verifies each candidate with
//! the full pattern. Every network rule sits in exactly one bucket:
//!
//! - `host`: `||domain^` rules, keyed by the anchored domain
//! - `token`: rules keyed by their rarest pinned literal token
//! - `fallback`: everything else, checked for every request
//!
//! Element hiding rules are bucketed by included domain, with domain-less
//! rules kept in the generic lists.

use std::collections::HashMap;

use crate::hash::{hash_domain, hash_token_bytes};
use crate::psl::walk_host_suffixes;
use crate::rule::{Pattern, Rule};
use crate::types::RuleKind;
use crate::url::{extract_host, tokenize_url, MIN_TOKEN_LEN};

/// Shortlisting structure built from one ordered rule list.
#[derive(Debug, Default, Clone)]
pub struct MatchIndex {
    host: HashMap<u64, Vec<u32>>,
    token: HashMap<u32, Vec<u32>>,
    fallback: Vec<u32>,
    hide_generic: Vec<u32>,
    hide_specific: HashMap<u64, Vec<u32>>,
    unhide_generic: Vec<u32>,
    unhide_specific: HashMap<u64, Vec<u32>>,
}

/// Bucket sizes, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub host_keys: usize,
    pub token_keys: usize,
    pub fallback: usize,
    pub hiding: usize,
}

impl MatchIndex {
    /// Index every rule of `rules` by position.
    ///
    /// Disabled rules are indexed too; the matcher checks `enabled` when it
    /// verifies candidates, so toggling a rule needs no rebuild.
    pub fn build(rules: &[Rule]) -> Self {
        let mut index = Self::default();

        // First pass: how often each pinned token occurs, to key every rule
        // by its rarest one.
        let mut rule_tokens: Vec<Vec<u32>> = Vec::with_capacity(rules.len());
        let mut frequency: HashMap<u32, usize> = HashMap::new();
        for rule in rules {
            let tokens = match (&rule.pattern, rule.kind.is_network()) {
                (Pattern::Wildcard(program), true) if program.host_key().is_none() => program
                    .safe_tokens(MIN_TOKEN_LEN)
                    .iter()
                    .map(|token| hash_token_bytes(token))
                    .collect(),
                _ => Vec::new(),
            };
            for &hash in &tokens {
                *frequency.entry(hash).or_default() += 1;
            }
            rule_tokens.push(tokens);
        }

        for (id, rule) in rules.iter().enumerate() {
            let id = id as u32;
            match rule.kind {
                RuleKind::Block | RuleKind::Exception => {
                    if let Pattern::Wildcard(program) = &rule.pattern {
                        if let Some(domain) = program.host_key() {
                            index.host.entry(hash_domain(&domain)).or_default().push(id);
                            continue;
                        }
                    }

                    let rarest = rule_tokens[id as usize]
                        .iter()
                        .min_by_key(|hash| frequency.get(hash).copied().unwrap_or(0));
                    match rarest {
                        Some(&hash) => index.token.entry(hash).or_default().push(id),
                        None => index.fallback.push(id),
                    }
                }
                RuleKind::ElementHide | RuleKind::ElementHideException => {
                    let (generic, specific) = if rule.kind == RuleKind::ElementHide {
                        (&mut index.hide_generic, &mut index.hide_specific)
                    } else {
                        (&mut index.unhide_generic, &mut index.unhide_specific)
                    };
                    if rule.domains.included.is_empty() {
                        generic.push(id);
                    } else {
                        for domain in &rule.domains.included {
                            specific.entry(hash_domain(domain)).or_default().push(id);
                        }
                    }
                }
            }
        }

        index
    }

    /// Positions of network rules that could match `url`.
    ///
    /// Each position is reported at most once.
    pub fn network_candidates(&self, url: &str) -> Vec<u32> {
        let mut candidates = self.fallback.clone();

        if let Some(host) = extract_host(url) {
            for suffix in walk_host_suffixes(host) {
                if let Some(ids) = self.host.get(&hash_domain(suffix)) {
                    candidates.extend_from_slice(ids);
                }
            }
        }

        for hash in tokenize_url(url) {
            if let Some(ids) = self.token.get(&hash) {
                candidates.extend_from_slice(ids);
            }
        }

        candidates
    }

    /// Positions of element hiding rules (`exceptions = false`) or
    /// element hiding exceptions (`exceptions = true`) that could apply to
    /// `domain`.
    pub fn hiding_candidates(&self, domain: &str, exceptions: bool, include_generic: bool) -> Vec<u32> {
        let (generic, specific) = if exceptions {
            (&self.unhide_generic, &self.unhide_specific)
        } else {
            (&self.hide_generic, &self.hide_specific)
        };

        let mut candidates = if include_generic { generic.clone() } else { Vec::new() };
        for suffix in walk_host_suffixes(domain) {
            if let Some(ids) = specific.get(&hash_domain(suffix)) {
                for &id in ids {
                    if !candidates.contains(&id) {
                        candidates.push(id);
                    }
                }
            }
        }

        candidates
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            host_keys: self.host.len(),
            token_keys: self.token.len(),
            fallback: self.fallback.len(),
            hiding: self.hide_generic.len()
                + self.unhide_generic.len()
                + self.hide_specific.values().map(Vec::len).sum::<usize>()
                + self.unhide_specific.values().map(Vec::len).sum::<usize>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Atom, AnchorType, DomainRestrictions, PatternProgram, RuleOptions, Segment};

    fn network(filter: &str, anchor: AnchorType, body: &str) -> Rule {
        let atoms = body
            .bytes()
            .map(|b| if b == b'^' { Atom::Separator } else { Atom::Byte(b) })
            .collect();
        Rule {
            filter: filter.to_string(),
            kind: RuleKind::Block,
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

    fn hide(filter: &str, domains: &[&str], selector: &str) -> Rule {
        Rule {
            filter: filter.to_string(),
            kind: RuleKind::ElementHide,
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

    #[test]
    fn test_buckets() {
        let rules = vec![
            network("||ads.example.com^", AnchorType::Hostname, "ads.example.com^"),
            network("/track.js", AnchorType::None, "/track.js"),
            network("ad", AnchorType::None, "ad"),
        ];
        let index = MatchIndex::build(&rules);
        let stats = index.stats();
        assert_eq!(stats.host_keys, 1);
        assert_eq!(stats.token_keys, 1);
        assert_eq!(stats.fallback, 1);
    }

    #[test]
    fn test_network_candidates() {
        let rules = vec![
            network("||ads.example.com^", AnchorType::Hostname, "ads.example.com^"),
            network("/track.js", AnchorType::None, "/track.js"),
        ];
        let index = MatchIndex::build(&rules);

        assert_eq!(index.network_candidates("http://sub.ads.example.com/x"), vec![0]);
        assert_eq!(index.network_candidates("http://cdn.net/TRACK.js"), vec![1]);
        assert!(index.network_candidates("http://cdn.net/tracker.js").is_empty());
    }

    #[test]
    fn test_rarest_token_wins() {
        let rules = vec![
            network("/ads/one", AnchorType::None, "/ads/one/"),
            network("/ads/two", AnchorType::None, "/ads/two/"),
            network("/ads/banner", AnchorType::None, "/ads/banner/"),
        ];
        let index = MatchIndex::build(&rules);
        // "ads" is shared, so each rule is keyed by its own second token.
        assert_eq!(index.network_candidates("http://x.com/ads/banner/1.png"), vec![2]);
    }

    #[test]
    fn test_hiding_candidates() {
        let rules = vec![
            hide("##.ad", &[], ".ad"),
            hide("example.com##.banner", &["example.com"], ".banner"),
        ];
        let index = MatchIndex::build(&rules);
        assert_eq!(index.hiding_candidates("www.example.com", false, true), vec![0, 1]);
        assert_eq!(index.hiding_candidates("www.example.com", false, false), vec![1]);
        assert_eq!(index.hiding_candidates("other.com", false, true), vec![0]);
        assert!(index.hiding_candidates("other.com", true, true).is_empty());
    }
}
