//! Filter rules and their compiled patterns
//!
//! A [`Rule`] is the parsed form of one filter-list line. Everything except
//! the `enabled` flag is fixed at parse time; the original line is kept in
//! `filter` and is the rule's identity for enable/disable bookkeeping.

use regex::Regex;

use crate::psl::walk_host_suffixes;
use crate::types::{PartyMask, RequestContext, RequestType, RuleFlags, RuleKind};
use crate::url::{get_host_position, is_separator};

// =============================================================================
// Pattern Atoms
// =============================================================================

/// One element of a pattern segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    /// Literal byte (already lowercased unless the rule is case-sensitive)
    Byte(u8),
    /// `^` - one separator character, or the end of the URL
    Separator,
}

/// Run of atoms between two `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub atoms: Vec<Atom>,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Try to match the segment at `pos`; returns the end position.
    fn match_at(&self, url: &[u8], pos: usize, match_case: bool) -> Option<usize> {
        let mut at = pos;
        for atom in &self.atoms {
            match *atom {
                Atom::Byte(expected) => {
                    let actual = *url.get(at)?;
                    let equal = if match_case {
                        actual == expected
                    } else {
                        actual.to_ascii_lowercase() == expected
                    };
                    if !equal {
                        return None;
                    }
                    at += 1;
                }
                Atom::Separator => {
                    if at == url.len() {
                        continue;
                    }
                    if !is_separator(url[at]) {
                        return None;
                    }
                    at += 1;
                }
            }
        }
        Some(at)
    }

    /// Leftmost match starting at or after `from`.
    fn find(&self, url: &[u8], from: usize, match_case: bool) -> Option<usize> {
        (from..=url.len()).find_map(|start| self.match_at(url, start, match_case))
    }
}

// =============================================================================
// Pattern Program
// =============================================================================

/// Where the first segment may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorType {
    /// Anywhere in the URL
    #[default]
    None,
    /// `|` - at the very start of the URL
    Left,
    /// `||` - at the start of a host label
    Hostname,
}

/// Wildcard pattern compiled from ABP syntax.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternProgram {
    pub anchor: AnchorType,
    /// `|` at the end - the last segment must reach the end of the URL
    pub right_anchor: bool,
    pub match_case: bool,
    /// Non-empty segments, in order. `*` sits between consecutive segments.
    pub segments: Vec<Segment>,
}

impl PatternProgram {
    /// Check whether the program matches `url`.
    pub fn matches(&self, url: &str) -> bool {
        let bytes = url.as_bytes();

        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return true,
        };

        match self.anchor {
            AnchorType::Left => first
                .match_at(bytes, 0, self.match_case)
                .map_or(false, |end| self.match_rest(bytes, rest, end)),
            AnchorType::Hostname => {
                let (host_start, host_end) = match get_host_position(url) {
                    Some(pos) => pos,
                    None => return false,
                };
                (host_start..host_end)
                    .filter(|&p| p == host_start || bytes[p - 1] == b'.')
                    .any(|start| {
                        first
                            .match_at(bytes, start, self.match_case)
                            .map_or(false, |end| self.match_rest(bytes, rest, end))
                    })
            }
            AnchorType::None => (0..=bytes.len()).any(|start| {
                first
                    .match_at(bytes, start, self.match_case)
                    .map_or(false, |end| self.match_rest(bytes, rest, end))
            }),
        }
    }

    /// Match the segments that follow a `*`.
    ///
    /// Leftmost placement of every middle segment leaves the most room for
    /// the ones after it, so only the last segment needs to try more than one
    /// position, and only when the pattern is right-anchored.
    fn match_rest(&self, url: &[u8], segments: &[Segment], mut pos: usize) -> bool {
        let (last, middle) = match segments.split_last() {
            Some(split) => split,
            None => return !self.right_anchor || pos == url.len(),
        };

        for segment in middle {
            match segment.find(url, pos, self.match_case) {
                Some(end) => pos = end,
                None => return false,
            }
        }

        if self.right_anchor {
            (pos..=url.len()).any(|start| last.match_at(url, start, self.match_case) == Some(url.len()))
        } else {
            last.find(url, pos, self.match_case).is_some()
        }
    }

    /// Domain part of a `||domain^` style pattern, usable as an exact host
    /// suffix key.
    ///
    /// Only returned when the domain is literal and terminated by something
    /// that can never occur inside a host name.
    pub fn host_key(&self) -> Option<String> {
        if self.anchor != AnchorType::Hostname {
            return None;
        }
        let first = self.segments.first()?;

        let mut domain = String::new();
        for (i, atom) in first.atoms.iter().enumerate() {
            match *atom {
                Atom::Byte(b) if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_') => {
                    domain.push(b.to_ascii_lowercase() as char);
                }
                Atom::Byte(b'/') | Atom::Byte(b':') | Atom::Separator => {
                    return valid_host_key(domain);
                }
                Atom::Byte(_) => return None,
            }
            if i + 1 == first.atoms.len() && self.segments.len() == 1 && self.right_anchor {
                return valid_host_key(domain);
            }
        }
        None
    }

    /// Alphanumeric runs that must appear as whole URL tokens whenever the
    /// pattern matches.
    ///
    /// A run qualifies when it is at least `min_len` bytes long and both of
    /// its ends are pinned: by a literal non-alphanumeric byte, a `^`, or an
    /// anchor at the pattern's edge.
    pub fn safe_tokens(&self, min_len: usize) -> Vec<Vec<u8>> {
        let mut tokens = Vec::new();
        let count = self.segments.len();

        for (seg_idx, segment) in self.segments.iter().enumerate() {
            let left_pinned = seg_idx == 0 && self.anchor != AnchorType::None;
            let right_pinned = seg_idx + 1 == count && self.right_anchor;
            let atoms = &segment.atoms;

            let mut run_start: Option<usize> = None;
            for i in 0..=atoms.len() {
                let alnum = matches!(atoms.get(i), Some(Atom::Byte(b)) if b.is_ascii_alphanumeric());
                if alnum {
                    if run_start.is_none() {
                        run_start = Some(i);
                    }
                    continue;
                }
                let start = match run_start.take() {
                    Some(start) => start,
                    None => continue,
                };
                let left_ok = start > 0 || left_pinned;
                let right_ok = i < atoms.len() || right_pinned;
                if left_ok && right_ok && i - start >= min_len {
                    let token: Vec<u8> = atoms[start..i]
                        .iter()
                        .filter_map(|atom| match atom {
                            Atom::Byte(b) => Some(b.to_ascii_lowercase()),
                            Atom::Separator => None,
                        })
                        .collect();
                    tokens.push(token);
                }
            }
        }

        tokens
    }
}

fn valid_host_key(domain: String) -> Option<String> {
    let trimmed = domain.trim_matches('.');
    if trimmed.is_empty() || trimmed.len() != domain.len() {
        return None;
    }
    Some(domain)
}

// =============================================================================
// Pattern
// =============================================================================

/// Compiled URL matcher of a network rule.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Element hiding rules carry no URL pattern
    None,
    /// ABP wildcard pattern
    Wildcard(PatternProgram),
    /// `/.../` regular expression
    Regex(Regex),
}

impl Pattern {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Pattern::None => false,
            Pattern::Wildcard(program) => program.matches(url),
            Pattern::Regex(regex) => regex.is_match(url),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pattern::None, Pattern::None) => true,
            (Pattern::Wildcard(a), Pattern::Wildcard(b)) => a == b,
            (Pattern::Regex(a), Pattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Resource-type and context restrictions from the `$` option list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleOptions {
    /// Empty means every type.
    pub request_types: RequestType,
    /// Empty means both parties.
    pub party: PartyMask,
    pub flags: RuleFlags,
    /// Options this engine does not understand, kept verbatim.
    pub unknown: Vec<String>,
}

impl RuleOptions {
    /// Check type and party restrictions against the request.
    pub fn accepts(&self, ctx: &RequestContext<'_>) -> bool {
        if !self.request_types.is_empty() && !self.request_types.intersects(ctx.request_type) {
            return false;
        }

        if !self.party.is_empty() {
            let request_party = if ctx.is_third_party {
                PartyMask::THIRD_PARTY
            } else {
                PartyMask::FIRST_PARTY
            };
            if !self.party.intersects(request_party) {
                return false;
            }
        }

        true
    }

    /// Page-level switches (`$elemhide`, `$generichide`) without any request
    /// type never apply to individual requests.
    pub fn is_page_only(&self) -> bool {
        self.request_types.is_empty()
            && self.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE)
    }
}

// =============================================================================
// Domain Restrictions
// =============================================================================

/// `domain=` option, or the domain list in front of `##`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainRestrictions {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl DomainRestrictions {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    /// Check the document domain against the lists.
    ///
    /// Matching is suffix based: `example.com` covers `www.example.com`.
    pub fn applies_to(&self, document_domain: &str) -> bool {
        let contains = |list: &[String]| {
            walk_host_suffixes(document_domain)
                .any(|suffix| list.iter().any(|d| d.eq_ignore_ascii_case(suffix)))
        };

        if !self.included.is_empty() && !contains(&self.included) {
            return false;
        }

        !(!self.excluded.is_empty() && contains(&self.excluded))
    }
}

// =============================================================================
// Rule
// =============================================================================

/// One parsed filter-list line.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Original source line, the rule's identity
    pub filter: String,
    pub kind: RuleKind,
    pub pattern: Pattern,
    pub options: RuleOptions,
    pub domains: DomainRestrictions,
    /// CSS selector, element hiding kinds only
    pub selector: Option<String>,
    pub enabled: bool,
}

impl Rule {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.kind == RuleKind::Exception
    }

    #[inline]
    pub fn is_css_rule(&self) -> bool {
        self.kind.is_css()
    }

    /// Element hiding rule without an included domain.
    pub fn is_generic_hide(&self) -> bool {
        self.kind.is_css() && self.domains.included.is_empty()
    }

    /// Full check of a network rule against a request. Ignores `enabled`.
    pub fn matches_request(&self, ctx: &RequestContext<'_>) -> bool {
        self.kind.is_network()
            && !self.options.is_page_only()
            && self.options.accepts(ctx)
            && self.domains.applies_to(ctx.document_domain)
            && self.pattern.matches(ctx.url)
    }

    /// Check a page-level exception (`$document`, `$elemhide`,
    /// `$generichide`) against the URL of the top-level document.
    pub fn matches_document(&self, document_url: &str, document_domain: &str, flag: RuleFlags) -> bool {
        self.kind == RuleKind::Exception
            && self.options.flags.contains(flag)
            && self.domains.applies_to(document_domain)
            && self.pattern.matches(document_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment {
            atoms: s
                .bytes()
                .map(|b| if b == b'^' { Atom::Separator } else { Atom::Byte(b) })
                .collect(),
        }
    }

    fn program(anchor: AnchorType, right_anchor: bool, segments: &[&str]) -> PatternProgram {
        PatternProgram {
            anchor,
            right_anchor,
            match_case: false,
            segments: segments.iter().map(|s| lit(s)).collect(),
        }
    }

    #[test]
    fn test_substring_match() {
        let p = program(AnchorType::None, false, &["/ads/"]);
        assert!(p.matches("http://example.com/ads/banner.png"));
        assert!(p.matches("http://example.com/ADS/banner.png"));
        assert!(!p.matches("http://example.com/adsx/banner.png"));
    }

    #[test]
    fn test_wildcard_segments() {
        let p = program(AnchorType::None, false, &["/banner", ".gif"]);
        assert!(p.matches("http://x.com/banner/123.gif"));
        assert!(!p.matches("http://x.com/123.gif/banner"));
    }

    #[test]
    fn test_separator_backtracking() {
        // The first "ad" is not followed by a separator, the second one is.
        let p = program(AnchorType::None, false, &["ad^"]);
        assert!(p.matches("http://x.com/adx/ad/"));
        assert!(p.matches("http://x.com/ad"));
        assert!(!p.matches("http://x.com/adx"));
    }

    #[test]
    fn test_left_and_right_anchor() {
        let p = program(AnchorType::Left, false, &["http://ads."]);
        assert!(p.matches("http://ads.example.com/"));
        assert!(!p.matches("https://x.com/?u=http://ads.example.com/"));

        let p = program(AnchorType::None, true, &[".swf"]);
        assert!(p.matches("http://x.com/movie.swf"));
        assert!(!p.matches("http://x.com/movie.swf?x=1"));

        let p = program(AnchorType::None, true, &["/a", ".js"]);
        assert!(p.matches("http://x.com/a.js/b.js"));
    }

    #[test]
    fn test_host_anchor() {
        let p = program(AnchorType::Hostname, false, &["ads.example.com^"]);
        assert!(p.matches("http://ads.example.com/x"));
        assert!(p.matches("http://sub.ads.example.com/x"));
        assert!(p.matches("https://ads.example.com:8080/x"));
        assert!(!p.matches("http://notads.example.com/x"));
        assert!(!p.matches("http://xads.example.com/x"));
        assert!(!p.matches("http://ads.example.com.evil.net/x"));
        assert!(!p.matches("http://evil.net/?ads.example.com/"));
    }

    #[test]
    fn test_host_key() {
        let p = program(AnchorType::Hostname, false, &["ads.example.com^"]);
        assert_eq!(p.host_key().as_deref(), Some("ads.example.com"));

        let p = program(AnchorType::Hostname, false, &["ads.example.com/banner"]);
        assert_eq!(p.host_key().as_deref(), Some("ads.example.com"));

        // Could continue into a longer host name
        let p = program(AnchorType::Hostname, false, &["ads.example.co"]);
        assert_eq!(p.host_key(), None);

        let p = program(AnchorType::Hostname, true, &["ads.example.com"]);
        assert_eq!(p.host_key().as_deref(), Some("ads.example.com"));

        let p = program(AnchorType::Hostname, false, &["ads", ".example.com^"]);
        assert_eq!(p.host_key(), None);
    }

    #[test]
    fn test_safe_tokens() {
        let p = program(AnchorType::None, false, &["/track.js"]);
        assert_eq!(p.safe_tokens(3), vec![b"track".to_vec()]);

        // Unpinned on the left
        let p = program(AnchorType::None, false, &["track.js"]);
        assert!(p.safe_tokens(3).is_empty());

        let p = program(AnchorType::Hostname, false, &["doubleclick.net^"]);
        assert_eq!(p.safe_tokens(3), vec![b"doubleclick".to_vec(), b"net".to_vec()]);

        // Neighbouring wildcard unpins the run
        let p = program(AnchorType::None, false, &["/banner", "/ad/"]);
        assert!(p.safe_tokens(3).is_empty());
    }

    #[test]
    fn test_domain_restrictions() {
        let d = DomainRestrictions {
            included: vec!["example.com".into()],
            excluded: vec!["safe.example.com".into()],
        };
        assert!(d.applies_to("example.com"));
        assert!(d.applies_to("www.example.com"));
        assert!(!d.applies_to("safe.example.com"));
        assert!(!d.applies_to("other.com"));

        let d = DomainRestrictions {
            included: vec![],
            excluded: vec!["other.com".into()],
        };
        assert!(d.applies_to("example.com"));
        assert!(!d.applies_to("a.other.com"));
    }
}
