use log::debug;
use regex::RegexBuilder;

use bw_core::rule::{AnchorType, Atom, DomainRestrictions, Pattern, PatternProgram, Rule, RuleOptions, Segment};
use bw_core::types::{PartyMask, RequestType, RuleFlags, RuleKind};

/// Why a line did not produce a rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("comment line")]
    Comment,
    #[error("element hiding rule without selector")]
    EmptySelector,
    #[error("unsupported filter syntax: {0}")]
    Unsupported(String),
    #[error("rule has neither pattern nor options")]
    EmptyPattern,
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
    #[error("options exclude every request type")]
    NoRequestTypes,
}

impl ParseError {
    /// Blank lines and comments are expected in every list and are not
    /// worth reporting.
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::Empty | Self::Comment)
    }
}

/// Parse a whole filter list, skipping lines that are not rules.
pub fn parse_filter_list(text: &str) -> Vec<Rule> {
    text.lines().filter_map(parse_line).collect()
}

/// Parse one line, logging rejected rules at debug level.
pub fn parse_line(line: &str) -> Option<Rule> {
    match parse_rule(line) {
        Ok(rule) => Some(rule),
        Err(err) => {
            if !err.is_comment() {
                debug!("skipping filter {:?}: {}", line.trim(), err);
            }
            None
        }
    }
}

/// Parse one filter-list line into a rule.
///
/// Parsing is a pure function of the trimmed line, which becomes the rule's
/// `filter`.
pub fn parse_rule(line: &str) -> Result<Rule, ParseError> {
    let filter = line.trim();
    if filter.is_empty() {
        return Err(ParseError::Empty);
    }
    if is_comment_line(filter) {
        return Err(ParseError::Comment);
    }

    if let Some(cosmetic) = split_cosmetic(filter) {
        return parse_cosmetic_rule(filter, cosmetic);
    }

    parse_network_rule(filter)
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

// =============================================================================
// Element hiding
// =============================================================================

struct CosmeticParts<'a> {
    domains: &'a str,
    marker: &'a str,
    selector: &'a str,
}

/// Split `domains##selector` style lines. Returns `None` for network rules.
fn split_cosmetic(line: &str) -> Option<CosmeticParts<'_>> {
    let hash = line.find('#')?;
    let domains = &line[..hash];
    if domains.contains(|c| matches!(c, '/' | '*' | '|' | '@' | '"' | '!' | '$' | '^')) {
        return None;
    }

    let rest = &line[hash..];
    ["#@#", "##", "#?#", "#$#", "#@?#", "#@$#"]
        .iter()
        .find(|marker| rest.starts_with(*marker))
        .map(|marker| CosmeticParts {
            domains,
            marker,
            selector: &rest[marker.len()..],
        })
}

fn parse_cosmetic_rule(filter: &str, parts: CosmeticParts<'_>) -> Result<Rule, ParseError> {
    let kind = match parts.marker {
        "##" => RuleKind::ElementHide,
        "#@#" => RuleKind::ElementHideException,
        other => return Err(ParseError::Unsupported(other.to_string())),
    };

    let selector = parts.selector.trim();
    if selector.is_empty() {
        return Err(ParseError::EmptySelector);
    }

    Ok(Rule {
        filter: filter.to_string(),
        kind,
        pattern: Pattern::None,
        options: RuleOptions::default(),
        domains: parse_domain_list(parts.domains, ','),
        selector: Some(selector.to_string()),
        enabled: true,
    })
}

// =============================================================================
// Network rules
// =============================================================================

fn parse_network_rule(filter: &str) -> Result<Rule, ParseError> {
    let (kind, body) = match filter.strip_prefix("@@") {
        Some(rest) => (RuleKind::Exception, rest),
        None => (RuleKind::Block, filter),
    };

    let (pattern_text, options_text) = split_rule_options(body);
    let parsed = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };

    let pattern_text = pattern_text.trim();
    if pattern_text.is_empty() && options_text.is_none() {
        return Err(ParseError::EmptyPattern);
    }

    let match_case = parsed.options.flags.contains(RuleFlags::MATCH_CASE);
    let mut options = parsed.options;
    let pattern = if is_regex_pattern(pattern_text) {
        options.flags |= RuleFlags::IS_REGEX;
        compile_regex(&pattern_text[1..pattern_text.len() - 1], match_case)?
    } else {
        let program = compile_pattern(pattern_text, match_case);
        if program.anchor == AnchorType::Left {
            options.flags |= RuleFlags::HAS_LEFT_ANCHOR;
        }
        if program.anchor == AnchorType::Hostname {
            options.flags |= RuleFlags::HAS_HOST_ANCHOR;
        }
        if program.right_anchor {
            options.flags |= RuleFlags::HAS_RIGHT_ANCHOR;
        }
        Pattern::Wildcard(program)
    };

    Ok(Rule {
        filter: filter.to_string(),
        kind,
        pattern,
        options,
        domains: parsed.domains,
        selector: None,
        enabled: true,
    })
}

fn is_regex_pattern(pattern: &str) -> bool {
    pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/')
}

fn compile_regex(source: &str, match_case: bool) -> Result<Pattern, ParseError> {
    RegexBuilder::new(source)
        .case_insensitive(!match_case)
        .build()
        .map(Pattern::Regex)
        .map_err(|err| ParseError::InvalidRegex(err.to_string()))
}

/// Compile ABP wildcard syntax into segments.
pub fn compile_pattern(text: &str, match_case: bool) -> PatternProgram {
    let (mut anchor, rest) = if let Some(rest) = text.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, text)
    };

    let (mut right_anchor, rest) = match rest.strip_suffix('|') {
        Some(stripped) => (true, stripped),
        None => (false, rest),
    };

    if rest.starts_with('*') {
        anchor = AnchorType::None;
    }
    if rest.ends_with('*') {
        right_anchor = false;
    }

    let segments = rest
        .split('*')
        .filter(|part| !part.is_empty())
        .map(|part| Segment {
            atoms: part
                .bytes()
                .map(|b| match b {
                    b'^' => Atom::Separator,
                    _ if match_case => Atom::Byte(b),
                    _ => Atom::Byte(b.to_ascii_lowercase()),
                })
                .collect(),
        })
        .collect();

    PatternProgram {
        anchor,
        right_anchor,
        match_case,
        segments,
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Default)]
struct ParsedOptions {
    options: RuleOptions,
    domains: DomainRestrictions,
}

/// Split at the last `$` when what follows looks like an option list.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) if looks_like_options(&line[pos + 1..]) => (&line[..pos], Some(&line[pos + 1..])),
        _ => (line, None),
    }
}

fn looks_like_options(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '~' | '=' | ',' | '|' | '.' | '*' | ':'))
}

fn parse_options(text: &str) -> Result<ParsedOptions, ParseError> {
    let mut parsed = ParsedOptions::default();
    let mut type_include = RequestType::empty();
    let mut type_exclude = RequestType::empty();

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let lower = raw.to_ascii_lowercase();

        if let Some(value) = lower.strip_prefix("domain=") {
            let domains = parse_domain_list(value, '|');
            parsed.domains.included.extend(domains.included);
            parsed.domains.excluded.extend(domains.excluded);
            continue;
        }

        let (negated, name) = match lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, lower.as_str()),
        };

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            if name == "document" && !negated {
                parsed.options.flags |= RuleFlags::DOCUMENT;
            }
            continue;
        }

        match (name, negated) {
            ("third-party" | "thirdparty" | "3p", false) | ("first-party" | "1p", true) => {
                parsed.options.party |= PartyMask::THIRD_PARTY;
            }
            ("third-party" | "thirdparty" | "3p", true) | ("first-party" | "1p", false) => {
                parsed.options.party |= PartyMask::FIRST_PARTY;
            }
            ("match-case", false) => parsed.options.flags |= RuleFlags::MATCH_CASE,
            ("elemhide", false) => parsed.options.flags |= RuleFlags::ELEMHIDE,
            ("generichide", false) => parsed.options.flags |= RuleFlags::GENERICHIDE,
            _ => parsed.options.unknown.push(raw.to_string()),
        }
    }

    if parsed.options.party == PartyMask::ALL {
        parsed.options.party = PartyMask::empty();
    }

    parsed.options.request_types = finalize_type_mask(type_include, type_exclude)?;
    Ok(parsed)
}

/// Empty result means "every type".
fn finalize_type_mask(include: RequestType, exclude: RequestType) -> Result<RequestType, ParseError> {
    if include.is_empty() && exclude.is_empty() {
        return Ok(RequestType::empty());
    }
    let base = if include.is_empty() { RequestType::ALL } else { include };
    let mask = base - exclude;
    if mask.is_empty() {
        return Err(ParseError::NoRequestTypes);
    }
    if mask == RequestType::ALL {
        return Ok(RequestType::empty());
    }
    Ok(mask)
}

fn request_type_mask(name: &str) -> Option<RequestType> {
    match name {
        "script" => Some(RequestType::SCRIPT),
        "image" => Some(RequestType::IMAGE),
        "stylesheet" => Some(RequestType::STYLESHEET),
        "object" => Some(RequestType::OBJECT),
        "object-subrequest" => Some(RequestType::OBJECT_SUBREQUEST),
        "subdocument" => Some(RequestType::SUBDOCUMENT),
        "document" => Some(RequestType::DOCUMENT),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST),
        "popup" => Some(RequestType::POPUP),
        "media" => Some(RequestType::MEDIA),
        "font" => Some(RequestType::FONT),
        "ping" => Some(RequestType::PING),
        "websocket" => Some(RequestType::WEBSOCKET),
        "other" => Some(RequestType::OTHER),
        _ => None,
    }
}

/// Parse `a.com,~b.com` (element hiding) or `a.com|~b.com` (`domain=`).
/// Entries that are not plausible domains are dropped.
fn parse_domain_list(value: &str, separator: char) -> DomainRestrictions {
    let mut domains = DomainRestrictions::default();

    for raw in value.split(separator) {
        let raw = raw.trim();
        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = match normalize_domain(domain_raw) {
            Some(domain) => domain,
            None => continue,
        };

        if is_exclude {
            domains.excluded.push(domain);
        } else {
            domains.included.push(domain);
        }
    }

    domains
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_' || b >= 0x80)
    {
        return None;
    }

    Some(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_core::types::RequestContext;

    fn rule(line: &str) -> Rule {
        parse_rule(line).expect("rule should parse")
    }

    #[test]
    fn test_rejects_comments_and_blank_lines() {
        assert_eq!(parse_rule(""), Err(ParseError::Empty));
        assert_eq!(parse_rule("   "), Err(ParseError::Empty));
        assert_eq!(parse_rule("! Title: EasyList"), Err(ParseError::Comment));
        assert_eq!(parse_rule("[Adblock Plus 2.0]"), Err(ParseError::Comment));
    }

    #[test]
    fn test_parses_block_and_exception_kinds() {
        assert_eq!(rule("/ads/banner").kind, RuleKind::Block);
        assert_eq!(rule("@@/ads/banner").kind, RuleKind::Exception);
    }

    #[test]
    fn test_parses_element_hiding() {
        let r = rule("example.com,~shop.example.com##.ad-box");
        assert_eq!(r.kind, RuleKind::ElementHide);
        assert_eq!(r.selector.as_deref(), Some(".ad-box"));
        assert_eq!(r.domains.included, vec!["example.com"]);
        assert_eq!(r.domains.excluded, vec!["shop.example.com"]);

        let r = rule("duckduckgo.com#@#.has-ad");
        assert_eq!(r.kind, RuleKind::ElementHideException);
        assert_eq!(r.selector.as_deref(), Some(".has-ad"));

        let r = rule("##div[id^=\"banner\"]");
        assert!(r.domains.is_empty());
        assert!(r.is_generic_hide());

        assert_eq!(parse_rule("example.com##"), Err(ParseError::EmptySelector));
        assert!(matches!(parse_rule("example.com#?#div:has(.ad)"), Err(ParseError::Unsupported(_))));
    }

    #[test]
    fn test_hash_in_url_pattern_is_not_cosmetic() {
        let r = rule("||example.com/page#ad");
        assert_eq!(r.kind, RuleKind::Block);
    }

    #[test]
    fn test_parses_options() {
        let r = rule("||ads.example.com^$script,image,third-party,domain=a.com|~b.a.com");
        assert_eq!(r.options.request_types, RequestType::SCRIPT | RequestType::IMAGE);
        assert_eq!(r.options.party, PartyMask::THIRD_PARTY);
        assert_eq!(r.domains.included, vec!["a.com"]);
        assert_eq!(r.domains.excluded, vec!["b.a.com"]);
        assert!(r.options.flags.contains(RuleFlags::HAS_HOST_ANCHOR));

        let r = rule("/track.js$~third-party");
        assert_eq!(r.options.party, PartyMask::FIRST_PARTY);

        let r = rule("/flash$~object");
        assert_eq!(r.options.request_types, RequestType::ALL - RequestType::OBJECT);
    }

    #[test]
    fn test_keeps_unknown_options() {
        let r = rule("||ads.example.com^$rewrite=abp-resource:blank-js,collapse");
        assert_eq!(r.options.unknown, vec!["rewrite=abp-resource:blank-js".to_string(), "collapse".to_string()]);
        assert!(r.options.request_types.is_empty());
    }

    #[test]
    fn test_drops_malformed_option_fragments() {
        let r = rule("/ads/$domain=,script");
        assert!(r.domains.is_empty());
        assert_eq!(r.options.request_types, RequestType::SCRIPT);

        let r = rule("/ads/$script,,image");
        assert_eq!(r.options.request_types, RequestType::SCRIPT | RequestType::IMAGE);
    }

    #[test]
    fn test_rejects_contradicting_types() {
        assert_eq!(parse_rule("/ads/$script,~script"), Err(ParseError::NoRequestTypes));
    }

    #[test]
    fn test_document_option_sets_flag() {
        let r = rule("@@||duckduckgo.com^$document");
        assert_eq!(r.kind, RuleKind::Exception);
        assert!(r.options.flags.contains(RuleFlags::DOCUMENT));
        assert_eq!(r.options.request_types, RequestType::DOCUMENT);
    }

    #[test]
    fn test_dollar_inside_pattern_is_literal() {
        let r = rule("||shop.com/a$b/c");
        assert!(r.options.request_types.is_empty());
        assert!(r.pattern.matches("http://shop.com/a$b/c"));
    }

    #[test]
    fn test_parses_regex() {
        let r = rule("/banner[0-9]+\\.gif/");
        assert!(r.options.flags.contains(RuleFlags::IS_REGEX));
        assert!(r.pattern.matches("http://x.com/BANNER12.gif"));
        assert!(!r.pattern.matches("http://x.com/banner.gif"));

        assert!(matches!(parse_rule("/ban(ner/"), Err(ParseError::InvalidRegex(_))));
    }

    #[test]
    fn test_match_case_option() {
        let r = rule("/Ads/$match-case");
        assert!(r.pattern.matches("http://x.com/Ads/1"));
        assert!(!r.pattern.matches("http://x.com/ads/1"));
    }

    #[test]
    fn test_options_only_rule_matches_everything_in_scope() {
        let r = rule("$third-party,script");
        let ctx = RequestContext::new("http://cdn.net/a.js", Some("http://site.com/"), RequestType::SCRIPT);
        assert!(r.matches_request(&ctx));
        assert_eq!(parse_rule("@@"), Err(ParseError::EmptyPattern));
    }

    #[test]
    fn test_domain_anchor_boundaries() {
        let r = rule("||ads.example.com^");
        assert!(r.pattern.matches("http://ads.example.com/x"));
        assert!(r.pattern.matches("http://sub.ads.example.com/x"));
        assert!(!r.pattern.matches("http://notads.example.com/x"));
        assert!(!r.pattern.matches("http://xads.example.com/x"));
    }

    #[test]
    fn test_wildcard_edges_drop_anchors() {
        let p = compile_pattern("|*ads|", false);
        assert_eq!(p.anchor, AnchorType::None);
        assert!(p.right_anchor);

        let p = compile_pattern("||ads*|", false);
        assert_eq!(p.anchor, AnchorType::Hostname);
        assert!(!p.right_anchor);
    }

    #[test]
    fn test_reparsing_filter_is_identity() {
        for line in [
            "||ads.example.com^$script,third-party",
            "@@||example.com/allowed/*.js|",
            "example.com,~a.example.com##.banner",
            "#@#.sponsor",
            "/banner\\d+/$image",
            "  /ads/  ",
        ] {
            let first = rule(line);
            let second = rule(&first.filter);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_parse_filter_list_skips_non_rules() {
        let rules = parse_filter_list("[Adblock Plus 2.0]\n! comment\n\n||a.com^\nexample.com##\n##.ad\n");
        let filters: Vec<&str> = rules.iter().map(|r| r.filter.as_str()).collect();
        assert_eq!(filters, vec!["||a.com^", "##.ad"]);
    }
}
