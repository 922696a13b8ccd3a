//! One filter list and its lifecycle.
//!
//! ```text
//! Uninitialized -> Loading -> Loaded | Stale
//! Stale | Loaded | FetchFailed -> Fetching -> Loaded | FetchFailed
//! ```
//!
//! A subscription never schedules anything itself: [`Subscription::load`]
//! reports whether a refresh is wanted and the manager defers it.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use bw_compiler::parse_line;
use bw_core::{Matcher, Rule};
use log::{debug, info, warn};
use url::Url;

use crate::cache;
use crate::catalog::EASYLIST_URL;
use crate::disabled::DisabledRules;
use crate::error::{FetchError, Result, SubscriptionError};

pub const CUSTOM_LIST_TITLE: &str = "Custom Rules";

/// Rules every custom list carries. They can be disabled, and come back on
/// the next load when removed.
pub const TRUSTED_RULES: [&str; 2] = ["@@||duckduckgo.com^$document", "duckduckgo.com#@#.has-ad"];

/// Handle of a subscription inside a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Uninitialized,
    Loading,
    Loaded,
    /// No usable cache; a refresh is wanted
    Stale,
    Fetching,
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Downloaded list, read-only
    Remote,
    /// The user's own list
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub editable: bool,
    pub removable: bool,
}

impl SubscriptionKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Remote => Capabilities { editable: false, removable: true },
            Self::Custom => Capabilities { editable: true, removable: false },
        }
    }
}

/// Result of reading the cache file.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { rules: usize },
    /// Valid but empty list that was not refreshed yet in this process
    Empty,
    /// No usable cache
    Stale(SubscriptionError),
}

impl LoadOutcome {
    pub fn needs_update(&self) -> bool {
        !matches!(self, Self::Loaded { .. })
    }
}

#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    title: String,
    url: Option<Url>,
    path: PathBuf,
    kind: SubscriptionKind,
    state: SubscriptionState,
    matcher: Matcher,
    updated: bool,
}

impl Subscription {
    /// Remote list. `url` is `None` when the configured address is missing
    /// or invalid, which makes refreshing impossible.
    pub fn remote(id: SubscriptionId, title: impl Into<String>, url: Option<Url>, path: impl Into<PathBuf>) -> Self {
        Self::with_kind(id, title.into(), url, path.into(), SubscriptionKind::Remote)
    }

    pub fn custom(id: SubscriptionId, path: impl Into<PathBuf>) -> Self {
        Self::with_kind(id, CUSTOM_LIST_TITLE.to_string(), None, path.into(), SubscriptionKind::Custom)
    }

    fn with_kind(id: SubscriptionId, title: String, url: Option<Url>, path: PathBuf, kind: SubscriptionKind) -> Self {
        Self {
            id,
            title,
            url,
            path,
            kind,
            state: SubscriptionState::Uninitialized,
            matcher: Matcher::default(),
            updated: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// A refresh succeeded in this process.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn rules(&self) -> &[Rule] {
        self.matcher.rules()
    }

    pub fn rule(&self, offset: usize) -> Option<&Rule> {
        self.matcher.rule(offset)
    }

    pub fn len(&self) -> usize {
        self.matcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    fn url_str(&self) -> &str {
        self.url.as_ref().map_or("", Url::as_str)
    }

    fn is_primary_easy_list(&self) -> bool {
        self.url.as_ref().map_or(false, |url| url.as_str() == EASYLIST_URL)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Read the cache file and rebuild the rule list.
    ///
    /// Rules whose filter is in `disabled` come up disabled. On a missing
    /// or malformed cache the previous rules stay active and the state
    /// becomes `Stale`.
    pub fn load(&mut self, disabled: &DisabledRules) -> LoadOutcome {
        self.state = SubscriptionState::Loading;

        if self.kind == SubscriptionKind::Custom {
            if let Err(err) = self.ensure_trusted_rules() {
                warn!("custom list {}: {}", self.path.display(), err);
            }
        }

        if self.title.is_empty() {
            self.state = SubscriptionState::Stale;
            return LoadOutcome::Stale(SubscriptionError::Format(self.path.display().to_string()));
        }

        let lines = match cache::read_cache(&self.path) {
            Ok(lines) => lines,
            Err(err) => {
                debug!("subscription \"{}\" has no usable cache: {}", self.title, err);
                self.state = SubscriptionState::Stale;
                return LoadOutcome::Stale(err);
            }
        };

        let mut rules = parse_lines(lines.iter().map(String::as_str), disabled);
        if self.kind == SubscriptionKind::Custom {
            let mut seen = HashSet::new();
            rules.retain(|rule| seen.insert(rule.filter.clone()));
        }
        let count = rules.len();
        self.matcher.replace_rules(rules);
        self.state = SubscriptionState::Loaded;

        if count == 0 && !self.updated {
            LoadOutcome::Empty
        } else {
            LoadOutcome::Loaded { rules: count }
        }
    }

    /// Write the header if the file is missing, empty or headerless, then
    /// append any trusted rule the file lacks.
    fn ensure_trusted_rules(&mut self) -> Result<()> {
        if !self.path.exists() {
            self.save()?;
        }

        let present = match cache::read_cache(&self.path) {
            Ok(lines) => lines,
            Err(SubscriptionError::Format(_)) => {
                let lines = cache::salvage_lines(&self.path)?;
                warn!("custom list {} has no header, rewriting it", self.path.display());
                cache::write_filters(&self.path, &self.title, self.url_str(), lines.iter().map(String::as_str))?;
                lines
            }
            Err(err) => return Err(err),
        };
        let missing: Vec<&str> = TRUSTED_RULES
            .iter()
            .copied()
            .filter(|trusted| !present.iter().any(|line| line.trim() == *trusted))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        cache::append_lines(&self.path, &missing)
    }

    // =========================================================================
    // Refreshing
    // =========================================================================

    /// Enter `Fetching` and return the address to download.
    ///
    /// `None` while a download is already running or when the subscription
    /// has no usable URL.
    pub fn begin_fetch(&mut self) -> Option<Url> {
        if self.state == SubscriptionState::Fetching {
            return None;
        }
        let url = self.url.clone()?;
        self.state = SubscriptionState::Fetching;
        Some(url)
    }

    /// Apply a finished download.
    ///
    /// A failed download or a body that is not a filter list leaves the
    /// cache and the active rules untouched. A good body is written to the
    /// cache and loaded back from it; when writing fails the body is used
    /// from memory.
    pub fn finish_fetch(
        &mut self,
        result: std::result::Result<Vec<u8>, FetchError>,
        limited_easy_list: bool,
        disabled: &DisabledRules,
    ) -> Result<usize> {
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                self.state = SubscriptionState::FetchFailed;
                return Err(SubscriptionError::Network(err));
            }
        };

        if !cache::is_filter_list(&body) {
            self.state = SubscriptionState::FetchFailed;
            return Err(SubscriptionError::Format(self.url_str().to_string()));
        }

        let body = String::from_utf8_lossy(&body);
        let body = if limited_easy_list && self.is_primary_easy_list() {
            cache::limit_easy_list(&body)
        } else {
            body.into_owned()
        };

        self.updated = true;

        if let Err(err) = cache::write_downloaded(&self.path, &self.title, self.url_str(), &body) {
            warn!("subscription \"{}\": {}; keeping the list in memory", self.title, err);
            let rules = parse_lines(body.lines().skip(1), disabled);
            let count = rules.len();
            self.matcher.replace_rules(rules);
            self.state = SubscriptionState::Loaded;
            return Ok(count);
        }

        match self.load(disabled) {
            LoadOutcome::Loaded { rules } => {
                info!("subscription \"{}\" updated, {} rules", self.title, rules);
                Ok(rules)
            }
            LoadOutcome::Empty => Ok(0),
            LoadOutcome::Stale(err) => Err(err),
        }
    }

    // =========================================================================
    // Enable / disable
    // =========================================================================

    /// Enable or disable the rule at `offset` and every other rule with the
    /// same filter. Returns the filter.
    pub fn set_rule_enabled(&mut self, offset: usize, enabled: bool) -> Result<String> {
        let filter = self.rule_at(offset)?.filter.clone();
        self.matcher.set_enabled_by_filter(&filter, enabled);
        Ok(filter)
    }

    /// Enable every rule carrying `filter`. Returns how many there are.
    pub fn enable_filter(&mut self, filter: &str) -> usize {
        self.matcher.set_enabled_by_filter(filter, true)
    }

    /// Disable every rule carrying `filter`. Returns how many there are.
    pub fn disable_filter(&mut self, filter: &str) -> usize {
        self.matcher.set_enabled_by_filter(filter, false)
    }

    fn rule_at(&self, offset: usize) -> Result<&Rule> {
        self.matcher.rule(offset).ok_or(SubscriptionError::OffsetOutOfRange {
            offset,
            len: self.matcher.len(),
        })
    }

    // =========================================================================
    // Editing (custom list only)
    // =========================================================================

    fn ensure_editable(&self) -> Result<()> {
        if self.capabilities().editable {
            Ok(())
        } else {
            Err(SubscriptionError::ReadOnly(self.title.clone()))
        }
    }

    /// Append a rule and return its offset. A filter already in the list
    /// is refused.
    pub fn add_rule(&mut self, rule: Rule) -> Result<usize> {
        self.ensure_editable()?;
        if self.contains_filter(&rule.filter) {
            return Err(SubscriptionError::DuplicateFilter(rule.filter));
        }
        Ok(self.matcher.push(rule))
    }

    /// Remove and return the rule at `offset`.
    pub fn remove_rule(&mut self, offset: usize) -> Result<Rule> {
        self.ensure_editable()?;
        self.rule_at(offset)?;
        self.matcher.remove(offset).ok_or(SubscriptionError::OffsetOutOfRange {
            offset,
            len: self.matcher.len(),
        })
    }

    /// Put `rule` at `offset` and return the rule it replaced.
    pub fn replace_rule(&mut self, rule: Rule, offset: usize) -> Result<Rule> {
        self.ensure_editable()?;
        self.rule_at(offset)?;
        if self.find_filter(&rule.filter).map_or(false, |existing| existing != offset) {
            return Err(SubscriptionError::DuplicateFilter(rule.filter));
        }
        self.matcher.replace(offset, rule).ok_or(SubscriptionError::OffsetOutOfRange {
            offset,
            len: self.matcher.len(),
        })
    }

    pub fn contains_filter(&self, filter: &str) -> bool {
        self.rules().iter().any(|rule| rule.filter == filter)
    }

    pub fn find_filter(&self, filter: &str) -> Option<usize> {
        self.rules().iter().position(|rule| rule.filter == filter)
    }

    /// Remove the first rule with `filter`.
    pub fn remove_filter(&mut self, filter: &str) -> Result<Option<Rule>> {
        self.ensure_editable()?;
        match self.find_filter(filter) {
            Some(offset) => self.remove_rule(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Write the rule list, disabled rules included.
    pub fn save(&self) -> Result<()> {
        self.ensure_editable()?;
        cache::write_rules(&self.path, &self.title, self.url_str(), self.rules())
    }
}

/// Parse filter lines, marking rules from the registry disabled.
fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>, disabled: &DisabledRules) -> Vec<Rule> {
    lines
        .filter_map(parse_line)
        .map(|mut rule| {
            if disabled.contains(&rule.filter) {
                rule.set_enabled(false);
            }
            rule
        })
        .collect()
}
