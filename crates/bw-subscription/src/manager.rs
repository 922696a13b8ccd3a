//! Aggregation of all subscriptions behind one query surface.
//!
//! The manager owns every [`Subscription`], the disabled-rule registry, the
//! deferred task queue and the downloads in flight. It is driven from a
//! single task: queries and edits are plain method calls, and downloads
//! complete only inside [`Manager::next_completion`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bw_core::{HidingSelectors, MatchDecision, PageFlags, RequestContext, Rule, RuleFlags};
use bw_core::url::extract_host;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use crate::cache;
use crate::config::{file_name_for_title, EngineConfig, SubscriptionConfig};
use crate::disabled::DisabledRules;
use crate::error::{FetchError, Result, SubscriptionError};
use crate::events::{EngineEvent, EventBus};
use crate::fetch::Fetcher;
use crate::scheduler::{Scheduler, Task};
use crate::subscription::{LoadOutcome, Subscription, SubscriptionId, SubscriptionKind};

type Completion = (SubscriptionId, std::result::Result<Vec<u8>, FetchError>);

/// Outcome of a request query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: MatchDecision,
    /// Subscription holding the deciding rule
    pub subscription: Option<SubscriptionId>,
    /// Filter of the deciding rule
    pub filter: Option<String>,
}

impl Verdict {
    fn allow_by_default() -> Self {
        Self {
            decision: MatchDecision::Allow,
            subscription: None,
            filter: None,
        }
    }

    fn decided(decision: MatchDecision, subscription: &Subscription, offset: usize) -> Self {
        Self {
            decision,
            subscription: Some(subscription.id()),
            filter: subscription.rule(offset).map(|rule| rule.filter.clone()),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}

pub struct Manager {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
    subscriptions: Vec<Subscription>,
    custom_id: SubscriptionId,
    next_id: u32,
    disabled: DisabledRules,
    scheduler: Scheduler,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    events: EventBus,
}

impl Manager {
    /// Create the custom list and every configured remote subscription.
    /// Nothing is read from disk until [`Manager::load`].
    pub fn new(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let disabled: DisabledRules = config.disabled_rules.iter().cloned().collect();
        let custom_id = SubscriptionId::new(0);
        let mut manager = Self {
            subscriptions: vec![Subscription::custom(custom_id, config.resolved_custom_list_path())],
            config,
            fetcher,
            custom_id,
            next_id: 1,
            disabled,
            scheduler: Scheduler::new(),
            in_flight: FuturesUnordered::new(),
            events: EventBus::new(),
        };

        for entry in manager.config.subscriptions.clone() {
            let path = manager.config.resolved_subscription_path(&entry);
            let url = match Url::parse(&entry.url) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!("subscription \"{}\" has an invalid url {:?}: {}", entry.title, entry.url, err);
                    None
                }
            };
            let id = manager.allocate_id();
            manager.subscriptions.push(Subscription::remote(id, entry.title, url, path));
        }

        manager
    }

    /// Load every subscription from its cache and queue refreshes for the
    /// ones without a usable list.
    pub fn load(&mut self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.iter().map(Subscription::id).collect();
        for id in ids {
            self.load_subscription(id);
        }
    }

    fn load_subscription(&mut self, id: SubscriptionId) {
        let Some(subscription) = self.subscriptions.iter_mut().find(|s| s.id() == id) else {
            return;
        };

        let outcome = subscription.load(&self.disabled);
        match &outcome {
            LoadOutcome::Loaded { rules } => {
                debug!("loaded \"{}\" with {} rules", subscription.title(), rules)
            }
            LoadOutcome::Empty => debug!("\"{}\" is empty", subscription.title()),
            LoadOutcome::Stale(err) => warn!("\"{}\": {}", subscription.title(), err),
        }

        if outcome.needs_update() && subscription.url().is_some() {
            debug!("deferring refresh of \"{}\"", subscription.title());
            self.scheduler.defer(Task::Update(id));
        }
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current configuration, kept in sync with the subscription set and
    /// the disabled registry.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id() == id)
    }

    fn subscription_mut(&mut self, id: SubscriptionId) -> Result<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(SubscriptionError::UnknownSubscription(id.get()))
    }

    pub fn custom_list(&self) -> &Subscription {
        &self.subscriptions[0]
    }

    pub fn custom_list_id(&self) -> SubscriptionId {
        self.custom_id
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            self.config.enabled = enabled;
            self.events.emit(EngineEvent::StyleSheetChanged);
        }
    }

    pub fn subscribe_events(&mut self) -> UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Downloads that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn should_block(&self, ctx: &RequestContext<'_>) -> bool {
        self.query(ctx).is_blocked()
    }

    /// Decide a request across all subscriptions.
    ///
    /// A page-level `$document` exception or any matching exception in any
    /// subscription allows the request, whatever the other lists say.
    pub fn query(&self, ctx: &RequestContext<'_>) -> Verdict {
        if !self.config.enabled {
            return Verdict::allow_by_default();
        }

        if let Some(document_url) = ctx.document_url {
            for subscription in &self.subscriptions {
                let matcher = subscription.matcher();
                if let Some(offset) = matcher.document_exception(document_url, ctx.document_domain, RuleFlags::DOCUMENT) {
                    return Verdict::decided(MatchDecision::Allow, subscription, offset);
                }
            }
        }

        for subscription in &self.subscriptions {
            if let Some(offset) = subscription.matcher().find_exception(ctx) {
                return Verdict::decided(MatchDecision::Allow, subscription, offset);
            }
        }

        for subscription in &self.subscriptions {
            if let Some(offset) = subscription.matcher().find_block(ctx) {
                return Verdict::decided(MatchDecision::Block, subscription, offset);
            }
        }

        Verdict::allow_by_default()
    }

    /// Hiding CSS for pages on `document_domain`: selectors of every
    /// subscription minus exceptions of every subscription.
    pub fn element_hiding_style_sheet(&self, document_domain: &str) -> String {
        if !self.config.enabled {
            return String::new();
        }
        self.collect_selectors(document_domain, true).style_sheet()
    }

    /// Hiding CSS for one page, honoring `$elemhide` and `$generichide`
    /// exceptions that match its URL.
    pub fn page_style_sheet(&self, document_url: &str) -> String {
        if !self.config.enabled {
            return String::new();
        }
        let domain = extract_host(document_url).unwrap_or("");

        let mut flags = PageFlags::default();
        for subscription in &self.subscriptions {
            flags.merge(subscription.matcher().page_flags(document_url, domain));
        }
        if flags.document || flags.elemhide {
            return String::new();
        }

        self.collect_selectors(domain, !flags.generichide).style_sheet()
    }

    fn collect_selectors(&self, document_domain: &str, include_generic: bool) -> HidingSelectors {
        let mut selectors = HidingSelectors::default();
        for subscription in &self.subscriptions {
            selectors.merge(subscription.matcher().hiding_selectors_with(document_domain, include_generic));
        }
        selectors
    }

    // =========================================================================
    // Disabled registry
    // =========================================================================

    pub fn disabled_rules(&self) -> &DisabledRules {
        &self.disabled
    }

    /// Disable `filter` everywhere.
    pub fn add_disabled_rule(&mut self, filter: &str) -> bool {
        self.set_filter_enabled(filter, false)
    }

    /// Re-enable `filter` everywhere.
    pub fn remove_disabled_rule(&mut self, filter: &str) -> bool {
        self.set_filter_enabled(filter, true)
    }

    /// Update the registry and every rule carrying `filter`. Returns
    /// whether the registry changed.
    fn set_filter_enabled(&mut self, filter: &str, enabled: bool) -> bool {
        let changed = if enabled {
            self.disabled.remove(filter)
        } else {
            self.disabled.insert(filter)
        };

        let mut touched = Vec::new();
        let mut css = false;
        for subscription in &mut self.subscriptions {
            let count = if enabled {
                subscription.enable_filter(filter)
            } else {
                subscription.disable_filter(filter)
            };
            if count > 0 {
                touched.push(subscription.id());
                css |= subscription.rules().iter().any(|r| r.filter == filter && r.is_css_rule());
            }
        }

        if changed {
            self.sync_disabled_config();
            self.events.emit(EngineEvent::DisabledRulesChanged);
        }
        for id in touched {
            self.events.emit(EngineEvent::SubscriptionChanged(id));
        }
        if css {
            self.events.emit(EngineEvent::StyleSheetChanged);
        }
        changed
    }

    fn sync_disabled_config(&mut self) {
        self.config.disabled_rules = self.disabled.to_vec();
    }

    /// Enable the rule at `offset` of a subscription.
    pub fn enable_rule(&mut self, id: SubscriptionId, offset: usize) -> Result<String> {
        self.toggle_rule(id, offset, true)
    }

    /// Disable the rule at `offset` of a subscription.
    pub fn disable_rule(&mut self, id: SubscriptionId, offset: usize) -> Result<String> {
        self.toggle_rule(id, offset, false)
    }

    fn toggle_rule(&mut self, id: SubscriptionId, offset: usize, enabled: bool) -> Result<String> {
        let filter = self
            .subscription(id)
            .ok_or(SubscriptionError::UnknownSubscription(id.get()))?
            .rule(offset)
            .map(|rule| rule.filter.clone())
            .ok_or_else(|| SubscriptionError::OffsetOutOfRange {
                offset,
                len: self.subscription(id).map_or(0, Subscription::len),
            })?;
        self.set_filter_enabled(&filter, enabled);
        Ok(filter)
    }

    // =========================================================================
    // Custom list editing
    // =========================================================================

    /// Append a rule to the custom list and return its offset.
    pub fn add_rule(&mut self, mut rule: Rule) -> Result<usize> {
        if self.disabled.contains(&rule.filter) {
            rule.set_enabled(false);
        }
        let css = rule.is_css_rule();
        let id = self.custom_id;
        let offset = self.subscription_mut(id)?.add_rule(rule)?;
        self.emit_edit(id, css);
        Ok(offset)
    }

    /// Remove the custom rule at `offset`, dropping its filter from the
    /// disabled registry.
    pub fn remove_rule(&mut self, offset: usize) -> Result<Rule> {
        let id = self.custom_id;
        let removed = self.subscription_mut(id)?.remove_rule(offset)?;
        if self.disabled.remove(&removed.filter) {
            self.sync_disabled_config();
            self.events.emit(EngineEvent::DisabledRulesChanged);
        }
        self.emit_edit(id, removed.is_css_rule());
        Ok(removed)
    }

    /// Replace the custom rule at `offset` and return the old one.
    pub fn replace_rule(&mut self, mut rule: Rule, offset: usize) -> Result<Rule> {
        if self.disabled.contains(&rule.filter) {
            rule.set_enabled(false);
        }
        let css = rule.is_css_rule();
        let id = self.custom_id;
        let old = self.subscription_mut(id)?.replace_rule(rule, offset)?;
        self.emit_edit(id, css || old.is_css_rule());
        Ok(old)
    }

    /// Remove the first custom rule with `filter`.
    pub fn remove_filter(&mut self, filter: &str) -> Result<Option<Rule>> {
        match self.custom_list().find_filter(filter) {
            Some(offset) => self.remove_rule(offset).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains_filter(&self, filter: &str) -> bool {
        self.custom_list().contains_filter(filter)
    }

    /// Write the custom list to disk.
    pub fn save_custom_list(&self) -> Result<()> {
        self.custom_list().save()
    }

    fn emit_edit(&mut self, id: SubscriptionId, css: bool) {
        self.events.emit(EngineEvent::SubscriptionChanged(id));
        if css {
            self.events.emit(EngineEvent::StyleSheetChanged);
        }
    }

    // =========================================================================
    // Subscription set
    // =========================================================================

    /// Subscribe to a remote list. Its cache file is created inside the
    /// adblock directory and a first download is queued.
    pub fn add_subscription(&mut self, title: &str, url: &str) -> Result<SubscriptionId> {
        let title = title.trim();
        let parsed = Url::parse(url).map_err(|err| SubscriptionError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let path = self.unique_cache_path(title);
        cache::write_downloaded(&path, title, parsed.as_str(), &format!("{}\n", cache::FORMAT_LINE))?;

        let id = self.allocate_id();
        self.subscriptions
            .push(Subscription::remote(id, title, Some(parsed.clone()), path.clone()));
        self.config.subscriptions.push(SubscriptionConfig {
            title: title.to_string(),
            url: parsed.to_string(),
            path: Some(path),
        });
        info!("added subscription \"{}\" ({})", title, parsed);

        self.events.emit(EngineEvent::SubscriptionAdded(id));
        self.load_subscription(id);
        Ok(id)
    }

    fn unique_cache_path(&self, title: &str) -> PathBuf {
        let dir = self.config.adblock_dir();
        let file_name = file_name_for_title(title);
        let stem = file_name.trim_end_matches(".txt");

        let taken = |path: &Path| path.exists() || self.subscriptions.iter().any(|s| s.path() == path);

        let mut candidate = dir.join(&file_name);
        let mut n = 1;
        while taken(&candidate) {
            candidate = dir.join(format!("{stem}-{n}.txt"));
            n += 1;
        }
        candidate
    }

    /// Drop a remote subscription and delete its cache file. Disabled
    /// registry entries are kept.
    pub fn remove_subscription(&mut self, id: SubscriptionId) -> Result<()> {
        let position = self
            .subscriptions
            .iter()
            .position(|s| s.id() == id)
            .ok_or(SubscriptionError::UnknownSubscription(id.get()))?;

        if !self.subscriptions[position].capabilities().removable {
            return Err(SubscriptionError::NotRemovable(self.subscriptions[position].title().to_string()));
        }

        let subscription = self.subscriptions.remove(position);
        match fs::remove_file(subscription.path()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("cannot delete {}: {}", subscription.path().display(), err),
        }

        let entry = self
            .config
            .subscriptions
            .iter()
            .position(|entry| self.config.resolved_subscription_path(entry) == subscription.path());
        if let Some(index) = entry {
            self.config.subscriptions.remove(index);
        }

        info!("removed subscription \"{}\"", subscription.title());
        self.events.emit(EngineEvent::SubscriptionRemoved(id));
        self.events.emit(EngineEvent::StyleSheetChanged);
        Ok(())
    }

    // =========================================================================
    // Refreshing
    // =========================================================================

    /// Start downloading a subscription. Returns `false` when a download is
    /// already running or the subscription has no usable URL.
    pub fn update_subscription(&mut self, id: SubscriptionId) -> Result<bool> {
        let subscription = self.subscription_mut(id)?;
        let Some(url) = subscription.begin_fetch() else {
            debug!("not refreshing \"{}\"", subscription.title());
            return Ok(false);
        };

        debug!("fetching \"{}\" from {}", subscription.title(), url);
        let fetcher = Arc::clone(&self.fetcher);
        self.in_flight.push(Box::pin(async move {
            let result = fetcher.fetch(&url).await;
            (id, result)
        }));
        Ok(true)
    }

    /// Start downloading every remote subscription. Returns how many
    /// downloads were started.
    pub fn update_all(&mut self) -> usize {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|s| s.kind() == SubscriptionKind::Remote)
            .map(Subscription::id)
            .collect();
        ids.into_iter()
            .filter(|&id| matches!(self.update_subscription(id), Ok(true)))
            .count()
    }

    /// Refresh remote subscriptions whose cache file is missing or older
    /// than `max_age`.
    pub fn update_stale(&mut self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|s| s.kind() == SubscriptionKind::Remote)
            .filter(|s| {
                let modified = fs::metadata(s.path()).and_then(|m| m.modified());
                match modified {
                    Ok(time) => now.duration_since(time).map_or(false, |age| age > max_age),
                    Err(_) => true,
                }
            })
            .map(Subscription::id)
            .collect();
        ids.into_iter()
            .filter(|&id| matches!(self.update_subscription(id), Ok(true)))
            .count()
    }

    /// [`Manager::update_stale`] with the configured interval.
    pub fn update_if_due(&mut self) -> usize {
        self.update_stale(self.config.update_interval())
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Run every queued task. Returns how many ran.
    pub fn tick(&mut self) -> usize {
        let tasks = self.scheduler.drain();
        let count = tasks.len();
        for task in tasks {
            match task {
                Task::Update(id) => {
                    if let Err(err) = self.update_subscription(id) {
                        debug!("dropping deferred refresh: {}", err);
                    }
                }
            }
        }
        count
    }

    /// Wait for one download and apply it. Returns its subscription, or
    /// `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<SubscriptionId> {
        let (id, result) = self.in_flight.next().await?;
        self.apply_completion(id, result);
        Some(id)
    }

    /// Alternate [`Manager::tick`] and [`Manager::next_completion`] until no
    /// task is queued and no download is in flight.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.tick();
            if self.next_completion().await.is_none() && self.scheduler.is_empty() {
                break;
            }
        }
    }

    fn apply_completion(&mut self, id: SubscriptionId, result: std::result::Result<Vec<u8>, FetchError>) {
        let limited = self.config.limited_easy_list;
        let Some(subscription) = self.subscriptions.iter_mut().find(|s| s.id() == id) else {
            debug!("discarding download for removed subscription {}", id);
            return;
        };

        match subscription.finish_fetch(result, limited, &self.disabled) {
            Ok(rules) => {
                info!("\"{}\" refreshed with {} rules", subscription.title(), rules);
                self.events.emit(EngineEvent::SubscriptionUpdated(id));
                self.events.emit(EngineEvent::SubscriptionChanged(id));
                self.events.emit(EngineEvent::StyleSheetChanged);
            }
            Err(err) => {
                warn!("\"{}\" refresh failed: {}", subscription.title(), err);
                self.events.emit(EngineEvent::SubscriptionError {
                    id,
                    message: err.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("subscriptions", &self.subscriptions)
            .field("disabled", &self.disabled)
            .field("pending_tasks", &self.scheduler.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
