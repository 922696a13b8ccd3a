//! Blockwise CLI
//!
//! Command line front end for querying and maintaining filter
//! subscriptions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;

use bw_compiler::parse_rule;
use bw_core::{RequestContext, RequestType};
use bw_subscription::catalog::find_known;
use bw_subscription::{known_subscriptions, EngineConfig, EngineEvent, HttpFetcher, Manager, SubscriptionId};

#[derive(Parser)]
#[command(name = "bw-cli")]
#[command(about = "Blockwise ad-block engine tools")]
struct Cli {
    /// Engine configuration file
    #[arg(short, long, default_value = "blockwise.json")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a request would be blocked
    Check {
        /// Request URL
        url: String,

        /// URL of the page making the request
        #[arg(short, long)]
        document: Option<String>,

        /// Request type (script, image, stylesheet, xhr, sub_frame, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        request_type: String,
    },

    /// Print the element hiding stylesheet
    Css {
        /// Document domain, or a full page URL with --page
        target: String,

        /// Treat the target as a page URL and honor page exceptions
        #[arg(short, long)]
        page: bool,
    },

    /// Download subscriptions
    Update {
        /// Refresh every list, not only the ones past the update interval
        #[arg(short, long)]
        all: bool,
    },

    /// List subscriptions, or the rules of one subscription
    List {
        /// Subscription id to show the rules of
        #[arg(short, long)]
        rules: Option<u32>,
    },

    /// Append a rule to the custom list
    AddRule { filter: String },

    /// Remove a rule from the custom list by offset
    RemoveRule { offset: usize },

    /// Enable a rule by subscription id and offset
    Enable { subscription: u32, offset: usize },

    /// Disable a rule by subscription id and offset
    Disable { subscription: u32, offset: usize },

    /// Subscribe to a list from the catalog, or to any URL with --url
    Subscribe {
        /// Catalog title, or the new subscription's title with --url
        title: String,

        #[arg(short, long)]
        url: Option<String>,
    },

    /// Remove a subscription
    Unsubscribe { subscription: u32 },

    /// Show the known subscription catalog
    Catalog,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Commands::Catalog = cli.command {
        cmd_catalog();
        return Ok(());
    }

    let config = EngineConfig::load(&cli.config).map_err(|e| e.to_string())?;
    let fetcher = HttpFetcher::new(&config).map_err(|e| format!("Failed to set up HTTP client: {e}"))?;
    let mut manager = Manager::new(config, Arc::new(fetcher));
    manager.load();

    match cli.command {
        Commands::Check {
            url,
            document,
            request_type,
        } => cmd_check(&manager, &url, document.as_deref(), &request_type),
        Commands::Css { target, page } => {
            let css = if page {
                manager.page_style_sheet(&target)
            } else {
                manager.element_hiding_style_sheet(&target)
            };
            print!("{css}");
            Ok(())
        }
        Commands::Update { all } => cmd_update(&mut manager, all).await,
        Commands::List { rules } => cmd_list(&manager, rules),
        Commands::AddRule { filter } => {
            let rule = parse_rule(&filter).map_err(|e| format!("Invalid rule '{}': {}", filter, e))?;
            let offset = manager.add_rule(rule).map_err(|e| e.to_string())?;
            manager.save_custom_list().map_err(|e| e.to_string())?;
            println!("Added rule at offset {offset}");
            Ok(())
        }
        Commands::RemoveRule { offset } => {
            let removed = manager.remove_rule(offset).map_err(|e| e.to_string())?;
            manager.save_custom_list().map_err(|e| e.to_string())?;
            save_config(&manager, &cli.config)?;
            println!("Removed '{}'", removed.filter);
            Ok(())
        }
        Commands::Enable { subscription, offset } => {
            let filter = manager
                .enable_rule(SubscriptionId::new(subscription), offset)
                .map_err(|e| e.to_string())?;
            save_config(&manager, &cli.config)?;
            println!("Enabled '{filter}'");
            Ok(())
        }
        Commands::Disable { subscription, offset } => {
            let filter = manager
                .disable_rule(SubscriptionId::new(subscription), offset)
                .map_err(|e| e.to_string())?;
            save_config(&manager, &cli.config)?;
            println!("Disabled '{filter}'");
            Ok(())
        }
        Commands::Subscribe { title, url } => cmd_subscribe(&mut manager, &cli.config, &title, url.as_deref()).await,
        Commands::Unsubscribe { subscription } => {
            manager
                .remove_subscription(SubscriptionId::new(subscription))
                .map_err(|e| e.to_string())?;
            save_config(&manager, &cli.config)?;
            println!("Removed subscription {subscription}");
            Ok(())
        }
        Commands::Catalog => Ok(()),
    }
}

fn save_config(manager: &Manager, path: &Path) -> Result<(), String> {
    debug!("writing {}", path.display());
    manager.config().save(path).map_err(|e| e.to_string())
}

fn cmd_check(manager: &Manager, url: &str, document: Option<&str>, request_type: &str) -> Result<(), String> {
    let ctx = RequestContext::new(url, document, RequestType::from_str(request_type));
    let verdict = manager.query(&ctx);

    let decision = if verdict.is_blocked() { "BLOCK" } else { "ALLOW" };
    match (verdict.subscription.and_then(|id| manager.subscription(id)), verdict.filter) {
        (Some(subscription), Some(filter)) => {
            println!("{decision}  {url}");
            println!("  rule:          {filter}");
            println!("  subscription:  {} ({})", subscription.title(), subscription.id());
        }
        _ => println!("{decision}  {url}  (no matching rule)"),
    }
    println!("  third-party:   {}", ctx.is_third_party);
    Ok(())
}

async fn cmd_update(manager: &mut Manager, all: bool) -> Result<(), String> {
    let mut events = manager.subscribe_events();

    manager.tick();
    let started = if all { manager.update_all() } else { manager.update_if_due() };
    debug!("{} refreshes requested", started);
    println!("Updating {} subscriptions", manager.in_flight());

    manager.run_until_idle().await;

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::SubscriptionUpdated(id) => {
                if let Some(subscription) = manager.subscription(id) {
                    println!("  updated  {} ({} rules)", subscription.title(), subscription.len());
                }
            }
            EngineEvent::SubscriptionError { id, message } => {
                failures += 1;
                let title = manager.subscription(id).map_or("?", |s| s.title());
                println!("  failed   {title}: {message}");
            }
            _ => {}
        }
    }

    if failures > 0 {
        return Err(format!("{failures} subscriptions failed to update"));
    }
    Ok(())
}

fn cmd_list(manager: &Manager, rules: Option<u32>) -> Result<(), String> {
    if let Some(id) = rules {
        let subscription = manager
            .subscription(SubscriptionId::new(id))
            .ok_or_else(|| format!("No subscription {id}"))?;
        for (offset, rule) in subscription.rules().iter().enumerate() {
            let mark = if rule.enabled { ' ' } else { '-' };
            println!("{offset:>6} {mark} {}", rule.filter);
        }
        let stats = subscription.matcher().index_stats();
        println!();
        println!(
            "Index: {} host keys, {} token keys, {} unindexed, {} hiding rules",
            stats.host_keys, stats.token_keys, stats.fallback, stats.hiding
        );
        return Ok(());
    }

    println!("{:>3}  {:<24} {:>8}  {:<12} Url", "Id", "Title", "Rules", "State");
    for subscription in manager.subscriptions() {
        println!(
            "{:>3}  {:<24} {:>8}  {:<12} {}",
            subscription.id().get(),
            subscription.title(),
            subscription.len(),
            format!("{:?}", subscription.state()),
            subscription.url().map_or("-", |url| url.as_str()),
        );
    }
    println!();
    println!("Disabled rules: {}", manager.disabled_rules().len());
    Ok(())
}

async fn cmd_subscribe(manager: &mut Manager, config_path: &Path, title: &str, url: Option<&str>) -> Result<(), String> {
    let (title, url) = match url {
        Some(url) => (title.to_string(), url.to_string()),
        None => {
            let known = find_known(title).ok_or_else(|| format!("'{title}' is not in the catalog; pass --url"))?;
            (known.title().to_string(), known.url.to_string())
        }
    };

    let id = manager.add_subscription(&title, &url).map_err(|e| e.to_string())?;
    save_config(manager, config_path)?;
    println!("Subscribed to {title} as {}", id.get());

    cmd_update(manager, false).await
}

fn cmd_catalog() {
    for known in known_subscriptions() {
        println!("{:<40} {}", known.label, known.url);
    }
}
