//! Interlude operator CLI. Validates definition files, evaluates decisions
//! for a visitor against a definition set and view history, and runs the
//! retention sweep over a history file.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use interlude_cache::build_cache;
use interlude_core::clock::{system_clock, Clock, ManualClock};
use interlude_core::types::{CreateInterstitialRequest, ViewRecord};
use interlude_core::validation::check;
use interlude_core::{
    AppConfig, EventName, EventRegistry, Interstitial, InterstitialId, ViewAction, Visitor,
};
use interlude_engine::{
    AttributeTenantResolver, Collaborators, EventTrigger, GateDecision, GateRequest,
    InterstitialAdmin, InterstitialManager, RequestContext, RetentionSweeper, RouteGate,
};
use interlude_store::{MemorySession, MemoryStore, ViewQuery, ViewStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Visitor attribute the CLI stores `--tenant` under.
const TENANT_ATTRIBUTE: &str = "tenant";

#[derive(Parser, Debug)]
#[command(name = "interlude")]
#[command(about = "Interstitial eligibility and queueing engine")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); INTERLUDE__* environment variables still apply
    #[arg(long, global = true, env = "INTERLUDE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate every definition in a JSON definitions file
    Validate {
        /// JSON array of interstitial definitions
        #[arg(short, long)]
        definitions: PathBuf,

        /// Event name the host application raises; repeatable. Defaults to
        /// the events the definitions reference.
        #[arg(long = "known-event")]
        known_events: Vec<String>,
    },

    /// Decide what a visitor would be shown for one trigger
    Evaluate {
        /// JSON array of interstitial definitions; ids are assigned from 1 in file order
        #[arg(short, long)]
        definitions: PathBuf,

        /// JSON array of view facts
        #[arg(long)]
        history: Option<PathBuf>,

        /// Authenticated user id (guest when omitted)
        #[arg(long)]
        user: Option<String>,

        /// Role held by the visitor; repeatable
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Tenant the visitor belongs to
        #[arg(long)]
        tenant: Option<String>,

        /// Session id
        #[arg(long, default_value = "cli")]
        session: String,

        /// Evaluate at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// Delete view facts older than the retention window from a history file
    Sweep {
        /// JSON array of view facts, rewritten in place
        #[arg(long)]
        history: PathBuf,

        /// Retention in days (overrides config)
        #[arg(long)]
        days: Option<u32>,

        /// Only report what would be deleted
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TriggerArgs {
    /// Route name or path the visitor arrives at
    #[arg(long)]
    route: Option<String>,

    /// Business event raised by the host application
    #[arg(long)]
    event: Option<String>,

    /// Inline slot being rendered
    #[arg(long)]
    slot: Option<String>,
}

/// One line of a history file. `id` is optional in hand-written files.
#[derive(Debug, Deserialize)]
struct HistoryEntry {
    id: Option<Uuid>,
    interstitial_id: InterstitialId,
    user_id: Option<String>,
    session_id: Option<String>,
    action: ViewAction,
    viewed_at: DateTime<Utc>,
}

impl From<HistoryEntry> for ViewRecord {
    fn from(entry: HistoryEntry) -> Self {
        ViewRecord {
            id: entry.id.unwrap_or_else(Uuid::new_v4),
            interstitial_id: entry.interstitial_id,
            user_id: entry.user_id,
            session_id: entry.session_id,
            action: entry.action,
            viewed_at: entry.viewed_at,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interlude=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Commands::Validate {
            definitions,
            known_events,
        } => {
            if !validate(&definitions, &known_events)? {
                std::process::exit(1);
            }
        }
        Commands::Evaluate {
            definitions,
            history,
            user,
            roles,
            tenant,
            session,
            at,
            trigger,
        } => {
            let visitor = build_visitor(user, roles, tenant);
            let clock: Arc<dyn Clock> = match at {
                Some(at) => Arc::new(ManualClock::new(at)),
                None => system_clock(),
            };
            let output = evaluate(
                config,
                clock,
                &definitions,
                history.as_deref(),
                &visitor,
                session,
                trigger,
            )?;
            print_json(&output)?;
        }
        Commands::Sweep {
            history,
            days,
            dry_run,
        } => {
            let days = days.unwrap_or(config.retention.days);
            sweep(&history, days, dry_run)?;
        }
    }

    Ok(())
}

fn validate(definitions: &Path, known_events: &[String]) -> anyhow::Result<bool> {
    let defs: Vec<CreateInterstitialRequest> = read_json(definitions)?;
    let registry = if known_events.is_empty() {
        referenced_events(&defs)?
    } else {
        EventRegistry::with_events(known_events.iter().cloned())?
    };

    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(defs.len());
    let mut invalid = 0;
    for (index, def) in defs.iter().enumerate() {
        let mut problems = check(def, &registry);
        if !seen.insert(def.name.as_str()) {
            problems.push(format!("duplicate name '{}'", def.name));
        }
        if !problems.is_empty() {
            invalid += 1;
        }
        results.push(json!({
            "index": index,
            "name": def.name,
            "valid": problems.is_empty(),
            "problems": problems,
        }));
    }

    info!(definitions = defs.len(), invalid, "Validation finished");
    print_json(&json!({
        "definitions": defs.len(),
        "invalid": invalid,
        "results": results,
    }))?;
    Ok(invalid == 0)
}

fn evaluate(
    config: AppConfig,
    clock: Arc<dyn Clock>,
    definitions: &Path,
    history: Option<&Path>,
    visitor: &Visitor,
    session_id: String,
    trigger: TriggerArgs,
) -> anyhow::Result<Value> {
    let defs: Vec<CreateInterstitialRequest> = read_json(definitions)?;
    let mut registry = referenced_events(&defs)?;
    if let Some(event) = &trigger.event {
        registry.register(event.as_str())?;
    }

    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let admin = InterstitialAdmin::new(store.clone(), store.clone(), store.clone(), registry, clock.clone());
    for def in defs {
        let name = def.name.clone();
        admin
            .create(def)
            .with_context(|| format!("loading definition '{name}'"))?;
    }
    if let Some(path) = history {
        let entries: Vec<HistoryEntry> = read_json(path)?;
        let count = entries.len();
        for entry in entries {
            store.record_view(entry.into())?;
        }
        info!(facts = count, "History loaded");
    }

    let cache = build_cache(&config.cache)?;
    let parts = Collaborators::from_store(store, cache)
        .with_clock(clock)
        .with_tenants(Arc::new(AttributeTenantResolver::new(TENANT_ATTRIBUTE)));
    let manager = Arc::new(InterstitialManager::new(config, parts));

    let session = MemorySession::new(session_id);
    let mut ctx = RequestContext::new(visitor, &session);
    let identity = ctx.identity().key().to_string();

    let mut output = if let Some(route) = trigger.route {
        let request = GateRequest {
            path: &route,
            full_url: &route,
            ..Default::default()
        };
        match RouteGate::new(manager.clone()).try_handle(&request, &mut ctx)? {
            GateDecision::Skip => json!({ "trigger": "route", "route": route, "decision": "skip" }),
            GateDecision::Redirect {
                location,
                interstitial,
            } => json!({
                "trigger": "route",
                "route": route,
                "decision": "redirect",
                "location": location,
                "interstitial": interstitial,
            }),
            GateDecision::Continue { queued } => json!({
                "trigger": "route",
                "route": route,
                "decision": "continue",
                "queued": summaries(&queued),
            }),
        }
    } else if let Some(event) = trigger.event {
        let name: EventName = event.parse()?;
        let triggered = EventTrigger::new(manager.clone()).handle(&name, &mut ctx)?;
        json!({
            "trigger": "event",
            "event": name.as_str(),
            "triggered": summaries(&triggered),
            "queued": summaries(&manager.get_queued(&ctx, None)),
        })
    } else if let Some(slot) = trigger.slot {
        let candidates = manager.get_for_slot(&slot, &ctx)?;
        let rendered = match candidates.first() {
            Some(top) => Some(manager.render(top, &serde_json::Map::new())?),
            None => None,
        };
        json!({
            "trigger": "slot",
            "slot": slot,
            "candidates": summaries(&candidates),
            "rendered": rendered,
        })
    } else {
        bail!("one of --route, --event or --slot is required");
    };

    output["visitor"] = json!(identity);
    Ok(output)
}

fn sweep(history: &Path, days: u32, dry_run: bool) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let entries: Vec<HistoryEntry> = read_json(history)?;
    for entry in entries {
        store.record_view(entry.into())?;
    }

    let report = RetentionSweeper::new(store.clone(), system_clock()).sweep(days, dry_run)?;
    if report.deleted > 0 {
        let remaining = store.views(&ViewQuery::default())?;
        std::fs::write(history, serde_json::to_string_pretty(&remaining)?)
            .with_context(|| format!("writing {}", history.display()))?;
    }
    print_json(&serde_json::to_value(&report)?)
}

fn build_visitor(user: Option<String>, roles: Vec<String>, tenant: Option<String>) -> Visitor {
    let mut visitor = user.map(Visitor::user).unwrap_or_else(Visitor::guest);
    if !roles.is_empty() {
        visitor = visitor.with_attribute("roles", json!(roles));
    }
    if let Some(tenant) = tenant {
        visitor = visitor.with_attribute(TENANT_ATTRIBUTE, json!(tenant));
    }
    visitor
}

/// The host's event registry, as far as a definitions file can tell.
fn referenced_events(defs: &[CreateInterstitialRequest]) -> anyhow::Result<EventRegistry> {
    Ok(EventRegistry::with_events(
        defs.iter()
            .filter_map(|d| d.trigger_event.as_ref())
            .map(|e| e.as_str().to_string()),
    )?)
}

fn summaries(items: &[Interstitial]) -> Vec<Value> {
    items
        .iter()
        .map(|i| {
            json!({
                "id": i.id,
                "uuid": i.uuid,
                "name": i.name,
                "type": i.kind,
                "priority": i.priority,
            })
        })
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
