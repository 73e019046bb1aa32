//! nmimgr: triage NMIs by reason code.
//!
//! Usage:
//!     nmimgr --events-panic 61 --events-drop 1-4 check
//!     nmimgr --events-debug 5 classify --source io_check 5 0x3d
//!     nmimgr --cmdline-file /proc/cmdline simulate --source unknown 61

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use nmi_common::{OutputFormat, ReasonCode, SourceType, SCHEMA_VERSION};
use nmi_config::{
    resolve_config, BackendKind, Category, CategoryTable, ConfigDiagnostic, ConfigOverrides,
    NmiConfig, TriageParams,
};
use nmi_core::{
    AbortHalt, BacktraceCapture, ChainHost, CountingCapture, DiagnosticCapture, DieEvent,
    ExitCode, Halt, HandlerBinding, InterruptSource, NmiManager, NotifierHost, Outcome,
    PanicHalt, TriageEngine, TriageStats,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "nmimgr",
    version,
    about = "Route NMIs by reason code: ignore, debug, drop, or panic"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/nmimgr/nmimgr.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Reason codes to ignore silently
    #[arg(long, global = true, value_name = "LIST")]
    events_ignore: Option<String>,

    /// Reason codes that trigger a stack dump
    #[arg(long, global = true, value_name = "LIST")]
    events_debug: Option<String>,

    /// Reason codes hidden from other handlers
    #[arg(long, global = true, value_name = "LIST")]
    events_drop: Option<String>,

    /// Reason codes that halt the system
    #[arg(long, global = true, value_name = "LIST")]
    events_panic: Option<String>,

    /// Read nmimgr.events_*= parameters from a boot command line file
    #[arg(long, global = true, value_name = "PATH")]
    cmdline_file: Option<PathBuf>,

    /// Maximum entries per list
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Host registration backend (chain, notifier)
    #[arg(long, global = true, env = "NMIMGR_BACKEND")]
    backend: Option<BackendKind>,

    /// Sources to bind, comma-separated (unknown, system_error, io_check)
    #[arg(long = "sources", global = true, value_delimiter = ',')]
    sources: Option<Vec<SourceType>>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse every list and show the resulting categories
    Check,
    /// Show the outcome for reason codes without touching any host
    Classify {
        /// Source the codes arrive on
        #[arg(long, default_value = "unknown")]
        source: SourceType,
        /// Reason codes (decimal or 0x hex)
        #[arg(required = true, value_parser = parse_reason)]
        reasons: Vec<ReasonCode>,
    },
    /// Start the manager on an in-process host and deliver NMIs to it
    Simulate {
        /// Source the codes arrive on
        #[arg(long, default_value = "unknown")]
        source: SourceType,
        /// Reason codes (decimal or 0x hex)
        #[arg(required = true, value_parser = parse_reason)]
        reasons: Vec<ReasonCode>,
        /// Actually abort the process on a panic-listed code
        #[arg(long)]
        allow_halt: bool,
        /// Capture real backtraces for debug-listed codes
        #[arg(long)]
        backtrace: bool,
    },
}

fn parse_reason(s: &str) -> Result<ReasonCode, String> {
    ReasonCode::parse(s).ok_or_else(|| format!("invalid reason code: {s} (expected 0-255 or 0x00-0xff)"))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.log_json);
    let format = cli.global.format;

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(code = err.code(), "{err}");
            eprintln!("nmimgr: {err}");
            if format.is_machine_readable() {
                let report = serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "error": err.to_string(),
                    "code": err.code(),
                });
                if let Err(encode) = print_json(&report) {
                    eprintln!("nmimgr: {encode}");
                }
            }
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run(cli: Cli) -> nmi_common::Result<ExitCode> {
    let config = load_config(&cli.global)?;
    let format = cli.global.format;
    match cli.command {
        Commands::Check => check(&config, format),
        Commands::Classify { source, reasons } => classify(&config, source, &reasons, format),
        Commands::Simulate {
            source,
            reasons,
            allow_halt,
            backtrace,
        } => simulate(&config, source, &reasons, allow_halt, backtrace, format),
    }
}

fn load_config(opts: &GlobalOpts) -> nmi_common::Result<NmiConfig> {
    let mut flags = TriageParams {
        ignore: opts.events_ignore.clone(),
        debug: opts.events_debug.clone(),
        drop: opts.events_drop.clone(),
        panic: opts.events_panic.clone(),
    };
    if let Some(path) = &opts.cmdline_file {
        let cmdline = std::fs::read_to_string(path)?;
        flags = flags.or(&TriageParams::from_cmdline(&cmdline));
    }

    let overrides = ConfigOverrides {
        config_path: opts.config.clone(),
        params: flags,
        capacity: opts.capacity,
        backend: opts.backend,
        sources: opts.sources.clone(),
    };
    Ok(resolve_config(&overrides, &TriageParams::from_env())?)
}

/// A rejected list downgrades an otherwise clean run; any other code wins.
fn degraded_or(diagnostics: &[ConfigDiagnostic], code: ExitCode) -> ExitCode {
    if code == ExitCode::Clean && !diagnostics.is_empty() {
        ExitCode::ConfigDegraded
    } else {
        code
    }
}

// ── check ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CheckReport<'a> {
    schema_version: &'static str,
    backend: BackendKind,
    sources: &'a [SourceType],
    capacity: usize,
    categories: CategoryTable,
    diagnostics: &'a [ConfigDiagnostic],
}

fn check(config: &NmiConfig, format: OutputFormat) -> nmi_common::Result<ExitCode> {
    let (table, diagnostics) = CategoryTable::build(&config.params, config.capacity);

    match format {
        OutputFormat::Json => print_json(&CheckReport {
            schema_version: SCHEMA_VERSION,
            backend: config.backend,
            sources: &config.sources,
            capacity: config.capacity,
            categories: table,
            diagnostics: &diagnostics,
        })?,
        OutputFormat::Human => {
            println!("backend:  {}", config.backend);
            let sources: Vec<String> = config.sources.iter().map(|s| s.to_string()).collect();
            println!("sources:  {}", sources.join(", "));
            println!("capacity: {}", config.capacity);
            for category in Category::ALL {
                let set = table.set(category);
                let shown = if set.is_empty() {
                    "-".to_string()
                } else {
                    set.to_range_list()
                };
                println!("{:<8} {:>3}  {}", category.to_string(), set.len(), shown);
            }
            for diag in &diagnostics {
                println!("error: {}: {}", diag.category.param_name(), diag.message);
            }
        }
    }

    Ok(degraded_or(&diagnostics, ExitCode::Clean))
}

// ── classify ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Classification {
    source: SourceType,
    reason: ReasonCode,
    outcome: Outcome,
    categories: Vec<Category>,
}

#[derive(Serialize)]
struct ClassifyReport<'a> {
    schema_version: &'static str,
    results: Vec<Classification>,
    diagnostics: &'a [ConfigDiagnostic],
}

fn classify(
    config: &NmiConfig,
    source: SourceType,
    reasons: &[ReasonCode],
    format: OutputFormat,
) -> nmi_common::Result<ExitCode> {
    let (table, diagnostics) = CategoryTable::build(&config.params, config.capacity);
    let engine = TriageEngine::new(table, Arc::new(CountingCapture::new()));

    let results: Vec<Classification> = reasons
        .iter()
        .map(|&reason| Classification {
            source,
            reason,
            outcome: engine.decide(reason).outcome,
            categories: engine.table().memberships(reason).collect(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&ClassifyReport {
            schema_version: SCHEMA_VERSION,
            results,
            diagnostics: &diagnostics,
        })?,
        OutputFormat::Human => {
            for r in &results {
                let cats: Vec<String> = r.categories.iter().map(|c| c.to_string()).collect();
                println!(
                    "{} {} -> {} [{}]",
                    r.source,
                    r.reason,
                    r.outcome,
                    cats.join(",")
                );
            }
        }
    }

    Ok(degraded_or(&diagnostics, ExitCode::Clean))
}

// ── simulate ────────────────────────────────────────────────────────────

enum SimHost {
    Chain(Arc<ChainHost>),
    Notifier(Arc<NotifierHost>),
}

impl SimHost {
    fn new(kind: BackendKind, halt: Arc<dyn Halt>) -> Self {
        match kind {
            BackendKind::Chain => SimHost::Chain(Arc::new(ChainHost::new(halt))),
            BackendKind::Notifier => SimHost::Notifier(Arc::new(NotifierHost::new(halt))),
        }
    }

    fn interrupt_source(&self) -> Arc<dyn InterruptSource> {
        match self {
            SimHost::Chain(host) => host.clone() as Arc<dyn InterruptSource>,
            SimHost::Notifier(host) => host.clone() as Arc<dyn InterruptSource>,
        }
    }

    /// Deliver through the host. The notifier backend only carries
    /// `Unknown`, so callers check the source is bound first.
    fn deliver(&self, source: SourceType, reason: ReasonCode) -> Option<String> {
        match self {
            SimHost::Chain(host) => host.deliver(source, reason).handled_by,
            SimHost::Notifier(host) => host.notify(DieEvent::NmiUnknown, reason),
        }
    }
}

#[derive(Serialize)]
struct SimulatedEvent {
    source: SourceType,
    reason: ReasonCode,
    /// Whether the host ran its handler chain for this event.
    delivered: bool,
    /// Outcome the engine recorded; `None` when it never ran.
    outcome: Option<Outcome>,
    handled_by: Option<String>,
    halt_withheld: bool,
}

impl SimulatedEvent {
    fn skipped(source: SourceType, reason: ReasonCode, halt_withheld: bool) -> Self {
        Self {
            source,
            reason,
            delivered: false,
            outcome: None,
            handled_by: None,
            halt_withheld,
        }
    }
}

#[derive(Serialize)]
struct SimulateReport<'a> {
    schema_version: &'static str,
    backend: BackendKind,
    bound: &'a [SourceType],
    skipped: &'a [SourceType],
    events: Vec<SimulatedEvent>,
    stats: TriageStats,
    diagnostics: &'a [ConfigDiagnostic],
}

fn simulate(
    config: &NmiConfig,
    source: SourceType,
    reasons: &[ReasonCode],
    allow_halt: bool,
    backtrace: bool,
    format: OutputFormat,
) -> nmi_common::Result<ExitCode> {
    let halt: Arc<dyn Halt> = if allow_halt {
        Arc::new(AbortHalt)
    } else {
        Arc::new(PanicHalt)
    };
    let capture: Arc<dyn DiagnosticCapture> = if backtrace {
        Arc::new(BacktraceCapture)
    } else {
        Arc::new(CountingCapture::new())
    };

    let host = SimHost::new(config.backend, halt);
    let mut manager = NmiManager::start_with(
        config,
        host.interrupt_source(),
        capture,
        HandlerBinding::Global,
    )?;

    let source_bound = manager.bound_sources().contains(&source);
    if !source_bound {
        tracing::warn!(
            %source,
            backend = %config.backend,
            "source not bound, events will not be delivered"
        );
    }

    let mut events = Vec::with_capacity(reasons.len());
    let mut withheld = false;
    let mut undelivered = false;
    for &reason in reasons {
        if !source_bound {
            undelivered = true;
            events.push(SimulatedEvent::skipped(source, reason, false));
            continue;
        }
        if manager.engine().decide(reason).outcome.is_terminal() && !allow_halt {
            tracing::warn!(%source, reason = reason.0, "halt withheld (use --allow-halt)");
            withheld = true;
            events.push(SimulatedEvent::skipped(source, reason, true));
            continue;
        }

        let before = manager.engine().stats();
        let handled_by = host.deliver(source, reason);
        let outcome = manager.engine().stats().since(&before).single_outcome();
        events.push(SimulatedEvent {
            source,
            reason,
            delivered: true,
            outcome,
            handled_by,
            halt_withheld: false,
        });
    }

    let stats = manager.engine().stats();
    let summary = manager.registration().clone();
    let diagnostics = manager.diagnostics().to_vec();
    let teardown = manager.shutdown();

    match format {
        OutputFormat::Json => print_json(&SimulateReport {
            schema_version: SCHEMA_VERSION,
            backend: config.backend,
            bound: &summary.bound,
            skipped: &summary.skipped,
            events,
            stats,
            diagnostics: &diagnostics,
        })?,
        OutputFormat::Human => {
            let bound: Vec<String> = summary.bound.iter().map(|s| s.to_string()).collect();
            println!("bound: {}", bound.join(", "));
            for e in &events {
                let outcome = e
                    .outcome
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let by = match (&e.handled_by, e.halt_withheld, e.delivered) {
                    (_, true, _) => "halt withheld".to_string(),
                    (_, false, false) => "not delivered, source not bound".to_string(),
                    (Some(name), false, true) => format!("handled by {name}"),
                    (None, false, true) => "passed to other handlers".to_string(),
                };
                println!("{} {} -> {} ({})", e.source, e.reason, outcome, by);
            }
            println!(
                "stats: suppressed={} dropped={} panics={} unmanaged={} captures={}",
                stats.suppressed, stats.dropped, stats.panics, stats.unmanaged, stats.captures
            );
            for failure in &teardown.failed {
                println!("teardown: {} {}", failure.source, failure.error);
            }
        }
    }

    let code = if undelivered {
        ExitCode::NotDelivered
    } else if withheld {
        ExitCode::HaltWithheld
    } else {
        ExitCode::Clean
    };
    Ok(degraded_or(&diagnostics, code))
}

fn print_json<T: Serialize>(value: &T) -> nmi_common::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}
