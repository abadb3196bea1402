use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use stonks_core_types::{Envelope, Props, RawEvent, ViewArgs, PAGE_VIEW};
use stonks_event_bus::outcome_bus;
use stonks_observe::{current_policy, init_tracing, set_policy, ObsPolicyView};
use stonks_tracker::compose::EventComposer;
use stonks_tracker::config::load_options;
use stonks_tracker::delivery::{DeliveryChannel, DeliveryPlan};
use stonks_tracker::host::memory::MemoryHost;
use stonks_tracker::host::PageContext;
use stonks_tracker::props::parse_props;
use stonks_tracker::utm::parse_utm_params;
use stonks_tracker::{TrackerConfig, TrackerOptions};
use tracing::{debug, error, info};

/// Stonks - compose and send tracker events from the command line
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (JSON tracker options)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the send pipeline against a simulated page and print the result
    Compose(EventArgs),
    /// Compose an event and POST it to the collector
    Send(EventArgs),
    /// Show version and build information
    Version,
}

#[derive(Args, Clone, Debug)]
struct EventArgs {
    /// Page location the event is reported from
    #[arg(long)]
    url: String,

    /// Event type; `PageView` applies page-view rules (UTM extraction)
    #[arg(long, default_value = PAGE_VIEW)]
    event: String,

    /// Path override replacing the location path
    #[arg(long)]
    path: Option<String>,

    /// Event property as `key:value` (repeatable)
    #[arg(long = "prop", value_name = "KEY:VALUE")]
    props: Vec<String>,

    /// Explicit referrer
    #[arg(long)]
    referrer: Option<String>,

    /// Collector endpoint
    #[arg(long)]
    collector: Option<String>,

    /// Stand-in hostname reported for localhost pages
    #[arg(long)]
    track_localhost_as: Option<String>,

    /// Enable hash-based routing
    #[arg(long)]
    hash_routing: bool,
}

impl EventArgs {
    fn options(&self) -> TrackerOptions {
        TrackerOptions {
            collector_url: self.collector.clone(),
            track_localhost_as: self.track_localhost_as.clone(),
            hash_routing: self.hash_routing.then_some(true),
            ..TrackerOptions::default()
        }
    }

    fn props(&self) -> Option<Props> {
        let props: Props = self.props.iter().flat_map(|raw| parse_props(raw)).collect();
        (!props.is_empty()).then_some(props)
    }

    fn raw_event(&self, page: &MemoryHost) -> RawEvent {
        let event = if self.event == PAGE_VIEW {
            let path = self.path.clone().unwrap_or_else(|| page.pathname());
            RawEvent::page_view(path, self.props(), parse_utm_params(&page.search()))
        } else {
            RawEvent::custom(
                &self.event,
                ViewArgs {
                    path: self.path.clone(),
                    props: self.props(),
                },
            )
        };
        match &self.referrer {
            Some(referrer) => event.with_referrer(referrer),
            None => event,
        }
    }
}

struct Composed {
    config: TrackerConfig,
    envelope: Envelope,
    plan: DeliveryPlan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.debug)?;
    debug!("Starting stonks v{}", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Commands::Compose(args) => cmd_compose(&cli, args),
        Commands::Send(args) => cmd_send(&cli, args).await,
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level: tracing::Level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let level = level.to_string().to_lowercase();
    set_policy(ObsPolicyView {
        filter: format!("stonks={level},stonks_tracker={level},warn"),
        ..current_policy()
    });
    init_tracing();
    Ok(())
}

/// `None` when the environment rules suppress the event.
fn compose(cli: &Cli, args: &EventArgs) -> Result<Option<Composed>> {
    let options = load_options(cli.config.as_deref())
        .context("Failed to load tracker options")?
        .merge(args.options());
    let config = TrackerConfig::resolve(options);

    let page = MemoryHost::new(args.url.clone());
    if page.location().is_none() {
        bail!("'{}' is not an absolute URL", args.url);
    }

    let event = args.raw_event(&page);
    let Some(envelope) = EventComposer::new(&config).compose(&page, &event)? else {
        return Ok(None);
    };
    let plan = DeliveryChannel::new(config.collector_url.clone(), outcome_bus()).plan(&envelope)?;
    Ok(Some(Composed {
        config,
        envelope,
        plan,
    }))
}

fn print_suppressed(cli: &Cli, args: &EventArgs) {
    match cli.output {
        OutputFormat::Human => println!("suppressed: {} is not reported (localhost without a stand-in host)", args.url),
        OutputFormat::Json => println!("{}", json!({ "suppressed": true, "url": args.url })),
    }
}

fn cmd_compose(cli: &Cli, args: &EventArgs) -> Result<()> {
    let Some(composed) = compose(cli, args)? else {
        print_suppressed(cli, args);
        return Ok(());
    };

    match cli.output {
        OutputFormat::Human => {
            println!("collector: {}", composed.config.collector_url);
            println!("envelope:  {}", composed.plan.body);
            match &composed.plan.image_url {
                Some(url) => println!("image:     {url}"),
                None => println!("image:     skipped (payload over GET threshold)"),
            }
            println!("fallback:  sendBeacon, then fetch(keepalive)");
        }
        OutputFormat::Json => {
            let report = json!({
                "collector": composed.config.collector_url,
                "envelope": composed.envelope,
                "imageUrl": composed.plan.image_url,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn cmd_send(cli: &Cli, args: &EventArgs) -> Result<()> {
    let Some(composed) = compose(cli, args)? else {
        print_suppressed(cli, args);
        return Ok(());
    };

    let collector = &composed.config.collector_url;
    info!(collector = %collector, event = %composed.envelope.event().t, "sending event");
    let response = reqwest::Client::new()
        .post(collector)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(composed.plan.body.clone())
        .send()
        .await
        .with_context(|| format!("POST {collector} failed"))?;

    let status = response.status();
    match cli.output {
        OutputFormat::Human => println!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("")),
        OutputFormat::Json => println!(
            "{}",
            json!({ "status": status.as_u16(), "envelope": composed.envelope })
        ),
    }
    if !status.is_success() {
        bail!("collector answered {status}");
    }
    Ok(())
}

fn cmd_version() {
    println!("stonks {}", env!("CARGO_PKG_VERSION"));
    println!("built:  {}", env!("BUILD_DATE"));
    println!("commit: {}", env!("GIT_HASH"));
}
