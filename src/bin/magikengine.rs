//! magikengine - container engine client CLI
//!
//! Drives the Remote backend of the engine facade from configuration.
//!
//! ## Usage
//!
//! ```sh
//! magikengine [--config <path>] [--url <uri>] <command> [args]
//!
//! magikengine healthcheck <container>
//! magikengine events [--filter key=value]... [--since t] [--until t] [--no-stream]
//! magikengine network-update <network> [--dns-add ip]... [--dns-drop ip]...
//! magikengine artifact-pull <name> [--authfile p] [--creds user:pass] [--retry n] [--quiet]
//! magikengine untag <image> [repo:tag]...
//! magikengine info
//! ```
//!
//! ## Configuration
//!
//! Defaults, then `$XDG_CONFIG_HOME/magikengine/engine.yaml` (or `--config`),
//! then environment (`CONTAINER_HOST`, `MAGIKENGINE_MODE`, ...), then flags.
//! Log filter comes from `MAGIKENGINE_LOG` (default `warn`), written to stderr.

use anyhow::{Context, bail};
use magikengine::config::{self, EngineMode};
use magikengine::constants::{API_VERSION, ENV_HOST, ENV_LOG, EVENT_CHANNEL_CAPACITY};
use magikengine::engine::{
    ArtifactPullOptions, AutoUpdateOptions, EventsEnd, EventsOptions, HealthCheckOptions,
    ImageUntagOptions, NetworkUpdateOptions, ShowTrustOptions,
};
use magikengine::{ContainerEngine, EngineBuilder, EventSubscription};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Default)]
struct GlobalArgs {
    config: Option<PathBuf>,
    url: Option<String>,
}

#[derive(Debug)]
enum Command {
    HealthCheck {
        name: String,
    },
    AutoUpdate {
        opts: AutoUpdateOptions,
    },
    Events {
        opts: EventsOptions,
    },
    NetworkUpdate {
        name: String,
        opts: NetworkUpdateOptions,
    },
    ArtifactPull {
        name: String,
        opts: ArtifactPullOptions,
    },
    Untag {
        image: String,
        tags: Vec<String>,
    },
    Info,
    TrustShow {
        images: Vec<String>,
    },
    Version,
    Help,
}

/// Returns the value following a flag.
fn flag_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

/// Returns the first positional argument after the subcommand.
fn positional(rest: &[String], command: &str, what: &str) -> Result<String, String> {
    rest.first()
        .filter(|a| !a.starts_with('-'))
        .cloned()
        .ok_or_else(|| format!("{command} requires <{what}>"))
}

fn parse_args(args: &[String]) -> Result<(GlobalArgs, Command), String> {
    let mut global = GlobalArgs::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                global.config = Some(PathBuf::from(flag_value(args, &mut i, "--config")?));
            }
            "--url" => global.url = Some(flag_value(args, &mut i, "--url")?),
            _ => break,
        }
        i += 1;
    }

    let Some(command) = args.get(i) else {
        return Ok((global, Command::Help));
    };
    let rest = &args[i + 1..];

    let cmd = match command.as_str() {
        "healthcheck" => Command::HealthCheck {
            name: positional(rest, "healthcheck", "container")?,
        },
        "auto-update" => {
            let mut opts = AutoUpdateOptions::default();
            let mut j = 0;
            while j < rest.len() {
                match rest[j].as_str() {
                    "--authfile" => {
                        opts.authfile = Some(flag_value(rest, &mut j, "--authfile")?.into());
                    }
                    "--dry-run" => opts.dry_run = true,
                    "--rollback" => opts.rollback = true,
                    other => return Err(format!("unknown auto-update flag: {other}")),
                }
                j += 1;
            }
            Command::AutoUpdate { opts }
        }
        "events" => {
            let mut opts = EventsOptions::default();
            let mut j = 0;
            while j < rest.len() {
                match rest[j].as_str() {
                    "--filter" | "-f" => opts.filters.push(flag_value(rest, &mut j, "--filter")?),
                    "--since" => opts.since = Some(flag_value(rest, &mut j, "--since")?),
                    "--until" => opts.until = Some(flag_value(rest, &mut j, "--until")?),
                    "--no-stream" => opts.stream = false,
                    other => return Err(format!("unknown events flag: {other}")),
                }
                j += 1;
            }
            Command::Events { opts }
        }
        "network-update" => {
            let name = positional(rest, "network-update", "network")?;
            let mut opts = NetworkUpdateOptions::default();
            let mut j = 1;
            while j < rest.len() {
                match rest[j].as_str() {
                    "--dns-add" => opts
                        .add_dns_servers
                        .push(flag_value(rest, &mut j, "--dns-add")?),
                    "--dns-drop" => opts
                        .remove_dns_servers
                        .push(flag_value(rest, &mut j, "--dns-drop")?),
                    other => return Err(format!("unknown network-update flag: {other}")),
                }
                j += 1;
            }
            Command::NetworkUpdate { name, opts }
        }
        "artifact-pull" => {
            let name = positional(rest, "artifact-pull", "name")?;
            let mut opts = ArtifactPullOptions::default();
            let mut j = 1;
            while j < rest.len() {
                match rest[j].as_str() {
                    "--authfile" => {
                        opts.authfile = Some(flag_value(rest, &mut j, "--authfile")?.into());
                    }
                    "--creds" => {
                        let creds = flag_value(rest, &mut j, "--creds")?;
                        let (user, pass) = creds.split_once(':').unwrap_or((creds.as_str(), ""));
                        opts.username = Some(user.to_string());
                        opts.password = Some(pass.to_string());
                    }
                    "--retry" => {
                        let value = flag_value(rest, &mut j, "--retry")?;
                        let retry = value
                            .parse()
                            .map_err(|_| format!("invalid --retry: {value}"))?;
                        opts.retry = Some(retry);
                    }
                    "--retry-delay" => {
                        opts.retry_delay = Some(flag_value(rest, &mut j, "--retry-delay")?);
                    }
                    "--quiet" | "-q" => opts.quiet = Some(true),
                    "--tls-verify=false" => opts.tls_verify = Some(false),
                    "--tls-verify" | "--tls-verify=true" => opts.tls_verify = Some(true),
                    other => return Err(format!("unknown artifact-pull flag: {other}")),
                }
                j += 1;
            }
            Command::ArtifactPull { name, opts }
        }
        "untag" => Command::Untag {
            image: positional(rest, "untag", "image")?,
            tags: rest.iter().skip(1).cloned().collect(),
        },
        "info" => Command::Info,
        "trust-show" => Command::TrustShow {
            images: rest.to_vec(),
        },
        "version" | "--version" | "-v" => Command::Version,
        "help" | "--help" | "-h" => Command::Help,
        unknown => return Err(format!("unknown command: {unknown}")),
    };
    Ok((global, cmd))
}

// =============================================================================
// Commands
// =============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(global: &GlobalArgs) -> anyhow::Result<Arc<dyn ContainerEngine>> {
    let mut config = config::load(global.config.as_deref())?;
    if let Some(url) = &global.url {
        config.mode = EngineMode::Remote.to_string();
        config.uri = Some(url.clone());
        config.machine_mode = false;
    }
    if config.engine_mode()? == EngineMode::Direct {
        bail!("direct mode needs an embedding runtime; set {ENV_HOST} or --url");
    }
    let engine = EngineBuilder::new(config)
        .build()
        .await
        .context("failed to connect to engine")?;
    Ok(engine)
}

async fn cmd_events(engine: Arc<dyn ContainerEngine>, opts: EventsOptions) -> anyhow::Result<()> {
    let mut subscription = EventSubscription::spawn(engine, opts, EVENT_CHANNEL_CAPACITY);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = subscription.events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }
    match subscription.stop().await? {
        EventsEnd::Cancelled => tracing::debug!("event subscription cancelled"),
        EventsEnd::StreamClosed => tracing::debug!("event stream closed"),
    }
    Ok(())
}

async fn run(global: GlobalArgs, cmd: Command) -> anyhow::Result<()> {
    match &cmd {
        Command::Version => {
            cmd_version();
            return Ok(());
        }
        Command::Help => {
            cmd_help();
            return Ok(());
        }
        _ => {}
    }

    let engine = connect(&global).await?;
    let result = match cmd {
        Command::HealthCheck { name } => engine
            .health_check_run(&name, HealthCheckOptions::default())
            .await
            .map_err(anyhow::Error::from)
            .and_then(|report| print_json(&report)),
        Command::AutoUpdate { opts } => {
            let (reports, errors) = engine.auto_update(opts).await;
            print_json(&reports)?;
            for e in &errors {
                eprintln!("error: {e}");
            }
            if errors.is_empty() {
                Ok(())
            } else {
                bail!("auto-update finished with {} error(s)", errors.len())
            }
        }
        Command::Events { opts } => cmd_events(Arc::clone(&engine), opts).await,
        Command::NetworkUpdate { name, opts } => engine
            .network_update(&name, opts)
            .await
            .map(|()| println!("{name}"))
            .map_err(Into::into),
        Command::ArtifactPull { name, opts } => engine
            .artifact_pull(&name, opts)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|report| print_json(&report)),
        Command::Untag { image, tags } => engine
            .image_untag(&image, &tags, ImageUntagOptions::default())
            .await
            .map_err(Into::into),
        Command::Info => engine
            .info()
            .await
            .map_err(anyhow::Error::from)
            .and_then(|info| print_json(&info)),
        Command::TrustShow { images } => engine
            .show_trust(&images, ShowTrustOptions::default())
            .await
            .map_err(anyhow::Error::from)
            .and_then(|report| print_json(&report)),
        Command::Version | Command::Help => Ok(()),
    };
    engine.shutdown().await;
    result
}

fn cmd_version() {
    println!("magikengine version {}", env!("CARGO_PKG_VERSION"));
    println!("api version: {API_VERSION}");
}

fn cmd_help() {
    println!(
        r#"magikengine - container engine client

USAGE:
    magikengine [--config <path>] [--url <uri>] <command> [args]

COMMANDS:
    healthcheck <container>            Run a container's health check
    auto-update [--dry-run]            Auto-update containers (direct mode only)
    events [--filter k=v] [--no-stream]
                                       Stream engine events until Ctrl-C
    network-update <network> [--dns-add ip] [--dns-drop ip]
                                       Update a network's DNS servers
    artifact-pull <name> [--authfile p] [--creds user:pass] [--retry n]
                                       Pull an artifact
    untag <image> [repo:tag]...        Remove tags (all tags if none given)
    info                               Show engine information
    trust-show [image]...              Show image trust policy (direct mode only)
    version                            Print version information
    help                               Print this help

ENVIRONMENT:
    CONTAINER_HOST                     Engine URI (unix://, npipe://, tcp://)
    MAGIKENGINE_MACHINE                Connect through the named machine
    MAGIKENGINE_LOG                    Log filter (default: warn)
"#
    );
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let (global, cmd) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("error: {e}");
            cmd_help();
            return ExitCode::FAILURE;
        }
    };
    init_logging();

    match run(global, cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
