//! vault-scm - SourceGear Vault checkout and change polling CLI
//!
//! The `vault-scm` command drives the Vault client the way a CI server's
//! SCM plugin would, so jobs can poll and check out outside of one.
//!
//! ## Commands
//!
//! - `validate`: Check the job configuration
//! - `locate`: Print the Vault client that would be used
//! - `poll`: Decide whether the repository changed since a baseline
//! - `checkout`: Fetch into a workspace and record the changelog
//! - `changelog`: Print a recorded changelog

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use vault_scm_core::{
    BuildContext, ChangeLogSet, CheckoutOutcome, HostServices, Password, PollOutcome,
    RevisionMarker, ScmConfig, ScmOptions, TracingListener, VaultScm, BUILT_IN_NODE,
};

#[derive(Parser)]
#[command(name = "vault-scm")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SourceGear Vault checkout and change polling", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Job configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "VAULT_SCM_CONFIG",
        default_value = "vault-scm.toml"
    )]
    config: PathBuf,

    /// Vault password, overriding the configuration file
    #[arg(long, global = true, env = "VAULT_SCM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Node name used to pick per-node tool installations
    #[arg(long, global = true, default_value = BUILT_IN_NODE)]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report missing or invalid configuration
    Validate,

    /// Print the resolved Vault client path
    Locate,

    /// Print BUILD_NOW if the repository changed since the baseline, else NO_CHANGES
    Poll {
        /// Working directory for the client
        #[arg(short, long)]
        workspace: PathBuf,

        /// Baseline timestamp (RFC 3339)
        #[arg(long, conflicts_with = "revision")]
        since: Option<DateTime<Utc>>,

        /// Revision marker written by a previous `checkout --revision-out`
        #[arg(long)]
        revision: Option<PathBuf>,
    },

    /// Fetch the configured repository folder into a workspace
    Checkout {
        /// Workspace directory (created if missing)
        #[arg(short, long)]
        workspace: PathBuf,

        /// Where to record the changelog
        #[arg(long)]
        changelog: Option<PathBuf>,

        /// When the previous build started (RFC 3339); read from
        /// --revision-out when omitted
        #[arg(long)]
        previous_build: Option<DateTime<Utc>>,

        /// Build number for log correlation
        #[arg(long, default_value = "1")]
        build_number: u64,

        /// Write this build's revision marker here for the next poll
        #[arg(long)]
        revision_out: Option<PathBuf>,
    },

    /// Print a recorded changelog
    Changelog {
        /// Changelog file written by `checkout --changelog`
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vault_scm_core::telemetry::init_tracing(cli.json, level);

    let password = cli.password.as_deref();
    match cli.command {
        Commands::Validate => cmd_validate(&cli.config, password).map(|_| ()),
        Commands::Locate => {
            let scm = build_scm(&cli.config, password)?;
            cmd_locate(&scm, &cli.node).await.map(|_| ())
        }
        Commands::Poll {
            workspace,
            since,
            revision,
        } => {
            let scm = build_scm(&cli.config, password)?;
            let baseline = resolve_baseline(since, revision.as_deref())?;
            cmd_poll(&scm, &baseline, &workspace, &cli.node)
                .await
                .map(|_| ())
        }
        Commands::Checkout {
            workspace,
            changelog,
            previous_build,
            build_number,
            revision_out,
        } => {
            let scm = build_scm(&cli.config, password)?;
            cmd_checkout(
                &scm,
                &workspace,
                changelog.as_deref(),
                previous_build,
                build_number,
                revision_out.as_deref(),
                &cli.node,
            )
            .await
            .map(|_| ())
        }
        Commands::Changelog { file, format } => {
            let scm = build_scm(&cli.config, password)?;
            cmd_changelog(&scm, &file, format).map(|_| ())
        }
    }
}

/// Load the configuration and wire the core to this machine.
fn build_scm(config_path: &Path, password: Option<&str>) -> Result<VaultScm> {
    let mut config = ScmConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let missing = config.missing_fields();
    if !missing.is_empty() {
        warn!(fields = %missing.join(", "), "configuration incomplete, relying on the client's stored login");
    }

    let registry = Arc::new(config.tool_registry());
    let users = Arc::new(config.user_directory());
    let options = ScmOptions {
        process_timeout: config.process_timeout(),
        default_paths: config.tool.default_paths.clone(),
        ..ScmOptions::default()
    };

    if let Some(password) = password {
        config.override_password(Password::new(password));
    }
    let settings = config
        .into_settings()
        .context("Invalid vault-scm configuration")?;

    Ok(VaultScm::new(
        settings,
        HostServices::local(registry, users),
        options,
    ))
}

/// Baseline from an explicit timestamp, a saved marker, or "never built".
fn resolve_baseline(since: Option<DateTime<Utc>>, revision: Option<&Path>) -> Result<RevisionMarker> {
    if let Some(since) = since {
        return Ok(RevisionMarker::new(since));
    }
    match revision {
        Some(path) if path.exists() => RevisionMarker::load(path)
            .with_context(|| format!("Failed to read revision marker {}", path.display())),
        Some(path) => {
            info!(path = %path.display(), "no revision marker yet, polling since epoch");
            Ok(RevisionMarker::epoch())
        }
        None => Ok(RevisionMarker::epoch()),
    }
}

/// Print configuration problems; fails if there are any.
fn cmd_validate(config_path: &Path, password: Option<&str>) -> Result<Vec<String>> {
    let mut config = ScmConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut problems: Vec<String> = config
        .missing_fields()
        .into_iter()
        .map(|field| format!("{field} is required"))
        .collect();

    if let Some(password) = password {
        config.override_password(Password::new(password));
    }
    if let Err(e) = config.into_settings() {
        problems.push(e.to_string());
    }

    if problems.is_empty() {
        println!("{}: OK", config_path.display());
        return Ok(problems);
    }
    for problem in &problems {
        println!("{problem}");
    }
    bail!(
        "{} has {} configuration problem(s)",
        config_path.display(),
        problems.len()
    )
}

async fn cmd_locate(scm: &VaultScm, node: &str) -> Result<PathBuf> {
    let path = scm
        .locate(Some(node), &TracingListener)
        .await
        .context("Failed to find Vault path")?;
    println!("{}", path.display());
    Ok(path)
}

async fn cmd_poll(
    scm: &VaultScm,
    baseline: &RevisionMarker,
    workspace: &Path,
    node: &str,
) -> Result<PollOutcome> {
    // The client must be able to start in the workspace even before the first checkout.
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let outcome = scm
        .poll_compare(baseline, workspace, Some(node), &TracingListener)
        .await
        .context("Poll failed")?;
    println!("{outcome}");
    Ok(outcome)
}

async fn cmd_checkout(
    scm: &VaultScm,
    workspace: &Path,
    changelog: Option<&Path>,
    previous_build: Option<DateTime<Utc>>,
    build_number: u64,
    revision_out: Option<&Path>,
    node: &str,
) -> Result<CheckoutOutcome> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let previous = match (previous_build, revision_out) {
        (Some(at), _) => Some(at),
        (None, Some(path)) if path.exists() => Some(
            RevisionMarker::load(path)
                .with_context(|| format!("Failed to read revision marker {}", path.display()))?
                .built_at,
        ),
        _ => None,
    };

    let mut build = BuildContext::new(build_number, Utc::now());
    build.previous_build_at = previous;
    build.node = Some(node.to_string());
    build.env = std::env::vars().collect::<BTreeMap<_, _>>();

    let outcome = scm
        .checkout(&build, workspace, &TracingListener, changelog)
        .await
        .context("Checkout aborted")?;

    if let Some(path) = revision_out {
        scm.calc_revision_state(&build)
            .save(path)
            .with_context(|| format!("Failed to write revision marker {}", path.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

fn cmd_changelog(scm: &VaultScm, file: &Path, format: OutputFormat) -> Result<ChangeLogSet> {
    let changes = scm
        .parse_changelog(file)
        .with_context(|| format!("Failed to parse changelog {}", file.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
        OutputFormat::Text => {
            if changes.is_empty() {
                println!("No changes.");
            }
            for change in &changes {
                println!(
                    "{}  {}  {}",
                    change.date,
                    change.author.display_name(),
                    change.msg()
                );
            }
        }
    }
    Ok(changes)
}
