use std::{path::PathBuf, time::Duration};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    easel_browser::{CdpConnector, ManagerClient, SessionOptions},
    easel_config::EaselConfig,
    easel_engine::{
        AspectRatio, EventKind, JobScheduler, JobSpec, LogLevel, Selectors,
    },
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "easel", about = "Easel — browser-driven image generation jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List connectable browser profiles reported by the manager.
    Profiles,
    /// Run generation jobs, one per browser profile.
    Run {
        /// Browser profile to attach to; repeat for concurrent jobs.
        /// Defaults to the last one used.
        #[arg(long)]
        identity: Vec<String>,
        /// Prompt text. Defaults to the last one used.
        #[arg(long)]
        prompt: Option<String>,
        /// Aspect ratio label, e.g. "16:9".
        #[arg(long)]
        ratio: Option<String>,
        /// Generation cycles to run.
        #[arg(long)]
        iterations: Option<u32>,
        /// Base output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Short name used for the per-job subfolder.
        #[arg(long)]
        name: Option<String>,
        /// Write artifacts directly into the output directory, without a
        /// per-job subfolder.
        #[arg(long, default_value_t = false)]
        no_subfolder: bool,
        /// Disable the capture fallback for failed exports.
        #[arg(long, default_value_t = false)]
        no_capture_fallback: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn manager_client(cfg: &EaselConfig) -> anyhow::Result<ManagerClient> {
    ManagerClient::new(
        &cfg.manager.base_url,
        Duration::from_secs(cfg.manager.request_timeout_secs),
    )
    .context("building browser-manager client")
}

async fn list_profiles(cfg: &EaselConfig) -> anyhow::Result<()> {
    let profiles = manager_client(cfg)?
        .list_running()
        .await
        .context("listing browser profiles")?;

    if profiles.is_empty() {
        println!("no running browser profiles");
        return Ok(());
    }
    for profile in profiles {
        println!("{}\t{}", profile.id, profile.name);
    }
    Ok(())
}

struct RunArgs {
    identity: Vec<String>,
    prompt: Option<String>,
    ratio: Option<String>,
    iterations: Option<u32>,
    output_dir: Option<PathBuf>,
    name: Option<String>,
    no_subfolder: bool,
    no_capture_fallback: bool,
}

/// The profiles to run against: every `--identity` given, or the
/// remembered one.
fn resolve_identities(cfg: &EaselConfig, args: &RunArgs) -> anyhow::Result<Vec<String>> {
    if !args.identity.is_empty() {
        return Ok(args.identity.clone());
    }
    cfg.defaults
        .last_identity
        .clone()
        .map(|id| vec![id])
        .context("no --identity given and none remembered from a previous run")
}

/// Merge CLI overrides over the config defaults into a job spec.
fn build_spec(cfg: &EaselConfig, args: &RunArgs, identity: String) -> anyhow::Result<JobSpec> {
    let prompt = args
        .prompt
        .clone()
        .or_else(|| cfg.defaults.last_prompt.clone())
        .context("no --prompt given and none remembered from a previous run")?;

    let ratio_label = args.ratio.as_deref().unwrap_or(&cfg.defaults.last_ratio);
    let ratio = AspectRatio::parse(ratio_label).map_err(|e| {
        warn!("{e}");
        anyhow::anyhow!("{e}; supported: {}", supported_ratios())
    })?;

    Ok(JobSpec {
        identity,
        name: args.name.clone(),
        prompt,
        ratio,
        iterations: args.iterations.unwrap_or(cfg.defaults.last_count).max(1),
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&cfg.defaults.output_dir)),
        file_prefix: cfg.defaults.file_prefix.clone(),
        per_job_subfolder: cfg.defaults.per_job_subfolder && !args.no_subfolder,
        enhanced_capture: cfg.defaults.enhanced_capture && !args.no_capture_fallback,
        min_delay: Duration::from_secs(cfg.defaults.min_delay_secs),
        max_delay: Duration::from_secs(cfg.defaults.max_delay_secs),
        generation_timeout: Duration::from_secs(cfg.defaults.generation_timeout_secs),
    })
}

fn supported_ratios() -> String {
    AspectRatio::ALL
        .iter()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remember the submitted values for the next invocation.
fn persist_submission(cfg: &mut EaselConfig, spec: &JobSpec) {
    cfg.defaults.last_identity = Some(spec.identity.clone());
    cfg.defaults.last_prompt = Some(spec.prompt.clone());
    cfg.defaults.last_ratio = spec.ratio.label().to_string();
    cfg.defaults.last_count = spec.iterations;
    cfg.defaults.output_dir = spec.output_dir.to_string_lossy().into_owned();
    if let Err(e) = easel_config::save_config(cfg) {
        warn!(error = %e, "could not persist configuration");
    }
}

async fn run_jobs(cfg: &mut EaselConfig, args: &RunArgs) -> anyhow::Result<()> {
    let identities = resolve_identities(cfg, args)?;

    let manager = manager_client(cfg)?;
    let options = SessionOptions {
        app_url: cfg.target.app_url.clone(),
        url_fragment: cfg.target.url_fragment.clone(),
        request_timeout: Duration::from_secs(cfg.manager.request_timeout_secs),
    };
    let connector = CdpConnector::new(manager, options);
    let selectors = Selectors::from(&cfg.selectors);
    let (scheduler, mut events) =
        JobScheduler::new(connector, selectors, cfg.defaults.max_concurrent);

    let mut pending = std::collections::HashSet::new();
    let mut last_spec = None;
    for identity in identities {
        let spec = build_spec(cfg, args, identity)?;
        match scheduler.submit(spec.clone()).await {
            Ok(id) => {
                info!(job = %id, identity = spec.identity, "job submitted");
                pending.insert(id);
                last_spec = Some(spec);
            }
            Err(e) => {
                warn!(identity = spec.identity, "submission rejected: {e}");
            }
        }
    }
    let Some(last_spec) = last_spec else {
        anyhow::bail!("no job was admitted");
    };
    persist_submission(cfg, &last_spec);

    // Single drain loop; Ctrl-C requests a cooperative stop and draining
    // continues until every admitted job reports its terminal event.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("stop requested, finishing current steps");
                scheduler.stop_all().await;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.kind {
                    EventKind::Log { level: LogLevel::Info, message } => {
                        println!("[{}] {message}", event.job);
                    }
                    EventKind::Log { level: LogLevel::Warn, message } => {
                        println!("[{}] warning: {message}", event.job);
                    }
                    EventKind::Progress { current, total } => {
                        println!("[{}] iteration {current}/{total}", event.job);
                    }
                    EventKind::Status(status) => {
                        println!("[{}] {status}", event.job);
                    }
                    EventKind::Error(message) => {
                        eprintln!("[{}] error: {message}", event.job);
                    }
                    EventKind::Done { artifacts } => {
                        println!("[{}] finished with {artifacts} artifact(s)", event.job);
                        pending.remove(&event.job);
                        if pending.is_empty() {
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut cfg = easel_config::discover_and_load();

    match cli.command {
        Commands::Profiles => list_profiles(&cfg).await,
        Commands::Run {
            identity,
            prompt,
            ratio,
            iterations,
            output_dir,
            name,
            no_subfolder,
            no_capture_fallback,
        } => {
            let args = RunArgs {
                identity,
                prompt,
                ratio,
                iterations,
                output_dir,
                name,
                no_subfolder,
                no_capture_fallback,
            };
            run_jobs(&mut cfg, &args).await
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(identity: Vec<String>) -> RunArgs {
        RunArgs {
            identity,
            prompt: Some("a fox in watercolour".into()),
            ratio: None,
            iterations: None,
            output_dir: None,
            name: None,
            no_subfolder: false,
            no_capture_fallback: false,
        }
    }

    #[test]
    fn identity_flag_is_repeatable() {
        let cli = Cli::try_parse_from([
            "easel",
            "run",
            "--identity",
            "profile-a",
            "--identity",
            "profile-b",
            "--prompt",
            "p",
        ])
        .unwrap();
        let Commands::Run { identity, .. } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(identity, ["profile-a", "profile-b"]);
    }

    #[test]
    fn identities_fall_back_to_remembered_profile() {
        let mut cfg = EaselConfig::default();
        cfg.defaults.last_identity = Some("profile-7".into());

        let explicit = resolve_identities(&cfg, &run_args(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(explicit, ["a", "b"]);

        let remembered = resolve_identities(&cfg, &run_args(vec![])).unwrap();
        assert_eq!(remembered, ["profile-7"]);

        cfg.defaults.last_identity = None;
        assert!(resolve_identities(&cfg, &run_args(vec![])).is_err());
    }

    #[test]
    fn spec_merges_cli_over_config_defaults() {
        let cfg = EaselConfig::default();
        let mut args = run_args(vec![]);
        args.ratio = Some("16:9".into());
        args.iterations = Some(3);

        let spec = build_spec(&cfg, &args, "profile-1".into()).unwrap();
        assert_eq!(spec.identity, "profile-1");
        assert_eq!(spec.ratio, AspectRatio::Widescreen);
        assert_eq!(spec.iterations, 3);
        assert!(spec.per_job_subfolder);
    }
}
