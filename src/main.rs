use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use resolver_core::{RepositoryContext, ResolverConfig, CONFIG_FILE_NAME};
use resolver_engine::dispatch::{classify, Dispatch};
use resolver_engine::llm::LlmClient;
use resolver_engine::telemetry::TracingSink;
use resolver_engine::workflow::Workflows;
use resolver_github::event::ActionEvent;
use resolver_github::github::GitHubClient;

#[derive(Parser)]
#[command(
    name = "ai-issue-resolver",
    version,
    about = "Turn labelled issues and PR comments into AI-generated changes and reviews",
    long_about = "Reacts to GitHub Actions events.\n\n\
                   An `issues` event carrying the trigger label generates a fix and opens a pull request.\n\
                   A comment starting with the change command applies feedback to the pull request.\n\
                   A comment starting with the review command posts an AI review.\n\n\
                   Examples:\n  \
                     ai-issue-resolver run                          Handle the event from the Actions environment\n  \
                     ai-issue-resolver classify --event-name issues --event-path event.json\n  \
                     ai-issue-resolver init                         Write a default .ai-issue-resolver.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .ai-issue-resolver.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct EventArgs {
    /// Event name (default: $GITHUB_EVENT_NAME)
    #[arg(long)]
    event_name: Option<String>,

    /// Path to the event payload (default: $GITHUB_EVENT_PATH)
    #[arg(long)]
    event_path: Option<PathBuf>,

    /// Repository as owner/name (default: payload, then $GITHUB_REPOSITORY)
    #[arg(long)]
    repo: Option<String>,
}

#[derive(clap::Args)]
struct RunOverrides {
    /// GitHub token (default: input github-token, then $GITHUB_TOKEN)
    #[arg(long)]
    github_token: Option<String>,

    /// API key for the model provider
    #[arg(long)]
    model_api_key: Option<String>,

    /// Model provider: openai or anthropic
    #[arg(long)]
    model_provider: Option<String>,

    /// Model name
    #[arg(long)]
    model_name: Option<String>,

    /// Base URL for an OpenAI-compatible endpoint
    #[arg(long)]
    model_base_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one event: generate a PR, apply feedback, or review
    #[command(long_about = "Handle one GitHub Actions event.\n\n\
        Settings are layered: defaults, then the config file, then action inputs\n\
        (INPUT_* environment variables), then these flags.\n\n\
        Examples:\n  ai-issue-resolver run\n  ai-issue-resolver run --model-provider anthropic --model-name claude-sonnet-4-5")]
    Run {
        #[command(flatten)]
        event: EventArgs,

        #[command(flatten)]
        overrides: RunOverrides,
    },
    /// Print which workflow an event would start, without network access
    Classify {
        #[command(flatten)]
        event: EventArgs,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a default .ai-issue-resolver.toml in the current directory
    Init,
}

const DEFAULT_CONFIG: &str = r#"# ai-issue-resolver configuration
# Action inputs and command-line flags override these values.

[llm]
# provider = "openai"          # or "anthropic"
# model = "gpt-4"
# base_url = "https://api.openai.com/v1"
# api_key is normally supplied through the model-api-key input

[github]
# api_url = "https://api.github.com"

[commands]
# trigger_label = "ai-fix"
# change_command = "/ai-issue-resolver-change"
# review_command = "/ai-issue-resolver-review"
# branch_prefix = "ai-fix/issue-"
# pr_labels = ["ai-generated"]
# base_branch = "main"
# max_file_bytes = 100000
"#;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn load_event(args: &EventArgs) -> Result<ActionEvent> {
    let mut event = match (&args.event_name, &args.event_path) {
        (None, None) => ActionEvent::from_env(env)?,
        (name, path) => {
            let name = name
                .clone()
                .or_else(|| env("GITHUB_EVENT_NAME"))
                .ok_or_else(|| miette::miette!("--event-name or GITHUB_EVENT_NAME is required"))?;
            let path = path
                .clone()
                .or_else(|| env("GITHUB_EVENT_PATH").map(PathBuf::from))
                .ok_or_else(|| miette::miette!("--event-path or GITHUB_EVENT_PATH is required"))?;
            let mut event = ActionEvent::from_file(&name, &path)
                .wrap_err_with(|| format!("failed to load event from {}", path.display()))?;
            if event.repository.is_none() {
                event.repository = env("GITHUB_REPOSITORY")
                    .as_deref()
                    .and_then(RepositoryContext::from_full_name);
            }
            event
        }
    };
    if let Some(full_name) = &args.repo {
        let mut repo = RepositoryContext::from_full_name(full_name)
            .ok_or_else(|| miette::miette!("--repo must be owner/name, got '{full_name}'"))?;
        repo.default_branch = event
            .repository
            .as_ref()
            .and_then(|r| r.default_branch.clone());
        event.repository = Some(repo);
    }
    Ok(event)
}

/// Layer action inputs and flags over the config file.
fn load_run_config(path: Option<&Path>, overrides: RunOverrides) -> Result<ResolverConfig> {
    let mut config = ResolverConfig::load(path)?;
    config.apply_action_inputs(env);
    if let Some(token) = overrides.github_token {
        config.github.token = Some(token);
    }
    if let Some(key) = overrides.model_api_key {
        config.llm.api_key = Some(key);
    }
    if let Some(provider) = overrides.model_provider {
        config.llm.provider = provider;
    }
    if let Some(model) = overrides.model_name {
        config.llm.model = model;
    }
    if let Some(url) = overrides.model_base_url {
        config.llm.base_url = Some(url);
    }
    Ok(config)
}

async fn run_command(
    config_path: Option<&Path>,
    event: &EventArgs,
    overrides: RunOverrides,
) -> Result<()> {
    let config = load_run_config(config_path, overrides)?;
    let event = load_event(event)?;
    run(config, event).await
}

/// Escape a message for an Actions workflow command.
fn escape_annotation(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

async fn run(config: ResolverConfig, event: ActionEvent) -> Result<()> {
    // classify first so ignored events need no credentials
    if classify(&event, &config.commands) == Dispatch::Ignore {
        tracing::info!(event = %event.kind, "event does not match any workflow, nothing to do");
        return Ok(());
    }
    config.validate_for_run()?;

    let repo_ctx = event
        .repository
        .clone()
        .ok_or_else(|| miette::miette!("event has no repository; pass --repo or set GITHUB_REPOSITORY"))?;
    let base_branch = repo_ctx
        .default_branch
        .clone()
        .unwrap_or_else(|| config.commands.base_branch.clone());
    let token = config.github.token.as_deref().unwrap_or_default();

    let github = GitHubClient::new(token, config.github.api_url.as_deref(), repo_ctx)?;
    let llm = LlmClient::new(&config.llm)?;
    let telemetry = TracingSink;
    tracing::info!(
        repo = %github.repository(),
        provider = %config.llm.provider,
        model = %config.llm.model,
        base = %base_branch,
        "handling event"
    );

    let workflows = Workflows::new(&llm, &github, &telemetry, config.commands, base_branch);
    let decision = workflows.handle(&event).await?;
    tracing::info!(%decision, "done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { event, overrides } => {
            if let Err(e) = run_command(cli.config.as_deref(), &event, overrides).await {
                // surfaces as an annotation on the workflow run
                println!("::error::{}", escape_annotation(&e.to_string()));
                eprintln!("{e:?}");
                std::process::exit(1);
            }
        }
        Command::Classify { event, json } => {
            let config = ResolverConfig::load(cli.config.as_deref())?;
            let event = load_event(&event)?;
            let decision = classify(&event, &config.commands);
            if json {
                let mut out = serde_json::json!({
                    "event": event.kind.to_string(),
                    "workflow": decision.name(),
                });
                match &decision {
                    Dispatch::GeneratePr(issue) => out["issue"] = issue.number.into(),
                    Dispatch::ApplyFeedback { comment, feedback } => {
                        out["issue"] = comment.issue_number().into();
                        out["feedback"] = feedback.clone().into();
                    }
                    Dispatch::Review(comment) => out["issue"] = comment.issue_number().into(),
                    Dispatch::Ignore => {}
                }
                println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
            } else {
                println!("{decision}");
            }
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
        }
    }

    Ok(())
}
