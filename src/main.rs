//! refpromote CLI - promote a tag or branch from one repository to another

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};

use refpromote::models::Visibility;
use refpromote::services::credentials_service::TOKEN_USERNAME;
use refpromote::services::transport::apply_server_timeouts;
use refpromote::services::{
    parse_secret_ref, Anonymous, AuthProvider, BasicAuth, CancellationToken, EnvSecretSource,
    GitLabClient, KeyringSecretSource, SecretSource,
};
use refpromote::{
    OperationRequest, PlatformConfig, PromoteConfig, Promoter, PromotionReport, TagConflictPolicy,
};

/// Promote a single Git tag or branch between repositories
#[derive(Parser, Debug)]
#[command(name = "refpromote")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true, env = "REFPROMOTE_CONFIG")]
    config: Option<PathBuf>,

    /// GitLab instance for project commands
    #[arg(long, global = true, default_value = "https://gitlab.com")]
    base_url: String,

    /// Accept any TLS certificate
    #[arg(long, global = true)]
    insecure: bool,

    /// Where `--*-secret` values are read from
    #[arg(long, global = true, value_enum, default_value_t = SecretBackend::Keyring)]
    secret_backend: SecretBackend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SecretBackend {
    Keyring,
    Env,
}

impl SecretBackend {
    fn source(self) -> Box<dyn SecretSource> {
        match self {
            SecretBackend::Keyring => Box::new(KeyringSecretSource),
            SecretBackend::Env => Box::new(EnvSecretSource),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a tag or branch to a destination repository
    Promote(PromoteArgs),

    /// List the projects of a group, including subgroups
    ListProjects {
        /// Group path, e.g. `models/prod`
        #[arg(long)]
        group: String,
        /// public, private or internal
        #[arg(long)]
        visibility: Option<String>,
        #[command(flatten)]
        token: ApiToken,
        /// Print JSON instead of one line per project
        #[arg(long)]
        json: bool,
    },

    /// Fork a project into another namespace
    Fork {
        #[arg(long)]
        project_id: u64,
        /// Group the project is forked from; used to look up its name
        #[arg(long)]
        source_group: String,
        /// Namespace to fork into
        #[arg(long)]
        namespace: String,
        #[command(flatten)]
        token: ApiToken,
    },

    /// Store a secret in the OS keychain; the value is read from stdin
    StoreSecret {
        /// `namespace/key`
        secret: String,
    },
}

#[derive(Args, Debug)]
struct PromoteArgs {
    /// Source repository URL
    #[arg(long)]
    from: String,

    /// Tag or branch to promote
    #[arg(long)]
    from_ref: String,

    #[arg(long, env = "REFPROMOTE_FROM_TOKEN", hide_env_values = true)]
    from_token: Option<String>,

    /// Source token from the secret backend, as `namespace/key`
    #[arg(long, conflicts_with = "from_token")]
    from_secret: Option<String>,

    /// Destination repository URL
    #[arg(long)]
    to: String,

    /// Name on the destination; defaults to the source name
    #[arg(long)]
    to_ref: Option<String>,

    #[arg(long, env = "REFPROMOTE_TO_TOKEN", hide_env_values = true)]
    to_token: Option<String>,

    /// Destination token from the secret backend, as `namespace/key`
    #[arg(long, conflicts_with = "to_token")]
    to_secret: Option<String>,

    /// Username sent with tokens
    #[arg(long, default_value = TOKEN_USERNAME)]
    username: String,

    /// Working copy location; an existing clone there is reused
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// What to do when the tag already exists on the destination
    #[arg(long, default_value = "error")]
    on_tag_exists: TagConflictPolicy,

    #[arg(long)]
    default_branch: Option<String>,

    /// Fetch the full history instead of a shallow clone
    #[arg(long)]
    full_history: bool,

    /// Operation timeout in seconds; 0 disables it
    #[arg(long)]
    timeout: Option<u64>,

    /// Delete a reused working copy after the run
    #[arg(long)]
    remove_reused: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ApiToken {
    #[arg(long, env = "REFPROMOTE_GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// API token from the secret backend, as `namespace/key`
    #[arg(long, conflicts_with = "token")]
    token_secret: Option<String>,
}

fn resolve_token(
    token: Option<String>,
    secret: Option<&str>,
    backend: SecretBackend,
) -> anyhow::Result<Option<String>> {
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        return Ok(Some(token));
    }
    match secret {
        Some(reference) => {
            let (namespace, key) = parse_secret_ref(reference)?;
            let value = backend
                .source()
                .fetch(&namespace, &key)
                .with_context(|| format!("reading secret {}", reference))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn auth_provider(username: &str, token: Option<String>) -> Arc<dyn AuthProvider> {
    match token {
        Some(token) => Arc::new(BasicAuth::new(username, token)),
        None => Arc::new(Anonymous),
    }
}

fn api_client(
    platform: &PlatformConfig,
    token: ApiToken,
    backend: SecretBackend,
) -> anyhow::Result<GitLabClient> {
    let token = resolve_token(token.token, token.token_secret.as_deref(), backend)?
        .context("a GitLab token is required (--token or --token-secret)")?;
    Ok(GitLabClient::new(platform, token)?)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PromoteConfig> {
    match path {
        Some(path) => PromoteConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PromoteConfig::default()),
    }
}

async fn promote(
    args: PromoteArgs,
    mut config: PromoteConfig,
    insecure: bool,
    backend: SecretBackend,
) -> anyhow::Result<PromotionReport> {
    if let Some(branch) = args.default_branch {
        config.default_branch = branch;
    }
    if args.full_history {
        config.clone_depth = None;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config.insecure_skip_tls |= insecure;
    apply_server_timeouts(config.timeout()).context("setting transport timeouts")?;

    let from_token = resolve_token(args.from_token, args.from_secret.as_deref(), backend)?;
    let to_token = resolve_token(args.to_token, args.to_secret.as_deref(), backend)?;

    let mut builder = OperationRequest::builder(args.from, args.from_ref, args.to)
        .source_auth(auth_provider(&args.username, from_token))
        .destination_auth(auth_provider(&args.username, to_token))
        .policy(args.on_tag_exists)
        .remove_reused_workdir(args.remove_reused);
    if let Some(name) = args.to_ref {
        builder = builder.destination_ref(name);
    }
    if let Some(dir) = args.output_dir {
        builder = builder.workdir(dir);
    }
    let request = builder.build()?;

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; aborting transfers");
            on_interrupt.cancel();
        }
    });

    let promoter = Promoter::new(config).with_cancellation(cancellation);
    let report = tokio::task::spawn_blocking(move || promoter.promote(&request))
        .await
        .context("promotion task panicked")?;
    Ok(report)
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let platform = PlatformConfig {
        base_url: cli.base_url,
        insecure_skip_tls: cli.insecure,
    };

    match cli.command {
        Commands::Promote(args) => {
            let json = args.json;
            let config = load_config(cli.config.as_ref())?;
            let report = promote(args, config, cli.insecure, cli.secret_backend).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            if let refpromote::Outcome::Failed(err) = &report.outcome {
                eprintln!("Error: {}", err.message);
            }
            Ok(report.exit_code())
        }
        Commands::ListProjects {
            group,
            visibility,
            token,
            json,
        } => {
            // reject a bad filter before touching the network
            let visibility = visibility
                .as_deref()
                .map(str::parse::<Visibility>)
                .transpose()?;
            let client = api_client(&platform, token, cli.secret_backend)?;
            let projects = client.list_group_projects(&group, visibility).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for project in &projects {
                    println!(
                        "{}\t{}\t{}",
                        project.id,
                        project.path_with_namespace,
                        project.visibility.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(0)
        }
        Commands::Fork {
            project_id,
            source_group,
            namespace,
            token,
        } => {
            let client = api_client(&platform, token, cli.secret_backend)?;
            let source = client
                .list_group_projects(&source_group, None)
                .await?
                .into_iter()
                .find(|p| p.id == project_id)
                .with_context(|| {
                    format!("project {} not found in group '{}'", project_id, source_group)
                })?;

            if let Some(existing) = client.find_project_in_group(&namespace, &source.name).await? {
                bail!(
                    "'{}' already exists in '{}' ({})",
                    source.name,
                    namespace,
                    existing.web_url
                );
            }

            let fork = client.fork_project(project_id, &namespace).await?;
            println!("{}", fork.web_url);
            Ok(0)
        }
        Commands::StoreSecret { secret } => {
            let (namespace, key) = parse_secret_ref(&secret)?;
            let mut value = String::new();
            std::io::stdin()
                .read_to_string(&mut value)
                .context("reading secret from stdin")?;
            let value = value.trim_end_matches(['\r', '\n']);
            if value.is_empty() {
                bail!("no secret value on stdin");
            }
            KeyringSecretSource.store(&namespace, &key, value)?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    refpromote::init_tracing();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
