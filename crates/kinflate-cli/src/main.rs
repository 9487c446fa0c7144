//! kinflate CLI - render charts into plain Kubernetes manifests

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;
mod pipeline;

use error::Result;

#[derive(Parser)]
#[command(name = "kinflate")]
#[command(author = "kinflate contributors")]
#[command(version)]
#[command(about = "Render charts into plain Kubernetes manifests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Abort rendering after this many seconds (0 disables the timeout)
    #[arg(long, global = true, env = "KINFLATE_TIMEOUT", default_value_t = 0)]
    timeout: u64,

    /// Accept repositories missing from the repository configuration
    #[arg(
        long,
        global = true,
        env = "KINFLATE_TRUST_ANY_REPO",
        default_value_t = true,
        action = ArgAction::Set
    )]
    trust_any_repo: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file, or directory with a kustomization when ending with `/`
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Replace an existing output file or directory
    #[arg(long)]
    output_replace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the chart described by a ChartRenderer document (kustomize plugin mode)
    Generate {
        /// Configuration document, `-` for stdin
        #[arg(default_value = "-")]
        config: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Render a chart configured from flags
    Template(commands::template::TemplateArgs),

    /// Manage chart repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a repository and download its index
    Add {
        /// Repository name
        name: String,

        /// Repository URL
        url: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Bearer token
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,

        /// Read username and password from these environment variables at use time
        #[arg(
            long,
            num_args = 2,
            value_names = ["USERNAME_VAR", "PASSWORD_VAR"],
            conflicts_with_all = ["username", "password", "token"]
        )]
        credentials_env: Option<Vec<String>>,
    },

    /// List configured repositories
    List,

    /// Remove a repository
    Remove {
        /// Repository name
        name: String,
    },
}

/// Process-wide settings shared by the commands
pub struct Global {
    pub timeout: Option<Duration>,
    pub trust_any_repo: bool,
    pub cwd: PathBuf,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    // stdout carries the resource stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(debug)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let global = Global {
        timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
        trust_any_repo: cli.trust_any_repo,
        cwd: std::env::current_dir()?,
    };

    match cli.command {
        Commands::Generate { config, output } => {
            commands::generate::run(&global, &config, &output).await
        }
        Commands::Template(args) => commands::template::run(&global, args).await,
        Commands::Repo { command } => match command {
            RepoCommands::Add {
                name,
                url,
                username,
                password,
                token,
                credentials_env,
            } => {
                let credentials = commands::repo::credentials(
                    username,
                    password,
                    token,
                    credentials_env.unwrap_or_default(),
                )?;
                commands::repo::add(&name, &url, credentials).await
            }
            RepoCommands::List => commands::repo::list(),
            RepoCommands::Remove { name } => commands::repo::remove(&name),
        },
    }
}

fn main() {
    miette::set_panic_hook();
    // stderr is often captured by kustomize; no line wrapping
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().wrap_lines(false).build())
    }));

    let cli = Cli::parse();
    init_logging(cli.debug);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(error::CliError::internal(e.to_string())));
            std::process::exit(exit_codes::ERROR);
        }
    };

    if let Err(err) = runtime.block_on(run(cli)) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        // a detached render task may still be running
        runtime.shutdown_background();
        std::process::exit(code);
    }
}
