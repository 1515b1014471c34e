pub mod jobs;
pub mod serve;

use clap::{Parser, Subcommand};

/// Host the client commands talk to when `--host` is not given.
pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";
/// Port the client commands talk to when `--port` is not given.
pub const DEFAULT_CLIENT_PORT: u16 = 8000;

/// Ad Generator - logo and video ad generation jobs
#[derive(Parser, Debug)]
#[command(
    name = "adgen",
    version,
    about = "Ad Generator - submit and track logo and video ad generation jobs"
)]
pub struct Cli {
    /// Server host (for `serve`, overrides the bind address from config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port (for `serve`, overrides the listen port from config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn client_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_CLIENT_HOST)
    }

    pub fn client_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_CLIENT_PORT)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the API server in the foreground
    Serve {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<String>,

        /// Data directory path
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },

    /// Submit a generation job
    Submit {
        /// Description of the product or brand
        #[arg(short = 'p', long)]
        prompt: String,

        /// Also generate an advertisement video
        #[arg(long)]
        video: bool,

        /// Owner of the job
        #[arg(short = 'u', long)]
        user: Option<String>,

        /// Wait for the job to finish, printing progress
        #[arg(short = 'w', long)]
        wait: bool,
    },

    /// Show the status of a job
    Status {
        /// Job ID
        job: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs, most recent first
    List {
        /// Owner whose jobs to list
        #[arg(short = 'u', long)]
        user: Option<String>,

        /// Maximum number of jobs
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show job counts per status
    Dashboard {
        /// Owner whose jobs to summarize
        #[arg(short = 'u', long)]
        user: Option<String>,
    },

    /// Cancel a pending or running job
    Cancel {
        /// Job ID
        job: String,
    },

    /// Poll a job until it finishes
    Watch {
        /// Job ID
        job: String,

        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}

/// Build the base URL for the server HTTP API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Format a connection error message for when the server is not reachable.
pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to server at {}:{}. Is it running? (try: adgen serve)",
        host, port
    )
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let host = cli.client_host();
    let port = cli.client_port();

    match &cli.command {
        Some(Commands::Serve { config, data_dir }) => {
            serve::cmd_serve(
                config.as_deref(),
                data_dir.as_deref(),
                cli.host.clone(),
                cli.port,
                cli.verbose,
            )
            .await
        }
        Some(Commands::Submit {
            prompt,
            video,
            user,
            wait,
        }) => jobs::cmd_submit(host, port, prompt, *video, user.as_deref(), *wait).await,
        Some(Commands::Status { job, json }) => jobs::cmd_status(host, port, job, *json).await,
        Some(Commands::List { user, limit, json }) => {
            jobs::cmd_list(host, port, user.as_deref(), *limit, *json).await
        }
        Some(Commands::Dashboard { user }) => {
            jobs::cmd_dashboard(host, port, user.as_deref()).await
        }
        Some(Commands::Cancel { job }) => jobs::cmd_cancel(host, port, job).await,
        Some(Commands::Watch { job, interval }) => {
            jobs::cmd_watch(host, port, job, *interval).await
        }
        None => {
            // No subcommand provided -- print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
