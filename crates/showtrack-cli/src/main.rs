use clap::{ArgAction, Parser, Subcommand};
use commands::{auth, clear, config, dashboard, episodes, lists, show, watch};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "showtrack")]
#[command(about = "showtrack - Keep track of every episode you've watched")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Also write logs to a daily-rotated file (defaults to the showtrack log directory)
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign up, sign in and out
    Auth {
        #[command(subcommand)]
        cmd: AuthCommands,
    },
    /// Totals, watched percentage and per-show progress
    Dashboard,
    /// List episodes page by page
    #[command(long_about = "List episodes with pagination, filters and sorting. Filters use the REST syntax column=operator.value, e.g. --filter 'Show=eq.Breaking Bad' or --filter 'Air Date=gte.2020-01-01'.")]
    Episodes {
        /// Page to show (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page (defaults to display.page_size)
        #[arg(long)]
        page_size: Option<u32>,

        /// Only episodes of this show
        #[arg(long)]
        show: Option<String>,

        /// Only watched episodes
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "unwatched")]
        watched: bool,

        /// Only unwatched episodes
        #[arg(long, action = ArgAction::SetTrue)]
        unwatched: bool,

        /// Extra filter, repeatable: column=operator.value
        #[arg(long = "filter", value_name = "FILTER")]
        filters: Vec<String>,

        /// Column to sort by
        #[arg(long, default_value = "Show")]
        sort: String,

        /// Sort descending
        #[arg(long, action = ArgAction::SetTrue)]
        desc: bool,
    },
    /// Episodes of one show with progress
    #[command(long_about = "Show every episode of one show. The name may be given with spaces or in CamelCase (BreakingBad). With --follow the view refreshes whenever a row of the show changes.")]
    Show {
        name: String,

        /// Keep running and refresh on every change
        #[arg(long, action = ArgAction::SetTrue)]
        follow: bool,
    },
    /// Flip the watched flag of an episode
    Toggle {
        show: String,
        episode: String,
    },
    /// Edit an episode; prompts for any field not given
    Edit {
        show: String,
        episode: String,

        /// New episode code
        #[arg(long = "episode")]
        new_episode: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// YYYY-MM-DD
        #[arg(long)]
        air_date: Option<String>,

        #[arg(long)]
        watched: Option<bool>,

        /// watching, completed, plan-to-watch or dropped
        #[arg(long)]
        status: Option<showtrack_models::ShowStatus>,
    },
    /// Manage your show lists
    Lists {
        #[command(subcommand)]
        cmd: ListCommands,
    },
    /// Stream raw change notifications
    Watch {
        /// Collection to watch (defaults to the episodes collection)
        #[arg(long)]
        table: Option<String>,

        /// INSERT, UPDATE, DELETE or *
        #[arg(long, default_value = "*")]
        event: String,

        /// Row filter such as 'Show=eq.Dark'
        #[arg(long)]
        filter: Option<String>,
    },
    /// View and change configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Clear stored data
    #[command(long_about = "Clear stored data. Use --credentials to remove the saved session, --logs to remove log files, or --all for both.")]
    Clear {
        /// Clear credentials and logs
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["credentials", "logs"])]
        all: bool,

        /// Remove the saved session
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,

        /// Remove log files
        #[arg(long, action = ArgAction::SetTrue)]
        logs: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account
    Signup {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,

        /// Keep the session for this run only
        #[arg(long, action = ArgAction::SetTrue)]
        no_persist: bool,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// All lists, newest first
    Ls,
    /// Create a list
    Create { name: String },
    /// Delete a list by name or id
    Delete {
        list: String,

        /// Skip confirmation
        #[arg(short, long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Shows in a list
    Show { list: String },
    /// Add a show to a list; choose interactively when no show is given
    Add { list: String, show: Option<String> },
    /// Remove a show from a list
    Remove { list: String, show: String },
    /// Shows that are not in the list yet
    Available { list: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks the API key)
    Show {
        /// Show the API key unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Set one value, e.g. `display.page_size 20`
    Set { key: String, value: String },
    /// Write a new configuration file
    Init {
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        anon_key: Option<String>,

        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = cli.log_file.map(|path| {
        if path.as_os_str().is_empty() {
            showtrack_config::PathManager::default().log_file()
        } else {
            path
        }
    });
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Auth { cmd } => auth::run_auth(cmd, &output).await,
        Commands::Dashboard => dashboard::run_dashboard(&output).await,
        Commands::Episodes {
            page,
            page_size,
            show,
            watched,
            unwatched,
            filters,
            sort,
            desc,
        } => {
            let args = episodes::EpisodeArgs {
                page,
                page_size,
                show,
                watched: if watched { Some(true) } else if unwatched { Some(false) } else { None },
                filters,
                sort,
                desc,
            };
            episodes::run_episodes(args, &output).await
        }
        Commands::Show { name, follow } => show::run_show(&name, follow, &output).await,
        Commands::Toggle { show, episode } => show::run_toggle(&show, &episode, &output).await,
        Commands::Edit {
            show,
            episode,
            new_episode,
            title,
            air_date,
            watched,
            status,
        } => {
            let edit = showtrack_models::EpisodeEdit {
                episode: new_episode,
                title,
                air_date,
                watched,
                status,
                ..Default::default()
            };
            show::run_edit(&show, &episode, edit, &output).await
        }
        Commands::Lists { cmd } => lists::run_lists(cmd, &output).await,
        Commands::Watch { table, event, filter } => watch::run_watch(table, &event, filter, &output).await,
        Commands::Config { cmd } => config::run_config(cmd, &output).await,
        Commands::Clear { all, credentials, logs } => clear::run_clear(all, credentials, logs, &output).await,
    }
}
