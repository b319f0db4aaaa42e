use std::path::PathBuf;

use brief_core::models::SummaryLength;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "brief")]
#[command(about = "Keep page summary history in sync with the Brief API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local history store
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the CLI config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Work with the local history replica
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Delete a history item remotely and locally
    Delete {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Synchronize with the Brief API
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Sign in to the Brief account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LengthArg {
    Short,
    #[default]
    Medium,
    Detailed,
}

impl From<LengthArg> for SummaryLength {
    fn from(value: LengthArg) -> Self {
        match value {
            LengthArg::Short => Self::Short,
            LengthArg::Medium => Self::Medium,
            LengthArg::Detailed => Self::Detailed,
        }
    }
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Save a page summary locally and queue it for upload
    Add {
        /// Page URL
        url: String,
        /// Summary text
        #[arg(long)]
        summary: String,
        /// Page title
        #[arg(long)]
        title: Option<String>,
        /// Summary length the text was generated with
        #[arg(long, value_enum, default_value_t = LengthArg::Medium)]
        length: LengthArg,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List recent history items
    List {
        /// Number of items to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one history item
    Show {
        /// Record ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Upload queued local changes
    Drain {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge the remote history into the local replica
    Reconcile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue and session status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing while the API is reachable (Ctrl-C to stop)
    Watch,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email/password and store the session in the keychain
    Login {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show the stored session
    Status,
    /// Sign out and clear the stored session
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Brief API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
    },
    /// Print the effective configuration
    Show,
}
