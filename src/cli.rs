use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hichat_client::api::models::{BulkStatus, ReviewStatus};
use hichat_client::app::Settings;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Hi Chat command-line client", long_about = None)]
pub struct Args {
    /// Path to the TOML settings file (defaults to the user config dir)
    #[arg(long, env = "HICHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// REST API base URL (e.g., https://api.hichat.io/api/v1)
    #[arg(long, env = "HICHAT_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Socket server root; derived from the API base when unset
    #[arg(long, env = "HICHAT_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Bearer token for the REST API and socket handshake
    #[arg(long, env = "HICHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Public origin that serves the chat widget
    #[arg(long, env = "HICHAT_APP_URL")]
    pub app_url: Option<String>,

    /// Skip the local conversation cache
    #[arg(long, default_value = "false")]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List conversations
    Conversations {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        unread: bool,
        /// Number of pages to fetch
        #[arg(long, default_value = "1")]
        pages: u32,
    },
    /// Connect to the socket and log real-time events until interrupted
    Watch {
        /// Conversation rooms to join
        #[arg(long = "join")]
        rooms: Vec<String>,
    },
    /// List bulk message campaigns with their progress
    Campaigns {
        #[arg(long)]
        status: Option<BulkStatus>,
    },
    /// List meetings grouped by day
    Meetings {
        #[arg(long)]
        upcoming: bool,
    },
    /// List reviews with a rating summary
    Reviews {
        #[arg(long)]
        status: Option<ReviewStatus>,
    },
    /// Show call history
    Calls {
        #[arg(long, default_value = "1")]
        page: u32,
    },
    /// Print the embed URL and iframe snippet for a widget config
    WidgetUrl { id: String },
    /// Print the effective settings
    Config {
        /// Write the effective settings back to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Args {
    /// File settings, then `HICHAT_*` environment, then flags.
    pub fn settings(&self) -> Settings {
        let mut settings = match &self.config {
            Some(path) => Settings::load_or_default(path),
            None => Settings::load(),
        };
        if self.config.is_some() {
            settings.apply_env(|key| std::env::var(key).ok());
        }
        if let Some(v) = &self.api_base_url {
            settings.api_base_url = v.clone();
        }
        if let Some(v) = &self.backend_url {
            settings.backend_url = Some(v.clone());
        }
        if let Some(v) = &self.token {
            settings.token = Some(v.clone());
        }
        if let Some(v) = &self.app_url {
            settings.app_url = Some(v.clone());
        }
        settings
    }
}
