use clap::{Parser, Subcommand};
use notifybox::handlers::{NotifyFormat, NotifyType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "notifybox")]
#[command(about = "Send one notification to many services", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to $NOTIFYBOX_CONFIG or config/notifybox.toml)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deliver a notification
    Send(SendArgs),
    /// List registered services and their capabilities
    Services {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    /// Message body; read from stdin when omitted
    #[arg(long, short)]
    pub body: Option<String>,

    #[arg(long, short, default_value = "")]
    pub title: String,

    /// info, success, warning or failure
    #[arg(long = "type", short = 'n', default_value = "info")]
    pub notify_type: NotifyType,

    /// Format the body is written in: text, html or markdown
    #[arg(long, short = 'i', default_value = "text")]
    pub format: NotifyFormat,

    /// Tag group, e.g. `ops,db`; repeat for alternatives
    #[arg(long = "tag", short = 'g')]
    pub tags: Vec<String>,

    /// File to attach; repeatable
    #[arg(long = "attach", short = 'a')]
    pub attachments: Vec<PathBuf>,

    /// Select and prepare, but do not send
    #[arg(long)]
    pub dry_run: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,

    /// Text configuration file with one URL per line; repeatable
    #[arg(long = "config", short = 'c')]
    pub configs: Vec<PathBuf>,

    /// Target URLs
    pub urls: Vec<String>,
}
