use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::publish::SyncStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "mdpublish",
    version,
    about = "Publish Markdown files under shareable ids with attachments and tables of contents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Publish(PublishArgs),
    Unpublish(UnpublishArgs),
    Render(RenderArgs),
    Attachment(AttachmentArgs),
    Directory(DirectoryArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    pub filename: String,

    #[arg(long, env = "MDPUBLISH_BASE_PATH", default_value = ".")]
    pub base_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_SITE_URL")]
    pub site_url: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UnpublishArgs {
    pub filename: String,

    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Id of a published root document.
    pub id: String,

    #[arg(long, env = "MDPUBLISH_BASE_PATH", default_value = ".")]
    pub base_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,

    /// Write the HTML here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SyncStrategy::Replace)]
    pub attachments: SyncStrategy,

    /// Shorthand for `--attachments stable`.
    #[arg(long, default_value_t = false, conflicts_with = "attachments")]
    pub stable_attachments: bool,
}

impl RenderArgs {
    pub fn strategy(&self) -> SyncStrategy {
        if self.stable_attachments {
            SyncStrategy::Stable
        } else {
            self.attachments
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AttachmentArgs {
    pub root_id: String,

    pub filename: String,

    #[arg(long, env = "MDPUBLISH_BASE_PATH", default_value = ".")]
    pub base_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DirectoryArgs {
    #[arg(long, env = "MDPUBLISH_BASE_PATH", default_value = ".")]
    pub base_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,

    #[arg(long, env = "MDPUBLISH_SITE_URL")]
    pub site_url: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "MDPUBLISH_DB_PATH", default_value = "mdpublish.sqlite")]
    pub db_path: PathBuf,
}
