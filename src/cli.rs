use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// tagwatch — detect newer container image versions and decide who to tell
#[derive(Parser, Debug)]
#[command(name = "tagwatch", version, about)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "TAGWATCH_CONFIG", default_value = "tagwatch.toml")]
    pub config: PathBuf,

    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the tags of an image, highest first
    Tags(ImageArgs),
    /// Resolve the manifest digest of an image for one platform
    Manifest(ManifestArgs),
    /// Run detection, classification and trigger decisions for configured containers
    Check,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Registry name from the configuration file
    #[arg(long)]
    pub registry: String,

    /// Image name within the registry (e.g., library/nginx)
    #[arg(long)]
    pub image: String,
}

#[derive(Args, Debug)]
pub struct ManifestArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    #[arg(long, default_value = "latest")]
    pub tag: String,

    /// Resolve this digest or tag instead of --tag
    #[arg(long)]
    pub reference: Option<String>,

    #[arg(long, default_value = "amd64")]
    pub arch: String,

    #[arg(long, default_value = "linux")]
    pub os: String,

    #[arg(long)]
    pub variant: Option<String>,
}
