// Command line + the settings derived from it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::error::Error;
use crate::interaction::BoundsPolicy;
use crate::persist;
use crate::session::SessionOptions;
use crate::viewport::DEFAULT_PADDING;

#[derive(Parser, Debug)]
#[command(name = "morning-poster", version, about = "Drag-and-drop morning poster editor")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base URL of the generation proxy (serves /api/image and /api/chat)
    #[arg(long, env = "POSTER_API_BASE", default_value = "http://localhost:8787", global = true)]
    pub api_base: String,

    /// Where the editor state lives
    #[arg(long, env = "POSTER_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Keep dragged elements' origin on the canvas
    #[arg(long, global = true)]
    pub clamp: bool,

    /// Space kept around the canvas in the window, in screen pixels
    #[arg(long, default_value_t = DEFAULT_PADDING, global = true)]
    pub padding: f32,

    /// HTTP timeout for generation calls and image fetches, in seconds
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open the editor window (default)
    Edit {
        #[arg(long, default_value_t = 540)]
        width: usize,
        #[arg(long, default_value_t = 980)]
        height: usize,
        /// Image the L key places as the logo
        #[arg(long)]
        logo: Option<PathBuf>,
    },
    /// Render the saved poster to a PNG
    Export {
        /// Output file (defaults to morning-poster-YYYY-MM-DD.png)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Strip the bottom-right watermark from an image file
    Inpaint { input: PathBuf, output: PathBuf },
    /// Replace the text of one element in the saved poster
    SetText { id: String, text: String },
    /// Set (or with --remove, clear) the logo in the saved poster
    Logo {
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path")]
        remove: bool,
    },
    /// Ask the backend for a new background and/or quote and save them
    Generate {
        #[arg(long)]
        background: bool,
        #[arg(long)]
        quote: bool,
    },
}

/// Resolved settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub state_path: PathBuf,
    pub policy: BoundsPolicy,
    pub padding: f32,
    pub timeout: Duration,
}

impl Config {
    pub fn from_args(args: &GlobalArgs) -> Result<Self, Error> {
        if !(args.padding.is_finite() && args.padding >= 0.0) {
            return Err(Error::Config(format!("padding must be >= 0, got {}", args.padding)));
        }
        if !args.api_base.starts_with("http://") && !args.api_base.starts_with("https://") {
            return Err(Error::Config(format!("api base must be an http(s) URL, got `{}`", args.api_base)));
        }
        Ok(Self {
            api_base: args.api_base.clone(),
            state_path: args.state.clone().unwrap_or_else(persist::default_state_path),
            policy: if args.clamp { BoundsPolicy::Clamped } else { BoundsPolicy::Free },
            padding: args.padding,
            timeout: Duration::from_secs(args.timeout.max(1)),
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions { policy: self.policy, padding: self.padding, asset_timeout: self.timeout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_the_editor_unclamped() {
        let cli = Cli::try_parse_from(["morning-poster", "--state", "/tmp/s.json"]).unwrap();
        assert!(cli.command.is_none());
        let cfg = Config::from_args(&cli.global).unwrap();
        assert_eq!(cfg.policy, BoundsPolicy::Free);
        assert_eq!(cfg.padding, 20.0);
        assert_eq!(cfg.state_path, PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["morning-poster", "export", "-o", "x.png", "--clamp"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Export { out: Some(_) })));
        assert_eq!(Config::from_args(&cli.global).unwrap().policy, BoundsPolicy::Clamped);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let cli = Cli::try_parse_from(["morning-poster", "--padding=-5"]).unwrap();
        assert!(matches!(Config::from_args(&cli.global), Err(Error::Config(_))));
        let cli = Cli::try_parse_from(["morning-poster", "--api-base", "ftp://x"]).unwrap();
        assert!(matches!(Config::from_args(&cli.global), Err(Error::Config(_))));
    }

    #[test]
    fn logo_path_and_remove_conflict() {
        assert!(Cli::try_parse_from(["morning-poster", "logo", "a.png", "--remove"]).is_err());
    }
}
