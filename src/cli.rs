use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tubetone", version, about = "Save the audio of a video link as MP3")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tray app (default).
    Run(RunArgs),
    /// Download one link from the terminal.
    Fetch(FetchArgs),
    /// Report whether the transcoder, engine, and network are available.
    Check,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Output folder; overrides the configured default.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct FetchArgs {
    #[arg(long)]
    pub url: String,
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_none() {
        let cli = Cli::parse_from(["tubetone"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn fetch_parses_url_and_out() {
        let cli = Cli::parse_from([
            "tubetone",
            "fetch",
            "--url",
            "https://x.example/v",
            "--out",
            "/tmp/m",
        ]);
        match cli.command {
            Some(Commands::Fetch(args)) => {
                assert_eq!(args.url, "https://x.example/v");
                assert_eq!(args.out, Some(PathBuf::from("/tmp/m")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
