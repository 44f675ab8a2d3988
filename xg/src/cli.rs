//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ExerciseGen - AI exercise-generation workflow
#[derive(Parser)]
#[command(
    name = "xg",
    about = "Turn a free-text instruction into structured learning exercises",
    version,
    after_help = "Logs are written to: ~/.local/share/exercisegen/logs/exercisegen.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start a session and drive it interactively to completion
    Run {
        /// The instruction, e.g. "5 B1 German exercises about food"
        prompt: String,

        /// Target document reference
        #[arg(short, long, default_value = "local")]
        document: String,

        /// Principal starting the session
        #[arg(short, long, default_value = "local-user")]
        owner: String,

        /// Model override for this session
        #[arg(short, long)]
        model: Option<String>,

        /// Approve the plan without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Show one session's progress and stage results
    Show {
        /// Session id, hex prefix, or slug fragment
        session: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List sessions
    Sessions {
        /// Filter by status (e.g. completed, failed, awaiting_approval)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for read commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["xg", "run", "5 B1 German exercises about food"]);
        match cli.command {
            Command::Run {
                prompt,
                document,
                owner,
                model,
                yes,
            } => {
                assert_eq!(prompt, "5 B1 German exercises about food");
                assert_eq!(document, "local");
                assert_eq!(owner, "local-user");
                assert!(model.is_none());
                assert!(!yes);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_flags() {
        let cli = Cli::parse_from(["xg", "run", "prompt", "--model", "model-x", "--yes"]);
        match cli.command {
            Command::Run { model, yes, .. } => {
                assert_eq!(model.as_deref(), Some("model-x"));
                assert!(yes);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn test_cli_parse_show_json() {
        let cli = Cli::parse_from(["xg", "show", "019430", "--format", "json"]);
        match cli.command {
            Command::Show { session, format } => {
                assert_eq!(session, "019430");
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected Show"),
        }
    }

    #[test]
    fn test_cli_parse_sessions_with_status() {
        let cli = Cli::parse_from(["xg", "sessions", "--status", "completed"]);
        match cli.command {
            Command::Sessions { status, .. } => {
                assert_eq!(status.as_deref(), Some("completed"));
            }
            _ => panic!("expected Sessions"),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert!(matches!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json));
        assert!(matches!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
