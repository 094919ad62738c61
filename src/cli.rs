use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::client::{DEFAULT_EYE_CONTEXT, DEFAULT_RITUAL_STEPS};
use crate::config::{trim_trailing_slash, HelixConfig};
use crate::error::Result;
use crate::events::CRITICAL_HARMONY;

#[derive(Parser)]
#[command(name = "helix")]
#[command(version)]
#[command(about = "Query the Helix API and stream its live events")]
pub struct Args {
    /// REST base URL (overrides config file and HELIX_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// WebSocket URL (overrides config file and HELIX_WS_URL)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// System status including UCF metrics and agent information
    Status,
    /// Current UCF metrics
    Ucf,
    /// All agents with their status
    Agents,
    /// Discovery manifest
    Manifest,
    /// UCF state at the Eye of Consciousness
    Eye {
        #[arg(long, default_value = DEFAULT_EYE_CONTEXT)]
        context: String,
    },
    /// List sacred coordinates, or fetch one by name
    Sacred {
        name: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
    /// UCF state for one ritual step
    Ritual {
        step: u32,
        #[arg(long, default_value_t = DEFAULT_RITUAL_STEPS)]
        total_steps: u32,
    },
    /// UCF state from an arbitrary Mandelbrot coordinate
    Generate {
        #[arg(allow_negative_numbers = true)]
        real: f64,
        #[arg(allow_negative_numbers = true)]
        imag: f64,
        #[arg(long)]
        context: Option<String>,
    },
    /// Generate music from a text prompt
    Music {
        prompt: String,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        model_id: Option<String>,
    },
    /// Send current UCF telemetry to Zapier
    ZapierTelemetry,
    /// Trigger the Zapier webhook with a JSON payload
    ZapierTrigger {
        /// JSON object to send
        data: String,
    },
    /// Exit non-zero when harmony is below the threshold
    Harmony {
        #[arg(long, default_value_t = CRITICAL_HARMONY)]
        threshold: f64,
    },
    /// Stream live events over the WebSocket
    Monitor {
        /// Seconds to stay connected
        #[arg(long, default_value_t = 60)]
        duration: u64,
        /// Consecutive failed connections before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Run the REST walkthrough (and optionally the monitor)
    Demo {
        /// Also stream events for `--duration` seconds
        #[arg(long)]
        with_monitor: bool,
        #[arg(long, default_value_t = 60)]
        duration: u64,
    },
    /// Print shell completions
    Completions { shell: Shell },
}

impl Command {
    /// Monitor duration for the commands that stream.
    pub fn monitor_duration(&self) -> Option<Duration> {
        match self {
            Command::Monitor { duration, .. } => Some(Duration::from_secs(*duration)),
            Command::Demo { with_monitor: true, duration } => Some(Duration::from_secs(*duration)),
            _ => None,
        }
    }
}

/// Layer CLI flags over file and environment configuration.
pub fn resolve_config(args: &Args) -> Result<HelixConfig> {
    let mut config = HelixConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.base_url {
        config.base_url = trim_trailing_slash(url);
    }
    if let Some(url) = &args.ws_url {
        config.ws_url = url.clone();
    }
    if let Command::Monitor { max_attempts: Some(n), .. } = args.command {
        config.reconnect.max_attempts = n;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_status() {
        let args = Args::parse_from(["helix", "status"]);
        assert_eq!(args.command, Command::Status);
        assert!(args.base_url.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_args_global_flags_after_subcommand() {
        let args = Args::parse_from(["helix", "ucf", "--base-url", "http://localhost:8000"]);
        assert_eq!(args.base_url.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn test_args_eye_default_context() {
        let args = Args::parse_from(["helix", "eye"]);
        assert_eq!(args.command, Command::Eye { context: "meditation".into() });
    }

    #[test]
    fn test_args_ritual_default_total() {
        let args = Args::parse_from(["helix", "ritual", "54"]);
        assert_eq!(args.command, Command::Ritual { step: 54, total_steps: 108 });
    }

    #[test]
    fn test_args_generate_negative_coordinates() {
        let args = Args::parse_from(["helix", "generate", "-0.75", "0.25", "--context", "exploration"]);
        assert_eq!(
            args.command,
            Command::Generate {
                real: -0.75,
                imag: 0.25,
                context: Some("exploration".into())
            }
        );
    }

    #[test]
    fn test_args_harmony_default_threshold() {
        let args = Args::parse_from(["helix", "harmony"]);
        assert_eq!(args.command, Command::Harmony { threshold: 0.40 });
    }

    #[test]
    fn test_args_monitor_defaults() {
        let args = Args::parse_from(["helix", "monitor"]);
        assert_eq!(args.command, Command::Monitor { duration: 60, max_attempts: None });
        assert_eq!(args.command.monitor_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_demo_without_monitor_has_no_duration() {
        let args = Args::parse_from(["helix", "demo"]);
        assert_eq!(args.command.monitor_duration(), None);
        let args = Args::parse_from(["helix", "demo", "--with-monitor", "--duration", "5"]);
        assert_eq!(args.command.monitor_duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_args_completions_shell() {
        let args = Args::parse_from(["helix", "completions", "bash"]);
        assert_eq!(args.command, Command::Completions { shell: Shell::Bash });
    }

    #[test]
    fn test_args_missing_subcommand_is_error() {
        assert!(Args::try_parse_from(["helix"]).is_err());
    }

    #[test]
    fn test_resolve_config_flags_win() {
        let args = Args::parse_from([
            "helix",
            "monitor",
            "--max-attempts",
            "3",
            "--base-url",
            "http://cli.test/",
            "--ws-url",
            "ws://cli.test/ws",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.base_url, "http://cli.test");
        assert_eq!(cfg.ws_url, "ws://cli.test/ws");
        assert_eq!(cfg.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_resolve_config_rejects_zero_attempts() {
        let args = Args::parse_from(["helix", "monitor", "--max-attempts", "0"]);
        assert!(resolve_config(&args).is_err());
    }
}
