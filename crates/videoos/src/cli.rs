//! Clap derive structures for the `videoos` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// videoos -- drive a Poly VideoOS endpoint over its REST API
#[derive(Debug, Parser)]
#[command(
    name = "videoos",
    version,
    about = "Control Poly VideoOS endpoints from the command line",
    long_about = "Logs into a VideoOS endpoint's REST API, queries and switches\n\
        device (USB camera) mode, reboots the unit, and streams session and\n\
        mode changes.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "VIDEOOS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device host or base URL (overrides profile)
    #[arg(long, short = 'H', env = "VIDEOOS_HOST", global = true)]
    pub host: Option<String>,

    /// Login user (overrides profile)
    #[arg(long, short = 'u', env = "VIDEOOS_USERNAME", global = true)]
    pub username: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "VIDEOOS_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "VIDEOOS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', default_value = "plain", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log every response and dump device state after login
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Plain,
    /// Pretty-printed JSON
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in, print session and system mode, log out
    #[command(alias = "st")]
    Status,

    /// Reboot the endpoint
    Reboot,

    /// Switch device (USB camera) mode
    #[command(alias = "dm")]
    DeviceMode(DeviceModeArgs),

    /// Stay logged in and print every session/mode/error change until Ctrl-C
    Watch,

    /// Inspect CLI configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct DeviceModeArgs {
    #[command(subcommand)]
    pub command: DeviceModeCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeviceModeCommand {
    /// Enter device mode
    Start,
    /// Leave device mode
    Stop,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the resolved configuration (passwords redacted)
    Show,
}
