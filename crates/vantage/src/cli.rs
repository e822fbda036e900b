//! Clap derive structures for the `vantage` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vantage -- bridge Vantage InFusion controllers into a home automation hub
#[derive(Debug, Parser)]
#[command(
    name = "vantage",
    version,
    about = "Bridge Vantage InFusion lighting controllers from the command line",
    long_about = "Discover Vantage InFusion controllers, manage config entries, and run the\n\
        entity bridge against them.\n\n\
        Controllers are reached through fixture files describing simulated\n\
        controllers (--fixture, or `fixtures` in the config file).",
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
    /// Config file path
    #[arg(long, env = "VANTAGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Controller fixture to make reachable (repeatable)
    #[arg(long = "fixture", short = 'f', global = true, value_name = "PATH")]
    pub fixtures: Vec<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', env = "VANTAGE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PasswordStore {
    /// System keyring
    Keyring,
    /// Plaintext in the config file
    Plaintext,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse the local network for controllers (mDNS)
    Discover(DiscoverArgs),

    /// Manage config entries (one per controller)
    #[command(alias = "entry", alias = "e")]
    Entries(EntriesArgs),

    /// Show the objects and entities a fixture controller would produce
    Inspect(InspectArgs),

    /// Bridge every configured controller and stream bus events
    Run(RunArgs),

    /// Start or stop controller tasks
    #[command(alias = "t")]
    Task(TaskArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// How long to listen for announcements
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: std::time::Duration,
}

// ── Entries ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntriesArgs {
    #[command(subcommand)]
    pub command: EntriesCommand,
}

#[derive(Debug, Subcommand)]
pub enum EntriesCommand {
    /// List config entries
    #[command(alias = "ls")]
    List,

    /// Add a controller
    Add(AddArgs),

    /// Remove a config entry
    #[command(alias = "rm")]
    Remove {
        /// Entry id (or unique prefix), serial number, or host
        entry: String,
    },

    /// Change the host or login of an existing entry
    Reconfigure(ReconfigureArgs),

    /// Replace the stored login of an entry
    Reauth(ReauthArgs),
}

/// Login options shared by every command that may prompt for credentials.
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Controller username
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Controller password
    #[arg(long, env = "VANTAGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Where to keep the password
    #[arg(long, value_enum, default_value = "keyring")]
    pub store: PasswordStore,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Controller host or IP address
    #[arg(long)]
    pub host: Option<String>,

    #[command(flatten)]
    pub login: LoginArgs,
}

#[derive(Debug, Args)]
pub struct ReconfigureArgs {
    /// Entry id (or unique prefix), serial number, or host
    pub entry: String,

    /// New controller host
    #[arg(long)]
    pub host: Option<String>,

    #[command(flatten)]
    pub login: LoginArgs,
}

#[derive(Debug, Args)]
pub struct ReauthArgs {
    /// Entry id (or unique prefix), serial number, or host
    pub entry: String,

    #[command(flatten)]
    pub login: LoginArgs,
}

// ── Inspect ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Controller fixture (YAML or JSON)
    pub fixture: PathBuf,

    /// What to list
    #[arg(long, value_enum, default_value = "entities")]
    pub show: InspectView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectView {
    /// Platform entities
    Entities,
    /// Raw object directory
    Objects,
    /// Device registry
    Devices,
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after this long (default: until Ctrl-C)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<std::time::Duration>,

    /// Only bridge this entry
    #[arg(long)]
    pub entry: Option<String>,
}

// ── Task ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Start a task
    Start(TaskSelectArgs),
    /// Stop a running task
    Stop(TaskSelectArgs),
}

/// Exactly one of `--id` / `--name` selects the task.
#[derive(Debug, Args)]
pub struct TaskSelectArgs {
    /// Task vid
    #[arg(long)]
    pub id: Option<u32>,

    /// Task name (exact, case-sensitive)
    #[arg(long)]
    pub name: Option<String>,

    /// Restrict resolution to one entry
    #[arg(long)]
    pub entry: Option<String>,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
