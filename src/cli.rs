use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::DesiredState;

#[derive(Parser)]
#[command(name = "catalyst")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative reconciliation for Cisco Catalyst Center", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile one resource to its desired state
    Apply(ApplyArgs),

    /// Reconcile every resource listed in a batch file
    Run(RunArgs),

    /// List resource kinds and their aliases
    Kinds,

    /// Show the descriptor of a resource kind
    Describe {
        /// Kind or alias
        kind: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Connection
// ============================================================================

#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Config file (default: ~/.config/catalyst/config.toml)
    #[arg(long, global = true, env = "CATALYST_CONFIG", value_name = "FILE")]
    pub config: Option<String>,

    /// Controller hostname or IP
    #[arg(long, global = true, env = "CATALYST_HOST")]
    pub host: Option<String>,

    /// HTTPS port
    #[arg(long, global = true, env = "CATALYST_PORT")]
    pub port: Option<u16>,

    /// API username
    #[arg(long, global = true, env = "CATALYST_USERNAME")]
    pub username: Option<String>,

    /// API password
    #[arg(long, global = true, env = "CATALYST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Extra descriptor file (TOML), may be repeated
    #[arg(long = "descriptors", global = true, value_name = "FILE")]
    pub descriptors: Vec<String>,
}

// ============================================================================
// Apply / Run
// ============================================================================

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StateArg {
    Present,
    Absent,
    Query,
}

impl From<StateArg> for DesiredState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Present => Self::Present,
            StateArg::Absent => Self::Absent,
            StateArg::Query => Self::Query,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options shared by `apply` and `run`
#[derive(Args, Debug, Clone, Default)]
pub struct ReconcileArgs {
    /// Report what would change without writing anything
    #[arg(long)]
    pub check: bool,

    /// Show a before/after diff of each change
    #[arg(long)]
    pub diff: bool,

    /// Task timeout in seconds (overrides descriptor and config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Rewrite a secret field even though it cannot be compared
    #[arg(long = "force-rotate", value_name = "FIELD")]
    pub force_rotate: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Resource kind or alias
    pub kind: String,

    /// Target state
    #[arg(short, long, value_enum, default_value = "present")]
    pub state: StateArg,

    /// Desired document as a JSON or TOML file ("-" reads JSON from stdin)
    #[arg(short, long, value_name = "FILE", conflicts_with = "json")]
    pub file: Option<String>,

    /// Desired document as inline JSON
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,

    /// Set a field (value parsed as JSON when it parses, else a string)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    #[command(flatten)]
    pub reconcile: ReconcileArgs,
}

#[derive(Args)]
pub struct RunArgs {
    /// Batch file of `[[resource]]` entries (TOML or JSON)
    pub file: String,

    /// Number of reconciliations to run in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    #[command(flatten)]
    pub reconcile: ReconcileArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_args() {
        let cli = Cli::try_parse_from([
            "catalyst",
            "--host",
            "dnac.lab",
            "apply",
            "cli_credential",
            "--state",
            "absent",
            "--set",
            "username=netops",
            "--check",
        ])
        .unwrap();
        assert_eq!(cli.connection.host.as_deref(), Some("dnac.lab"));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(DesiredState::from(args.state), DesiredState::Absent);
        assert_eq!(args.set, vec!["username=netops"]);
        assert!(args.reconcile.check);
    }

    #[test]
    fn test_file_conflicts_with_json() {
        let result = Cli::try_parse_from([
            "catalyst", "apply", "tag", "--file", "a.json", "--json", "{}",
        ]);
        assert!(result.is_err());
    }
}
