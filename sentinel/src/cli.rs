use clap::Parser;
use std::path::PathBuf;

const EXAMPLES: &str = "\
A simple invocation:

  $ sentinel -p 123 --to me@example.com

A more complex invocation ([+] marks flags that may be repeated):

  $ sentinel -p 1234 -p 4258 -c 'myapp*' --crx 'exec\\d+' \\
        --to person1@example.com --to person2@example.org";

/// Command line surface. Every value here is folded into [`crate::config::Config`]
/// once at startup.
#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "sentinel",
    version,
    about = "Watch processes and send a notification when they end.",
    after_help = EXAMPLES,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Process ID to watch [+]
    #[arg(short = 'p', long = "pid", value_name = "PID")]
    pub pids: Vec<u32>,

    /// Watch every process whose command name matches this shell-style wildcard [+]
    #[arg(short = 'c', long = "command", value_name = "COMMAND_PATTERN")]
    pub commands: Vec<String>,

    /// Watch every process whose command name matches this regular expression [+]
    #[arg(long = "command-regex", visible_alias = "crx", value_name = "COMMAND_REGEX")]
    pub command_regexes: Vec<String>,

    /// Keep watching for new processes that match --command / --command-regex
    #[arg(short = 'w', long)]
    pub watch_new: bool,

    /// Email address to notify [+]
    #[arg(long = "to", value_name = "EMAIL_ADDRESS")]
    pub to: Vec<String>,

    /// Chat channel to notify [+]
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,

    /// Incoming webhook URL used for chat notifications
    #[arg(long, value_name = "URL")]
    pub webhook: Option<String>,

    /// Show a desktop notification
    #[arg(short = 'n', long)]
    pub notify: bool,

    /// How often to check on processes, in seconds [default: 15.0]
    #[arg(short = 'i', long, value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Only print warnings and errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log-style output with timestamps and levels
    #[arg(long)]
    pub log: bool,

    /// Label attached to watched processes and notification subjects
    #[arg(long, value_name = "LABEL")]
    pub tag: Option<String>,

    /// Account used to log in to the SMTP relay
    #[arg(short = 'l', long, value_name = "ACCOUNT")]
    pub login: Option<String>,

    /// Password for --login
    #[arg(long)]
    pub password: Option<String>,

    /// SMTP relay as host[:port] [default: smtp.gmail.com:587]
    #[arg(long, value_name = "HOST:PORT")]
    pub smtp: Option<String>,

    /// Configuration file [default: <config dir>/sentinel/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
