use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayplan",
    version,
    about = "Day planner: tasks on a week/month calendar",
    disable_help_subcommand = true,
    infer_subcommands = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Dashboard: calendar, tasks of the selected day and counters.
    Home {
        /// Select this day (and share it with the other views).
        #[arg(long)]
        date: Option<String>,
        /// Show the month grid instead of the week strip.
        #[arg(long)]
        month: bool,
        /// Page the calendar by this many months.
        #[arg(long, allow_negative_numbers = true)]
        months: Option<i64>,
    },
    /// Create a task.
    Add {
        #[arg(short = 'p', long)]
        priority: Option<String>,
        #[arg(short = 'd', long)]
        description: Option<String>,
        #[arg(long)]
        alert: bool,
        /// Day of the task, defaults to today.
        #[arg(long)]
        date: Option<String>,
        name: Vec<String>,
    },
    /// Pending tasks of a day.
    Pending {
        #[arg(long)]
        date: Option<String>,
    },
    /// Completed tasks of a day.
    Completed {
        #[arg(long)]
        date: Option<String>,
    },
    /// Flip completion of a task by id.
    Toggle { id: u64 },
    /// Delete a task by id.
    Delete { id: u64 },
    /// Delete every task of a day.
    Clear {
        #[arg(long)]
        date: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Set the shared selected day.
    Select { date: String },
    /// Open a page by address, e.g. `task-pending.html?date=2024-03-15`.
    Open { url: String },
    /// Print the stored collection as JSON.
    Export,
    /// Keep a page open, following changes and reading commands from stdin.
    Watch {
        #[arg(value_enum, default_value_t = WatchPage::Home)]
        page: WatchPage,
        #[arg(long)]
        date: Option<String>,
        /// Stop after this many clock ticks.
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Print the effective configuration.
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPage {
    Home,
    Create,
    Pending,
    Completed,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_overrides_are_extracted() {
        let raw = args(&["dayplan", "rc.color=off", "home", "rc.clock.tick.ms:50"]);
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["dayplan", "home"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.clock.tick.ms".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn subcommands_accept_prefixes() {
        let cli = GlobalCli::try_parse_from(args(&["dayplan", "pend", "--date", "2024-03-15"]))
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Pending { date: Some(ref d) }) if d == "2024-03-15"
        ));
    }

    #[test]
    fn add_collects_name_words() {
        let cli = GlobalCli::try_parse_from(args(&["dayplan", "add", "-p", "high", "Buy", "milk"]))
            .expect("parse");
        match cli.command {
            Some(Command::Add { name, priority, .. }) => {
                assert_eq!(name.join(" "), "Buy milk");
                assert_eq!(priority.as_deref(), Some("high"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn negative_month_paging() {
        let cli = GlobalCli::try_parse_from(args(&["dayplan", "home", "--months", "-2"]))
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Home { months: Some(-2), .. })
        ));
    }
}
