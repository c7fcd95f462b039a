use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tapedeck_shared::MoveAction;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::app::Command;
use crate::navigation::Screen;
use crate::tape::{Slot, TapeId};
use crate::view::SortKey;

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
    name = "tapedeck",
    version,
    about = "Operator console for the cassette vending machine",
    disable_help_subcommand = true,
    arg_required_else_help = false
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

    /// Read settings from this file instead of ~/.tapedeckrc.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Machine base URL; overrides `server.url`.
    #[arg(long = "server")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Print the tape directory as a list.
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        sort: Option<SortKey>,
        /// Filter by genre; repeat for several.
        #[arg(short, long = "genre", action = ArgAction::Append)]
        genre: Vec<String>,
    },
    /// Print the 5x11 slot grid.
    Grid {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List the genres the machine knows about.
    Genres,
    /// Alias of `genres`.
    Tags,
    /// Show one tape.
    Show { id: TapeId },
    Dispense { id: TapeId },
    Return { id: TapeId },
    /// Register a new cassette.
    Add {
        name: String,
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        slot: Option<Vec<u8>>,
    },
    Remove {
        id: TapeId,
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every cassette from the database.
    RemoveAll {
        #[arg(short, long)]
        yes: bool,
    },
    /// Drive the carriage directly.
    Move {
        action: MoveAction,
        #[arg(default_value_t = 0)]
        x: u8,
        #[arg(default_value_t = 0)]
        y: u8,
    },
    /// Send a servo offset.
    Offset {
        #[arg(allow_hyphen_values = true)]
        val: f64,
    },
    /// Interactive session; the default.
    Console,
}

impl CliCommand {
    /// Whether the command needs a confirmation that `--yes` already gave.
    pub fn assumes_yes(&self) -> bool {
        matches!(
            self,
            CliCommand::Remove { yes: true, .. } | CliCommand::RemoveAll { yes: true }
        )
    }

    /// The session commands a one-shot invocation runs, in order.
    pub fn into_commands(self) -> anyhow::Result<Vec<Command>> {
        let commands = match self {
            CliCommand::List {
                search,
                sort,
                genre,
            } => {
                let mut out = Vec::new();
                if let Some(sort) = sort {
                    out.push(Command::Sort(sort));
                }
                if let Some(term) = search {
                    out.push(Command::Search(term));
                }
                if !genre.is_empty() {
                    out.push(Command::ApplyGenres(genre));
                }
                out.push(Command::Navigate(Screen::Directory));
                out
            }
            CliCommand::Grid { search } => {
                let mut out = vec![Command::ToggleMode];
                if let Some(term) = search {
                    out.push(Command::Search(term));
                }
                out.push(Command::Navigate(Screen::Directory));
                out
            }
            CliCommand::Genres | CliCommand::Tags => vec![Command::ListGenres],
            CliCommand::Show { id } => vec![Command::Refresh, Command::OpenTape(id)],
            CliCommand::Dispense { id } => vec![Command::Refresh, Command::Dispense(id)],
            CliCommand::Return { id } => vec![Command::Refresh, Command::Return(id)],
            CliCommand::Add { name, artist, slot } => {
                let slot = match slot.as_deref() {
                    None => None,
                    Some(&[x, y]) => Some(
                        Slot::new(x, y).ok_or_else(|| anyhow!("slot ({x}, {y}) is off the grid"))?,
                    ),
                    Some(other) => return Err(anyhow!("expected two slot coordinates, got {other:?}")),
                };
                vec![Command::SubmitAdd { name, artist, slot }]
            }
            CliCommand::Remove { id, .. } => vec![Command::OpenRemoval, Command::Remove(id)],
            CliCommand::RemoveAll { .. } => vec![Command::RemoveAll],
            CliCommand::Move { action, x, y } => vec![
                Command::Navigate(Screen::DevMode),
                Command::Move { action, x, y },
            ],
            CliCommand::Offset { val } => {
                vec![Command::Navigate(Screen::DevMode), Command::Offset(val)]
            }
            CliCommand::Console => vec![],
        };
        Ok(commands)
    }
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
