use std::io::{BufRead, Write};

use anyhow::{Context, anyhow};
use tapedeck_shared::MoveAction;
use tracing::{debug, info, warn};

use crate::app::{App, Command, Flow};
use crate::navigation::Screen;
use crate::tape::{Slot, TapeId};
use crate::view::SortKey;

pub const HELP: &str = "\
screens    main | directory | dev | go <screen>
directory  refresh | show | toggle | search [text] | sort <key>
genres     genres | filter <genre>... | unfilter
tapes      open <id> | close | cell <x> <y> | dispense <id> | return <id>
add        new | add <name> [artist] [at <x> <y>] | cancel
removal    removal | find [text] | remove <id> | clear-all | done
hardware   move <action> [x y] | offset <value>
session    status | help | quit";

const COMMAND_NAMES: &[&str] = &[
    "main",
    "home",
    "directory",
    "dev",
    "go",
    "refresh",
    "show",
    "toggle",
    "search",
    "sort",
    "genres",
    "filter",
    "unfilter",
    "open",
    "close",
    "cell",
    "dispense",
    "return",
    "new",
    "add",
    "cancel",
    "removal",
    "find",
    "remove",
    "clear-all",
    "done",
    "move",
    "offset",
    "status",
    "help",
    "quit",
    "exit",
];

/// Resolves a unique prefix of a known command word.
pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Splits a console line on whitespace, keeping double-quoted runs together.
pub fn tokenize(line: &str) -> anyhow::Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(anyhow!("unterminated quote"));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[tracing::instrument]
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let tokens = tokenize(line)?;
    let Some((head, args)) = tokens.split_first() else {
        return Ok(None);
    };
    let lowered = head.to_ascii_lowercase();
    let word = expand_command_abbrev(&lowered, COMMAND_NAMES)
        .ok_or_else(|| anyhow!("unknown or ambiguous command: {head}"))?;
    debug!(token = %head, expanded = %word, "resolved command token");

    let command = match word {
        "main" | "home" => Command::Navigate(Screen::Main),
        "directory" => Command::Navigate(Screen::Directory),
        "dev" => Command::Navigate(Screen::DevMode),
        "go" => Command::Navigate(one(args, "screen")?.parse()?),
        "refresh" => Command::Refresh,
        "show" => Command::Render,
        "toggle" => Command::ToggleMode,
        "search" => Command::Search(args.join(" ")),
        "sort" => Command::Sort(one(args, "sort key")?.parse::<SortKey>()?),
        "genres" => Command::ListGenres,
        "filter" => {
            if args.is_empty() {
                return Err(anyhow!("filter needs at least one genre"));
            }
            Command::ApplyGenres(args.to_vec())
        }
        "unfilter" => Command::ClearGenres,
        "open" => Command::OpenTape(tape_id(args)?),
        "close" => Command::CloseTape,
        "cell" => Command::Cell(slot(args)?),
        "dispense" => Command::Dispense(tape_id(args)?),
        "return" => Command::Return(tape_id(args)?),
        "new" => Command::OpenAdd,
        "add" => parse_add(args)?,
        "cancel" => Command::CloseAdd,
        "removal" => Command::OpenRemoval,
        "find" => Command::FilterRemoval(args.join(" ")),
        "remove" => Command::Remove(tape_id(args)?),
        "clear-all" => Command::RemoveAll,
        "done" => Command::CloseRemoval,
        "move" => parse_move(args)?,
        "offset" => {
            let raw = one(args, "offset value")?;
            let val = raw
                .parse::<f64>()
                .with_context(|| format!("invalid offset: {raw}"))?;
            Command::Offset(val)
        }
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(anyhow!("unhandled command: {other}")),
    };
    Ok(Some(command))
}

fn one<'a>(args: &'a [String], what: &str) -> anyhow::Result<&'a str> {
    match args {
        [value] => Ok(value.as_str()),
        _ => Err(anyhow!("expected one {what}")),
    }
}

fn tape_id(args: &[String]) -> anyhow::Result<TapeId> {
    let raw = one(args, "tape id")?;
    raw.parse::<TapeId>()
        .with_context(|| format!("invalid tape id: {raw}"))
}

fn coordinate(raw: &str) -> anyhow::Result<u8> {
    raw.parse::<u8>()
        .with_context(|| format!("invalid coordinate: {raw}"))
}

fn slot(args: &[String]) -> anyhow::Result<Slot> {
    let [x, y] = args else {
        return Err(anyhow!("expected <x> <y>"));
    };
    let (x, y) = (coordinate(x)?, coordinate(y)?);
    Slot::new(x, y).ok_or_else(|| anyhow!("slot ({x}, {y}) is off the grid"))
}

fn parse_add(args: &[String]) -> anyhow::Result<Command> {
    let (fields, slot) = match args.iter().position(|arg| arg.eq_ignore_ascii_case("at")) {
        Some(idx) => (&args[..idx], Some(slot(&args[idx + 1..])?)),
        None => (args, None),
    };
    let (name, artist) = match fields {
        [name] => (name.clone(), String::new()),
        [name, artist] => (name.clone(), artist.clone()),
        _ => return Err(anyhow!("usage: add <name> [artist] [at <x> <y>]")),
    };
    Ok(Command::SubmitAdd { name, artist, slot })
}

fn parse_move(args: &[String]) -> anyhow::Result<Command> {
    let (raw_action, coords) = args
        .split_first()
        .ok_or_else(|| anyhow!("move needs an action"))?;
    let action = raw_action.parse::<MoveAction>().map_err(|e| anyhow!(e))?;
    let (x, y) = match coords {
        [] => (0, 0),
        [x, y] => (coordinate(x)?, coordinate(y)?),
        _ => return Err(anyhow!("usage: move <action> [x y]")),
    };
    Ok(Command::Move { action, x, y })
}

/// Asks on stderr and reads the answer from `input`; anything but y/yes declines.
pub fn ask<R: BufRead>(input: &mut R, prompt: &str) -> bool {
    eprint!("{prompt} [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(err) => {
            warn!(error = %err, "failed to read confirmation");
            false
        }
    }
}

/// Reads commands from `input` until EOF or `quit`.
#[tracing::instrument(skip_all)]
pub async fn run<R, W>(app: &mut App<W>, mut input: R, interactive: bool) -> anyhow::Result<()>
where
    R: BufRead,
    W: Write,
{
    info!("console started");
    loop {
        if interactive {
            let screen = app.screen();
            write!(app.output_mut(), "tapedeck:{screen}> ")?;
            app.output_mut().flush()?;
        }

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(app.output_mut(), "error: {err:#}")?;
                continue;
            }
        };

        let mut confirm = |prompt: &str| ask(&mut input, prompt);
        if app.dispatch(command, &mut confirm).await? == Flow::Quit {
            break;
        }
    }
    info!("console finished");
    Ok(())
}
