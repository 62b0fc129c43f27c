//! Operator console commands
//!
//! Lines are parsed into [`Command`] values and executed against a
//! [`FleetManager`]. Rendering happens after the manager has released its
//! locks; every handler works on copied snapshots.

pub mod table;

use std::fmt::Write as _;

use crate::fleet::{BotDetail, FleetManager};
use table::Table;

pub const HELP: &str = "\
Commands:
  disconnect [n]   disconnect the n most recently launched bots (all if omitted)
  shutdown | quit  exit once no bot is connected
  show bots        per-bot status and totals
  show bot <name>  details of one bot
  show regions     regions discovered by the fleet
  show metrics     fleet counters
  help             this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Shutdown,
    Disconnect(Option<usize>),
    ShowRegions,
    ShowBots,
    ShowBot(String),
    ShowMetrics,
    Help,
}

/// What the front-end should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Output(String),
    /// Print the message and exit the process
    Exit(String),
}

/// Malformed console input; the fleet is never touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("Unknown command '{0}', try 'help'")]
    UnknownCommand(String),
    #[error("Invalid bot count '{0}', expected a non-negative integer")]
    InvalidCount(String),
    #[error("Usage: {0}")]
    MissingArgument(&'static str),
    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, UsageError> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };

    let command = match first.to_ascii_lowercase().as_str() {
        "shutdown" | "quit" => no_more(words, Command::Shutdown)?,
        "help" | "?" => no_more(words, Command::Help)?,
        "disconnect" => {
            let count = match words.next() {
                Some(arg) => Some(
                    arg.parse::<usize>()
                        .map_err(|_| UsageError::InvalidCount(arg.to_string()))?,
                ),
                None => None,
            };
            no_more(words, Command::Disconnect(count))?
        }
        "show" => {
            let Some(what) = words.next() else {
                return Err(UsageError::MissingArgument("show bots|bot <name>|regions|metrics"));
            };
            match what.to_ascii_lowercase().as_str() {
                "bots" => no_more(words, Command::ShowBots)?,
                "regions" => no_more(words, Command::ShowRegions)?,
                "metrics" => no_more(words, Command::ShowMetrics)?,
                "bot" => {
                    // Bot names contain a space
                    let name = words.collect::<Vec<_>>().join(" ");
                    if name.is_empty() {
                        return Err(UsageError::MissingArgument("show bot <first> <last>"));
                    }
                    Command::ShowBot(name)
                }
                _ => return Err(UsageError::UnknownCommand(format!("show {}", what))),
            }
        }
        _ => return Err(UsageError::UnknownCommand(first.to_string())),
    };

    Ok(Some(command))
}

fn no_more<'a>(
    mut rest: impl Iterator<Item = &'a str>,
    command: Command,
) -> Result<Command, UsageError> {
    match rest.next() {
        Some(extra) => Err(UsageError::UnexpectedArgument(extra.to_string())),
        None => Ok(command),
    }
}

/// Run a parsed command
pub fn execute(manager: &FleetManager, command: Command) -> CommandOutcome {
    match command {
        Command::Shutdown => match manager.shutdown() {
            Ok(()) => CommandOutcome::Exit("Shutting down".to_string()),
            Err(e) => CommandOutcome::Output(e.to_string()),
        },
        Command::Disconnect(count) => {
            let report = manager.disconnect(count);
            CommandOutcome::Output(format!(
                "Disconnecting {} of {} connected bots",
                report.requested, report.connected
            ))
        }
        Command::ShowRegions => CommandOutcome::Output(render_regions(manager)),
        Command::ShowBots => CommandOutcome::Output(render_bots(manager)),
        Command::ShowBot(name) => CommandOutcome::Output(match manager.find_bot(&name) {
            Some(detail) => render_detail(&detail),
            None => format!("No bot named '{}'", name),
        }),
        Command::ShowMetrics => CommandOutcome::Output(manager.metrics().to_prometheus()),
        Command::Help => CommandOutcome::Output(HELP.to_string()),
    }
}

fn render_regions(manager: &FleetManager) -> String {
    let regions = manager.regions();
    let mut table = Table::new(&["Name", "Handle", "X", "Y"]);
    for region in &regions {
        table.add_row(vec![
            region.name.clone(),
            region.handle.to_string(),
            region.x.to_string(),
            region.y.to_string(),
        ]);
    }
    format!("{}{} regions", table.render(), regions.len())
}

fn render_bots(manager: &FleetManager) -> String {
    let status = manager.status();
    let mut table = Table::new(&["Name", "Region", "Status", "Attempts"]);
    for row in &status.rows {
        table.add_row(vec![
            row.name.clone(),
            row.region.clone(),
            row.state.to_string(),
            row.attempts.to_string(),
        ]);
    }

    let mut out = table.render();
    for (state, count) in status.totals.iter() {
        let _ = writeln!(out, "{}: {}", state, count);
    }
    let _ = write!(out, "Total: {}", status.totals.total());
    out
}

fn render_detail(detail: &BotDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:        {}", detail.name);
    let _ = writeln!(out, "Status:      {}", detail.state);
    let _ = writeln!(out, "Attempts:    {}", detail.attempts);
    match &detail.region {
        Some(region) => {
            let _ = writeln!(out, "Region:      {} ({}, {})", region.name, region.x, region.y);
        }
        None => {
            let _ = writeln!(out, "Region:      none");
        }
    }
    if let Some(connected_for) = detail.connected_for {
        let _ = writeln!(out, "Connected:   {}s", connected_for.as_secs());
    }
    let _ = writeln!(out, "Behaviours:  {}", detail.behaviours);
    let _ = writeln!(out, "Start:       {}", detail.start_location);
    let _ = writeln!(out, "Login URI:   {}", detail.login_uri);
    let _ = writeln!(out, "Wear:        {}", detail.wear);
    if detail.shutdown_requested {
        let _ = writeln!(out, "Shutdown requested");
    }
    out.truncate(out.trim_end().len());
    out
}
