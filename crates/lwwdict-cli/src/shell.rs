//! Interactive shell over a single replica
//!
//! The replica is loaded once and held in memory; changes are written back
//! on `SAVE`, `QUIT` or end of input.

use anyhow::Result;
use colored::*;
use lwwdict_core::{Replica, ReplicaName};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tracing::debug;

use crate::commands::Session;

/// Shell input errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ShellError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A parsed shell line
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Add { key: String, value: Value },
    Del { key: String },
    Update { key: String, value: Value },
    Get { key: String },
    List,
    Merge { sources: Vec<ReplicaName> },
    Save,
    Help,
    Quit,
}

/// Parse a single shell line
pub fn parse_line(line: &str) -> Result<ShellCommand, ShellError> {
    let mut tokens = Tokenizer::new(line.trim());
    let cmd = tokens
        .next()
        .ok_or_else(|| ShellError::UnknownCommand(String::new()))?
        .to_uppercase();

    match cmd.as_str() {
        "ADD" | "SET" => {
            let key = tokens.next().ok_or_else(|| ShellError::MissingArgument("key".into()))?;
            let value = tokens.rest().ok_or_else(|| ShellError::MissingArgument("value".into()))?;
            Ok(ShellCommand::Add {
                key: key.to_string(),
                value: parse_value(&value),
            })
        }
        "DEL" | "DELETE" | "REMOVE" => {
            let key = tokens.next().ok_or_else(|| ShellError::MissingArgument("key".into()))?;
            Ok(ShellCommand::Del { key: key.to_string() })
        }
        "UPDATE" => {
            let key = tokens.next().ok_or_else(|| ShellError::MissingArgument("key".into()))?;
            let value = tokens.rest().ok_or_else(|| ShellError::MissingArgument("value".into()))?;
            Ok(ShellCommand::Update {
                key: key.to_string(),
                value: parse_value(&value),
            })
        }
        "GET" => {
            let key = tokens.next().ok_or_else(|| ShellError::MissingArgument("key".into()))?;
            Ok(ShellCommand::Get { key: key.to_string() })
        }
        "LIST" | "KEYS" => Ok(ShellCommand::List),
        "MERGE" => {
            let mut sources = Vec::new();
            while let Some(name) = tokens.next() {
                let name = ReplicaName::new(name)
                    .map_err(|e| ShellError::InvalidArgument(e.to_string()))?;
                sources.push(name);
            }
            if sources.is_empty() {
                return Err(ShellError::MissingArgument("replica".into()));
            }
            Ok(ShellCommand::Merge { sources })
        }
        "SAVE" => Ok(ShellCommand::Save),
        "HELP" => Ok(ShellCommand::Help),
        "QUIT" | "EXIT" => Ok(ShellCommand::Quit),
        _ => Err(ShellError::UnknownCommand(cmd)),
    }
}

/// Parse a value: JSON when it parses, otherwise the raw text as a string
pub fn parse_value(s: &str) -> Value {
    let s = s.trim();
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

/// Whitespace tokenizer that keeps double-quoted tokens together
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let remaining = &self.input[self.pos..];
        self.pos += remaining.len() - remaining.trim_start().len();
    }

    fn next(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];

        if let Some(quoted) = remaining.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                self.pos += end + 2;
                return Some(&quoted[..end]);
            }
        }

        let end = remaining.find(char::is_whitespace).unwrap_or(remaining.len());
        self.pos += end;
        Some(&remaining[..end])
    }

    fn rest(&mut self) -> Option<String> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = self.input[self.pos..].to_string();
        self.pos = self.input.len();
        Some(remaining)
    }
}

/// Run the shell until `QUIT` or end of input
pub async fn run(session: &Session, name: ReplicaName, quiet: bool) -> Result<()> {
    let replica = session.open(&name).await?;
    let mut dirty = false;

    if !quiet {
        let meta = replica.meta();
        println!(
            "{}",
            format!(
                "lwwdict shell - replica {} ({} visible keys). Type 'help' for commands.",
                name, meta.visible
            )
            .cyan()
        );
    }

    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{}> ", name.as_str().green());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let command = match parse_line(line) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{} {}", "Error:".red(), e);
                        continue;
                    }
                };

                match execute(session, &replica, command, &mut dirty).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("{} {:#}", "Error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if dirty {
        session.save(&replica).await?;
        debug!(replica = %name, "saved on exit");
    }
    Ok(())
}

/// Execute one command; returns false when the shell should exit
async fn execute(
    session: &Session,
    replica: &Replica<Value>,
    command: ShellCommand,
    dirty: &mut bool,
) -> Result<bool> {
    match command {
        ShellCommand::Add { key, value } => {
            let recorded = replica.add(key, value);
            *dirty |= recorded.changed;
            println!("{}", outcome(recorded.changed, recorded.op.timestamp()));
        }
        ShellCommand::Del { key } => {
            let value = replica.get(&key).unwrap_or(Value::Null);
            let recorded = replica.remove(key, value);
            *dirty |= recorded.changed;
            println!("{}", outcome(recorded.changed, recorded.op.timestamp()));
        }
        ShellCommand::Update { key, value } => match replica.update(key, value) {
            Some(recorded) => {
                *dirty |= recorded.changed;
                println!("{}", outcome(recorded.changed, recorded.op.timestamp()));
            }
            None => println!("{}", "(not present)".dimmed()),
        },
        ShellCommand::Get { key } => match replica.get(&key) {
            Some(value) => println!("{}", value),
            None => println!("{}", "(nil)".dimmed()),
        },
        ShellCommand::List => {
            let mut entries: Vec<_> = replica.projection().into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            if entries.is_empty() {
                println!("{}", "(empty)".dimmed());
            }
            for (i, (key, value)) in entries.iter().enumerate() {
                println!("{}) {} = {}", i + 1, key.yellow(), value);
            }
        }
        ShellCommand::Merge { sources } => {
            for source in sources {
                let snapshot = session.snapshot(&source).await?;
                let summary = replica.merge_snapshot(&snapshot);
                if !summary.is_empty() {
                    *dirty = true;
                }
                println!(
                    "{} {}: {} additions, {} removals",
                    "merged".green(),
                    source,
                    summary.additions_applied,
                    summary.removals_applied
                );
            }
        }
        ShellCommand::Save => {
            session.save(replica).await?;
            *dirty = false;
            println!("{}", "OK".green());
        }
        ShellCommand::Help => print_help(),
        ShellCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Status line for a write: `OK` or a stale-write notice, with its timestamp
pub fn outcome(changed: bool, timestamp: f64) -> String {
    if changed {
        format!("{} @ {}", "OK".green(), timestamp)
    } else {
        format!("{} @ {}", "(stale, ignored)".yellow(), timestamp)
    }
}

fn print_help() {
    println!(
        r#"
{}
  ADD <key> <value>        Add or overwrite a key
  DEL <key>                Remove a key
  UPDATE <key> <value>     Overwrite a key only if it is present
  GET <key>                Show a key's value
  LIST                     Show all visible entries
  MERGE <replica>...       Merge stored replicas into this one
  SAVE                     Persist changes now
  QUIT                     Save and exit

Values are parsed as JSON, falling back to plain strings.
"#,
        "Commands".cyan().bold()
    );
}
