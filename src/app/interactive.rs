use crate::app::commands::App;
use crate::config::Cli;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use clap::{CommandFactory, Parser};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const PROMPT: &str = "valuta> ";
const BIN_NAME: &str = "valutatrade";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

/// 處理一行輸入；指令錯誤寫到 `err`，迴圈繼續
pub async fn handle_line<S, O, E>(
    app: &mut App<S>,
    line: &str,
    out: &mut O,
    err: &mut E,
) -> Result<LineOutcome>
where
    S: Storage,
    O: Write,
    E: Write,
{
    let line = line.trim();
    match line {
        "" => return Ok(LineOutcome::Continue),
        "exit" | "quit" | "q" => return Ok(LineOutcome::Exit),
        "help" => {
            write!(out, "{}", help_text())?;
            return Ok(LineOutcome::Continue);
        }
        _ => {}
    }

    let args = std::iter::once(BIN_NAME).chain(line.split_whitespace());
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            // --help 與 --version 也走這裡
            write!(err, "{}", e.render())?;
            return Ok(LineOutcome::Continue);
        }
    };

    let Some(command) = cli.command else {
        writeln!(out, "Type 'help' to list commands")?;
        return Ok(LineOutcome::Continue);
    };

    if let Err(e) = app.execute(command, out).await {
        tracing::debug!("⚠️ Command failed: {} (Category: {:?})", e, e.category());
        writeln!(err, "Error: {}", e)?;
    }
    Ok(LineOutcome::Continue)
}

pub fn help_text() -> String {
    let cli = Cli::command();
    let mut text = String::from("Commands:\n");
    for sub in cli.get_subcommands() {
        let about = sub.get_about().map(|a| a.to_string()).unwrap_or_default();
        text.push_str(&format!("  {:<16} {}\n", sub.get_name(), about));
    }
    text.push_str("  help             Show this list\n");
    text.push_str("  exit             Leave (also quit, q)\n");
    text.push_str("Use '<command> --help' for the options of a command\n");
    text
}

pub async fn run_interactive<S: Storage>(app: &mut App<S>) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    writeln!(stdout, "Valutatrade Hub")?;
    writeln!(stdout, "Type 'help' to list commands, 'exit' to leave")?;
    if let Some(session) = app.usecases().current_session() {
        writeln!(stdout, "Logged in as '{}'", session.username)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, "{}", PROMPT)?;
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                None
            }
        };

        let Some(line) = line else {
            writeln!(stdout, "Bye")?;
            break;
        };

        if handle_line(app, &line, &mut stdout, &mut stderr).await? == LineOutcome::Exit {
            writeln!(stdout, "Bye")?;
            break;
        }
    }

    tracing::info!("👋 Interactive session closed");
    Ok(())
}
