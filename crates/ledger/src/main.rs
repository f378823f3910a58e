use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use run_ledger::{run, CommandKind, DEFAULT_LEDGER_PATH};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        println!("{}", usage_text());
        return Ok(());
    }

    let mut ledger_path = PathBuf::from(DEFAULT_LEDGER_PATH);
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--ledger" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --ledger".to_string())?;
                ledger_path = PathBuf::from(value);
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "profile" => match command_args {
            [player] => CommandKind::Profile {
                player: player.clone(),
            },
            [] => return Err("profile requires a player address".to_string()),
            _ => return Err("profile takes exactly one player address".to_string()),
        },
        "list" => {
            if !command_args.is_empty() {
                return Err("list takes no arguments".to_string());
            }
            CommandKind::List
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, &ledger_path, &mut io::stdout())
}

fn usage_text() -> String {
    [
        "run_ledger - inspect recorded dungeon runs",
        "",
        "Usage:",
        "  run_ledger [--ledger <path>] profile <player-address>",
        "  run_ledger [--ledger <path>] list",
        "",
        "Defaults:",
        "  --ledger data/runs.ledger",
    ]
    .join("\n")
}
