//! Rollcall - attendance tracking from the terminal.
//!
//! Record arrivals and departures, check today's status, and (for admins)
//! browse employee timelines. Backend responses are cached for the session so
//! repeated commands stay fast.

mod commands;
mod output;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollcall_core::models::RecordType;
use rollcall_core::Config;

use commands::{CacheAction, RecordOptions};

const USAGE: &str = "\
Usage: rollcall <command>

Commands:
  login <telegram-id> <init-data>   Verify and store credentials
  logout                            Forget credentials and end the session
  status                            Today's arrival and departure
  arrive [--lat X --lon Y] [--comment TEXT]
  depart [--lat X --lon Y] [--comment TEXT]
  employees [YYYY-MM-DD]            Status of every employee (admin)
  records <user-id> [YYYY-MM-DD]    One employee's timeline (admin)
  record <id>                       Details of a single record
  locations                         Where employees are right now (admin)
  report [FROM] [TO]                Discipline report sent to the bot chat (admin)
                                    defaults to the current month so far
  cache stats|clear|cleanup         Inspect or reset the session cache

Set RUST_LOG=debug for verbose logging.";

#[derive(Debug, PartialEq)]
enum Command {
    Login { telegram_id: i64, init_data: String },
    Logout,
    Status,
    Create(RecordType, RecordOptions),
    Employees { date: Option<String> },
    Records { user_id: i64, date: Option<String> },
    Record { id: i64 },
    Locations,
    Report { date_from: Option<String>, date_to: Option<String> },
    Cache(CacheAction),
    Help,
}

fn parse_id(value: Option<&String>, what: &str) -> Result<i64> {
    let raw = value.ok_or_else(|| anyhow::anyhow!("Missing {}", what))?;
    raw.parse().with_context(|| format!("Invalid {}: {}", what, raw))
}

fn parse_record_options(args: &[String]) -> Result<RecordOptions> {
    let mut options = RecordOptions::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} needs a value", flag))?;
        match flag.as_str() {
            "--lat" => options.latitude = Some(value.parse().with_context(|| format!("Invalid latitude: {}", value))?),
            "--lon" => options.longitude = Some(value.parse().with_context(|| format!("Invalid longitude: {}", value))?),
            "--comment" => options.comment = Some(value.clone()),
            other => anyhow::bail!("Unknown option: {}", other),
        }
    }
    Ok(options)
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    let parsed = match command.as_str() {
        "login" => Command::Login {
            telegram_id: parse_id(rest.first(), "telegram id")?,
            init_data: rest
                .get(1)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Missing init data"))?,
        },
        "logout" => Command::Logout,
        "status" => Command::Status,
        "arrive" => Command::Create(RecordType::Arrival, parse_record_options(rest)?),
        "depart" => Command::Create(RecordType::Departure, parse_record_options(rest)?),
        "employees" => Command::Employees {
            date: rest.first().cloned(),
        },
        "records" => Command::Records {
            user_id: parse_id(rest.first(), "user id")?,
            date: rest.get(1).cloned(),
        },
        "record" => Command::Record {
            id: parse_id(rest.first(), "record id")?,
        },
        "locations" => Command::Locations,
        "report" => {
            if rest.len() > 2 {
                anyhow::bail!("report takes at most two dates");
            }
            Command::Report {
                date_from: rest.first().cloned(),
                date_to: rest.get(1).cloned(),
            }
        }
        "cache" => Command::Cache(match rest.first().map(String::as_str) {
            Some("stats") | None => CacheAction::Stats,
            Some("clear") => CacheAction::Clear,
            Some("cleanup") => CacheAction::Cleanup,
            Some(other) => anyhow::bail!("Unknown cache action: {}", other),
        }),
        "help" | "--help" | "-h" => Command::Help,
        other => anyhow::bail!("Unknown command: {}\n\n{}", other, USAGE),
    };
    Ok(parsed)
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the log directory is usable, to a daily file.
/// The returned guard must be held until exit so the file writer flushes.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rollcall.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Login { telegram_id, init_data } => commands::login(config, telegram_id, init_data).await,
        Command::Logout => commands::logout(config),
        Command::Status => commands::status(config).await,
        Command::Create(record_type, options) => commands::create(config, record_type, options).await,
        Command::Employees { date } => commands::employees(config, date.as_deref()).await,
        Command::Records { user_id, date } => commands::records(config, user_id, date.as_deref()).await,
        Command::Record { id } => commands::record(config, id).await,
        Command::Locations => commands::locations(config).await,
        Command::Report { date_from, date_to } => {
            commands::report(config, date_from.as_deref(), date_to.as_deref()).await
        }
        Command::Cache(action) => commands::cache(config, action),
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    // Before loading config, so warnings about bad overrides are visible
    let _guard = init_tracing(Config::default().log_dir().ok().as_deref());
    let config = Config::load()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    // Not the parsed command: login arguments carry the init data
    info!(command = args.first().map(String::as_str).unwrap_or("help"), "rollcall starting");
    run(command, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse_args(&args(&["login", "12345", "query_id=AAA&user=%7B%7D"])).unwrap(),
            Command::Login {
                telegram_id: 12345,
                init_data: "query_id=AAA&user=%7B%7D".to_string()
            }
        );
        assert!(parse_args(&args(&["login", "12345"])).is_err());
        assert!(parse_args(&args(&["login", "abc", "x"])).is_err());
    }

    #[test]
    fn test_parse_arrive_options() {
        let command = parse_args(&args(&["arrive", "--lat", "55.9", "--lon", "36.8", "--comment", "late train"])).unwrap();
        assert_eq!(
            command,
            Command::Create(
                RecordType::Arrival,
                RecordOptions {
                    latitude: Some(55.9),
                    longitude: Some(36.8),
                    comment: Some("late train".to_string()),
                }
            )
        );
        assert_eq!(
            parse_args(&args(&["depart"])).unwrap(),
            Command::Create(RecordType::Departure, RecordOptions::default())
        );
    }

    #[test]
    fn test_parse_rejects_bad_options() {
        assert!(parse_args(&args(&["arrive", "--lat"])).is_err());
        assert!(parse_args(&args(&["arrive", "--lat", "north"])).is_err());
        assert!(parse_args(&args(&["arrive", "--photo", "x.jpg"])).is_err());
        assert!(parse_args(&args(&["cache", "purge"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
    }

    #[test]
    fn test_parse_report() {
        assert_eq!(
            parse_args(&args(&["report", "2024-03-01", "2024-03-31"])).unwrap(),
            Command::Report {
                date_from: Some("2024-03-01".to_string()),
                date_to: Some("2024-03-31".to_string())
            }
        );
        assert_eq!(
            parse_args(&args(&["report"])).unwrap(),
            Command::Report {
                date_from: None,
                date_to: None
            }
        );
        assert!(parse_args(&args(&["report", "a", "b", "c"])).is_err());
    }

    #[test]
    fn test_parse_views() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Help);
        assert_eq!(
            parse_args(&args(&["records", "7", "2024-03-01"])).unwrap(),
            Command::Records {
                user_id: 7,
                date: Some("2024-03-01".to_string())
            }
        );
        assert_eq!(parse_args(&args(&["employees"])).unwrap(), Command::Employees { date: None });
        assert_eq!(parse_args(&args(&["cache"])).unwrap(), Command::Cache(CacheAction::Stats));
        assert_eq!(
            parse_args(&args(&["cache", "cleanup"])).unwrap(),
            Command::Cache(CacheAction::Cleanup)
        );
    }
}
