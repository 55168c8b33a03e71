//! Purpose: `sqlitemap` CLI entry point.
//! Role: Binary crate root; parses args, runs one map command, emits JSON on stdout.
//! Invariants: Commands emit one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Map log output goes through `tracing` to stderr, never stdout.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use sqlitemap::api::{
    Config, DEFAULT_TABLE, Error, ErrorKind, LogLevel, OpenMode, SqliteMap, list_tables,
    to_exit_code, tracing_sink,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `sqlitemap --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.log_level);
    let color_mode = cli.color;
    let settings = MapSettings {
        file: cli.file,
        table: cli.table,
        mode: cli.mode,
        auto_commit: cli.auto_commit,
        log_level: cli.log_level,
        pragmas: cli.pragma,
    };

    command_dispatch::dispatch_command(cli.command, &settings)
        .map_err(add_store_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "sqlitemap",
    version,
    about = "Typed persistent key/value maps in SQLite",
    long_about = None,
    after_help = r#"EXAMPLES
  $ sqlitemap --file data.db put alice 42
  $ sqlitemap --file data.db get alice
  $ sqlitemap --file data.db list --reverse
  $ sqlitemap --file data.db --table users size
  $ sqlitemap --file data.db tables"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        short = 'f',
        default_value = "sqlitemap.db",
        help = "Database file (\":memory:\" for a throwaway in-memory map)",
        value_hint = ValueHint::FilePath
    )]
    file: PathBuf,
    #[arg(long, short = 't', default_value = DEFAULT_TABLE, help = "Table holding the map")]
    table: String,
    #[arg(
        long,
        short = 'm',
        default_value = "c",
        help = "Open mode: c (create), r (read-only), w (wipe), n (fresh)"
    )]
    mode: OpenMode,
    #[arg(long, help = "Statement run on open, e.g. \"journal_mode = WAL\" (repeatable)")]
    pragma: Vec<String>,
    #[arg(long, help = "Commit every write immediately")]
    auto_commit: bool,
    #[arg(
        long,
        default_value = "off",
        help = "Map log level: trace|debug|info|warn|error|off (RUST_LOG overrides the filter)"
    )]
    log_level: LogLevel,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print the value stored under a key")]
    Get {
        #[arg(help = "Key to look up")]
        key: String,
    },
    #[command(about = "Store a value under a key and commit")]
    Put {
        #[arg(help = "Key to write")]
        key: String,
        #[arg(help = "Value to store")]
        value: String,
    },
    #[command(about = "Delete a key and commit")]
    Del {
        #[arg(help = "Key to delete")]
        key: String,
    },
    #[command(about = "List entries in insertion order")]
    List {
        #[arg(long, help = "Newest entries first")]
        reverse: bool,
        #[arg(long, conflicts_with = "values", help = "Print keys only")]
        keys: bool,
        #[arg(long, help = "Print values only")]
        values: bool,
    },
    #[command(about = "Count the entries in the table")]
    Size,
    #[command(about = "List the tables stored in the database file")]
    Tables,
    #[command(about = "Delete every entry in the table")]
    Clear,
    #[command(name = "delete-db", about = "Close the map and delete its database file")]
    DeleteDb,
    #[command(
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ sqlitemap completion bash > ~/.local/share/bash-completion/completions/sqlitemap
  $ sqlitemap completion zsh > ~/.zfunc/_sqlitemap
  $ sqlitemap completion fish > ~/.config/fish/completions/sqlitemap.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

struct MapSettings {
    file: PathBuf,
    table: String,
    mode: OpenMode,
    auto_commit: bool,
    log_level: LogLevel,
    pragmas: Vec<String>,
}

impl MapSettings {
    fn filename(&self) -> String {
        self.file.to_string_lossy().into_owned()
    }

    fn open(&self) -> Result<SqliteMap, Error> {
        let mut config = Config::default()
            .with_filename(self.filename())
            .with_table(self.table.clone())
            .with_mode(self.mode)
            .with_auto_commit(self.auto_commit)
            .with_log_level(self.log_level)
            .with_log_sink(tracing_sink());
        for pragma in &self.pragmas {
            config = config.with_pragma(pragma.clone());
        }
        SqliteMap::open(config)
    }
}

fn init_tracing(level: LogLevel) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

// Terminals get readable text; pipes and logs get one JSON object per error.
fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    let rendered = if is_tty {
        error_text(err, color_mode.use_color(is_tty))
    } else {
        error_json(err).to_string()
    };
    eprintln!("{rendered}");
}

fn add_store_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Store || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check that the file is a SQLite database and is not locked by another writer.")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::State => "invalid state".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Store => "sqlite error".to_string(),
        ErrorKind::Range => "out of range".to_string(),
        ErrorKind::Encode => "encode failed".to_string(),
        ErrorKind::Decode => "decode failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    std::iter::successors(err.source(), |&source| source.source())
        .map(ToString::to_string)
        .collect()
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let paint = |label: &str, code: &str| {
        if use_color {
            format!("\u{1b}[{code}m{label}\u{1b}[0m")
        } else {
            label.to_string()
        }
    };
    let details = [
        ("hint:", err.hint().map(str::to_string)),
        ("key:", err.key().map(str::to_string)),
        ("path:", err.path().map(|path| path.display().to_string())),
        ("caused by:", error_causes(err).into_iter().next()),
    ];

    let mut lines = vec![format!("{} {}", paint("error:", "31"), error_message(err))];
    for (label, detail) in details {
        if let Some(detail) = detail {
            lines.push(format!("{} {detail}", paint(label, "33")));
        }
    }
    lines.join("\n")
}

// First meaningful line of clap's rendered error, without its "error:" prefix.
fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

#[cfg(test)]
mod tests {
    use super::{Cli, error_json, error_text};
    use clap::{CommandFactory, Parser};
    use sqlitemap::api::{Error, ErrorKind, OpenMode};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_into_settings() {
        let cli = Cli::try_parse_from([
            "sqlitemap", "--file", "db.sqlite", "--mode", "r", "--pragma", "journal_mode = WAL",
            "size",
        ])
        .expect("parse");
        assert_eq!(cli.mode, OpenMode::ReadOnly);
        assert_eq!(cli.pragma, vec!["journal_mode = WAL".to_string()]);
        assert_eq!(cli.table, "unnamed");
    }

    #[test]
    fn error_json_carries_key_and_hint() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("key not found")
            .with_key("'a'")
            .with_hint("Use `sqlitemap list` to see stored keys.");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["key"], "'a'");
        assert_eq!(
            error_text(&err, false),
            "error: key not found\nhint: Use `sqlitemap list` to see stored keys.\nkey: 'a'"
        );
        assert!(error_text(&err, true).starts_with("\u{1b}[31merror:\u{1b}[0m"));
    }
}
