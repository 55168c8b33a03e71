//! Purpose: Hold top-level CLI command dispatch for `sqlitemap`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Writes are committed before a command reports success.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    settings: &MapSettings,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "sqlitemap", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Get { key } => {
            let map = settings.open()?;
            let value = map.get(&key).map_err(with_list_hint)?;
            emit_json(json!({ "key": key, "value": value }));
            Ok(RunOutcome::ok())
        }
        Command::Put { key, value } => {
            let map = settings.open()?;
            map.set(&key, &value)?;
            map.commit()?;
            emit_json(json!({ "key": key, "value": value }));
            Ok(RunOutcome::ok())
        }
        Command::Del { key } => {
            let map = settings.open()?;
            let removed = map.erase(&key)?;
            map.commit()?;
            emit_json(json!({ "key": key, "removed": removed }));
            Ok(RunOutcome::ok())
        }
        Command::List {
            reverse,
            keys,
            values,
        } => {
            let map = settings.open()?;
            let listed = if keys {
                let iter = if reverse { map.keys_rev()? } else { map.keys()? };
                iter.map(|key| key.map(Value::String))
                    .collect::<Result<Vec<_>, _>>()?
            } else if values {
                let iter = if reverse {
                    map.values_rev()?
                } else {
                    map.values()?
                };
                iter.map(|value| value.map(Value::String))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                let iter = if reverse { map.iter_rev()? } else { map.iter()? };
                iter.map(|entry| entry.map(|(key, value)| json!({ "key": key, "value": value })))
                    .collect::<Result<Vec<_>, _>>()?
            };
            emit_json(Value::Array(listed));
            Ok(RunOutcome::ok())
        }
        Command::Size => {
            let map = settings.open()?;
            emit_json(json!({ "table": settings.table, "size": map.size()? }));
            Ok(RunOutcome::ok())
        }
        Command::Tables => {
            let tables = list_tables(&settings.file)?;
            emit_json(json!({ "file": settings.filename(), "tables": tables }));
            Ok(RunOutcome::ok())
        }
        Command::Clear => {
            let map = settings.open()?;
            map.clear()?;
            emit_json(json!({ "table": settings.table, "cleared": true }));
            Ok(RunOutcome::ok())
        }
        Command::DeleteDb => {
            let mut map = settings.open()?;
            map.terminate()?;
            emit_json(json!({ "deleted": settings.filename() }));
            Ok(RunOutcome::ok())
        }
    }
}

fn with_list_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::NotFound {
        return err;
    }
    err.with_hint("Use `sqlitemap list --keys` to see stored keys.")
}
