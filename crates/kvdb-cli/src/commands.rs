use std::io::Write;

use anyhow::{bail, Context};
use colored::Colorize;
use kvdb_file::{FileProducer, ProducerConfig};
use kvdb_store::{DbProducer, SharedStore};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ProducerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProducerConfig::default(),
    };
    let producer = FileProducer::from_config(&cli.datadir, &config);
    let json = matches!(cli.format, OutputFormat::Json);

    match cli.command {
        Command::List => cmd_list(&producer, json, out),
        Command::Get(args) => cmd_get(&producer, args, json, out),
        Command::Put(args) => cmd_put(&producer, args, json, out),
        Command::Delete(args) => cmd_delete(&producer, args, json, out),
        Command::Scan(args) => cmd_scan(&producer, args, json, out),
        Command::Stat(args) => cmd_stat(&producer, args, json, out),
        Command::Compact(args) => cmd_compact(&producer, args, json, out),
        Command::Drop(args) => cmd_drop(&producer, args, json, out),
    }
}

/// Decode a command-line key or value: `0x`-prefixed hex, else UTF-8.
pub fn parse_bytes(arg: &str) -> anyhow::Result<Vec<u8>> {
    match arg.strip_prefix("0x") {
        Some(digits) => hex::decode(digits).with_context(|| format!("invalid hex {arg:?}")),
        None => Ok(arg.as_bytes().to_vec()),
    }
}

/// Render bytes as text when printable, else as `0x` hex.
pub fn render_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.starts_with("0x") && !text.chars().any(char::is_control) => {
            text.to_string()
        }
        _ => format!("0x{}", hex::encode(bytes)),
    }
}

/// Open `name` only if it already exists, so read commands never create
/// databases.
fn existing(producer: &FileProducer, name: &str) -> anyhow::Result<SharedStore> {
    if !producer.names().iter().any(|n| n == name) {
        bail!(
            "database {name:?} does not exist in {}",
            producer.datadir().display()
        );
    }
    Ok(producer.open_db(name)?)
}

fn cmd_list(producer: &FileProducer, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let names = producer.names();
    if json {
        writeln!(out, "{}", json!({ "databases": names }))?;
    } else if names.is_empty() {
        writeln!(out, "No databases in {}.", producer.datadir().display())?;
    } else {
        for name in &names {
            writeln!(out, "{}", name.bold())?;
        }
    }
    Ok(())
}

fn cmd_get(
    producer: &FileProducer,
    args: KeyArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = existing(producer, &args.db)?;
    let value = db.get(&parse_bytes(&args.key)?)?;
    db.close()?;

    if json {
        let value = value.as_deref().map(render_bytes);
        writeln!(out, "{}", json!({ "key": args.key, "value": value }))?;
    } else {
        match value {
            Some(v) => writeln!(out, "{}", render_bytes(&v))?,
            None => writeln!(out, "{}", "(not found)".dimmed())?,
        }
    }
    Ok(())
}

fn cmd_put(
    producer: &FileProducer,
    args: PutArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = producer.open_db(&args.db)?;
    db.put(&parse_bytes(&args.key)?, &parse_bytes(&args.value)?)?;
    db.close()?;

    if json {
        writeln!(out, "{}", json!({ "db": args.db, "put": args.key }))?;
    } else {
        writeln!(out, "{} {} = {}", "✓".green(), args.key.yellow(), args.value)?;
    }
    Ok(())
}

fn cmd_delete(
    producer: &FileProducer,
    args: KeyArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = existing(producer, &args.db)?;
    db.delete(&parse_bytes(&args.key)?)?;
    db.close()?;

    if json {
        writeln!(out, "{}", json!({ "db": args.db, "deleted": args.key }))?;
    } else {
        writeln!(out, "{} Deleted {}", "✓".green(), args.key.yellow())?;
    }
    Ok(())
}

fn cmd_scan(
    producer: &FileProducer,
    args: ScanArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = existing(producer, &args.db)?;
    let mut it = db.new_iterator(&parse_bytes(&args.prefix)?, &parse_bytes(&args.start)?);
    let limit = args.limit.unwrap_or(usize::MAX);

    let mut rows = Vec::new();
    while rows.len() < limit && it.next() {
        if let (Some(k), Some(v)) = (it.key(), it.value()) {
            rows.push((render_bytes(k), render_bytes(v)));
        }
    }
    let failure = it.error().map(ToString::to_string);
    it.release();
    db.close()?;
    if let Some(e) = failure {
        bail!("iteration failed: {e}");
    }

    if json {
        let entries: Vec<_> = rows
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        writeln!(out, "{}", json!({ "entries": entries }))?;
    } else {
        for (k, v) in &rows {
            writeln!(out, "{}  {}", k.yellow(), v)?;
        }
        writeln!(out, "{} entries", rows.len().to_string().bold())?;
    }
    Ok(())
}

fn cmd_stat(
    producer: &FileProducer,
    args: StatArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = existing(producer, &args.db)?;
    let value = db.stat(&args.property)?;
    db.close()?;

    if json {
        writeln!(out, "{}", json!({ "property": args.property, "value": value }))?;
    } else {
        writeln!(out, "{}: {}", args.property.bold(), value)?;
    }
    Ok(())
}

fn cmd_compact(
    producer: &FileProducer,
    args: DbArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let db = existing(producer, &args.db)?;
    let before = db.stat("log.size")?;
    db.compact(&[], &[])?;
    let after = db.stat("log.size")?;
    db.close()?;

    if json {
        writeln!(out, "{}", json!({ "db": args.db, "before": before, "after": after }))?;
    } else {
        writeln!(
            out,
            "{} Compacted {}: {} → {} bytes",
            "✓".green(),
            args.db.yellow(),
            before,
            after
        )?;
    }
    Ok(())
}

fn cmd_drop(
    producer: &FileProducer,
    args: DropArgs,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !args.yes {
        bail!("refusing to drop {:?} without --yes", args.db);
    }
    let db = existing(producer, &args.db)?;
    db.destroy();

    if json {
        writeln!(out, "{}", json!({ "dropped": args.db }))?;
    } else {
        writeln!(out, "{} Dropped {}", "✓".green().bold(), args.db.yellow())?;
    }
    Ok(())
}
