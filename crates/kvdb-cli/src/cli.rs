use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvdb",
    about = "Inspect and maintain a directory of kvdb databases",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding one subdirectory per database
    #[arg(long, global = true, default_value = "kvdb-data")]
    pub datadir: PathBuf,

    /// TOML file with per-database cache and handle budgets
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List databases in the data directory
    List,
    /// Read one key
    Get(KeyArgs),
    /// Write one key
    Put(PutArgs),
    /// Delete one key
    Delete(KeyArgs),
    /// Iterate keys in order
    Scan(ScanArgs),
    /// Show a database statistic
    Stat(StatArgs),
    /// Rewrite a database's log without dead records
    Compact(DbArgs),
    /// Destroy a database and remove its directory
    Drop(DropArgs),
}

#[derive(Args)]
pub struct DbArgs {
    /// Database name
    pub db: String,
}

/// Keys and values are UTF-8 text, or hex with a `0x` prefix.
#[derive(Args)]
pub struct KeyArgs {
    pub db: String,
    pub key: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub db: String,
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct ScanArgs {
    pub db: String,
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// First key to visit, relative to the prefix
    #[arg(long, default_value = "")]
    pub start: String,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct StatArgs {
    pub db: String,
    #[arg(default_value = "entries")]
    pub property: String,
}

#[derive(Args)]
pub struct DropArgs {
    pub db: String,
    /// Skip the confirmation guard
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list() {
        let cli = Cli::try_parse_from(["kvdb", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List));
        assert_eq!(cli.datadir, PathBuf::from("kvdb-data"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_put() {
        let cli = Cli::try_parse_from(["kvdb", "put", "chaindata", "k", "0x01ff"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.db, "chaindata");
            assert_eq!(args.key, "k");
            assert_eq!(args.value, "0x01ff");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_scan_with_options() {
        let cli = Cli::try_parse_from([
            "kvdb", "scan", "db", "--prefix", "acct/", "--start", "b", "-n", "10",
        ])
        .unwrap();
        if let Command::Scan(args) = cli.command {
            assert_eq!(args.prefix, "acct/");
            assert_eq!(args.start, "b");
            assert_eq!(args.limit, Some(10));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_stat_default_property() {
        let cli = Cli::try_parse_from(["kvdb", "stat", "db"]).unwrap();
        if let Command::Stat(args) = cli.command {
            assert_eq!(args.property, "entries");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_drop_requires_db() {
        assert!(Cli::try_parse_from(["kvdb", "drop"]).is_err());
        let cli = Cli::try_parse_from(["kvdb", "drop", "old", "--yes"]).unwrap();
        if let Command::Drop(args) = cli.command {
            assert!(args.yes);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_options() {
        let cli = Cli::try_parse_from([
            "kvdb", "-v", "--format", "json", "--datadir", "/tmp/x", "--config", "p.toml", "list",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.datadir, PathBuf::from("/tmp/x"));
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
    }
}
