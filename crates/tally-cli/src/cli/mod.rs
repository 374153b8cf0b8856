use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `tally` binary.
#[derive(Debug, Parser)]
#[command(
    name = "tally",
    version,
    about = "tally - load delimited files into tables, upsert extracts, audit row changes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<u32>,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database file (overrides `database.path`; `:memory:` for a scratch database)
    #[arg(long, global = true)]
    pub db: Option<String>,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            quiet: self.quiet,
            verbose: self.verbose,
            db: self.db.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use super::subcommands::RowCommands;
    use super::{Cli, Commands, GlobalFlags, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "tally",
            "--format",
            "table",
            "--limit",
            "10",
            "--verbose",
            "unmonitor",
            "people",
        ])
        .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.limit, Some(10));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Unmonitor(_)));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["tally", "unmonitor", "people", "--format", "raw", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        let parsed = Cli::try_parse_from(["tally", "--format", "xml", "unmonitor", "people"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_extraction_copies_values() {
        let cli = Cli::try_parse_from(["tally", "--db", "/tmp/demo.db", "unmonitor", "people"])
            .expect("cli should parse");
        let flags: GlobalFlags = cli.global_flags();
        assert_eq!(flags.db.as_deref(), Some("/tmp/demo.db"));
    }

    #[test]
    fn sync_requires_table_and_key() {
        assert!(Cli::try_parse_from(["tally", "sync", "extract.csv", "--table", "people"]).is_err());

        let cli = Cli::try_parse_from([
            "tally", "sync", "extract.csv", "--table", "people", "--key", "id", "--delimiter", ";",
        ])
        .expect("cli should parse");
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.table, "people");
        assert_eq!(args.key, "id");
        assert_eq!(args.delimiter, Some(';'));
        assert_eq!(args.schema, None);
    }

    #[test]
    fn infer_accepts_table_override_and_drop() {
        let cli = Cli::try_parse_from(["tally", "infer", "q1.csv", "--table", "sales", "--drop"])
            .expect("cli should parse");
        let Commands::Infer(args) = cli.command else {
            panic!("expected infer");
        };
        assert_eq!(args.table.as_deref(), Some("sales"));
        assert!(args.drop);
    }

    #[test]
    fn row_update_collects_repeated_assignments() {
        let cli = Cli::try_parse_from([
            "tally", "row", "update", "people", "--key", "id", "--value", "17", "--set", "name=Y",
            "--set", "age=31",
        ])
        .expect("cli should parse");
        let Commands::Row { action } = cli.command else {
            panic!("expected row");
        };
        let RowCommands::Update(args) = action else {
            panic!("expected update");
        };
        assert_eq!(args.target.value, "17");
        assert_eq!(args.set, vec!["name=Y", "age=31"]);
    }

    #[test]
    fn row_update_needs_at_least_one_assignment() {
        let parsed = Cli::try_parse_from([
            "tally", "row", "update", "people", "--key", "id", "--value", "17",
        ]);
        assert!(parsed.is_err());
    }
}
