//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for safe, sandboxed env var manipulation.

use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use tally_config::TallyConfig;

#[test]
fn loads_database_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
path = "/var/lib/tally/extracts.db"
schema = "main"
busy_timeout_ms = 250
"#,
        )?;

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.database.path, "/var/lib/tally/extracts.db");
        assert_eq!(config.database.busy_timeout_ms, 250);
        Ok(())
    });
}

#[test]
fn loads_full_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
path = "sync.db"

[ingest]
delimiter = "|"
drop_existing = true
batch_size = 64
staging_prefix = "_tmp"

[audit]
table_suffix = "_log"
default_limit = 10
"#,
        )?;

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.ingest.delimiter, '|');
        assert!(config.ingest.drop_existing);
        assert_eq!(config.ingest.batch_size, 64);
        assert_eq!(config.ingest.staging_prefix, "_tmp");
        assert_eq!(config.audit.table_suffix, "_log");
        assert_eq!(config.audit.default_limit, 10);
        // Keys absent from the file keep their defaults.
        assert_eq!(config.database.schema, "main");
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn env_var_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.set_env("TALLY_DATABASE__PATH", "from-env.db");

        jail.create_file(
            "config.toml",
            r#"
[database]
path = "from-toml.db"
busy_timeout_ms = 900
"#,
        )?;

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("TALLY_").split("__"))
            .extract()?;

        // Env should win over TOML
        assert_eq!(config.database.path, "from-env.db");
        // TOML value not overridden by env should remain
        assert_eq!(config.database.busy_timeout_ms, 900);
        Ok(())
    });
}

#[test]
fn project_config_is_picked_up_by_load() {
    Jail::expect_with(|jail| {
        jail.create_dir(".tally")?;
        jail.create_file(
            ".tally/config.toml",
            r#"
[ingest]
delimiter = ";"
"#,
        )?;
        jail.set_env("TALLY_AUDIT__DEFAULT_LIMIT", "7");

        let config = TallyConfig::load().expect("config loads");
        assert_eq!(config.ingest.delimiter, ';');
        assert_eq!(config.audit.default_limit, 7);
        Ok(())
    });
}

#[test]
fn load_rejects_invalid_values() {
    Jail::expect_with(|jail| {
        jail.set_env("TALLY_INGEST__BATCH_SIZE", "0");
        assert!(TallyConfig::load().is_err());
        Ok(())
    });
}

/// Documents the figment gotcha: typo'd env var keys are silently ignored.
#[test]
fn typo_env_var_silently_ignored() {
    Jail::expect_with(|jail| {
        jail.set_env("TALLY_DATABASE__PATHH", "typo.db");

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Env::prefixed("TALLY_").split("__"))
            .extract()?;

        assert_eq!(config.database.path, "tally.db");
        Ok(())
    });
}
