use anyhow::Context;
use figment::providers::Serialized;
use tally_config::TallyConfig;

use crate::cli::GlobalFlags;

/// Load `.env`, then the layered configuration, with `--db` on top.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<TallyConfig> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let env_path = cwd.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
    }

    let mut figment = TallyConfig::figment();
    if let Some(db) = &flags.db {
        figment = figment.merge(Serialized::default("database.path", db));
    }

    let config: TallyConfig = figment.extract().context("failed to load tally configuration")?;
    config.validate()?;
    Ok(config)
}
