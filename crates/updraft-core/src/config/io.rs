use super::models::EngineConfig;
use super::tables::ConfigTables;
use crate::error::ConfigError;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load the config file, falling back to defaults on any problem.
pub fn load_config(path: &Path) -> EngineConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return EngineConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "{err}");
            EngineConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<EngineConfig, ConfigError> {
    let tables: ConfigTables = toml::from_str(contents)?;
    Ok(EngineConfig::from(tables).clamped())
}

pub fn serialize_config(config: &EngineConfig) -> Result<String, ConfigError> {
    let tables = ConfigTables::from(config);
    Ok(toml::to_string(&tables)?)
}
