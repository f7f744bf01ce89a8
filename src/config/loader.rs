//! Configuration loading.
//!
//! Layers a TOML file under `JOBFLOW_`-prefixed environment overrides. Loading
//! failures are reported as [`PipelineError::InvalidConfiguration`]; a file
//! that parses but fails validation is rejected the same way.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::PipelineConfig;
use crate::error::{PipelineError, Result};

const ENV_PREFIX: &str = "JOBFLOW";
const CONFIG_PATH_VAR: &str = "JOBFLOW_CONFIG";

/// Load configuration from the file named by `JOBFLOW_CONFIG`, falling back
/// to defaults when the variable is unset.
pub fn load() -> Result<PipelineConfig> {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => load_from_file(Path::new(&path)),
        Err(_) => {
            debug!("{CONFIG_PATH_VAR} not set, using default configuration");
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Load and validate configuration from a TOML file, with environment
/// overrides applied on top (`JOBFLOW_` prefix, `__` as the nesting
/// separator, e.g. `JOBFLOW_RETRY__MAX_ATTEMPTS=3`).
pub fn load_from_file(path: &Path) -> Result<PipelineConfig> {
    debug!(path = %path.display(), "loading pipeline configuration");

    let source = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|err| configuration_error(path, err))?;

    let config: PipelineConfig = source
        .try_deserialize()
        .map_err(|err| configuration_error(path, err))?;

    config.validate()?;
    Ok(config)
}

fn configuration_error(path: &Path, err: config::ConfigError) -> PipelineError {
    PipelineError::invalid_configuration(path.display().to_string(), err.to_string())
}
