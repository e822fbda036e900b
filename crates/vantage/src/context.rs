//! Per-invocation context: the loaded config file, resolved output
//! settings, and the controllers this process can reach.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use tracing::debug;

use vantage_config::Config;
use vantage_core::{ConfigEntries, Hub};
use vantage_link::{MemoryController, MemoryNetwork};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub struct Context {
    pub path: PathBuf,
    pub config: Config,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub yes: bool,
    pub network: MemoryNetwork,
}

impl Context {
    /// Load the config file and every fixture named on the command line or
    /// in the config. Fixture paths in the config are relative to its
    /// directory.
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = global.config.clone().unwrap_or_else(vantage_config::config_path);
        let config = vantage_config::load_config_from(&path)?;

        let output = match global.output {
            Some(format) => format,
            None => parse_setting("defaults.output", &config.defaults.output)?,
        };
        let color_mode = match global.color {
            Some(mode) => mode,
            None => parse_setting::<ColorMode>("defaults.color", &config.defaults.color)?,
        };

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let fixture_paths = config
            .fixtures
            .iter()
            .map(|p| base.join(p))
            .chain(global.fixtures.iter().cloned());

        let mut network = MemoryNetwork::new();
        for fixture in fixture_paths {
            let controller = MemoryController::load(&fixture)?;
            debug!(path = %fixture.display(), host = controller.host(), "fixture controller loaded");
            network.insert(Arc::new(controller));
        }

        Ok(Self {
            path,
            config,
            output,
            color: output::should_color(color_mode),
            quiet: global.quiet,
            yes: global.yes,
            network,
        })
    }

    pub fn save(&self) -> Result<(), CliError> {
        vantage_config::save_config_to(&self.config, &self.path)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    /// Runtime registry built from the persisted entries.
    pub fn entries(&self) -> Arc<ConfigEntries> {
        Arc::new(self.config.config_entries())
    }

    pub fn hub(&self, entries: Arc<ConfigEntries>) -> Hub {
        Hub::new(
            Arc::new(self.network.clone()),
            entries,
            self.config.bridge.to_bridge_config(),
        )
    }

    pub fn require_entries(&self) -> Result<(), CliError> {
        if self.config.entries.is_empty() {
            return Err(CliError::NoEntries {
                path: self.path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Entry id for a user-supplied selector.
    pub fn entry_id(&self, selector: &str) -> Result<String, CliError> {
        Ok(self.config.find_entry(selector)?.entry_id.clone())
    }
}

fn parse_setting<T: ValueEnum>(field: &str, raw: &str) -> Result<T, CliError> {
    T::from_str(raw, true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}
