//! Config subcommand handlers.

use videoos_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&videoos_config::config_path().display().to_string());
            Ok(())
        }
        ConfigCommand::Show => {
            let mut cfg = videoos_config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some(REDACTED.into());
                }
            }
            let rendered = match global.output {
                OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(ConfigError::Serialization)?
                }
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
            };
            output::print_output(&rendered);
            Ok(())
        }
    }
}
