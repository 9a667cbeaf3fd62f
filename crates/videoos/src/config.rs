//! CLI flag overrides on top of `videoos-config` profiles.
//!
//! Core never sees these types -- it receives a pre-built `DeviceConfig`.

use std::time::Duration;

use videoos_config::{Config, Profile};
use videoos_core::DeviceConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve which profile to use: `--profile`, then the config default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    cfg.active_profile_name(global.profile.as_deref())
}

/// Build a `DeviceConfig` from the config file, profile, and CLI overrides.
///
/// With `--host` and no matching profile the device is described by flags
/// and environment alone.
pub fn build_device_config(global: &GlobalOpts, polling: bool) -> Result<DeviceConfig, CliError> {
    let mut cfg = videoos_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.remove(&profile_name) {
        Some(profile) => profile,
        None if global.host.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available.join(", "),
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: videoos_config::config_path().display().to_string(),
            });
        }
    };
    apply_overrides(&mut profile, global);

    let mut config =
        videoos_config::profile_to_device_config(&profile, &profile_name, &cfg.defaults)?;
    config.debug |= global.debug;
    if !polling {
        config.polling_interval = Duration::ZERO;
    }
    Ok(config)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn flags_override_profile() {
        let cli = Cli::try_parse_from([
            "videoos", "status", "-H", "10.1.1.1", "-u", "ops", "-k", "--timeout", "9",
        ])
        .unwrap();
        let mut profile = Profile {
            host: "10.0.0.20".into(),
            username: Some("admin".into()),
            insecure: Some(false),
            ..Profile::default()
        };

        apply_overrides(&mut profile, &cli.global);

        assert_eq!(profile.host, "10.1.1.1");
        assert_eq!(profile.username.as_deref(), Some("ops"));
        assert_eq!(profile.insecure, Some(true));
        assert_eq!(profile.timeout, Some(9));
    }

    #[test]
    fn absent_flags_leave_profile_alone() {
        let cli = Cli::try_parse_from(["videoos", "status"]).unwrap();
        if cli.global.host.is_some() || cli.global.username.is_some() || cli.global.insecure {
            return;
        }
        let mut profile = Profile {
            host: "10.0.0.20".into(),
            insecure: Some(false),
            ..Profile::default()
        };

        apply_overrides(&mut profile, &cli.global);

        assert_eq!(profile.host, "10.0.0.20");
        assert_eq!(profile.insecure, Some(false));
    }
}
