//! Reconfiguring and toggling `nova-fairness` on the host.
//!
//! None of these commands check their exit status: a failed edit or a service that does not come
//! up simply produces a meaningless measurement.

use spurs::{cmd, Execute, SshShell};

use super::services::NovaService;

/// The nova configuration file on the host.
pub const NOVA_CONF: &str = "/etc/nova/nova.conf";

/// Parameters of `nova-fairness` that the experiments modify.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigParam {
    /// Seconds between resource usage collections. `-1` disables collection.
    RuiCollectionInterval,

    /// Whether `nova-fairness` logs timing statistics.
    TimingStatsEnabled,
}

impl ConfigParam {
    pub fn key(self) -> &'static str {
        match self {
            ConfigParam::RuiCollectionInterval => "rui_collection_interval",
            ConfigParam::TimingStatsEnabled => "timing_stats_enabled",
        }
    }
}

/// Render a boolean the way `nova.conf` spells it.
pub fn conf_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// A `sed` script that replaces every `<key>=...` line remainder with `<key>=<value>`. Nothing
/// else in the file is touched.
pub fn sed_script(param: ConfigParam, value: &str) -> String {
    format!("s/{key}=.*/{key}={value}/g", key = param.key(), value = value)
}

/// Set `param` to `value` in `conf` in place. The exit status is ignored.
pub fn set_param(
    shell: &SshShell,
    conf: &str,
    param: ConfigParam,
    value: &str,
) -> Result<(), failure::Error> {
    log::info!("Setting {}={} in {}", param.key(), value, conf);
    shell.run(cmd!("sudo sed -i '{}' {}", sed_script(param, value), conf).allow_error())?;
    Ok(())
}

/// Start the given service with the init system. Does not check that it actually started.
pub fn start_service(shell: &SshShell, service: NovaService) -> Result<(), failure::Error> {
    shell.run(cmd!("sudo service {} start", service.name()).allow_error())?;
    Ok(())
}

/// Stop the given service with the init system. Does not check that it actually stopped.
pub fn stop_service(shell: &SshShell, service: NovaService) -> Result<(), failure::Error> {
    shell.run(cmd!("sudo service {} stop", service.name()).allow_error())?;
    Ok(())
}
