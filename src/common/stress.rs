//! Generating synthetic CPU load inside the guests.
//!
//! Load is launched detached on the host and never acknowledged. The only synchronization with the
//! measurement window is that the local side sleeps for the same duration that `stress` was told
//! to run. If a guest is unreachable or `stress` fails to start, the window still completes on
//! schedule with no actual load. `UnconfirmedLoad` makes that visible to callers.

use std::net::IpAddr;

use spurs::{cmd, Execute, SshShell};

use super::virsh::Instance;

/// How to generate load in each guest.
#[derive(Clone, Debug)]
pub struct StressConfig<'a> {
    /// The user to log into the guests as.
    pub vm_user: &'a str,

    /// The number of `stress` CPU workers per guest.
    pub cpus: usize,

    /// How long `stress` runs, in seconds.
    pub duration: u64,
}

/// A record of a best-effort load launch. None of the targets confirmed that `stress` actually
/// started.
#[derive(Clone, Debug, Default)]
pub struct UnconfirmedLoad {
    /// Guests a `stress` command was fired at.
    pub targets: Vec<(String, IpAddr)>,

    /// Guests that were skipped because their address is unknown.
    pub skipped: Vec<String>,
}

impl UnconfirmedLoad {
    /// True if no guest was even asked to generate load.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The command that runs `stress` in the guest at `ip`, detached from the calling shell.
pub fn stress_command(config: &StressConfig<'_>, ip: IpAddr) -> String {
    format!(
        "nohup ssh -l {} {} stress --cpu {} -t {} > /dev/null 2>&1 &",
        config.vm_user, ip, config.cpus, config.duration
    )
}

/// Fire `stress` at every given instance without waiting for it to start or finish. Instances with
/// no known address are skipped with a warning.
pub fn launch_unconfirmed<'i>(
    shell: &SshShell,
    instances: impl IntoIterator<Item = &'i Instance>,
    config: &StressConfig<'_>,
) -> Result<UnconfirmedLoad, failure::Error> {
    let mut load = UnconfirmedLoad::default();

    for instance in instances {
        match instance.ip {
            Some(ip) => {
                shell.run(
                    cmd!("{}", stress_command(config, ip))
                        .use_bash()
                        .no_pty()
                        .allow_error(),
                )?;
                load.targets.push((instance.name.clone(), ip));
            }
            None => {
                log::warn!(
                    "Not generating load in {}: its address was never resolved",
                    instance.name
                );
                load.skipped.push(instance.name.clone());
            }
        }
    }

    log::info!(
        "Fired stress at {} guest(s), skipped {}; none of them is confirmed",
        load.targets.len(),
        load.skipped.len()
    );

    Ok(load)
}
