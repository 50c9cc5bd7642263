//! A library of routines shared by the fairness overhead experiments.
//!
//! Everything that touches the virtualization host goes through a single `SshShell` to that host.
//! Pass `localhost` as the hostname to run against the machine the runner is on.

#[macro_use]
pub mod macros;

#[macro_use]
pub mod output;

pub mod cpu;
pub mod nova;
pub mod results;
pub mod services;
pub mod stress;
pub mod virsh;

use std::net::{IpAddr, SocketAddr};

use failure_derive::Fail;

use spurs::{cmd, Execute, SshShell};

#[derive(Copy, Clone, Debug)]
pub struct Username<'u>(pub &'u str);

impl Username<'_> {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

pub struct Login<'u, 'h, A: std::net::ToSocketAddrs + std::fmt::Display> {
    pub host: A,
    pub hostname: &'h str,
    pub username: Username<'u>,
}

/// Errors produced while interpreting the output of commands run on the host.
#[derive(Debug, Fail)]
pub enum OutputParseError {
    #[fail(display = "malformed /proc/<pid>/stat record: {:?}", record)]
    ProcStat { record: String },

    #[fail(display = "malformed pid file for domain {}: {:?}", domain, contents)]
    PidFile { domain: String, contents: String },
}

/// The user that logs into the guests to run `stress`.
pub const DEFAULT_VM_USER: &str = "ubuntu";

/// The number of `stress` CPU workers started in each guest.
pub const DEFAULT_STRESS_CPUS: usize = 2;

/// The port used when `HOSTNAME` does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// The address to open the SSH connection to. `hostname` may be `host`, `host:port`, an IP
/// address, or an IP address with a port; the port defaults to `DEFAULT_SSH_PORT`.
pub fn ssh_target(hostname: &str) -> String {
    if hostname.parse::<SocketAddr>().is_ok() {
        return hostname.to_owned();
    }

    match hostname.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]:{}", hostname, DEFAULT_SSH_PORT),
        Ok(IpAddr::V4(_)) => format!("{}:{}", hostname, DEFAULT_SSH_PORT),
        Err(_) if hostname.contains(':') => hostname.to_owned(),
        Err(_) => format!("{}:{}", hostname, DEFAULT_SSH_PORT),
    }
}

/// Connect to the virtualization host. There is no retry: if the host is unreachable, the
/// experiment cannot run at all.
pub fn connect_to_host<A>(login: &Login<A>) -> Result<SshShell, failure::Error>
where
    A: std::net::ToSocketAddrs + std::fmt::Display + std::fmt::Debug,
{
    let ushell = SshShell::with_default_key(login.username.as_str(), &login.host)?;

    ushell.run(cmd!("uname -a"))?;

    Ok(ushell)
}

/// Sleep for the given number of seconds, announcing it at `debug` level.
pub fn settle(secs: u64, why: &str) {
    log::debug!("Sleeping {}s: {}", secs, why);
    std::thread::sleep(std::time::Duration::from_secs(secs));
}

/// Used as a clap validator for unsigned options.
pub fn is_usize(s: String) -> Result<(), String> {
    s.as_str()
        .parse::<usize>()
        .map(|_| ())
        .map_err(|e| format!("{:?}", e))
}

/// Used as a clap validator for comma-separated lists of sampling intervals.
pub fn is_interval_list(s: String) -> Result<(), String> {
    parse_interval_list(&s).map(|_| ())
}

/// Parse a comma-separated list of sampling intervals (e.g. `-1,1,2,4`). `-1` disables
/// collection.
pub fn parse_interval_list(s: &str) -> Result<Vec<i64>, String> {
    s.split(',')
        .map(str::trim)
        .map(|i| i.parse::<i64>().map_err(|e| format!("{:?}: {}", i, e)))
        .collect()
}

/// Parse a load flag. Accepts `true/false`, `yes/no` and `1/0`, ignoring case.
pub fn parse_load_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Used as a clap validator for the load flag.
pub fn is_load_flag(s: String) -> Result<(), String> {
    parse_load_flag(&s)
        .map(|_| ())
        .ok_or_else(|| format!("expected a boolean (true/false), got {:?}", s))
}
