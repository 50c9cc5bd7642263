//! Locating the nova services in the host process list.

use regex::Regex;

use spurs::{cmd, Execute, SshShell};

use super::cpu::CpuWindow;

/// The services whose CPU time is recorded. The order is the order of the CSV columns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NovaService {
    Compute,
    Network,
    ApiMetadata,
    Fairness,
}

impl NovaService {
    pub const ALL: [NovaService; 4] = [
        NovaService::Compute,
        NovaService::Network,
        NovaService::ApiMetadata,
        NovaService::Fairness,
    ];

    /// The name of the executable and of the init service.
    pub fn name(self) -> &'static str {
        match self {
            NovaService::Compute => "nova-compute",
            NovaService::Network => "nova-network",
            NovaService::ApiMetadata => "nova-api-metadata",
            NovaService::Fairness => "nova-fairness",
        }
    }

    /// The header of this service's CSV column.
    pub fn column(self) -> &'static str {
        match self {
            NovaService::Compute => "NOVA_COMPUTE",
            NovaService::Network => "NOVA_NETWORK",
            NovaService::ApiMetadata => "NOVA_API_METADATA",
            NovaService::Fairness => "NOVA_FAIRNESS",
        }
    }
}

/// A service process being measured.
#[derive(Clone, Debug)]
pub struct Service {
    pub kind: NovaService,
    pub pid: usize,
    pub cpu: CpuWindow,
}

/// The tracked services, at most one per `NovaService`, kept in column order.
#[derive(Clone, Debug, Default)]
pub struct Services(Vec<Service>);

impl Services {
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.0.iter_mut()
    }

    pub fn get(&self, kind: NovaService) -> Option<&Service> {
        self.0.iter().find(|s| s.kind == kind)
    }

    /// Track `kind` as process `pid`. If it is already tracked, only the PID is updated.
    pub fn track(&mut self, kind: NovaService, pid: usize) {
        if let Some(service) = self.0.iter_mut().find(|s| s.kind == kind) {
            service.pid = pid;
            return;
        }

        self.0.push(Service {
            kind,
            pid,
            cpu: CpuWindow::default(),
        });
        self.0.sort_by_key(|s| s.kind);
    }

    /// Stop tracking `kind`.
    pub fn untrack(&mut self, kind: NovaService) {
        self.0.retain(|s| s.kind != kind);
    }

    /// The CPU time consumed by each service in the last window, in column order. Services that
    /// are not tracked are `None`.
    pub fn deltas(&self) -> Vec<Option<f64>> {
        NovaService::ALL
            .iter()
            .map(|&kind| self.get(kind).and_then(|s| s.cpu.delta()))
            .collect()
    }
}

/// Take one snapshot of the host process list.
pub fn process_list(shell: &SshShell) -> Result<String, failure::Error> {
    Ok(shell.run(cmd!("ps aux"))?.stdout)
}

/// Find the PID of the first process in `ps aux` output (in output order) that runs `kind` as
/// user `nova`.
pub fn find_service_pid(
    ps: &str,
    kind: NovaService,
) -> Result<Option<usize>, failure::Error> {
    let re = Regex::new(&format!(
        r"nova\s*(\d+).*/usr/bin/python /usr/bin/{}",
        regex::escape(kind.name())
    ))?;

    Ok(re.captures(ps).and_then(|caps| caps[1].parse().ok()))
}

/// Locate the given services in one snapshot of the process list. Services that are not running
/// are left out.
pub fn locate(shell: &SshShell, kinds: &[NovaService]) -> Result<Services, failure::Error> {
    let mut services = Services::default();
    locate_into(shell, kinds, &mut services)?;
    Ok(services)
}

/// Like `locate`, but updates an existing set of tracked services.
pub fn locate_into(
    shell: &SshShell,
    kinds: &[NovaService],
    services: &mut Services,
) -> Result<(), failure::Error> {
    let ps = process_list(shell)?;

    for &kind in kinds {
        match find_service_pid(&ps, kind)? {
            Some(pid) => {
                log::info!("Found {} with pid {}", kind.name(), pid);
                services.track(kind, pid);
            }
            None => {
                log::warn!("{} is not running; not tracking it", kind.name());
                services.untrack(kind);
            }
        }
    }

    Ok(())
}
