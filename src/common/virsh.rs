//! Discovering and controlling the libvirt domains on the host via `virsh`.

use std::net::IpAddr;

use lazy_static::lazy_static;

use regex::Regex;

use spurs::{cmd, Execute, SshShell};

use super::{cpu::CpuWindow, OutputParseError};

/// Where libvirt keeps the PID files of running qemu domains.
pub const QEMU_PID_DIR: &str = "/var/run/libvirt/qemu";

/// A virtual machine instance being measured.
#[derive(Clone, Debug)]
pub struct Instance {
    /// The libvirt domain name.
    pub name: String,

    /// The address of the guest, if the host's neighbor cache knew it at discovery time.
    pub ip: Option<IpAddr>,

    /// The PID of the qemu process backing the domain, once started by us.
    pub pid: Option<usize>,

    /// Whether this instance is part of the current measurement.
    pub running: bool,

    pub cpu: CpuWindow,
}

impl Instance {
    fn new(name: String, ip: Option<IpAddr>) -> Self {
        Instance {
            name,
            ip,
            pid: None,
            running: false,
            cpu: CpuWindow::default(),
        }
    }
}

/// The instances that are part of the current measurement, in discovery order.
pub fn running(instances: &[Instance]) -> impl Iterator<Item = &Instance> {
    instances.iter().filter(|i| i.running)
}

/// Names of all domains known to libvirt, in `virsh` order.
pub fn list_all_domains(shell: &SshShell) -> Result<Vec<String>, failure::Error> {
    let out = shell.run(cmd!("sudo virsh list --all --name"))?.stdout;
    Ok(parse_domain_names(&out))
}

/// Names of the currently active domains, in `virsh` order.
pub fn list_active_domains(shell: &SshShell) -> Result<Vec<String>, failure::Error> {
    let out = shell.run(cmd!("sudo virsh list --name"))?.stdout;
    Ok(parse_domain_names(&out))
}

fn parse_domain_names(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Is the given domain running?
pub fn is_active(shell: &SshShell, domain: &str) -> Result<bool, failure::Error> {
    let state = shell.run(cmd!("sudo virsh domstate {}", domain))?.stdout;
    Ok(state.trim() == "running")
}

/// Build an `Instance` for each of the given domains, resolving their addresses.
pub fn discover(shell: &SshShell, domains: Vec<String>) -> Result<Vec<Instance>, failure::Error> {
    let mut instances = Vec::with_capacity(domains.len());

    for domain in domains {
        let ip = find_domain_ip(shell, &domain)?;
        match ip {
            Some(ip) => log::info!("Domain {} is at {}", domain, ip),
            None => log::warn!("Could not resolve the address of domain {}", domain),
        }
        instances.push(Instance::new(domain, ip));
    }

    Ok(instances)
}

/// Find the IP address of a domain by looking up the MAC address from its XML description in the
/// host's ARP table. Returns `None` if the domain has no interface or if the neighbor cache has
/// not learned the address yet (e.g. the guest is still booting). There is only a single attempt.
pub fn find_domain_ip(shell: &SshShell, domain: &str) -> Result<Option<IpAddr>, failure::Error> {
    let xml = shell.run(cmd!("sudo virsh dumpxml {}", domain))?.stdout;
    let mac = match parse_mac_address(&xml) {
        Some(mac) => mac,
        None => return Ok(None),
    };

    let arp = shell.run(cmd!("arp -an"))?.stdout;
    find_ip_in_arp(&arp, &mac)
}

/// The `address` attribute of the first `<mac>` element of a domain XML description.
pub fn parse_mac_address(xml: &str) -> Option<String> {
    lazy_static! {
        static ref MAC: Regex =
            Regex::new(r#"<mac\s[^>]*\baddress\s*=\s*['"]([^'"]*)['"]"#).unwrap();
    }
    MAC.captures(xml).map(|caps| caps[1].to_owned())
}

/// Find the address that `arp -an` associates with `mac`, e.g. `? (1.2.3.4) at aa:bb:cc:dd:ee:ff
/// [ether] on virbr0`.
pub fn find_ip_in_arp(arp: &str, mac: &str) -> Result<Option<IpAddr>, failure::Error> {
    let re = Regex::new(&format!(r"\((.+)\) at {}", regex::escape(mac)))?;
    Ok(re.captures(arp).and_then(|caps| caps[1].parse().ok()))
}

/// Ask the domain to shut down. Does not wait for it to go down.
pub fn shutdown(shell: &SshShell, domain: &str) -> Result<(), failure::Error> {
    shell.run(cmd!("sudo virsh shutdown {}", domain))?;
    Ok(())
}

/// Start the domain. Does not wait for it to boot.
pub fn start(shell: &SshShell, domain: &str) -> Result<(), failure::Error> {
    shell.run(cmd!("sudo virsh start {}", domain))?;
    Ok(())
}

/// The PID of the qemu process of a running domain, from its libvirt PID file.
pub fn domain_pid(shell: &SshShell, domain: &str) -> Result<usize, failure::Error> {
    let pid_file = dir!(QEMU_PID_DIR, format!("{}.pid", domain));
    let contents = shell.run(cmd!("sudo cat {}", pid_file))?.stdout;
    Ok(parse_pid_file(domain, &contents)?)
}

fn parse_pid_file(domain: &str, contents: &str) -> Result<usize, OutputParseError> {
    contents
        .trim()
        .parse::<usize>()
        .map_err(|_| OutputParseError::PidFile {
            domain: domain.to_owned(),
            contents: contents.to_owned(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    const DOMAIN_XML: &str = r#"<domain type='kvm' id='3'>
  <name>instance-00000001</name>
  <uuid>1b2d0c8e-1f7b-4a3e-9d55-0d3c5c9a8d21</uuid>
  <memory unit='KiB'>2097152</memory>
  <devices>
    <emulator>/usr/bin/qemu-system-x86_64</emulator>
    <disk type='file' device='disk'>
      <source file='/var/lib/nova/instances/1b2d/disk'/>
    </disk>
    <interface type='bridge'>
      <mac address='fa:16:3e:5d:7a:01'/>
      <source bridge='br100'/>
      <model type='virtio'/>
    </interface>
  </devices>
</domain>
"#;

    const ARP: &str = "? (10.0.0.3) at fa:16:3e:5d:7a:01 [ether] on br100\n\
                       ? (10.0.0.4) at <incomplete> on br100\n\
                       ? (192.168.1.1) at 00:1b:21:3a:4f:10 [ether] on eno1\n";

    #[test]
    fn mac_from_domain_xml() {
        assert_eq!(
            parse_mac_address(DOMAIN_XML).as_deref(),
            Some("fa:16:3e:5d:7a:01")
        );
        assert_eq!(
            parse_mac_address(r#"<interface><mac address="52:54:00:AB:cd:01"/></interface>"#)
                .as_deref(),
            Some("52:54:00:AB:cd:01")
        );
        assert_eq!(parse_mac_address("<domain><devices/></domain>"), None);
    }

    #[test]
    fn ip_from_arp_table() {
        assert_eq!(
            find_ip_in_arp(
                "? (1.2.3.4) at aa:bb:cc:dd:ee:ff [ether] on virbr0",
                "aa:bb:cc:dd:ee:ff"
            )
            .unwrap(),
            Some("1.2.3.4".parse().unwrap())
        );
        assert_eq!(
            find_ip_in_arp(ARP, "fa:16:3e:5d:7a:01").unwrap(),
            Some("10.0.0.3".parse().unwrap())
        );
        assert_eq!(
            find_ip_in_arp(ARP, "00:1b:21:3a:4f:10").unwrap(),
            Some("192.168.1.1".parse().unwrap())
        );
    }

    #[test]
    fn unresolved_addresses() {
        assert_eq!(find_ip_in_arp(ARP, "fa:16:3e:00:00:99").unwrap(), None);
        assert_eq!(find_ip_in_arp("", "aa:bb:cc:dd:ee:ff").unwrap(), None);
    }

    #[test]
    fn mac_matched_literally() {
        // `.` in the looked-up address must not act as a wildcard.
        let arp = "? (10.0.0.7) at fa:16:3e:5d:7a:01 [ether] on br100\n";
        assert_eq!(find_ip_in_arp(arp, "fa.16.3e.5d.7a.01").unwrap(), None);
        assert_eq!(find_ip_in_arp(arp, "(fa:16").unwrap(), None);

        // The compiled MAC pattern is reused across calls.
        for _ in 0..3 {
            assert_eq!(
                parse_mac_address(DOMAIN_XML).as_deref(),
                Some("fa:16:3e:5d:7a:01")
            );
        }
    }

    #[test]
    fn domain_names() {
        let out = "instance-00000001\ninstance-00000002\n\n";
        assert_eq!(
            parse_domain_names(out),
            vec!["instance-00000001".to_owned(), "instance-00000002".to_owned()]
        );
        assert!(parse_domain_names("\n").is_empty());
    }

    #[test]
    fn pid_file() {
        assert_eq!(parse_pid_file("instance-00000001", "31337\n").unwrap(), 31337);
        assert!(parse_pid_file("instance-00000001", "").is_err());
    }
}
