//! Sampling the cumulative CPU time of host processes.

use spurs::{cmd, Execute, SshShell};

use super::OutputParseError;

/// The kernel reports `utime` and `stime` in clock ticks (`USER_HZ`).
pub const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// 0-based index of `utime` in `/proc/<pid>/stat`. `stime` follows it.
const UTIME_FIELD: usize = 13;

/// CPU time samples taken at the start and end of a measurement window.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CpuWindow {
    pub start: Option<f64>,
    pub stop: Option<f64>,
}

impl CpuWindow {
    /// Seconds of CPU time consumed within the window, if both ends were sampled.
    pub fn delta(&self) -> Option<f64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Some(stop - start),
            _ => None,
        }
    }

    /// Whole seconds of CPU time consumed within the window. Each sample is truncated before
    /// subtracting.
    pub fn whole_delta(&self) -> Option<i64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Some(stop.trunc() as i64 - start.trunc() as i64),
            _ => None,
        }
    }
}

/// Read the cumulative (user + system) CPU time of process `pid` on the host, in seconds. Fails if
/// the process no longer exists.
pub fn cpu_time(shell: &SshShell, pid: usize) -> Result<f64, failure::Error> {
    let stat = shell.run(cmd!("cat /proc/{}/stat", pid))?.stdout;
    Ok(parse_proc_stat(&stat)?)
}

/// Extract `(utime + stime) / CLOCK_TICKS_PER_SEC` from a `/proc/<pid>/stat` record.
///
/// The second field (`comm`) is parenthesized and may contain spaces, so fields are counted from
/// the last `)`.
pub fn parse_proc_stat(record: &str) -> Result<f64, OutputParseError> {
    let malformed = || OutputParseError::ProcStat {
        record: record.trim().to_owned(),
    };

    let rest = match record.rfind(')') {
        Some(idx) => &record[idx + 1..],
        None => return Err(malformed()),
    };

    // `rest` starts at field 2 (`state`).
    let mut fields = rest.split_whitespace().skip(UTIME_FIELD - 2);
    let utime = fields.next().and_then(|f| f.parse::<u64>().ok());
    let stime = fields.next().and_then(|f| f.parse::<u64>().ok());

    match (utime, stime) {
        (Some(utime), Some(stime)) => Ok((utime + stime) as f64 / CLOCK_TICKS_PER_SEC),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stat_record(comm: &str, utime: u64, stime: u64) -> String {
        format!(
            "4242 ({}) S 1 4242 4242 0 -1 4194624 18251 0 0 0 {} {} 0 0 20 0 3 0 5541 \
             2487599104 139221 18446744073709551615 1 1 0 0 0 0 0 4096 16963 0 0 0 17 6 0 0 0 0 0\n",
            comm, utime, stime
        )
    }

    #[test]
    fn utime_plus_stime_in_seconds() {
        for &(utime, stime) in &[(0, 0), (1, 0), (0, 1), (1234, 567), (98_765_432, 1)] {
            let got = parse_proc_stat(&stat_record("qemu-system-x86", utime, stime)).unwrap();
            assert_eq!(got, (utime + stime) as f64 / 100.0);
        }
    }

    #[test]
    fn matches_plain_field_positions() {
        let record = stat_record("python", 2500, 750);
        let fields: Vec<&str> = record.split(' ').collect();
        let expected =
            (fields[13].parse::<f64>().unwrap() + fields[14].parse::<f64>().unwrap()) / 100.0;
        assert_eq!(parse_proc_stat(&record).unwrap(), expected);
        assert_eq!(expected, 32.5);
    }

    #[test]
    fn comm_with_spaces_and_parens() {
        let record = stat_record("CPU 0/KVM (x)", 300, 200);
        assert_eq!(parse_proc_stat(&record).unwrap(), 5.0);
    }

    #[test]
    fn malformed_records() {
        assert!(parse_proc_stat("").is_err());
        assert!(parse_proc_stat("cat: /proc/1/stat: No such file or directory").is_err());
        assert!(parse_proc_stat("1 (init) S 0 1 1").is_err());
    }

    #[test]
    fn window_deltas() {
        let window = CpuWindow {
            start: Some(10.75),
            stop: Some(13.5),
        };
        assert_eq!(window.delta(), Some(2.75));
        assert_eq!(window.whole_delta(), Some(3));

        let unsampled = CpuWindow {
            start: Some(1.0),
            stop: None,
        };
        assert_eq!(unsampled.delta(), None);
        assert_eq!(unsampled.whole_delta(), None);
    }
}
