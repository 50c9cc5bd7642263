//! Recording measurement windows to CSV files, one file per number of active instances.

use std::fs::OpenOptions;
use std::path::Path;

use super::services::NovaService;

/// Where results go unless told otherwise.
pub const DEFAULT_RESULTS_DIR: &str = "/var/log/nova/fairness/";

/// The columns that precede the per-instance columns.
pub const LEADING_COLUMNS: [&str; 3] = ["EXPERIMENT_DURATION", "INTERVAL_LENGTH", "LOAD"];

/// The name of the results file for `active` running instances.
pub fn csv_file_name(active: usize) -> String {
    format!("cpu_load_{}VM.csv", active)
}

/// The header of a results file: the leading columns, one column per running instance, then one
/// column per service.
pub fn header<'n>(running: impl IntoIterator<Item = &'n str>) -> Vec<String> {
    let mut header: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(running.into_iter().map(str::to_owned));
    header.extend(NovaService::ALL.iter().map(|s| s.column().to_owned()));
    header
}

/// The outcome of one measurement window.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementRow {
    /// Length of the window in seconds.
    pub duration: u64,

    /// The `rui_collection_interval` in effect.
    pub interval: i64,

    /// Whether `stress` was fired at the guests.
    pub load: bool,

    /// Whole seconds of CPU time used by each running instance, in header order.
    pub instance_deltas: Vec<Option<i64>>,

    /// Seconds of CPU time used by each service, in header order. Untracked services are `None`.
    pub service_deltas: Vec<Option<f64>>,
}

impl MeasurementRow {
    /// The CSV fields of this row. Missing values are empty cells so that the row always lines up
    /// with the header.
    pub fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.duration.to_string(),
            self.interval.to_string(),
            if self.load { "True" } else { "False" }.to_owned(),
        ];

        record.extend(
            self.instance_deltas
                .iter()
                .map(|d| d.map(|d| d.to_string()).unwrap_or_default()),
        );
        record.extend(
            self.service_deltas
                .iter()
                .map(|d| d.map(|d| format!("{:.2}", d)).unwrap_or_default()),
        );

        record
    }
}

/// Appends rows to the results files in one directory.
#[derive(Clone, Debug)]
pub struct ResultsRecorder {
    dir: String,
}

impl ResultsRecorder {
    /// Create a recorder writing into `dir`, creating the directory if needed.
    pub fn new(dir: &str) -> Result<Self, failure::Error> {
        std::fs::create_dir_all(dir)?;
        Ok(ResultsRecorder { dir: dir.to_owned() })
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// The path of the results file for `active` running instances.
    pub fn path(&self, active: usize) -> String {
        dir!(self.dir.as_str(), csv_file_name(active))
    }

    /// Make sure the results file for `active` instances exists, writing `header` if it is new.
    ///
    /// An existing file is never rewritten. If its header differs from `header` (a different set
    /// of instances was running when it was created), rows are still appended to it and a warning
    /// is logged.
    pub fn ensure_file(&self, active: usize, header: &[String]) -> Result<(), failure::Error> {
        let path = self.path(active);

        if Path::new(&path).is_file() {
            let existing = read_header(&path)?;
            if existing.as_deref() != Some(header) {
                log::warn!(
                    "{} already exists with header {:?}; appending rows for {:?} anyway",
                    path,
                    existing.unwrap_or_default(),
                    header
                );
            }
            return Ok(());
        }

        log::info!("Creating {}", path);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(header)?;
        writer.flush()?;

        Ok(())
    }

    /// Append a row to the results file for `active` instances.
    pub fn append(&self, active: usize, row: &MeasurementRow) -> Result<(), failure::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(active))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&row.record())?;
        writer.flush()?;

        Ok(())
    }
}

/// The first record of a CSV file, if it has one.
fn read_header(path: &str) -> Result<Option<Vec<String>>, failure::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    match reader.records().next() {
        Some(record) => Ok(Some(record?.iter().map(str::to_owned).collect())),
        None => Ok(None),
    }
}
