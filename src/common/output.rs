//! Utilities for naming and tagging generated output with the settings of the experiment that
//! produced it.

use chrono::{offset::Local, DateTime};
use serde::{ser::SerializeMap, Serialize, Serializer};

/// `OutputManager` records the settings of an experiment run so that the CSV results can later be
/// matched with the parameters that produced them.
///
/// Each experiment creates an `OutputManager` at the beginning with all of its settings, usually
/// through the `settings!` macro. The manager generates the name of the `.params` file, which
/// includes a timestamp and any settings marked as `important`.
#[derive(Debug, Clone)]
pub struct OutputManager {
    settings: std::collections::BTreeMap<String, String>,
    important: Vec<String>,
    timestamp: DateTime<Local>,
}

impl OutputManager {
    /// Create a new `OutputManager` containing no settings.
    pub fn new() -> Self {
        OutputManager {
            settings: std::collections::BTreeMap::new(),
            important: Vec::new(),
            timestamp: Local::now(),
        }
    }

    /// Register a new setting called `name` with value `value`. The boolean value `important`
    /// indicates whether or not the setting should be included in generated filenames.
    ///
    /// # Panics
    ///
    /// If `name` was already registered.
    pub fn register<V: serde::Serialize + std::fmt::Debug>(
        &mut self,
        name: &str,
        value: &V,
        important: bool,
    ) {
        let value = serde_json::to_string(value).expect("unable to serialize");
        if let Some(prev) = self.settings.insert(name.into(), value) {
            panic!(
                "Setting {:?} previously registered with value {:?}",
                name, prev
            );
        }
        if important {
            self.important.push(name.into());
        }
    }

    /// The name of the `.params` file for this run.
    pub fn params_file_name(&self) -> String {
        self.gen_file_name("params")
    }

    /// Generate a filename with the given extension (without the leading dot).
    fn gen_file_name(&self, ext: &str) -> String {
        let mut base = String::new();

        for (i, setting) in self.important.iter().enumerate() {
            if i > 0 {
                base.push_str("-");
            }
            self.append_setting(&mut base, setting);
        }

        if !base.is_empty() {
            base.push_str("-");
        }
        base.push_str(&self.timestamp.format("%Y-%m-%d-%H-%M-%S").to_string());

        base.push_str(".");
        base.push_str(ext);

        base
    }

    /// Helper to add the given setting to the given string. The caller should ensure that the
    /// setting is registered.
    fn append_setting(&self, string: &mut String, setting: &str) {
        let val = self
            .settings
            .get(setting)
            .expect("important setting not defined");

        // sanitize
        let val = val.trim();
        let val = val.replace(" ", "_");
        let val = val.replace("\"", "");
        let val = val.replace("\'", "_");
        let val = val.replace("/", "_");

        string.push_str(setting);
        string.push_str(&val);
    }

    /// Returns the value of setting `setting` deserialized to a `D`.
    ///
    /// # Panics
    ///
    /// - If `setting` is not registered at the time `get` is called.
    /// - If `setting`'s value cannot be deserialized to a `D`.
    pub fn get<'s, 'de, D: serde::Deserialize<'de>>(&'s self, setting: &str) -> D
    where
        's: 'de,
    {
        serde_json::from_str(self.settings.get(setting).expect("no such setting"))
            .expect("unable to deserialize")
    }

    /// Write all settings as JSON to a `.params` file in `dir`. Returns the path of the file.
    pub fn write_params(&self, dir: &str) -> Result<String, failure::Error> {
        std::fs::create_dir_all(dir)?;

        let path = dir!(dir, self.params_file_name());
        std::fs::write(&path, serde_json::to_string(self)?)?;

        Ok(path)
    }
}

impl Serialize for OutputManager {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.settings.len()))?;
        for (k, v) in &self.settings {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __settings_helper {
    ($manager:ident $(,)?) => {};
    ($manager:ident, $name:ident : $value:expr, $($tail:tt)*) => {{
        $manager.register(stringify!($name), &$value, false);
        $crate::__settings_helper!($manager, $($tail)*);
    }};
    ($manager:ident, * $name:ident : $value:expr, $($tail:tt)*) => {{
        $manager.register(stringify!($name), &$value, true);
        $crate::__settings_helper!($manager, $($tail)*);
    }};
}

/// A convenience macro for creating an `OutputManager` with the given settings. The syntax is `[*]
/// name: value,` where `name` is the name of the setting, `value` is any expression that
/// evaluates to the value of the setting, and the `*` marks the setting as important. Every entry
/// must be followed by a comma.
///
/// ```rust,ignore
/// let settings = settings! {
///     * workflow: "load_test",
///     duration: 240,
///     intervals: vec![-1, 1, 2],
/// };
/// ```
#[macro_export]
macro_rules! settings {
    ($($tail:tt)*) => {{
        let mut manager = crate::common::output::OutputManager::new();

        $crate::__settings_helper!(manager, $($tail)*);

        manager
    }}
}

#[cfg(test)]
mod test {
    #[test]
    fn settings_round_trip_through_manager() {
        let settings = settings! {
            * workflow: "load_test",
            * host: "compute1:22",
            duration: 240u64,
            intervals: vec![-1i64, 1, 2],
            stress_cpus: 2usize,
        };

        assert_eq!(settings.get::<u64>("duration"), 240);
        assert_eq!(settings.get::<Vec<i64>>("intervals"), vec![-1, 1, 2]);
        assert_eq!(settings.get::<String>("workflow"), "load_test");

        let name = settings.params_file_name();
        assert!(name.starts_with("workflowload_test-hostcompute1:22-"));
        assert!(name.ends_with(".params"));

        let json: std::collections::BTreeMap<String, String> =
            serde_json::from_str(&serde_json::to_string(&settings).unwrap()).unwrap();
        assert_eq!(json["stress_cpus"], "2");
    }

    #[test]
    #[should_panic(expected = "previously registered")]
    fn duplicate_setting_panics() {
        let _ = settings! {
            duration: 1,
            duration: 2,
        };
    }

    #[test]
    fn params_written_to_dir() {
        let dir = std::env::temp_dir().join(format!("fairness-params-{}", std::process::id()));
        let dir = dir.to_str().unwrap();

        let settings = settings! {
            * workflow: "runtime_test",
            load: true,
        };

        let path = settings.write_params(dir).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"load\":\"true\""));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
