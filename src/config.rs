use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// File name picked up from every search path unless defaults are disabled.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

const SYSTEM_CONFIG_DIR: &str = "/etc/relwatch";
const LOCAL_CONFIG_DIR: &str = "./configs";
const USER_CONFIG_DIR: &str = ".relwatch";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Expand a leading `~` to the user's home directory. Paths without a
/// tilde come back unchanged.
fn expand_user(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Directories searched for config files, in merge order: user dotdir,
/// system dir, local `./configs`, then any overrides appended as given.
pub fn search_paths(overrides: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = home::home_dir() {
        paths.push(home.join(USER_CONFIG_DIR));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_DIR));
    paths.push(PathBuf::from(LOCAL_CONFIG_DIR));
    for path in overrides {
        paths.push(expand_user(path));
    }
    paths
}

/// All existing config files for the given names, in discovery order.
pub fn config_files(filenames: &[&str], overrides: &[PathBuf], use_defaults: bool) -> Vec<PathBuf> {
    let mut names: Vec<&str> = Vec::new();
    if use_defaults {
        names.push(DEFAULT_CONFIG_FILE);
    }
    names.extend(filenames);

    let mut found = Vec::new();
    for path in search_paths(overrides) {
        for name in &names {
            let candidate = path.join(name);
            if candidate.is_file() {
                found.push(candidate);
            }
        }
    }
    found
}

/// Recursively merge `incoming` into `base`. Mappings merge key by key;
/// sequences and scalars from `incoming` replace the base value wholesale.
pub fn merge(base: Value, incoming: Value) -> Value {
    match (base, incoming) {
        (Value::Mapping(mut base), Value::Mapping(incoming)) => {
            for (key, value) in incoming {
                let current = base.remove(&key).unwrap_or(Value::Null);
                base.insert(key, merge(current, value));
            }
            Value::Mapping(base)
        }
        (_, incoming) => incoming,
    }
}

/// Layered YAML config, deep-merged over every file found in the search
/// paths. Finding no file at all is not an error: callers get an empty
/// mapping and are expected to cope.
#[derive(Debug, Default)]
pub struct ConfigManager {
    data: Mapping,
    files: Vec<PathBuf>,
}

impl ConfigManager {
    pub fn load(
        filenames: &[&str],
        overrides: &[PathBuf],
        use_defaults: bool,
    ) -> Result<Self, ConfigError> {
        let mut manager = ConfigManager::default();
        for file in config_files(filenames, overrides, use_defaults) {
            manager.merge_file(&file)?;
        }
        Ok(manager)
    }

    fn merge_file(&mut self, file: &Path) -> Result<(), ConfigError> {
        debug!("Merging config file {}", file.display());
        let contents = fs::read_to_string(file)?;
        let incoming = serde_yaml::from_str::<Value>(&contents)?;
        // An empty file parses as Null. Neither it nor any other
        // non-mapping document has keys to merge, so it overrides nothing.
        if !matches!(incoming, Value::Mapping(_)) {
            debug!("Skipping {}: no mapping to merge", file.display());
            return Ok(());
        }
        let merged = merge(
            Value::Mapping(std::mem::take(&mut self.data)),
            incoming,
        );
        if let Value::Mapping(mapping) = merged {
            self.data = mapping;
        }
        self.files.push(file.to_path_buf());
        Ok(())
    }

    /// The merged configuration data.
    pub fn config(&self) -> &Mapping {
        &self.data
    }

    /// The files found and merged, in merge order.
    pub fn config_files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_overrides_nested_keys() {
        let base = yaml("a:\n  x: 1\n  y: 2\n");
        let incoming = yaml("a:\n  y: 3\n");
        let expected = yaml("a:\n  x: 1\n  y: 3\n");
        assert_eq!(merge(base, incoming), expected);
    }

    #[test]
    fn merge_is_idempotent() {
        let base = yaml("a:\n  x: 1\nb: [1, 2]\n");
        let incoming = yaml("a:\n  y: 2\nb: [3]\n");
        let once = merge(base.clone(), incoming.clone());
        let twice = merge(merge(base, incoming.clone()), incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_replaces_sequences_and_scalars() {
        let base = yaml("tags: [a, b]\ncount: 1\n");
        let incoming = yaml("tags: [c]\ncount: 2\n");
        let expected = yaml("tags: [c]\ncount: 2\n");
        assert_eq!(merge(base, incoming), expected);
    }

    #[test]
    fn merge_mapping_replaces_scalar() {
        let base = yaml("a: 1\n");
        let incoming = yaml("a:\n  b: 2\n");
        let expected = yaml("a:\n  b: 2\n");
        assert_eq!(merge(base, incoming), expected);
    }

    #[test]
    fn search_paths_append_overrides_in_order() {
        let overrides = vec![PathBuf::from("/opt"), PathBuf::from("/usr/share")];
        let paths = search_paths(&overrides);
        let tail = &paths[paths.len() - 2..];
        assert_eq!(tail, &[PathBuf::from("/opt"), PathBuf::from("/usr/share")]);
        assert_eq!(paths[paths.len() - 3], PathBuf::from(LOCAL_CONFIG_DIR));
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user(Path::new("/opt/configs")), PathBuf::from("/opt/configs"));
    }

    #[test]
    fn expand_user_resolves_tilde() {
        let expanded = expand_user(Path::new("~/my_configs"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("my_configs"));
    }

    #[test]
    fn load_without_files_yields_empty_mapping() {
        let empty = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(
            &["does_not_exist.yml"],
            &[empty.path().to_path_buf()],
            false,
        )
        .unwrap();
        assert!(manager.config().is_empty());
        assert!(manager.config_files().is_empty());
    }

    #[test]
    fn load_merges_later_files_over_earlier() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("test.yml"), "a:\n  x: 1\n  y: 2\n").unwrap();
        std::fs::write(second.path().join("test.yml"), "a:\n  y: 3\n").unwrap();

        let manager = ConfigManager::load(
            &["test.yml"],
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            false,
        )
        .unwrap();

        let expected = match yaml("a:\n  x: 1\n  y: 3\n") {
            Value::Mapping(mapping) => mapping,
            _ => unreachable!(),
        };
        assert_eq!(manager.config(), &expected);
        assert_eq!(manager.config_files().len(), 2);
    }

    #[test]
    fn empty_later_file_overrides_nothing() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("test.yml"), "a:\n  x: 1\n").unwrap();
        std::fs::write(second.path().join("test.yml"), "").unwrap();

        let manager = ConfigManager::load(
            &["test.yml"],
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            false,
        )
        .unwrap();

        let expected = match yaml("a:\n  x: 1\n") {
            Value::Mapping(mapping) => mapping,
            _ => unreachable!(),
        };
        assert_eq!(manager.config(), &expected);
        assert_eq!(manager.config_files().len(), 1);
    }

    #[test]
    fn load_reports_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yml"), "a: [unclosed\n").unwrap();
        let result = ConfigManager::load(&["bad.yml"], &[dir.path().to_path_buf()], false);
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }
}
