use crate::config::schema::DispatchConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Environment variables with this prefix override top-level keys,
/// e.g. `FANOUT_CONCURRENCY=200`.
pub const ENV_PREFIX: &str = "FANOUT";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads a config file (JSON, YAML or TOML), resolving `extends` chains
    /// and applying the environment overlay.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DispatchConfig> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_env_prefix<P: AsRef<Path>>(path: P, env_prefix: &str) -> Result<DispatchConfig> {
        let mut visited = HashSet::new();
        let merged = Self::load_tree(path.as_ref(), &mut visited)?;
        let config = Self::overlay_env(merged, env_prefix)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults plus the environment overlay, for runs without a file.
    pub fn from_env() -> Result<DispatchConfig> {
        let defaults = serde_json::to_value(DispatchConfig::default())?;
        Self::overlay_env(defaults, ENV_PREFIX)
    }

    fn load_tree(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if !visited.insert(path.clone()) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }

        let mut value = Self::load_file(&path)?;
        let parent = value
            .as_object_mut()
            .and_then(|map| map.remove("extends"))
            .and_then(|extends| extends.as_str().map(str::to_string));

        match parent {
            Some(parent) => {
                let dir = path.parent().ok_or_else(|| {
                    Error::Config(format!(
                        "Cannot determine parent directory for {}",
                        path.display()
                    ))
                })?;
                let mut base = Self::load_tree(&dir.join(parent), visited)?;
                merge(&mut base, value);
                Ok(base)
            }
            None => Ok(value),
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let value: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported file extension: {}",
                    path.display()
                )));
            }
        };

        if !value.is_object() {
            return Err(Error::Config(format!(
                "{}: top level must be a table",
                path.display()
            )));
        }
        Ok(value)
    }

    fn overlay_env(value: Value, env_prefix: &str) -> Result<DispatchConfig> {
        let json = serde_json::to_string(&value)?;
        let config = ::config::Config::builder()
            .add_source(::config::File::from_str(&json, ::config::FileFormat::Json))
            .add_source(::config::Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?
            .try_deserialize::<DispatchConfig>()?;
        Ok(config)
    }
}

/// Deep-merges `child` into `base`; child keys win, tables merge recursively.
fn merge(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Object(base_map), Value::Object(child_map)) => {
            for (key, child_value) in child_map {
                let nested = child_value.is_object()
                    && base_map.get(&key).is_some_and(Value::is_object);
                if let (true, Some(base_value)) = (nested, base_map.get_mut(&key)) {
                    merge(base_value, child_value);
                } else {
                    base_map.insert(key, child_value);
                }
            }
        }
        (base, child) => *base = child,
    }
}
