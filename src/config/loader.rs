//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML file discovery, environment
//! detection and deep merging of environment-specific overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::StackdConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["stackd-config.yaml", "stackd-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit

pub struct ConfigManager {
    config: StackdConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    ///
    /// Tests use this instead of mutating process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        config.orchestration.stack_root =
            Self::anchor(&config_directory, &config.orchestration.stack_root);
        config.orchestration.environment_root =
            Self::anchor(&config_directory, &config.orchestration.environment_root);
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            stack_root = %config.orchestration.stack_root.display(),
            max_attempts = config.orchestration.default_max_attempts,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Build a manager around an already constructed configuration
    pub fn from_config(config: StackdConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &StackdConfig {
        &self.config
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: STACKD_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("STACKD_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Relative directories are resolved against the config directory's parent
    fn anchor(config_directory: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        config_directory
            .parent()
            .map(|root| root.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({}MB > {}MB limit)",
                    metadata.len() / (1024 * 1024),
                    MAX_CONFIG_FILE_SIZE / (1024 * 1024)
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn sanitize_config_for_logging(config: &StackdConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential", "auth"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<StackdConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: StackdConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;
        config.environment = environment.to_string();

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TEST_CONFIG: &str = r#"
orchestration:
  default_max_attempts: 3
  stack_root: "state/stacks"
  pillar_env: base
polling:
  ping_interval_ms: 2000
  ping_max_failures: 30
history:
  max_message_length: 512

development:
  polling:
    ping_interval_ms: 100

test:
  orchestration:
    default_max_attempts: 1
  polling:
    ping_interval_ms: 1
    state_wait_interval_ms: 1

production:
  orchestration:
    stack_root: "/srv/stackd/stacks"
"#;

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("stackd-config.yaml"), TEST_CONFIG).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp, config_dir) = setup_test_config_dir();

        let dev =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "development")
                .unwrap();
        assert_eq!(dev.config().polling.ping_interval_ms, 100);
        assert_eq!(dev.config().polling.ping_max_failures, 30);
        assert_eq!(dev.config().orchestration.default_max_attempts, 3);
        assert_eq!(dev.environment(), "development");

        let test =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();
        assert_eq!(test.config().orchestration.default_max_attempts, 1);
        assert_eq!(test.config().polling.state_wait_interval_ms, 1);
        assert_eq!(test.config().history.max_message_length, 512);
        assert_eq!(test.config().environment, "test");
    }

    #[test]
    fn test_relative_stack_root_is_anchored() {
        let (temp, config_dir) = setup_test_config_dir();

        let test =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();
        assert_eq!(
            test.config().orchestration.stack_root,
            temp.path().join("state/stacks")
        );

        let prod =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "production").unwrap();
        assert_eq!(
            prod.config().orchestration.stack_root,
            PathBuf::from("/srv/stackd/stacks")
        );
    }

    #[test]
    fn test_invalid_values_fail_loading() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("stackd-config.yml"),
            "orchestration:\n  default_max_attempts: 0\n",
        )
        .unwrap();
        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_yaml_reports_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("stackd-config.yaml"), "orchestration: [").unwrap();
        let err = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        )
        .unwrap_err();
        assert!(err.to_string().contains("stackd-config.yaml"));
    }

    #[test]
    fn test_config_sanitization() {
        let mut value = serde_json::json!({
            "salt": { "api_token": "abcdef123456", "url": "https://salt" },
            "secrets": [ { "password": "" } ]
        });
        ConfigManager::sanitize_json_recursive(&mut value, &["password", "secret", "token"]);
        assert_eq!(value["salt"]["api_token"], "[MASKED]");
        assert_eq!(value["salt"]["url"], "https://salt");
        assert_eq!(value["secrets"], "[MASKED]");
    }
}
