use crate::store::StorageConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables holding Gemini API keys, in rotation order
pub const API_KEY_ENV_VARS: [&str; 4] = [
    "GEMINI_API_KEY",
    "GEMINI_API_KEY_1",
    "GEMINI_API_KEY_2",
    "GEMINI_API_KEY_3",
];

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MAX_HISTORY_LENGTH: usize = 50;
const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct Config {
    pub character_name: String,
    pub discord_token: String,
    pub database_url: String,
    pub database_name: String,
    pub api_keys: Vec<String>,
    pub model: String,
    pub persona_file: PathBuf,
    pub max_history_length: usize,
    pub api_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| value(key).ok_or_else(|| format!("{} must be set", key));

        let character_name = required("CHARACTER_NAME")?;
        let discord_token = required("DISCORD_TOKEN")?;
        let database_url = required("DATABASE_URL")?;
        let database_name = value("DB_NAME").unwrap_or_else(|| character_name.clone());

        let api_keys: Vec<String> = API_KEY_ENV_VARS.iter().filter_map(|key| value(*key)).collect();

        let persona_file = value("PERSONA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("./characters/{}/persona.txt", character_name)));

        let max_history_length = match value("MAX_HISTORY_LENGTH") {
            Some(v) => v
                .parse()
                .map_err(|_| format!("MAX_HISTORY_LENGTH must be a valid number, got '{}'", v))?,
            None => DEFAULT_MAX_HISTORY_LENGTH,
        };

        let api_timeout_secs: u64 = match value("API_TIMEOUT_SECS") {
            Some(v) => v
                .parse()
                .map_err(|_| format!("API_TIMEOUT_SECS must be a valid number, got '{}'", v))?,
            None => DEFAULT_API_TIMEOUT_SECS,
        };

        Ok(Self {
            character_name,
            discord_token,
            database_url,
            database_name,
            api_keys,
            model: value("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            persona_file,
            max_history_length,
            api_timeout: Duration::from_secs(api_timeout_secs),
        })
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            uri: self.database_url.clone(),
            database_name: self.database_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("CHARACTER_NAME", "aoi"),
        ("DISCORD_TOKEN", "token"),
        ("DATABASE_URL", "sqlite://./.db"),
    ];

    #[test]
    fn test_defaults() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.database_name, "aoi");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.persona_file, PathBuf::from("./characters/aoi/persona.txt"));
        assert_eq!(config.max_history_length, 50);
        assert_eq!(config.api_timeout, Duration::from_secs(120));
        assert!(config.api_keys.is_empty());
    }

    #[test]
    fn test_api_keys_in_order_skipping_empty() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("GEMINI_API_KEY_3", "k3"),
            ("GEMINI_API_KEY", "k0"),
            ("GEMINI_API_KEY_1", "  "),
            ("GEMINI_API_KEY_2", "k2"),
        ]);
        assert_eq!(config(&vars).unwrap().api_keys, vec!["k0", "k2", "k3"]);
    }

    #[test]
    fn test_missing_required_or_bad_number() {
        let err = config(&REQUIRED[..2]).err().unwrap();
        assert!(err.contains("DATABASE_URL"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_HISTORY_LENGTH", "lots"));
        assert!(config(&vars).err().unwrap().contains("MAX_HISTORY_LENGTH"));
    }

    #[test]
    fn test_storage_config() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DB_NAME", "aoi_prod"));
        let storage = config(&vars).unwrap().storage();
        assert_eq!(storage.uri, "sqlite://./.db");
        assert_eq!(storage.database_name, "aoi_prod");
    }
}
