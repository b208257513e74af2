use crate::core::transaction::SUBSIDY;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_DB_PATH: &str = "data";
static DEFAULT_TREE_NAME: &str = "blocks";
const DEFAULT_DIFFICULTY_BITS: u32 = 16;

const DB_PATH_KEY: &str = "LEDGER_DB_PATH";
const DIFFICULTY_BITS_KEY: &str = "LEDGER_DIFFICULTY_BITS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the sled database
    pub db_path: PathBuf,
    /// Name of the tree holding blocks and the tip pointer
    pub tree_name: String,
    /// Leading zero bits a block hash must have
    pub difficulty_bits: u32,
    /// Value of every coinbase output
    pub subsidy: u64,
    /// Upper bound (exclusive) of the nonce search
    pub max_nonce: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            tree_name: String::from(DEFAULT_TREE_NAME),
            difficulty_bits: DEFAULT_DIFFICULTY_BITS,
            subsidy: SUBSIDY,
            max_nonce: i64::MAX,
        }
    }
}

impl LedgerConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> LedgerConfig {
        LedgerConfig {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    pub fn with_difficulty_bits(mut self, difficulty_bits: u32) -> LedgerConfig {
        self.difficulty_bits = difficulty_bits;
        self
    }

    pub fn with_subsidy(mut self, subsidy: u64) -> LedgerConfig {
        self.subsidy = subsidy;
        self
    }

    pub fn with_max_nonce(mut self, max_nonce: i64) -> LedgerConfig {
        self.max_nonce = max_nonce;
        self
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<LedgerConfig> {
        let config: LedgerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<LedgerConfig> {
        let contents = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<LedgerConfig> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => LedgerConfig::default(),
        };
        config.apply_env()
    }

    fn apply_env(mut self) -> Result<LedgerConfig> {
        if let Ok(db_path) = env::var(DB_PATH_KEY) {
            self.db_path = PathBuf::from(db_path);
        }
        if let Ok(bits) = env::var(DIFFICULTY_BITS_KEY) {
            self.difficulty_bits = bits.parse().map_err(|e| {
                LedgerError::Config(format!("Invalid {DIFFICULTY_BITS_KEY} '{bits}': {e}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=255).contains(&self.difficulty_bits) {
            return Err(LedgerError::Config(format!(
                "difficulty_bits must be within 1..=255, got {}",
                self.difficulty_bits
            )));
        }
        if self.subsidy == 0 {
            return Err(LedgerError::Config("subsidy must be positive".to_string()));
        }
        if self.tree_name.is_empty() {
            return Err(LedgerError::Config("tree_name must not be empty".to_string()));
        }
        if self.max_nonce <= 0 {
            return Err(LedgerError::Config(format!(
                "max_nonce must be positive, got {}",
                self.max_nonce
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.db_path, PathBuf::from("data"));
        assert_eq!(config.tree_name, "blocks");
        assert_eq!(config.difficulty_bits, 16);
        assert_eq!(config.subsidy, SUBSIDY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LedgerConfig::from_toml_str(
            r#"
            db_path = "/tmp/ledger"
            difficulty_bits = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.difficulty_bits, 8);
        assert_eq!(config.tree_name, "blocks");
        assert_eq!(config.subsidy, SUBSIDY);
    }

    #[test]
    fn test_rejects_out_of_range_difficulty() {
        let result = LedgerConfig::from_toml_str("difficulty_bits = 0");
        assert!(matches!(result, Err(LedgerError::Config(_))));

        let result = LedgerConfig::from_toml_str("difficulty_bits = 256");
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = LedgerConfig::from_toml_str("difficulty_bits = \"many\"");
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "subsidy = 25\ntree_name = \"chain\"\n").unwrap();

        let config = LedgerConfig::from_file(&path).unwrap();
        assert_eq!(config.subsidy, 25);
        assert_eq!(config.tree_name, "chain");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LedgerConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
