//! Layered configuration for strongbox.
//!
//! Values are merged from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. An optional configuration file; the format is chosen by extension
//!    (`.toml`, `.yaml`/`.yml` or `.json`).
//! 3. Environment variables prefixed with `STRONGBOX_`. Nested keys are
//!    separated by a double underscore, e.g. `STRONGBOX_KDF__ITERATIONS=4`.
//!
//! ```no_run
//! use strongbox_config::Config;
//!
//! let config = Config::load(Some("strongbox.toml")).unwrap();
//! assert!(config.max_backups >= 1);
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strongbox_compress::Compression;
use strongbox_crypto::KdfParams;
use tracing::instrument;

pub const ENV_PREFIX: &str = "STRONGBOX_";
const ENV_SEPARATOR: &str = "__";

/// Default number of backups kept by retention.
pub const DEFAULT_MAX_BACKUPS: usize = 10;
/// Default maximum length of an incremental chain.
pub const DEFAULT_FULL_BACKUP_EVERY: u32 = 7;
/// Default deduplication threshold for file descriptors, in bytes.
pub const DEFAULT_DEDUP_MIN_FILE_SIZE: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite catalog file.
    pub catalog_path: PathBuf,
    /// Root directory of the local storage backend.
    pub storage_root: PathBuf,
    /// Format used when compression is enabled.
    pub compression: Compression,
    /// Whether backups taken with the configured defaults are compressed.
    pub compression_enabled: bool,
    /// Whether backups taken with the configured defaults record a
    /// deduplication map.
    pub deduplication_enabled: bool,
    /// File descriptors at or below this size are not deduplicated.
    pub dedup_min_file_size: u64,
    /// Retention ring size.
    pub max_backups: usize,
    /// A full backup is taken instead of an incremental one once a chain
    /// would reach this many backups.
    pub full_backup_every: u32,
    pub kdf: KdfParams,
    /// Recorded in backup metadata.
    pub device_name: Option<String>,
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "strongbox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".strongbox"))
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            catalog_path: data_dir.join("catalog.sqlite"),
            storage_root: data_dir.join("backups"),
            compression: Compression::Gzip,
            compression_enabled: true,
            deduplication_enabled: true,
            dedup_min_file_size: DEFAULT_DEDUP_MIN_FILE_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
            full_backup_every: DEFAULT_FULL_BACKUP_EVERY,
            kdf: KdfParams::default(),
            device_name: None,
        }
    }
}

impl Config {
    /// Build the layered [`Figment`] without extracting it.
    pub fn figment(file: Option<impl AsRef<Path>>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            let file = file.as_ref();
            if !file.is_file() {
                exn::bail!(ErrorKind::Missing(file.to_path_buf()));
            }
            let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR)))
    }

    /// Load and validate the configuration.
    #[instrument(skip_all)]
    pub fn load(file: Option<impl AsRef<Path>>) -> Result<Self> {
        let config: Config = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Reject combinations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.max_backups == 0 {
            exn::bail!(ErrorKind::Invalid("max_backups must be at least 1".to_string()));
        }
        if self.full_backup_every == 0 {
            exn::bail!(ErrorKind::Invalid("full_backup_every must be at least 1".to_string()));
        }
        // A chain longer than the retention ring would always lose its full
        // backup to retention.
        if self.full_backup_every as usize > self.max_backups {
            exn::bail!(ErrorKind::Invalid(format!(
                "full_backup_every ({}) must not exceed max_backups ({})",
                self.full_backup_every, self.max_backups
            )));
        }
        self.kdf
            .validate()
            .or_raise(|| ErrorKind::Invalid("kdf parameters are out of range".to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const NO_FILE: Option<&Path> = None;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.max_backups, 10);
        assert_eq!(config.full_backup_every, 7);
        assert_eq!(config.compression, Compression::Gzip);
        assert!(config.catalog_path.ends_with("catalog.sqlite"));
    }

    #[rstest]
    #[case("strongbox.toml", "max_backups = 4\nfull_backup_every = 2\ncompression = \"bzip2\"\n[kdf]\niterations = 1\n")]
    #[case("strongbox.yaml", "max_backups: 4\nfull_backup_every: 2\ncompression: bzip2\nkdf:\n  iterations: 1\n")]
    #[case("strongbox.json", r#"{"max_backups": 4, "full_backup_every": 2, "compression": "bzip2", "kdf": {"iterations": 1}}"#)]
    fn test_load_file_by_extension(#[case] name: &str, #[case] contents: &str) {
        // Jail serializes tests that read the environment.
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config: Config = Config::figment(Some(name)).unwrap().extract()?;
            assert_eq!(config.max_backups, 4);
            assert_eq!(config.full_backup_every, 2);
            assert_eq!(config.compression, Compression::Bzip2);
            assert_eq!(config.kdf.iterations, 1);
            // Untouched nested fields keep their defaults.
            assert_eq!(config.kdf.memory_kib, KdfParams::default().memory_kib);
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strongbox.ini");
        std::fs::write(&path, "max_backups = 3").unwrap();
        let err = Config::figment(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Missing(_)));
    }

    #[test]
    fn test_malformed_file_is_a_load_error() {
        Jail::expect_with(|jail| {
            jail.create_file("strongbox.toml", "max_backups = \"many\"")?;
            let err = Config::load(Some("strongbox.toml")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("strongbox.toml", "max_backups = 5\ndevice_name = \"tablet\"")?;
            jail.set_env("STRONGBOX_MAX_BACKUPS", "8");
            jail.set_env("STRONGBOX_KDF__PARALLELISM", "2");
            jail.set_env("STRONGBOX_COMPRESSION_ENABLED", "false");
            let config = Config::load(Some("strongbox.toml")).unwrap();
            assert_eq!(config.max_backups, 8);
            assert_eq!(config.kdf.parallelism, 2);
            assert_eq!(config.device_name.as_deref(), Some("tablet"));
            assert!(!config.compression_enabled);
            assert!(config.deduplication_enabled);
            Ok(())
        });
    }

    #[test]
    fn test_environment_without_file() {
        Jail::expect_with(|jail| {
            jail.set_env("STRONGBOX_DEDUP_MIN_FILE_SIZE", "4096");
            let config = Config::load(NO_FILE).unwrap();
            assert_eq!(config.dedup_min_file_size, 4096);
            Ok(())
        });
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 0)]
    #[case(3, 4)]
    fn test_invalid_retention(#[case] max_backups: usize, #[case] full_backup_every: u32) {
        let config = Config { max_backups, full_backup_every, ..Config::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_invalid_kdf() {
        let config = Config {
            kdf: KdfParams { memory_kib: 1, iterations: 0, parallelism: 0 },
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
