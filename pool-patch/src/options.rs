//! User tunable pool fractions.
//!
//! Read from `pool-patch.json` next to the plugin on every request, so an
//! edited file applies to the next pool registration without a restart.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPTIONS_FILE_NAME: &str = "pool-patch.json";

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Io error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed options: {0}")]
    Json(#[from] serde_json::Error),
}

/// Share of detected capacity handed to each pool.
/// Values are not validated, out of range fractions just scale the result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fractions {
    #[serde(rename = "cpu_memory_pool_fraction", default = "default_cpu_fraction")]
    pub cpu: f32,

    #[serde(rename = "gpu_memory_pool_fraction", default = "default_gpu_fraction")]
    pub gpu: f32,
}

fn default_cpu_fraction() -> f32 {
    0.5
}

fn default_gpu_fraction() -> f32 {
    1.0
}

impl Default for Fractions {
    fn default() -> Self {
        Self {
            cpu: default_cpu_fraction(),
            gpu: default_gpu_fraction(),
        }
    }
}

/// Supplies fractions each time a pool is sized
pub trait FractionSource {
    fn fractions(&self) -> Fractions;
}

impl FractionSource for Fractions {
    fn fractions(&self) -> Fractions {
        *self
    }
}

/// JSON options file, re-read on every call
#[derive(Debug, Clone)]
pub struct OptionsFile {
    path: PathBuf,
}

impl OptionsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Options file placed in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(OPTIONS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Fractions, OptionsError> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl FractionSource for OptionsFile {
    fn fractions(&self) -> Fractions {
        match self.load() {
            Ok(fractions) => fractions,

            Err(OptionsError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No {}, using default fractions", self.path.display());
                Fractions::default()
            }

            Err(err) => {
                log::warn!(
                    "Can't read {}: {}. Using default fractions",
                    self.path.display(),
                    err
                );
                Fractions::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_options(test_name: &str, contents: Option<&str>) -> OptionsFile {
        let dir = std::env::temp_dir().join(format!(
            "pool-patch-{}-{}",
            test_name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();

        let options = OptionsFile::in_dir(&dir);
        let _ = fs::remove_file(options.path());

        if let Some(contents) = contents {
            fs::write(options.path(), contents).unwrap();
        }

        options
    }

    #[test]
    fn test_parse_both_fractions() {
        let fractions: Fractions = serde_json::from_str(
            r#"{ "cpu_memory_pool_fraction": 0.75, "gpu_memory_pool_fraction": 0.25 }"#,
        )
        .unwrap();

        assert_eq!(fractions, Fractions { cpu: 0.75, gpu: 0.25 });
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let fractions: Fractions =
            serde_json::from_str(r#"{ "gpu_memory_pool_fraction": 0.8, "other": true }"#).unwrap();

        assert_eq!(fractions.cpu, 0.5);
        assert_eq!(fractions.gpu, 0.8);
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_value(Fractions::default()).unwrap();
        assert_eq!(json["cpu_memory_pool_fraction"], 0.5);
        assert_eq!(json["gpu_memory_pool_fraction"], 1.0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let options = temp_options("missing", None);
        assert_eq!(options.fractions(), Fractions::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let options = temp_options("malformed", Some("{ cpu: half }"));
        assert!(matches!(options.load(), Err(OptionsError::Json(_))));
        assert_eq!(options.fractions(), Fractions::default());
    }

    #[test]
    fn test_file_is_reread_on_every_call() {
        let options = temp_options("reread", Some(r#"{ "cpu_memory_pool_fraction": 0.25 }"#));
        assert_eq!(options.fractions().cpu, 0.25);

        fs::write(options.path(), r#"{ "cpu_memory_pool_fraction": 0.75 }"#).unwrap();
        assert_eq!(options.fractions().cpu, 0.75);
    }
}
