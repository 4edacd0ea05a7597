#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use sharpen_kernel::{CoeffTable, PHASES};
use std::path::{Path, PathBuf};
use stream_core::LANES;
use thiserror::Error;

const RASTER_FILE: &str = "raster.yaml";
const COEFFICIENTS_FILE: &str = "coefficients.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RasterConfig {
    pub image_width: u32,
    pub image_height: u32,
}

impl RasterConfig {
    /// Ticks spanned by one raster row at the fixed lane count.
    pub fn row_ticks(&self) -> usize {
        self.image_width as usize / LANES
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoeffConfig {
    pub k1: Vec<u8>,
    pub k2: Vec<u8>,
    pub shift: Vec<u8>,
    pub k3: Vec<u8>,
}

impl CoeffConfig {
    pub fn from_table(table: &CoeffTable) -> Self {
        Self {
            k1: table.k1.to_vec(),
            k2: table.k2.to_vec(),
            shift: table.shift.to_vec(),
            k3: table.k3.to_vec(),
        }
    }

    pub fn to_table(&self) -> Result<CoeffTable, ConfigError> {
        Ok(CoeffTable {
            k1: phase_array("k1", &self.k1)?,
            k2: phase_array("k2", &self.k2)?,
            shift: phase_array("shift", &self.shift)?,
            k3: phase_array("k3", &self.k3)?,
        })
    }
}

fn phase_array(name: &str, values: &[u8]) -> Result<[u8; PHASES], ConfigError> {
    <[u8; PHASES]>::try_from(values).map_err(|_| ConfigError::Invalid {
        message: format!(
            "coefficient table {name} has {} entries, expected {PHASES}",
            values.len()
        ),
    })
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub raster: RasterConfig,
    pub coeffs: CoeffConfig,
}

impl FilterConfig {
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let base = dir.as_ref();
        let config = FilterConfig {
            raster: load_file(base.join(RASTER_FILE))?,
            coeffs: load_file(base.join(COEFFICIENTS_FILE))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The shipped configuration: a 64×64 raster and the default
    /// sharpening tables.
    pub fn fallback() -> Self {
        FilterConfig {
            raster: RasterConfig {
                image_width: 64,
                image_height: 64,
            },
            coeffs: CoeffConfig::from_table(&CoeffTable::sharpen_default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raster.image_width == 0 || self.raster.image_width as usize % LANES != 0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "image_width {} must be a positive multiple of {LANES}",
                    self.raster.image_width
                ),
            });
        }
        if self.raster.row_ticks() < 2 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "image_width {} spans fewer than two ticks per row",
                    self.raster.image_width
                ),
            });
        }
        if self.raster.image_height < 3 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "image_height {} cannot hold a three-row window",
                    self.raster.image_height
                ),
            });
        }
        let table = self.coeffs.to_table()?;
        if table.max_shift() >= 8 {
            return Err(ConfigError::Invalid {
                message: format!("shift amount {} out of range", table.max_shift()),
            });
        }
        Ok(())
    }
}

fn load_file<T: for<'de> Deserialize<'de>>(path: PathBuf) -> Result<T, ConfigError> {
    let reader = std::fs::File::open(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse { path, source })
}
