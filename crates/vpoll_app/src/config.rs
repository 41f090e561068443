//! Watch options stored in a RON file.
use std::fs;
use std::path::{Path, PathBuf};

use vpoll_core::WatchOptions;
use vpoll_logging::{vpoll_info, vpoll_warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Loads options from `path`. A missing file yields empty options.
pub fn load_options(path: &Path) -> Result<WatchOptions, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            vpoll_warn!("Config file {:?} not found; using defaults", path);
            return Ok(WatchOptions::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let options = ron::Options::default()
        .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
        .from_str(&content)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    vpoll_info!("Loaded watch options from {:?}", path);
    Ok(options)
}
