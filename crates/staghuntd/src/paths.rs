//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

use staghunt_games::record::SessionId;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Use `dir` if given, otherwise the OS data directory.
    pub fn new(dir: Option<PathBuf>) -> Result<Self, String> {
        let data_dir = match dir {
            Some(d) => d,
            None => Self::get_data_dir()?,
        };

        // Ensure directory exists
        fs::create_dir_all(&data_dir)
            .map_err(|e| format!("Failed to create data directory {}: {}", data_dir.display(), e))?;

        Ok(Self { data_dir })
    }

    fn get_data_dir() -> Result<PathBuf, String> {
        let base = dirs::data_dir().ok_or("Could not determine data directory")?;
        Ok(base.join("staghunt").join("sessions"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn session_file(&self, id: SessionId) -> PathBuf {
        self.data_dir.join(format!("session_{id}.json"))
    }

    /// Session id encoded in a file name, if it is one of ours.
    pub fn parse_session_file(name: &str) -> Option<SessionId> {
        name.strip_prefix("session_")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}
