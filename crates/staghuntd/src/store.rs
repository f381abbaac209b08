//! Session files on disk: one `session_<id>.json` per session.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::sync::Arc;

use staghunt_games::record::{
    Episode, EpisodeStore, SessionId, SessionIds, SessionMeta, SessionRecord, StoreError,
};
use tracing::{debug, info, warn};

use crate::paths::AppPaths;

/// Writes each session's record after every episode. Handles created with
/// [`DirStore::handle`] share one id allocator, so concurrent sessions never
/// collide on a file.
#[derive(Debug)]
pub struct DirStore {
    paths: AppPaths,
    ids: Arc<SessionIds>,
    /// Records of the sessions this handle is writing.
    open: HashMap<SessionId, SessionRecord>,
}

impl DirStore {
    /// Open the directory and continue numbering after the highest session
    /// already stored there.
    pub fn open(paths: AppPaths) -> Result<Self, StoreError> {
        let max = list_ids(&paths)?.into_iter().max().unwrap_or(0);
        info!(dir = %paths.data_dir().display(), last_session = max, "session store opened");
        Ok(Self {
            paths,
            ids: Arc::new(SessionIds::starting_after(max)),
            open: HashMap::new(),
        })
    }

    /// Another store over the same directory and id allocator.
    pub fn handle(&self) -> Self {
        Self {
            paths: self.paths.clone(),
            ids: Arc::clone(&self.ids),
            open: HashMap::new(),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn write(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.paths.session_file(record.meta.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record)?;
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), episodes = record.episodes.len(), "session written");
        Ok(())
    }
}

impl EpisodeStore for DirStore {
    fn allocate_session_id(&mut self) -> Result<SessionId, StoreError> {
        Ok(self.ids.allocate())
    }

    fn append_episode(&mut self, meta: &SessionMeta, episode: &Episode) -> Result<(), StoreError> {
        if episode.session_id != meta.id {
            return Err(StoreError::Format(format!(
                "episode belongs to session {}, not {}",
                episode.session_id, meta.id
            )));
        }
        let record = self
            .open
            .entry(meta.id)
            .or_insert_with(|| SessionRecord::new(meta.clone()));
        record.episodes.push(episode.clone());
        let record = record.clone();
        self.write(&record)
    }
}

fn list_ids(paths: &AppPaths) -> Result<Vec<SessionId>, StoreError> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(paths.data_dir())? {
        let entry = entry?;
        let name = entry.file_name();
        match name.to_str().and_then(AppPaths::parse_session_file) {
            Some(id) => ids.push(id),
            None => {
                if name.to_string_lossy().ends_with(".tmp") {
                    warn!(file = %name.to_string_lossy(), "leftover partial write");
                }
            }
        }
    }
    Ok(ids)
}
