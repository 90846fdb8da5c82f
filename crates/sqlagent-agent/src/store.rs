use std::collections::HashMap;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use sha2::{Digest, Sha256};
use sqlagent_llm::Message;

use crate::error::StoreError;

/// Persistence for per-thread conversation history.
pub trait ConversationStore: Send + Sync {
    /// History for `thread_id`; empty when the thread is new.
    fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Replace the stored history for `thread_id`.
    fn save(&self, thread_id: &str, messages: &[Message]) -> Result<(), StoreError>;
}

/// In-process store. History is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    threads: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide store shared by every agent that does not configure one.
    pub fn shared() -> Arc<MemoryStore> {
        static SHARED: OnceLock<Arc<MemoryStore>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(MemoryStore::new())))
    }

    pub fn thread_ids(&self) -> Result<Vec<String>, StoreError> {
        let threads = self.threads.lock().map_err(|_| StoreError::Poisoned)?;
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl ConversationStore for MemoryStore {
    fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let threads = self.threads.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    fn save(&self, thread_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().map_err(|_| StoreError::Poisoned)?;
        threads.insert(thread_id.to_string(), messages.to_vec());
        Ok(())
    }
}

/// One pretty-printed JSON file per thread inside a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(thread_id)))
    }
}

impl ConversationStore for JsonDirStore {
    fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let path = self.thread_path(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, thread_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(messages)?;
        write_bytes_atomic(&self.thread_path(thread_id), &data)
    }
}

/// Thread ids become file names: anything outside `[A-Za-z0-9_-]` maps to `_`,
/// and a digest of the raw id keeps ids that sanitise alike apart.
fn file_stem(thread_id: &str) -> String {
    let sanitised: String = thread_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(thread_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{sanitised}-{}", &digest[..8])
}

/// Write to a sibling temp file, fsync, then rename over the target.
fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    std::fs::rename(&tmp_path, path)?;
    if let Some(parent) = parent {
        sync_dir(parent)?;
    }
    Ok(())
}

fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_threads_independently() {
        let store = MemoryStore::new();
        store.save("a", &[Message::user("first")]).unwrap();
        store.save("b", &[Message::user("second")]).unwrap();

        assert_eq!(store.load("a").unwrap(), vec![Message::user("first")]);
        assert!(store.load("missing").unwrap().is_empty());
        assert_eq!(store.thread_ids().unwrap(), ["a", "b"]);
    }

    #[test]
    fn shared_store_is_a_single_instance() {
        let first = MemoryStore::shared();
        let second = MemoryStore::shared();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn sanitises_thread_ids_into_file_names() {
        let stem = file_stem("session-42_b");
        assert!(stem.starts_with("session-42_b-"), "{stem}");
        assert_eq!(stem.len(), "session-42_b-".len() + 8);
        assert!(file_stem("../../etc/passwd").starts_with("______etc_passwd-"));
        assert_eq!(file_stem("").len(), 9);
        assert_eq!(file_stem("session-42_b"), stem);
    }

    #[test]
    fn ids_that_sanitise_alike_use_separate_files() {
        assert_ne!(file_stem("a.b"), file_stem("a_b"));

        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        store.save("a.b", &[Message::user("dotted")]).unwrap();
        store.save("a_b", &[Message::user("underscored")]).unwrap();

        assert_eq!(store.load("a.b").unwrap(), vec![Message::user("dotted")]);
        assert_eq!(store.load("a_b").unwrap(), vec![Message::user("underscored")]);
    }

    #[test]
    fn json_dir_store_persists_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path().join("threads"));
        let history = vec![
            Message::system("prompt"),
            Message::user("How many albums?"),
            Message::assistant("347"),
        ];

        assert!(store.load("t1").unwrap().is_empty());
        store.save("t1", &history).unwrap();
        assert!(store.thread_path("t1").exists());
        let tmp = store.thread_path("t1").with_extension("json.tmp");
        assert!(!tmp.exists());

        let reopened = JsonDirStore::new(dir.path().join("threads"));
        assert_eq!(reopened.load("t1").unwrap(), history);
    }
}
