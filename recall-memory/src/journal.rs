//! File-backed message store writing one newline-delimited JSON journal per session.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use recall_primitives::SessionKey;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::MemoryResult;
use crate::message::Message;
use crate::store::{MessageStore, rank_matches};

/// Durable [`MessageStore`] keeping each session in `<root>/<escaped key>.jsonl`.
pub struct FileMessageStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMessageStore {
    /// Opens (or creates) a journal directory at the provided path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while creating the directory.
    pub async fn open(root: impl Into<PathBuf>) -> MemoryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the journal file used for `session`.
    #[must_use]
    pub fn session_path(&self, session: &SessionKey) -> PathBuf {
        self.root.join(format!("{}.jsonl", escape_key(session.as_str())))
    }

    async fn read_all(&self, session: &SessionKey) -> MemoryResult<Vec<Message>> {
        let data = match fs::read(self.session_path(session)).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut messages = Vec::new();
        for chunk in data
            .split(|byte| *byte == b'\n')
            .filter(|chunk| !chunk.is_empty())
        {
            let message: Message = serde_json::from_slice(chunk)?;
            messages.push(message);
        }
        Ok(messages)
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn append(&self, message: &Message) -> MemoryResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(message.session_key()))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_recent(&self, session: &SessionKey, limit: usize) -> MemoryResult<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut messages = self.read_all(session).await?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>> {
        let messages = self.read_all(session).await?;
        Ok(rank_matches(query, messages, threshold))
    }

    async fn clear(&self, session: &SessionKey) -> MemoryResult<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.session_path(session)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Keeps `[A-Za-z0-9_-]` and percent-encodes every other byte, so keys map to
/// distinct, traversal-free file names.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
