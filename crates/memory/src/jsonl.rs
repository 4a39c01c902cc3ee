//! JSON-lines store: one `.jsonl` file per session.
//!
//! Each line is a JSON-encoded `Message`. Files are append-only, so a crash
//! mid-write loses at most the last line; unreadable lines are skipped on
//! load with a warning.
//!
//! Storage location: `<chats_dir>/<session>.jsonl`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use counsel_core::error::StoreError;
use counsel_core::{ConversationId, ConversationStore, Message};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct JsonlStore {
    dir: PathBuf,
    // Serializes writers within this process
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Store files under `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file holding `session`'s history.
    pub fn path_for(&self, session: &ConversationId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(&session.0)))
    }

    async fn write_lines(&self, path: &Path, messages: &[Message]) -> Result<(), StoreError> {
        let mut buf = String::new();
        for message in messages {
            let line = serde_json::to_string(message)
                .map_err(|e| StoreError::Serialization(format!("Failed to encode message: {e}")))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!(
                "Failed to create chats directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to flush {}: {e}", path.display())))?;
        Ok(())
    }
}

/// Map a session id to a safe file stem.
///
/// Ids made only of `[A-Za-z0-9._-]` (and not starting with a dot) are used
/// as-is. Anything else has its odd characters replaced by `_` and gets a
/// short hash of the original id appended, so `a/b` and `a_b` stay apart.
fn file_stem(session: &str) -> String {
    let cleaned: String = session
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned == session && !cleaned.is_empty() {
        return cleaned.to_string();
    }

    let digest = Sha256::digest(session.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    let base = if cleaned.is_empty() { "default" } else { cleaned };
    format!("{base}-{suffix}")
}

fn parse_lines(content: &str, path: &Path) -> Vec<Message> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Message>(line) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = n + 1,
                    error = %e,
                    "Skipping corrupted chat line"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl ConversationStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, session: &ConversationId, message: &Message) -> Result<(), StoreError> {
        self.write_lines(&self.path_for(session), std::slice::from_ref(message))
            .await
    }

    async fn append_all(
        &self,
        session: &ConversationId,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let path = self.path_for(session);
        self.write_lines(&path, messages).await?;
        debug!(session = %session, count = messages.len(), "Appended chat messages");
        Ok(())
    }

    async fn read_all(&self, session: &ConversationId) -> Result<Vec<Message>, StoreError> {
        let path = self.path_for(session);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        let messages = parse_lines(&content, &path);
        debug!(session = %session, count = messages.len(), "Loaded chat history");
        Ok(messages)
    }

    async fn clear(&self, session: &ConversationId) -> Result<(), StoreError> {
        let path = self.path_for(session);
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counsel_core::{Role, ToolCallRequest};

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let id = ConversationId::from("weather-chat");

        {
            let store = JsonlStore::new(dir.path().join("chats"));
            store.append(&id, &Message::user("Weather in Oslo?")).await.unwrap();
            store
                .append_all(
                    &id,
                    &[
                        Message::assistant_tool_calls(
                            None,
                            vec![ToolCallRequest {
                                id: "call_1".into(),
                                name: "get_current_weather".into(),
                                arguments: r#"{"location":"Oslo"}"#.into(),
                            }],
                        ),
                        Message::tool_result("call_1", "get_current_weather", "{}"),
                        Message::assistant("Cold."),
                    ],
                )
                .await
                .unwrap();
        }

        let store = JsonlStore::new(dir.path().join("chats"));
        let history = store.read_all(&id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].tool_calls[0].id, "call_1");
        assert_eq!(history[2].role, Role::Tool);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[3].text(), "Cold.");
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        assert!(store
            .read_all(&ConversationId::from("nope"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let id = ConversationId::from("s");
        store.append(&id, &Message::user("first")).await.unwrap();
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(store.path_for(&id))
                .unwrap();
            writeln!(f, "{{not json").unwrap();
        }
        store.append(&id, &Message::user("second")).await.unwrap();

        let history = store.read_all(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text(), "second");
    }

    #[tokio::test]
    async fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let id = ConversationId::from("s");
        store.append(&id, &Message::user("hi")).await.unwrap();
        assert!(store.path_for(&id).exists());

        store.clear(&id).await.unwrap();
        assert!(!store.path_for(&id).exists());
        store.clear(&id).await.unwrap();
    }

    #[test]
    fn session_ids_are_sanitized() {
        assert_eq!(file_stem("plain-id_1"), "plain-id_1");
        assert_eq!(file_stem("v1.2"), "v1.2");

        let traversal = file_stem("../../etc/passwd");
        assert!(traversal.starts_with("_.._etc_passwd-"), "{traversal}");
        assert!(!traversal.contains('/'));
        assert!(file_stem("").starts_with("default-"));
        assert!(file_stem("...").starts_with("default-"));
        assert_ne!(file_stem(""), file_stem("..."));
    }

    #[test]
    fn path_stays_in_dir() {
        let store = JsonlStore::new("/tmp/chats");
        let path = store.path_for(&ConversationId::from("a/b"));
        assert_eq!(path.parent(), Some(Path::new("/tmp/chats")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("a_b-") && name.ends_with(".jsonl"), "{name}");
    }

    #[tokio::test]
    async fn sanitized_ids_do_not_share_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let slashed = ConversationId::from("a/b");
        let plain = ConversationId::from("a_b");

        store.append(&slashed, &Message::user("from a/b")).await.unwrap();
        store.append(&plain, &Message::user("from a_b")).await.unwrap();

        assert_ne!(store.path_for(&slashed), store.path_for(&plain));
        let history = store.read_all(&slashed).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text(), "from a/b");
        assert_eq!(store.read_all(&plain).await.unwrap().len(), 1);
    }
}
