//! Persistence boundary for chat sessions, history and tool descriptors.
//!
//! [`ChatStore`] is what the runtime depends on. [`FileStore`] is the
//! bundled implementation: an in-memory state optionally mirrored to a
//! single JSON file. Every mutation is applied to a copy, written to disk,
//! and only then swapped in, so a failed write leaves the state untouched.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use pv_domain::error::{Error, Result};
use pv_domain::history::HistoryRecord;
use pv_domain::session::{ChatSession, ToolDescriptor};
use pv_domain::stream::Usage;
use pv_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<ChatSession>>;

    /// Insert or overwrite a session.
    async fn save_session(&self, session: &ChatSession) -> Result<()>;

    /// Add usage to a session's counters and return the updated session.
    async fn record_usage(&self, session_id: &str, usage: &Usage) -> Result<ChatSession>;

    /// History of a session in conversation order.
    async fn list_history(&self, session_id: &str) -> Result<Vec<HistoryRecord>>;

    async fn append_history(&self, records: Vec<HistoryRecord>) -> Result<()>;

    /// Remove the records in `remove_ids` and insert `insert` at the
    /// position of the first removed record, as one atomic step. Fails
    /// without changes if any id is not part of the session's history.
    async fn replace_history(
        &self,
        session_id: &str,
        remove_ids: &[String],
        insert: Vec<HistoryRecord>,
    ) -> Result<()>;

    async fn get_tool_descriptor(&self, tool_id: &str) -> Result<Option<ToolDescriptor>>;

    /// Record a completed turn: counters and history together.
    async fn commit_turn(
        &self,
        session_id: &str,
        usage: &Usage,
        records: Vec<HistoryRecord>,
    ) -> Result<ChatSession> {
        let session = self.record_usage(session_id, usage).await?;
        self.append_history(records).await?;
        Ok(session)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    sessions: HashMap<String, ChatSession>,
    /// Per-session history in insertion order.
    #[serde(default)]
    history: HashMap<String, Vec<HistoryRecord>>,
    #[serde(default)]
    tools: HashMap<String, ToolDescriptor>,
}

pub struct FileStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Load or create the store file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let state = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?
        } else {
            StoreState::default()
        };

        tracing::info!(
            sessions = state.sessions.len(),
            path = %path.display(),
            "chat store loaded"
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    /// Register a tool descriptor so sessions can enable it by id.
    pub fn put_tool_descriptor(&self, descriptor: ToolDescriptor) -> Result<()> {
        self.mutate(|state| {
            state.tools.insert(descriptor.id.clone(), descriptor);
            Ok(())
        })
    }

    /// Apply `f` to a copy of the state, persist the copy, then publish it.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            write_atomic(path, &next)?;
        }
        *state = next;
        Ok(out)
    }
}

/// Write to a uniquely named sibling, sync, then rename into place.
fn write_atomic(path: &Path, state: &StoreState) -> Result<()> {
    use std::io::Write;

    let json = serde_json::to_vec_pretty(state)?;
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp = path.with_file_name(tmp_name);

    let written = std::fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(&json)?;
        f.sync_data()
    });
    if let Err(e) = written.and_then(|_| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

#[async_trait]
impl ChatStore for FileStore {
    async fn load_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.state.read().sessions.get(session_id).cloned())
    }

    async fn save_session(&self, session: &ChatSession) -> Result<()> {
        self.mutate(|state| {
            state.sessions.insert(session.id.clone(), session.clone());
            Ok(())
        })
    }

    async fn record_usage(&self, session_id: &str, usage: &Usage) -> Result<ChatSession> {
        self.mutate(|state| add_usage(state, session_id, usage))
    }

    async fn list_history(&self, session_id: &str) -> Result<Vec<HistoryRecord>> {
        let mut records = self
            .state
            .read()
            .history
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        // Stable: ties keep insertion order.
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn append_history(&self, records: Vec<HistoryRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let appended = self.mutate(|state| {
            let mut per_session: HashMap<String, usize> = HashMap::new();
            for record in records {
                *per_session.entry(record.session_id.clone()).or_default() += 1;
                state
                    .history
                    .entry(record.session_id.clone())
                    .or_default()
                    .push(record);
            }
            Ok(per_session)
        })?;

        for (session_id, records) in appended {
            TraceEvent::HistoryAppend { session_id, records }.emit();
        }
        Ok(())
    }

    async fn replace_history(
        &self,
        session_id: &str,
        remove_ids: &[String],
        insert: Vec<HistoryRecord>,
    ) -> Result<()> {
        let inserted = insert.len();
        self.mutate(|state| {
            let history = state.history.entry(session_id.to_owned()).or_default();
            let remove: HashSet<&str> = remove_ids.iter().map(String::as_str).collect();

            let present = history.iter().filter(|r| remove.contains(r.id.as_str())).count();
            if present != remove.len() {
                return Err(Error::Storage(format!(
                    "replace_history: {} of {} records missing from session {session_id}",
                    remove.len() - present,
                    remove.len()
                )));
            }

            let at = history
                .iter()
                .position(|r| remove.contains(r.id.as_str()))
                .unwrap_or(history.len());
            history.retain(|r| !remove.contains(r.id.as_str()));
            let tail = history.split_off(at.min(history.len()));
            history.extend(insert);
            history.extend(tail);
            Ok(())
        })?;

        TraceEvent::HistoryReplaced {
            session_id: session_id.to_owned(),
            removed: remove_ids.len(),
            inserted,
        }
        .emit();
        Ok(())
    }

    async fn get_tool_descriptor(&self, tool_id: &str) -> Result<Option<ToolDescriptor>> {
        Ok(self.state.read().tools.get(tool_id).cloned())
    }

    async fn commit_turn(
        &self,
        session_id: &str,
        usage: &Usage,
        records: Vec<HistoryRecord>,
    ) -> Result<ChatSession> {
        let count = records.len();
        let session = self.mutate(|state| {
            let session = add_usage(state, session_id, usage)?;
            state
                .history
                .entry(session_id.to_owned())
                .or_default()
                .extend(records);
            Ok(session)
        })?;

        TraceEvent::HistoryAppend {
            session_id: session_id.to_owned(),
            records: count,
        }
        .emit();
        Ok(session)
    }
}

fn add_usage(state: &mut StoreState, session_id: &str, usage: &Usage) -> Result<ChatSession> {
    let session = state
        .sessions
        .get_mut(session_id)
        .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
    session.add_usage(usage);
    Ok(session.clone())
}
