//! Part-based upload session
//!
//! [`PartUploadSession`] is the multipart upload state machine. It buffers
//! bytes from the streaming writer, cuts a part every time the buffer
//! reaches the configured threshold, and commits either as one atomic PUT
//! (small objects) or by completing a multipart session. The object becomes
//! visible to readers only at commit; an aborted session leaves nothing
//! behind.
//!
//! The session talks to the store through the [`ObjectTransport`] trait and
//! never opens sockets itself. Retry policy, if any, belongs to the
//! transport implementation.

use crate::error::{Error, Result};
use crate::types::UploadMode;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifier of one multipart session at the store
pub type SessionId = String;

/// Store-assigned identifier for one uploaded part (ETag-like)
pub type ContentId = String;

// ============================================================================
// Transport boundary
// ============================================================================

/// Byte-sink boundary contract for an S3-style object store.
///
/// One transport instance targets one object. Part numbers are assigned by
/// the caller, ascending from 1.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Begin a multipart session for the target object
    async fn create_session(&self) -> Result<SessionId>;

    /// Upload one part; returns the store's content identifier for it
    async fn upload_part(
        &self,
        session: &str,
        part_number: u64,
        bytes: Bytes,
    ) -> Result<ContentId>;

    /// Upload the whole object in one atomic request
    async fn put_object(&self, bytes: Bytes) -> Result<ContentId>;

    /// Assemble the listed parts, in the given order, into the visible object
    async fn complete_session(
        &self,
        session: &str,
        parts: &[(u64, ContentId)],
    ) -> Result<String>;

    /// Release server-side resources held by an uncommitted session
    async fn abort_session(&self, session: &str) -> Result<()>;

    /// Human-readable handle of the target object
    fn location(&self) -> String;
}

// ============================================================================
// Upload session state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Accumulating bytes; still below the part threshold
    Buffering,
    /// A multipart session exists; switching back is impossible
    Multipart,
    /// Terminal: object is visible
    Committed,
    /// Terminal: nothing is visible
    Aborted,
}

/// Receipt returned by a successful [`PartUploadSession::commit`]
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    /// Single PUT or multipart
    pub mode: UploadMode,
    /// Number of uploaded parts (1 for a single PUT)
    pub part_count: u64,
    /// Handle of the now-visible object
    pub object: String,
    /// Total bytes written through the session
    pub bytes: u64,
}

/// Buffers writer output and uploads it through a part-based protocol.
///
/// Stays in single-PUT mode while the cumulative size is below
/// `part_size_threshold`; crossing it switches irrevocably to multipart.
/// Callers must end the session with [`commit`](Self::commit) or
/// [`abort`](Self::abort): a dropped live session leaks server-side
/// multipart storage, and `Drop` logs a warning to make that visible.
pub struct PartUploadSession<T: ObjectTransport> {
    transport: T,
    threshold: usize,
    buffer: BytesMut,
    session_id: Option<SessionId>,
    /// (part number, content id), ascending part numbers assigned at cut time
    parts: Vec<(u64, ContentId)>,
    next_part: u64,
    total_bytes: u64,
    state: SessionState,
}

impl<T: ObjectTransport> PartUploadSession<T> {
    /// Create a session with the given part-size threshold in bytes
    pub fn new(transport: T, part_size_threshold: usize) -> Self {
        Self {
            transport,
            threshold: part_size_threshold.max(1),
            buffer: BytesMut::new(),
            session_id: None,
            parts: Vec::new(),
            next_part: 1,
            total_bytes: 0,
            state: SessionState::Buffering,
        }
    }

    /// Total bytes accepted so far
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of parts uploaded so far
    pub fn part_count(&self) -> u64 {
        self.parts.len() as u64
    }

    /// Whether the session already switched to multipart mode
    pub fn is_multipart(&self) -> bool {
        self.state == SessionState::Multipart
    }

    fn ensure_active(&self, op: &str) -> Result<()> {
        match self.state {
            SessionState::Buffering | SessionState::Multipart => Ok(()),
            SessionState::Committed => Err(Error::protocol(format!(
                "{op} on a committed upload session"
            ))),
            SessionState::Aborted => Err(Error::protocol(format!(
                "{op} on an aborted upload session"
            ))),
        }
    }

    /// Append bytes, cutting and uploading a part at every threshold crossing.
    ///
    /// A single call may produce several parts when the payload spans more
    /// than one threshold boundary; remainders smaller than the threshold
    /// stay buffered for the next write or for commit.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_active("write")?;

        self.buffer.extend_from_slice(bytes);
        self.total_bytes += bytes.len() as u64;

        while self.buffer.len() >= self.threshold {
            if self.session_id.is_none() {
                let id = self.transport.create_session().await?;
                debug!(session = %id, "entered multipart mode");
                self.session_id = Some(id);
                self.state = SessionState::Multipart;
            }
            let part = self.buffer.split_to(self.threshold).freeze();
            self.upload_next_part(part).await?;
        }

        Ok(())
    }

    async fn upload_next_part(&mut self, part: Bytes) -> Result<()> {
        let session = self
            .session_id
            .as_deref()
            .ok_or_else(|| Error::protocol("part upload without a multipart session"))?;
        let part_number = self.next_part;
        let size = part.len();

        let content_id = self.transport.upload_part(session, part_number, part).await?;
        debug!(part_number, size, content_id = %content_id, "uploaded part");

        self.parts.push((part_number, content_id));
        self.next_part += 1;
        Ok(())
    }

    /// Make the object visible.
    ///
    /// Below the threshold this is one atomic PUT of everything buffered.
    /// In multipart mode the remaining buffer goes out as the final part
    /// (an empty part if nothing was ever cut, so completion has a part to
    /// reference), then the session is completed with every part's
    /// (number, content id) pair in ascending part order.
    pub async fn commit(&mut self) -> Result<CommitReceipt> {
        self.ensure_active("commit")?;

        let receipt = match self.session_id.as_deref() {
            None => {
                let payload = self.buffer.split().freeze();
                self.transport.put_object(payload).await?;
                CommitReceipt {
                    mode: UploadMode::SinglePut,
                    part_count: 1,
                    object: self.transport.location(),
                    bytes: self.total_bytes,
                }
            }
            Some(_) => {
                if !self.buffer.is_empty() || self.parts.is_empty() {
                    let tail = self.buffer.split().freeze();
                    self.upload_next_part(tail).await?;
                }
                let session = self.session_id.as_deref().unwrap_or_default();
                let object = self.transport.complete_session(session, &self.parts).await?;
                CommitReceipt {
                    mode: UploadMode::Multipart,
                    part_count: self.parts.len() as u64,
                    object,
                    bytes: self.total_bytes,
                }
            }
        };

        self.state = SessionState::Committed;
        Ok(receipt)
    }

    /// Abandon the session so nothing becomes visible.
    ///
    /// A failure of the store-side abort call is logged but still moves the
    /// session to Aborted locally; there is nothing more the caller can do
    /// with it. Idempotent on an already-aborted session; an error after
    /// commit, since a committed object cannot be retracted here.
    pub async fn abort(&mut self) -> Result<()> {
        match self.state {
            SessionState::Aborted => return Ok(()),
            SessionState::Committed => {
                return Err(Error::protocol("abort on a committed upload session"));
            }
            SessionState::Buffering | SessionState::Multipart => {}
        }

        if let Some(session) = self.session_id.as_deref() {
            if let Err(e) = self.transport.abort_session(session).await {
                warn!(session, error = %e, "failed to abort multipart session at the store");
            }
        }
        self.buffer.clear();
        self.state = SessionState::Aborted;
        Ok(())
    }
}

impl<T: ObjectTransport> Drop for PartUploadSession<T> {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Buffering | SessionState::Multipart) {
            warn!(
                object = %self.transport.location(),
                multipart = self.session_id.is_some(),
                "upload session dropped without commit or abort; \
                 uncommitted multipart storage is leaked at the store"
            );
        }
    }
}

// ============================================================================
// object_store-backed transport
// ============================================================================

/// Transport backed by any `object_store` implementation.
///
/// Parts are dispatched sequentially in part-number order, which is what
/// `object_store`'s `MultipartUpload` handles expect. The store tracks real
/// ETags internally and does not expose them, so content ids returned here
/// are synthetic.
pub struct ObjectStoreTransport {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    url: String,
    uploads: tokio::sync::Mutex<HashMap<SessionId, Box<dyn MultipartUpload>>>,
    next_session: AtomicU64,
}

impl ObjectStoreTransport {
    /// Create a transport targeting one object
    pub fn new(store: Arc<dyn ObjectStore>, path: ObjectPath, url: impl Into<String>) -> Self {
        Self {
            store,
            path,
            url: url.into(),
            uploads: tokio::sync::Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ObjectTransport for ObjectStoreTransport {
    async fn create_session(&self) -> Result<SessionId> {
        let upload = self.store.put_multipart(&self.path).await?;
        let id = format!("mpu-{}", self.next_session.fetch_add(1, Ordering::Relaxed));
        self.uploads.lock().await.insert(id.clone(), upload);
        Ok(id)
    }

    async fn upload_part(&self, session: &str, part_number: u64, bytes: Bytes) -> Result<ContentId> {
        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(session)
            .ok_or_else(|| Error::transport(format!("unknown upload session '{session}'")))?;
        upload.put_part(bytes.into()).await?;
        Ok(format!("part-{part_number}"))
    }

    async fn put_object(&self, bytes: Bytes) -> Result<ContentId> {
        let result = self.store.put(&self.path, bytes.into()).await?;
        Ok(result.e_tag.unwrap_or_else(|| "put".to_string()))
    }

    async fn complete_session(&self, session: &str, _parts: &[(u64, ContentId)]) -> Result<String> {
        let mut upload = self
            .uploads
            .lock()
            .await
            .remove(session)
            .ok_or_else(|| Error::transport(format!("unknown upload session '{session}'")))?;
        upload.complete().await?;
        Ok(self.url.clone())
    }

    async fn abort_session(&self, session: &str) -> Result<()> {
        let mut upload = self
            .uploads
            .lock()
            .await
            .remove(session)
            .ok_or_else(|| Error::transport(format!("unknown upload session '{session}'")))?;
        upload.abort().await?;
        Ok(())
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// In-memory transport that records every call.
///
/// Objects become readable only after a commit (a completed session or a
/// single PUT); aborted sessions leave nothing behind. Used by the test
/// suite to assert call counts and abort visibility.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<std::sync::Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, MemorySession>,
    object: Option<Bytes>,
    next_session: u64,
    create_calls: u64,
    upload_part_calls: u64,
    put_calls: u64,
    complete_calls: u64,
    abort_calls: u64,
    fail_uploads: bool,
}

#[derive(Default)]
struct MemorySession {
    parts: Vec<(u64, Bytes)>,
    completed: bool,
    aborted: bool,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed object, if any commit happened
    pub fn committed_object(&self) -> Option<Bytes> {
        self.state.lock().expect("memory transport lock").object.clone()
    }

    /// Sizes of the parts uploaded to `session`, in part-number order
    pub fn part_sizes(&self) -> Vec<usize> {
        let state = self.state.lock().expect("memory transport lock");
        let mut sizes: Vec<(u64, usize)> = state
            .sessions
            .values()
            .flat_map(|s| s.parts.iter().map(|(n, b)| (*n, b.len())))
            .collect();
        sizes.sort_unstable_by_key(|(n, _)| *n);
        sizes.into_iter().map(|(_, len)| len).collect()
    }

    /// Make every subsequent `upload_part` fail
    pub fn fail_uploads(&self, fail: bool) {
        self.state.lock().expect("memory transport lock").fail_uploads = fail;
    }

    /// (create_session, upload_part, put_object, complete_session, abort_session) call counts
    pub fn call_counts(&self) -> (u64, u64, u64, u64, u64) {
        let state = self.state.lock().expect("memory transport lock");
        (
            state.create_calls,
            state.upload_part_calls,
            state.put_calls,
            state.complete_calls,
            state.abort_calls,
        )
    }
}

#[async_trait]
impl ObjectTransport for MemoryTransport {
    async fn create_session(&self) -> Result<SessionId> {
        let mut state = self.state.lock().expect("memory transport lock");
        state.create_calls += 1;
        state.next_session += 1;
        let id = format!("mem-{}", state.next_session);
        state.sessions.insert(id.clone(), MemorySession::default());
        Ok(id)
    }

    async fn upload_part(&self, session: &str, part_number: u64, bytes: Bytes) -> Result<ContentId> {
        let mut state = self.state.lock().expect("memory transport lock");
        state.upload_part_calls += 1;
        if state.fail_uploads {
            return Err(Error::transport("injected part upload failure"));
        }
        let entry = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| Error::transport(format!("unknown session '{session}'")))?;
        entry.parts.push((part_number, bytes));
        Ok(format!("etag-{part_number}"))
    }

    async fn put_object(&self, bytes: Bytes) -> Result<ContentId> {
        let mut state = self.state.lock().expect("memory transport lock");
        state.put_calls += 1;
        state.object = Some(bytes);
        Ok("etag-put".to_string())
    }

    async fn complete_session(&self, session: &str, parts: &[(u64, ContentId)]) -> Result<String> {
        let mut state = self.state.lock().expect("memory transport lock");
        state.complete_calls += 1;

        let entry = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| Error::transport(format!("unknown session '{session}'")))?;
        if entry.aborted {
            return Err(Error::transport("complete on an aborted session"));
        }

        // Assemble in the caller's declared part order, like the real store
        let mut assembled = BytesMut::new();
        for (part_number, _content_id) in parts {
            let part = entry
                .parts
                .iter()
                .find(|(n, _)| n == part_number)
                .ok_or_else(|| Error::transport(format!("part {part_number} never uploaded")))?;
            assembled.extend_from_slice(&part.1);
        }
        entry.completed = true;
        state.object = Some(assembled.freeze());
        Ok("memory://object".to_string())
    }

    async fn abort_session(&self, session: &str) -> Result<()> {
        let mut state = self.state.lock().expect("memory transport lock");
        state.abort_calls += 1;
        let entry = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| Error::transport(format!("unknown session '{session}'")))?;
        entry.aborted = true;
        entry.parts.clear();
        Ok(())
    }

    fn location(&self) -> String {
        "memory://object".to_string()
    }
}
