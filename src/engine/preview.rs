// src/engine/preview.rs
//
// Preview sessions: debounced, latest-wins rendering per file.
//
// Every request gets a monotonic id. A session (keyed by source path)
// remembers the newest id; publishing a newer one wakes any older request
// still debouncing or rendering through a `watch` channel, and that request
// resolves to `None`. Only the newest request's render is surfaced, and
// delivering it removes the session. So does dropping the newest request's
// future before it completes.

use crate::engine::common::EngineResult;
use crate::engine::pool;
use crate::ops::AdjustmentSettings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub id: u64,
    pub path: PathBuf,
    pub settings: AdjustmentSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPhase {
    Idle,
    Debouncing,
    Rendering,
}

/// Encoded preview handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResult {
    pub request_id: u64,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub status: i32,
    pub message: String,
}

impl RenderedResult {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            request_id: 0,
            byte_size: bytes.len() as u64,
            bytes,
            width,
            height,
            status: 1,
            message: String::new(),
        }
    }
}

struct Session {
    latest: u64,
    phase: PreviewPhase,
    wake: watch::Sender<u64>,
}

pub struct PreviewSessions {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<PathBuf, Session>>,
    debounce: Duration,
}

impl PreviewSessions {
    pub fn new(debounce: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
            debounce,
        }
    }

    /// Register a new request; it supersedes every earlier one for `path`.
    fn issue(&self, path: impl Into<PathBuf>, settings: AdjustmentSettings) -> PreviewRequest {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let path = path.into();
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(path.clone()).or_insert_with(|| Session {
            latest: 0,
            phase: PreviewPhase::Idle,
            wake: watch::channel(0).0,
        });
        session.latest = id;
        session.phase = PreviewPhase::Debouncing;
        session.wake.send_replace(id);
        debug!(target: "decolgen::preview", id, path = %path.display(), "preview issued");
        PreviewRequest { id, path, settings }
    }

    /// Issue a request for `path`, debounce, then render on the worker pool.
    ///
    /// `Ok(None)` means the request was superseded or cancelled; that is not
    /// an error. Render errors are returned only for the newest request.
    pub async fn submit<F>(
        &self,
        path: impl Into<PathBuf>,
        settings: AdjustmentSettings,
        render: F,
    ) -> EngineResult<Option<RenderedResult>>
    where
        F: FnOnce(&AdjustmentSettings) -> EngineResult<RenderedResult> + Send + 'static,
    {
        let request = self.issue(path, settings);
        self.run(request, render).await
    }

    async fn run<F>(
        &self,
        request: PreviewRequest,
        render: F,
    ) -> EngineResult<Option<RenderedResult>>
    where
        F: FnOnce(&AdjustmentSettings) -> EngineResult<RenderedResult> + Send + 'static,
    {
        let _abandon = AbandonGuard {
            sessions: self,
            request: &request,
        };
        let Some(mut wake) = self.subscribe_if_latest(&request) else {
            return Ok(self.dropped(&request, "before debounce"));
        };

        let quiet = tokio::time::sleep(self.debounce);
        tokio::pin!(quiet);
        loop {
            tokio::select! {
                _ = &mut quiet => break,
                changed = wake.changed() => {
                    if changed.is_err() || *wake.borrow_and_update() != request.id {
                        return Ok(self.dropped(&request, "while debouncing"));
                    }
                }
            }
        }

        if !self.transition(&request, PreviewPhase::Debouncing, PreviewPhase::Rendering) {
            return Ok(self.dropped(&request, "after debounce"));
        }

        let settings = request.settings.clone();
        let job = pool::spawn("preview", move || render(&settings));
        tokio::pin!(job);
        let result = loop {
            tokio::select! {
                result = &mut job => break result,
                changed = wake.changed() => {
                    // The pool job keeps running; its result is discarded
                    if changed.is_err() || *wake.borrow_and_update() != request.id {
                        return Ok(self.dropped(&request, "while rendering"));
                    }
                }
            }
        };

        if !self.finish(&request) {
            return Ok(self.dropped(&request, "after render"));
        }
        let mut rendered = result?;
        rendered.request_id = request.id;
        debug!(
            target: "decolgen::preview",
            id = request.id,
            size = rendered.byte_size,
            "preview rendered"
        );
        Ok(Some(rendered))
    }

    /// Drop the session for `path`; pending requests resolve to `None`.
    pub fn cancel(&self, path: &Path) {
        if self.sessions.lock().remove(path).is_some() {
            debug!(target: "decolgen::preview", path = %path.display(), "preview cancelled");
        }
    }

    pub fn state(&self, path: &Path) -> PreviewPhase {
        self.sessions
            .lock()
            .get(path)
            .map_or(PreviewPhase::Idle, |s| s.phase)
    }

    /// Newest id issued for `path`, if a session exists.
    pub fn latest(&self, path: &Path) -> Option<u64> {
        self.sessions.lock().get(path).map(|s| s.latest)
    }

    fn subscribe_if_latest(&self, request: &PreviewRequest) -> Option<watch::Receiver<u64>> {
        let sessions = self.sessions.lock();
        let session = sessions.get(&request.path)?;
        (session.latest == request.id).then(|| session.wake.subscribe())
    }

    fn transition(&self, request: &PreviewRequest, from: PreviewPhase, to: PreviewPhase) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&request.path) {
            Some(session) if session.latest == request.id && session.phase == from => {
                session.phase = to;
                debug!(
                    target: "decolgen::preview",
                    id = request.id,
                    from = ?from,
                    to = ?to,
                    "preview phase"
                );
                true
            }
            _ => false,
        }
    }

    /// Remove the session once its newest request has rendered.
    fn finish(&self, request: &PreviewRequest) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(&request.path) {
            Some(session)
                if session.latest == request.id && session.phase == PreviewPhase::Rendering =>
            {
                sessions.remove(&request.path);
                debug!(target: "decolgen::preview", id = request.id, "preview session closed");
                true
            }
            _ => false,
        }
    }

    fn dropped(&self, request: &PreviewRequest, when: &'static str) -> Option<RenderedResult> {
        debug!(target: "decolgen::preview", id = request.id, when, "preview superseded");
        None
    }

    /// Remove the session if `request` is still its newest id.
    fn abandon(&self, request: &PreviewRequest) {
        let mut sessions = self.sessions.lock();
        if sessions
            .get(&request.path)
            .is_some_and(|s| s.latest == request.id)
        {
            sessions.remove(&request.path);
            debug!(target: "decolgen::preview", id = request.id, "preview abandoned");
        }
    }
}

/// Closes the session when the newest request's future is dropped before it
/// delivers. A no-op once a newer request, `cancel` or `finish` took over.
struct AbandonGuard<'a> {
    sessions: &'a PreviewSessions,
    request: &'a PreviewRequest,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.sessions.abandon(self.request);
    }
}
