//! Line-oriented auto-response engine.
//!
//! Each stripped chunk runs through the profile's pattern sets in a fixed
//! order: ready, enter, typing-respond, fatal, restart-without-continue,
//! session capture. Enter and typing matches stop the chunk; the rest
//! fall through so one chunk can both flag fatal and yield a session id.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ayes_profile::CompiledProfile;
use ayes_session::{SessionStore, extract_uuid};

use crate::shared::{EnterTiming, Shared, enter_protocol};
use crate::strip::ChunkSplitter;

/// Engine-to-supervisor notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderEvent {
    /// A fatal or restart pattern matched; run the graceful exit path.
    /// The `is_fatal` / `restart_without_continue` flags in [`Shared`]
    /// say which.
    ExitRequested,
}

/// Session-capture sink for resumable tools.
pub struct SessionCapture {
    pub store: Arc<Mutex<SessionStore>>,
    pub cwd: PathBuf,
}

pub struct AutoResponder {
    profile: Arc<CompiledProfile>,
    shared: Arc<Shared>,
    splitter: ChunkSplitter,
    events: mpsc::UnboundedSender<ResponderEvent>,
    session: Option<SessionCapture>,
    /// Running chunk count since start (`i` in the gating rules).
    chunk_index: usize,
}

impl AutoResponder {
    pub fn new(
        profile: Arc<CompiledProfile>,
        shared: Arc<Shared>,
        events: mpsc::UnboundedSender<ResponderEvent>,
        session: Option<SessionCapture>,
    ) -> Self {
        let splitter = ChunkSplitter::new(profile.profile.line_policy);
        Self {
            profile,
            shared,
            splitter,
            events,
            session,
            chunk_index: 0,
        }
    }

    /// Feed one raw output chunk (ANSI intact); the line policy and
    /// stripping are applied here.
    pub fn on_output(&mut self, raw: &str) {
        for chunk in self.splitter.push(raw) {
            self.chunk_index += 1;
            self.process(&chunk);
        }
    }

    fn process(&mut self, chunk: &str) {
        // 1. Ready.
        if self.profile.ready_matches(chunk, self.chunk_index) {
            if !self.shared.ready.is_ready() {
                debug!(chunk_index = self.chunk_index, "ready pattern matched");
            }
            self.shared.ready.ready();
            self.shared.first_ready.fire();
        }

        // 2. Enter.
        if self.profile.enter_matches(chunk) {
            debug!("enter pattern matched, confirming");
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                enter_protocol(&shared, EnterTiming::confirm()).await;
            });
            return;
        }

        // 3. Typing-respond: immediate, no ready wait.
        if let Some(send) = self.profile.typing_response(chunk) {
            debug!(response = send, "typing-respond pattern matched");
            self.shared.write_to_child(send.as_bytes());
            return;
        }

        // 4. Fatal.
        if self.profile.fatal_matches(chunk) {
            info!("fatal pattern matched, shutting down");
            self.shared
                .is_fatal
                .store(true, std::sync::atomic::Ordering::SeqCst);
            let _ = self.events.send(ResponderEvent::ExitRequested);
        }

        // 5. Restart-without-continue: the resume attempt itself failed.
        if self.profile.restart_matches(chunk) {
            info!("restart-without-continue pattern matched");
            self.shared
                .restart_without_continue
                .store(true, std::sync::atomic::Ordering::SeqCst);
            self.shared
                .is_fatal
                .store(true, std::sync::atomic::Ordering::SeqCst);
            let _ = self.events.send(ResponderEvent::ExitRequested);
        }

        // 6. Session capture.
        if self.profile.profile.resume.is_some() {
            if let Some(capture) = &self.session {
                if let Some(id) = extract_uuid(chunk) {
                    match capture.store.lock().unwrap().record(&capture.cwd, id) {
                        Ok(()) => debug!(session_id = id, "captured session id"),
                        Err(e) => warn!("failed persisting session id: {e:#}"),
                    }
                }
            }
        }
    }

    /// Chunks processed so far.
    pub fn chunks_seen(&self) -> usize {
        self.chunk_index
    }
}

#[cfg(test)]
#[path = "respond_tests.rs"]
mod tests;
