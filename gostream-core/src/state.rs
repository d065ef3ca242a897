//! Orchestration state shared by every supervisor
//!
//! Everything lives behind one coarse lock.  The lock is only ever held for
//! short bookkeeping; callers copy what they need out of it before any
//! `.await`, bind, accept or body write.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::edge::EdgeHandle;
use crate::media::registry::ListenerSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Supervised services visible to the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Media,
    Edge,
    Tunnel,
}

impl Service {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Edge => "edge",
            Self::Tunnel => "tunnel",
        }
    }
}

/// Token and generation handed to the task of one activation.
#[derive(Debug, Clone)]
pub struct Activation {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Lifecycle bookkeeping for a token-driven service.
///
/// At most one token is live at a time.  The generation counter keeps a
/// finishing task from clobbering the state of a newer activation.
#[derive(Debug, Default)]
pub struct ServiceSlot {
    state: ServiceState,
    token: Option<CancellationToken>,
    generation: u64,
}

impl ServiceSlot {
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        self.state
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.token.is_some()
    }

    /// Issue a fresh token, or `None` if one is already live.
    pub fn begin(&mut self) -> Option<Activation> {
        if self.token.is_some() {
            return None;
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.state = ServiceState::Starting;
        Some(Activation {
            generation: self.generation,
            token,
        })
    }

    pub fn mark_running(&mut self, generation: u64) {
        if generation == self.generation && self.token.is_some() {
            self.state = ServiceState::Running;
        }
    }

    /// Fire and clear the live token. Returns `false` when nothing was live.
    pub fn cancel(&mut self) -> bool {
        match self.token.take() {
            Some(token) => {
                token.cancel();
                self.state = ServiceState::Stopping;
                true
            }
            None => false,
        }
    }

    /// The task of `generation` reached its terminal state.
    pub fn finish(&mut self, generation: u64) {
        if generation == self.generation {
            self.token = None;
            self.state = ServiceState::Stopped;
        }
    }
}

#[derive(Debug, Default)]
pub struct SharedState {
    pub title: String,
    /// Set once the shell finished starting up; gates the quit confirmation.
    pub ready: bool,
    pub shutting_down: bool,
    pub backend_running: bool,
    pub media: ServiceSlot,
    /// Run task of the current media activation.
    pub media_task: Option<JoinHandle<()>>,
    pub tunnel: ServiceSlot,
    pub stream_key: ServiceSlot,
    pub listeners: ListenerSet,
    pub edge_state: ServiceState,
    pub edge: Option<EdgeHandle>,
}

/// The coarse lock around [`SharedState`].
#[derive(Debug, Default)]
pub struct Shared {
    inner: Mutex<SharedState>,
}

impl Shared {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SharedState {
                title: title.into(),
                ..SharedState::default()
            }),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.inner.lock()
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.inner.lock().title.clone()
    }

    pub fn set_title(&self, title: String) {
        self.inner.lock().title = title;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_begin_is_exclusive() {
        let mut slot = ServiceSlot::default();
        let first = slot.begin().unwrap();
        assert_eq!(slot.state(), ServiceState::Starting);
        assert!(slot.begin().is_none());

        slot.mark_running(first.generation);
        assert_eq!(slot.state(), ServiceState::Running);
    }

    #[test]
    fn test_slot_cancel_fires_token_once() {
        let mut slot = ServiceSlot::default();
        let activation = slot.begin().unwrap();

        assert!(slot.cancel());
        assert!(activation.token.is_cancelled());
        assert_eq!(slot.state(), ServiceState::Stopping);
        assert!(!slot.cancel());
        assert!(!slot.cancel());
    }

    #[test]
    fn test_stale_finish_does_not_clobber_new_activation() {
        let mut slot = ServiceSlot::default();
        let old = slot.begin().unwrap();
        slot.cancel();
        let new = slot.begin().unwrap();
        slot.mark_running(new.generation);

        slot.finish(old.generation);
        assert!(slot.is_live());
        assert_eq!(slot.state(), ServiceState::Running);

        slot.finish(new.generation);
        assert!(!slot.is_live());
        assert_eq!(slot.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_finish_clears_token_of_self_terminated_task() {
        let mut slot = ServiceSlot::default();
        let activation = slot.begin().unwrap();
        slot.finish(activation.generation);
        assert!(!slot.is_live());
        assert!(slot.begin().is_some());
    }

    #[test]
    fn test_shared_title_replacement() {
        let shared = Shared::new("GoStream");
        assert_eq!(shared.title(), "GoStream");
        shared.set_title("Movie Night".to_string());
        assert_eq!(shared.title(), "Movie Night");
    }
}
