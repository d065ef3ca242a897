//! Open listeners of the media engine

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SubServerKind;
use crate::state::Shared;

/// A bound listener, owned by the task serving it.
///
/// Closing aborts that task, which drops the socket. `released` must be
/// cancelled by whoever joins the task, once the join has returned.
#[derive(Debug)]
pub struct RegisteredListener {
    kind: SubServerKind,
    local_addr: SocketAddr,
    closer: AbortHandle,
    released: CancellationToken,
}

impl RegisteredListener {
    #[must_use]
    pub const fn new(
        kind: SubServerKind,
        local_addr: SocketAddr,
        closer: AbortHandle,
        released: CancellationToken,
    ) -> Self {
        Self {
            kind,
            local_addr,
            closer,
            released,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SubServerKind {
        self.kind
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Safe to call on a listener that has already stopped.
    pub fn close(&self) {
        self.closer.abort();
    }

    /// Resolves once the serving task is gone and the socket with it.
    pub async fn closed(&self) {
        self.released.cancelled().await;
    }
}

#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: Vec<RegisteredListener>,
}

impl ListenerSet {
    pub fn push(&mut self, listener: RegisteredListener) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    #[must_use]
    pub fn addrs(&self) -> Vec<(SubServerKind, SocketAddr)> {
        self.listeners
            .iter()
            .map(|l| (l.kind, l.local_addr))
            .collect()
    }

    /// Empty the set, handing back what it held.
    pub fn take(&mut self) -> Vec<RegisteredListener> {
        std::mem::take(&mut self.listeners)
    }
}

/// Tracks open listeners so they can be closed as a group.
#[derive(Debug, Clone)]
pub struct ListenerRegistry {
    shared: Arc<Shared>,
}

impl ListenerRegistry {
    #[must_use]
    pub const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Record a listener opened by the activation owning `owner`.
    ///
    /// If that activation was already cancelled the listener is closed on the
    /// spot instead, and `false` is returned.
    pub fn register(&self, listener: RegisteredListener, owner: &CancellationToken) -> bool {
        let mut state = self.shared.lock();
        if owner.is_cancelled() {
            drop(state);
            debug!(server = %listener.kind, "Activation already stopped, closing listener");
            listener.close();
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Close every registered listener and empty the registry.
    ///
    /// Returns once every socket has been released.
    pub async fn close_all(&self) -> usize {
        let listeners = self.shared.lock().listeners.take();
        for listener in &listeners {
            debug!(server = %listener.kind, addr = %listener.local_addr, "Closing listener");
            listener.close();
        }
        for listener in &listeners {
            listener.closed().await;
        }
        listeners.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock().listeners.is_empty()
    }

    #[must_use]
    pub fn addrs(&self) -> Vec<(SubServerKind, SocketAddr)> {
        self.shared.lock().listeners.addrs()
    }
}
