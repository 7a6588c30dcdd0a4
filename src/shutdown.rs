//! Process-wide shutdown, in two phases.
//!
//! 1. [`Shutdown::trigger`] asks every persistent socket to close. Sockets
//!    hold a [`SocketGuard`] so the caller can wait for them to be gone.
//! 2. [`Shutdown::close_listeners`] lets the HTTP listeners drain and stop.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct Shutdown {
    sockets: Arc<watch::Sender<bool>>,
    listeners: Arc<watch::Sender<bool>>,
    open_sockets: Arc<watch::Sender<usize>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sockets, _) = watch::channel(false);
        let (listeners, _) = watch::channel(false);
        let (open_sockets, _) = watch::channel(0);
        Self {
            sockets: Arc::new(sockets),
            listeners: Arc::new(listeners),
            open_sockets: Arc::new(open_sockets),
        }
    }

    /// Phase 1: persistent sockets close.
    pub fn trigger(&self) {
        self.sockets.send_replace(true);
    }

    /// Resolves once [`Shutdown::trigger`] has been called, including calls
    /// made before this future was created.
    pub async fn wait(&self) {
        wait_until_set(&self.sockets).await;
    }

    /// Registers an open socket until the guard is dropped.
    pub fn track_socket(&self) -> SocketGuard {
        self.open_sockets.send_modify(|n| *n += 1);
        SocketGuard {
            open_sockets: self.open_sockets.clone(),
        }
    }

    pub fn open_sockets(&self) -> usize {
        *self.open_sockets.borrow()
    }

    /// Resolves when no tracked socket is left.
    pub async fn sockets_closed(&self) {
        let mut rx = self.open_sockets.subscribe();
        // Err only if the sender is gone, and we hold it
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Phase 2: listeners stop accepting and drain.
    pub fn close_listeners(&self) {
        self.listeners.send_replace(true);
    }

    pub async fn listeners_closed(&self) {
        wait_until_set(&self.listeners).await;
    }
}

async fn wait_until_set(tx: &watch::Sender<bool>) {
    let mut rx = tx.subscribe();
    let _ = rx.wait_for(|set| *set).await;
}

#[derive(Debug)]
pub struct SocketGuard {
    open_sockets: Arc<watch::Sender<usize>>,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.open_sockets.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_returns_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.wait().await }
        });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn late_waiters_see_an_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn triggering_sockets_leaves_listeners_open() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let listeners = tokio::time::timeout(Duration::from_millis(50), shutdown.listeners_closed());
        assert!(listeners.await.is_err());

        shutdown.close_listeners();
        tokio::time::timeout(Duration::from_secs(1), shutdown.listeners_closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sockets_closed_waits_for_every_guard() {
        let shutdown = Shutdown::new();
        let first = shutdown.track_socket();
        let second = shutdown.track_socket();
        assert_eq!(shutdown.open_sockets(), 2);

        drop(first);
        let pending = tokio::time::timeout(Duration::from_millis(50), shutdown.sockets_closed());
        assert!(pending.await.is_err());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), shutdown.sockets_closed())
            .await
            .unwrap();
        assert_eq!(shutdown.open_sockets(), 0);
    }
}
