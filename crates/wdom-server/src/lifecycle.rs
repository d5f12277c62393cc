//! Connection lifecycle and auto-shutdown policy.
//!
//! ```text
//! IdleNoClients ──open──▶ IdleWithClients ──last close──▶ ShutdownPending
//!       ▲                     ▲    │                            │
//!       │                     └────┼────────open────────────────┤
//!       └──last close, auto-shutdown off                        │
//!                                                 grace elapsed ▼
//!                                                          Terminated
//! ```
//!
//! The grace period is measured from the most recent disconnect. At most
//! one timer is armed at a time; it re-checks the state when it wakes, so a
//! reconnect inside the grace window needs no cancellation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wdom_core::errors::SyncError;
use wdom_core::ids::ConnectionId;

use crate::adapter::ServerHandle;
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::ConnectionRegistry;

/// Where the document is in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// At least one browser is connected.
    IdleWithClients,
    /// Nobody is connected and no shutdown is scheduled.
    IdleNoClients,
    /// The last browser left; shutdown fires after the grace period.
    ShutdownPending,
    /// The server was closed. Terminal.
    Terminated,
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    last_disconnect: Option<Instant>,
    timer_armed: bool,
}

/// Tracks connects and disconnects and stops the server once it has been
/// unattended for the grace period.
#[derive(Debug)]
pub struct Lifecycle {
    registry: Arc<ConnectionRegistry>,
    auto_shutdown: bool,
    shutdown_wait: Duration,
    stop: CancellationToken,
    server: Mutex<Option<Arc<dyn ServerHandle>>>,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    /// Create the policy. `stop` is cancelled on termination.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        auto_shutdown: bool,
        shutdown_wait: Duration,
        stop: CancellationToken,
    ) -> Self {
        Self {
            registry,
            auto_shutdown,
            shutdown_wait,
            stop,
            server: Mutex::new(None),
            inner: Mutex::new(Inner {
                state: LifecycleState::IdleNoClients,
                last_disconnect: None,
                timer_armed: false,
            }),
        }
    }

    /// Handle used to close the listener on termination.
    pub fn attach_server(&self, handle: Arc<dyn ServerHandle>) {
        *self.server.lock() = Some(handle);
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Whether auto-shutdown already fired.
    pub fn is_terminated(&self) -> bool {
        self.state() == LifecycleState::Terminated
    }

    /// Register a newly opened connection.
    ///
    /// A pending shutdown is abandoned. After termination the connection is
    /// refused with [`SyncError::Terminated`].
    pub fn on_open(&self, connection: Arc<ClientConnection>) -> Result<(), SyncError> {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Terminated {
            return Err(SyncError::Terminated);
        }
        self.registry.register(connection)?;
        if inner.state == LifecycleState::ShutdownPending {
            debug!("client reconnected, shutdown abandoned");
        }
        inner.state = LifecycleState::IdleWithClients;
        Ok(())
    }

    /// Unregister a closed connection and, if it was the last one, schedule
    /// the shutdown.
    pub fn on_close(self: &Arc<Self>, connection_id: &ConnectionId) {
        let mut inner = self.inner.lock();
        let _ = self.registry.unregister(connection_id);
        if inner.state == LifecycleState::Terminated || self.registry.any_connected() {
            return;
        }
        if !self.auto_shutdown {
            inner.state = LifecycleState::IdleNoClients;
            return;
        }

        inner.state = LifecycleState::ShutdownPending;
        inner.last_disconnect = Some(Instant::now());
        if !inner.timer_armed {
            inner.timer_armed = true;
            info!(grace = ?self.shutdown_wait, "last client disconnected, shutdown scheduled");
            let _ = tokio::spawn(Arc::clone(self).shutdown_timer());
        }
    }

    async fn shutdown_timer(self: Arc<Self>) {
        loop {
            let deadline = {
                let mut inner = self.inner.lock();
                let Some(last) = inner.last_disconnect else {
                    inner.timer_armed = false;
                    return;
                };
                last + self.shutdown_wait
            };

            tokio::select! {
                () = self.stop.cancelled() => {
                    self.inner.lock().timer_armed = false;
                    return;
                }
                () = tokio::time::sleep_until(deadline) => {}
            }

            let mut inner = self.inner.lock();
            if inner.state != LifecycleState::ShutdownPending || self.registry.any_connected() {
                inner.timer_armed = false;
                return;
            }
            // A later disconnect pushed the deadline out.
            if inner
                .last_disconnect
                .is_some_and(|last| last + self.shutdown_wait > Instant::now())
            {
                continue;
            }
            inner.state = LifecycleState::Terminated;
            inner.timer_armed = false;
            drop(inner);
            self.terminate();
            return;
        }
    }

    fn terminate(&self) {
        info!("no clients reconnected within grace period, terminating");
        match self.server.lock().as_ref() {
            Some(handle) => handle.close(),
            None => warn!("no server handle attached at termination"),
        }
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct RecordingHandle {
        closes: AtomicUsize,
    }

    impl ServerHandle for RecordingHandle {
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 0))
        }

        fn close(&self) {
            let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    struct Fixture {
        lifecycle: Arc<Lifecycle>,
        handle: Arc<RecordingHandle>,
        stop: CancellationToken,
    }

    impl Fixture {
        fn new(auto_shutdown: bool, wait_ms: u64) -> Self {
            let stop = CancellationToken::new();
            let lifecycle = Arc::new(Lifecycle::new(
                Arc::new(ConnectionRegistry::new()),
                auto_shutdown,
                Duration::from_millis(wait_ms),
                stop.clone(),
            ));
            let handle = Arc::new(RecordingHandle::default());
            lifecycle.attach_server(handle.clone());
            Self {
                lifecycle,
                handle,
                stop,
            }
        }

        fn open(&self) -> ConnectionId {
            let (conn, _rx) = ClientConnection::channel(4);
            let id = conn.id.clone();
            self.lifecycle.on_open(conn).unwrap();
            id
        }

        fn closes(&self) -> usize {
            self.handle.closes.load(Ordering::SeqCst)
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn last_close_terminates_after_grace_period() {
        let fx = Fixture::new(true, 50);
        let id = fx.open();
        assert_eq!(fx.lifecycle.state(), LifecycleState::IdleWithClients);

        fx.lifecycle.on_close(&id);
        assert_eq!(fx.lifecycle.state(), LifecycleState::ShutdownPending);

        sleep_ms(49).await;
        assert_eq!(fx.closes(), 0);
        assert!(!fx.stop.is_cancelled());

        sleep_ms(2).await;
        assert_eq!(fx.closes(), 1);
        assert!(fx.lifecycle.is_terminated());
        assert!(fx.stop.is_cancelled());

        sleep_ms(500).await;
        assert_eq!(fx.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_cancels_shutdown() {
        let fx = Fixture::new(true, 50);
        let id = fx.open();
        fx.lifecycle.on_close(&id);

        sleep_ms(20).await;
        let _second = fx.open();
        assert_eq!(fx.lifecycle.state(), LifecycleState::IdleWithClients);

        sleep_ms(200).await;
        assert_eq!(fx.closes(), 0);
        assert_eq!(fx.lifecycle.state(), LifecycleState::IdleWithClients);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_is_measured_from_latest_disconnect() {
        let fx = Fixture::new(true, 50);
        let first = fx.open();
        fx.lifecycle.on_close(&first);

        sleep_ms(20).await;
        let second = fx.open();
        sleep_ms(10).await;
        fx.lifecycle.on_close(&second);

        // Original deadline (t=50) passes without effect.
        sleep_ms(40).await;
        assert_eq!(fx.closes(), 0);
        assert_eq!(fx.lifecycle.state(), LifecycleState::ShutdownPending);

        // New deadline is t=80.
        sleep_ms(15).await;
        assert_eq!(fx.closes(), 1);
        assert!(fx.lifecycle.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn close_with_other_clients_schedules_nothing() {
        let fx = Fixture::new(true, 50);
        let a = fx.open();
        let _b = fx.open();
        fx.lifecycle.on_close(&a);
        assert_eq!(fx.lifecycle.state(), LifecycleState::IdleWithClients);

        sleep_ms(200).await;
        assert_eq!(fx.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_shutdown_off_goes_idle() {
        let fx = Fixture::new(false, 50);
        let id = fx.open();
        fx.lifecycle.on_close(&id);
        assert_eq!(fx.lifecycle.state(), LifecycleState::IdleNoClients);

        sleep_ms(1_000).await;
        assert_eq!(fx.closes(), 0);
        assert!(!fx.stop.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn open_after_termination_is_refused() {
        let fx = Fixture::new(true, 10);
        let id = fx.open();
        fx.lifecycle.on_close(&id);
        sleep_ms(20).await;
        assert!(fx.lifecycle.is_terminated());

        let (conn, _rx) = ClientConnection::channel(4);
        assert_matches!(fx.lifecycle.on_open(conn), Err(SyncError::Terminated));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_close_of_same_connection_is_harmless() {
        let fx = Fixture::new(true, 50);
        let id = fx.open();
        fx.lifecycle.on_close(&id);
        fx.lifecycle.on_close(&id);
        sleep_ms(60).await;
        assert_eq!(fx.closes(), 1);
    }

    #[tokio::test]
    async fn duplicate_open_is_rejected() {
        let fx = Fixture::new(false, 50);
        let (conn, _rx) = ClientConnection::channel(4);
        fx.lifecycle.on_open(Arc::clone(&conn)).unwrap();
        assert_matches!(
            fx.lifecycle.on_open(conn),
            Err(SyncError::DuplicateConnection { .. })
        );
    }
}
