//! Shared application state handed to every adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use asrg_core::GatewayConfig;
use asrg_scheduler::MicroBatchScheduler;

/// Shared state for both the WebSocket and gRPC listeners: the resolved
/// configuration, the scheduler handle, and a shared active-session counter
/// used for connection admission (spec §4.6 layer 1).
pub struct GatewayState {
    /// Validated configuration, immutable after startup.
    pub config: Arc<GatewayConfig>,
    /// The single scheduler shared by every session across both adapters.
    pub scheduler: Arc<MicroBatchScheduler>,
    active_sessions: AtomicUsize,
}

impl GatewayState {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>, scheduler: Arc<MicroBatchScheduler>) -> Self {
        Self {
            config,
            scheduler,
            active_sessions: AtomicUsize::new(0),
        }
    }

    /// Attempt to admit a new connection. Returns `false` (and admits
    /// nothing) if `max_active` sessions are already open.
    #[must_use]
    pub fn try_admit(&self) -> bool {
        loop {
            let current = self.active_sessions.load(Ordering::Acquire);
            if current >= self.config.max_active {
                return false;
            }
            if self
                .active_sessions
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Release a previously admitted connection's slot.
    pub fn release(&self) {
        self.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }
}

/// Shared, reference-counted application state, mirroring the teacher's
/// `Arc<Context>` `AppState` convention.
pub type AppState = Arc<GatewayState>;

/// RAII guard that releases an admitted connection slot on drop, so every
/// early-return path in a handler still frees it — including a handler
/// task that outlives the function which admitted it.
pub struct AdmissionGuard {
    state: AppState,
}

impl AdmissionGuard {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.state.release();
    }
}
