//! Client-side synchronization engine for real-time conversations.
//!
//! The engine keeps a host UI's view of conversations, messages and typing
//! presence converged with a chat server over two feeds: a persistent event
//! stream (push) and a request/response data-access layer (pull). Hosts drive
//! it with [`AppAction`]s and render from the [`AppUpdate`] stream; all
//! synchronization logic runs on a single internal actor thread.

pub mod actions;
pub mod backend;
pub mod bus;
mod core;
pub mod error;
pub mod logging;
pub mod state;
pub mod store;
pub mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::{Receiver, Sender};

use crate::core::SyncCore;
use crate::updates::CoreMsg;

pub use crate::actions::AppAction;
pub use crate::backend::{
    BackendError, ChatBackend, ConversationRecord, MessageQuery, MessageRecord,
};
pub use crate::bus::{BusEvent, BusIntent, EventTransport, TransportEvent, WireFrame};
pub use crate::core::config::EngineConfig;
pub use crate::error::SyncError;
pub use crate::state::{
    AppState, BusyState, ChatMessage, ConnectionStatus, ConversationSummary,
    ConversationViewState, MessageDeliveryState, MessageKind, MessageSummary, Participant,
    PresenceStatus,
};
pub use crate::updates::AppUpdate;

/// Callback surface for the host's update stream.
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, update: AppUpdate);
}

/// Host-facing handle. Cheap to share, safe to call from any thread: actions
/// are queued to the engine's actor loop and never block the caller.
///
/// The handle is expected to live for the lifetime of the host process.
pub struct ChatEngine {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatEngine {
    /// Starts the engine: spawns the actor loop, connects the event pump to
    /// `transport` and issues the initial conversation snapshot fetch against
    /// `backend`.
    pub fn new(
        local_user_id: impl Into<String>,
        config: EngineConfig,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn EventTransport>,
    ) -> Arc<Self> {
        logging::init();

        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let (update_tx, update_rx) = flume::unbounded::<AppUpdate>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        let local_user_id = local_user_id.into();
        let loop_tx = core_tx.clone();
        let loop_state = shared_state.clone();
        std::thread::spawn(move || {
            let mut core = SyncCore::new(
                update_tx,
                loop_tx,
                local_user_id,
                config,
                backend,
                transport,
                loop_state,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
            tracing::debug!("engine loop stopped");
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    /// Queues an action for the actor loop. Fire and forget.
    pub fn dispatch(&self, action: AppAction) {
        if self.core_tx.send(CoreMsg::Action(action)).is_err() {
            tracing::warn!("engine loop is gone, action dropped");
        }
    }

    /// Snapshot of the current state, for hosts that want to (re)render
    /// without replaying the update stream.
    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Forwards the update stream to `listener` on a dedicated thread. Only
    /// the first registration takes effect.
    pub fn listen_for_updates(&self, listener: Box<dyn UpdateListener>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("update listener already registered, ignoring");
            return;
        }
        let rx = self.update_rx.clone();
        std::thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                listener.on_update(update);
            }
            tracing::debug!("update stream closed");
        });
    }
}
