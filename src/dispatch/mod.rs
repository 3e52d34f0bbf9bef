//! Per-connection process dispatcher.
//!
//! The dispatcher drains the session's inbound queue in arrival order. It
//! starts a handler task for every request-initiating packet, routes
//! continuation packets to the handler owning their operation id and fans a
//! `Suspend` out to every handler before marking the session dead.
//!
//! ```text
//! Idle ──request──▶ Active ──suspend──▶ Draining ──handlers done──▶ Closed
//!  ▲                  │
//!  └──last handler────┘
//! ```

use std::{ops::ControlFlow, sync::Arc};

use tokio::select;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    handler::{self, HandlerContext, HandlerKind, HandlerLimits},
    metrics,
    packet::{ErrorCode, Packet, RequestType},
    queue::{PacketReceiver, packet_queue},
    session::Session,
    store::FileStore,
};

pub mod liveness;
mod registry;

pub use registry::{AlreadyActive, Registration, Registry};

/// Lifecycle of a session as seen by its dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// No handler is running.
    Idle,
    /// At least one handler is running.
    Active,
    /// A suspend was fanned out; waiting for handlers to finish.
    Draining,
    /// Every handler has finished.
    Closed,
}

/// Routes the packets of one session.
pub struct Dispatcher<'a> {
    session: &'a Session,
    registry: Registry,
    store: Arc<FileStore>,
    limits: HandlerLimits,
    tracker: TaskTracker,
    halted: Option<DispatchState>,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher for `session`.
    #[must_use]
    pub fn new(session: &'a Session, store: Arc<FileStore>, limits: HandlerLimits) -> Self {
        Self {
            session,
            registry: Registry::new(),
            store,
            limits,
            tracker: TaskTracker::new(),
            halted: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DispatchState {
        match self.halted {
            Some(state) => state,
            None if self.registry.is_empty() => DispatchState::Idle,
            None => DispatchState::Active,
        }
    }

    /// Operation ids of the running handlers.
    #[must_use]
    pub fn active_ids(&self) -> Vec<u8> { self.registry.active_ids() }

    /// Handle one inbound packet.
    ///
    /// Returns [`ControlFlow::Break`] with the suspend code once the session
    /// has been suspended; every running handler has been signalled by then.
    pub fn dispatch(&mut self, packet: Packet) -> ControlFlow<ErrorCode> {
        let request = packet.request_type();
        if request == RequestType::Suspend {
            let code = packet.suspend_code().unwrap_or(ErrorCode::Unknown);
            self.suspend(&packet, code);
            return ControlFlow::Break(code);
        }
        if let Some(kind) = HandlerKind::for_request(request) {
            self.start(kind, packet);
        } else if matches!(request, RequestType::File | RequestType::Error) {
            self.forward(packet);
        } else if request == RequestType::ConnectionCheck {
            debug!(connection = %self.session.id(), "connection check received");
        } else {
            debug!(
                connection = %self.session.id(),
                request = %request,
                operation_id = packet.operation_id(),
                "ignoring packet"
            );
        }
        ControlFlow::Continue(())
    }

    fn start(&mut self, kind: HandlerKind, packet: Packet) {
        let operation_id = packet.operation_id();
        let (inbox, rx) = packet_queue();
        let registration = match self.registry.register(operation_id, inbox.clone()) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(connection = %self.session.id(), kind = kind.as_str(), error = %e, "request refused");
                metrics::inc_errors("operation_in_use");
                let refusal = Packet::error(kind.request_type(), ErrorCode::InvalidPacket, operation_id);
                let _ = self.session.outbound().send(refusal);
                return;
            }
        };
        let _ = inbox.send(packet);
        let ctx = HandlerContext::new(
            operation_id,
            Arc::clone(&self.store),
            self.session.outbound().clone(),
            self.session.liveness().clone(),
            self.session.user().clone(),
            self.limits,
        );
        debug!(connection = %self.session.id(), kind = kind.as_str(), operation_id, "handler started");
        self.tracker.spawn(async move {
            let _registration = registration;
            handler::run(kind, ctx, rx).await;
        });
    }

    fn forward(&self, packet: Packet) {
        let operation_id = packet.operation_id();
        match self.registry.route(operation_id) {
            Some(inbox) => {
                let _ = inbox.send(packet);
            }
            None => debug!(
                connection = %self.session.id(),
                operation_id,
                request = %packet.request_type(),
                "dropping packet for unknown operation"
            ),
        }
    }

    fn suspend(&mut self, packet: &Packet, code: ErrorCode) {
        self.halted = Some(DispatchState::Draining);
        let signalled = self.registry.broadcast(packet);
        info!(
            connection = %self.session.id(),
            %code,
            handlers = signalled,
            "session suspended"
        );
        self.session.kill();
    }

    /// Wait for every handler to finish.
    pub async fn drain(&mut self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.halted = Some(DispatchState::Closed);
    }

    /// Dispatch packets from `inbox` until the session is suspended, then
    /// wait for the handlers to finish.
    ///
    /// When `shutdown` fires first the session is suspended with
    /// `ManualShutdown` and a farewell frame is requested. Returns the
    /// suspend code.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run(mut self, mut inbox: PacketReceiver, shutdown: CancellationToken) -> ErrorCode {
        let code = loop {
            let packet = select! {
                biased;

                () = shutdown.cancelled() => {
                    self.session.request_farewell(ErrorCode::ManualShutdown);
                    Packet::suspend(ErrorCode::ManualShutdown)
                }
                packet = inbox.recv() => {
                    packet.unwrap_or_else(|| Packet::suspend(ErrorCode::SocketClosed))
                }
            };
            if let ControlFlow::Break(code) = self.dispatch(packet) {
                break code;
            }
        };
        self.drain().await;
        debug!(connection = %self.session.id(), %code, "dispatcher closed");
        code
    }
}

#[cfg(test)]
mod tests;
