//! Request handlers: one task per in-flight logical operation.
//!
//! A handler is started by the dispatcher when a request-initiating packet
//! arrives. It reads its own packets from a private queue, replies through
//! the session's outbound queue and ends with exactly one of: the success
//! sequence, a single `Error` packet, or a silent abort when the session is
//! suspended.

use std::{any::Any, io, sync::Arc};

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    metrics,
    packet::{ErrorCode, Packet, PayloadError, RequestType},
    panic::PanicMessage,
    queue::{PacketReceiver, PacketSender},
    session::UserIdentity,
    store::{FileStore, StoreError},
};

mod allocate;
mod download;
mod upload;

/// The three operations a client can start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// Stream a file to the client (`FileRequest`).
    Download,
    /// Receive a file from the client (`FileInfo`).
    Upload,
    /// Mint a new user id (`IdRequest`).
    Allocate,
}

impl HandlerKind {
    /// Handler started by `request`, if any.
    #[must_use]
    pub const fn for_request(request: RequestType) -> Option<Self> {
        match request {
            RequestType::FileRequest => Some(Self::Download),
            RequestType::FileInfo => Some(Self::Upload),
            RequestType::IdRequest => Some(Self::Allocate),
            _ => None,
        }
    }

    /// Request type echoed in this handler's `Error` packets.
    #[must_use]
    pub const fn request_type(self) -> RequestType {
        match self {
            Self::Download => RequestType::FileRequest,
            Self::Upload => RequestType::FileInfo,
            Self::Allocate => RequestType::IdRequest,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Allocate => "allocate",
        }
    }
}

/// Failures that end a single handler.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The file or target directory does not exist.
    #[error("file not found")]
    FileNotFound,
    /// The requested file has no content.
    #[error("file is empty")]
    EmptyFile,
    /// A request field is unacceptable.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// The packet sequence or a payload is malformed.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    /// No user id could be allocated.
    #[error("no more user ids")]
    NoMoreIds,
    /// Any other I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    /// The session was suspended or closed; nothing is reported.
    #[error("session suspended")]
    Suspended,
}

impl RequestError {
    /// Code reported to the peer, or `None` for a silent abort.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::FileNotFound => Some(ErrorCode::FileNotFound),
            Self::EmptyFile => Some(ErrorCode::EmptyFile),
            Self::Argument(_) => Some(ErrorCode::ArgumentError),
            Self::InvalidPacket(_) => Some(ErrorCode::InvalidPacket),
            Self::NoMoreIds => Some(ErrorCode::NoMoreId),
            Self::Io(_) => Some(ErrorCode::Unknown),
            Self::Suspended => None,
        }
    }
}

impl From<PayloadError> for RequestError {
    fn from(error: PayloadError) -> Self { Self::InvalidPacket(error.to_string()) }
}

impl From<StoreError> for RequestError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } | StoreError::UnsupportedKind(_) => Self::FileNotFound,
            StoreError::InvalidName { name } => Self::Argument(format!("file name {name:?}")),
            StoreError::TooLarge { len } => Self::Argument(format!("file of {len} bytes")),
            StoreError::NoMoreIds => Self::NoMoreIds,
            StoreError::Io(e) => Self::Io(e),
        }
    }
}

/// Size limits applied by handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerLimits {
    /// File bytes per download `File` packet.
    pub download_chunk: usize,
    /// Largest accepted upload.
    pub max_upload: usize,
}

/// Everything a handler needs from its session, cloned per handler.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    operation_id: u8,
    store: Arc<FileStore>,
    outbound: PacketSender,
    liveness: CancellationToken,
    user: UserIdentity,
    limits: HandlerLimits,
}

impl HandlerContext {
    /// Build a context for the handler owning `operation_id`.
    #[must_use]
    pub fn new(
        operation_id: u8,
        store: Arc<FileStore>,
        outbound: PacketSender,
        liveness: CancellationToken,
        user: UserIdentity,
        limits: HandlerLimits,
    ) -> Self {
        Self {
            operation_id,
            store,
            outbound,
            liveness,
            user,
            limits,
        }
    }

    /// Operation id stamped on every reply.
    #[must_use]
    pub const fn operation_id(&self) -> u8 { self.operation_id }

    /// Report whether the session is still alive.
    #[must_use]
    pub fn is_live(&self) -> bool { !self.liveness.is_cancelled() }

    /// Enqueue `packet` for the peer, stamped with this operation id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Suspended`] once the session has been torn
    /// down.
    pub fn send(&self, packet: Packet) -> Result<(), RequestError> {
        if !self.is_live() {
            return Err(RequestError::Suspended);
        }
        self.outbound
            .send(packet.with_operation_id(self.operation_id))
            .map_err(|_| RequestError::Suspended)
    }
}

/// Run the handler of `kind` to completion.
///
/// Errors are reported to the peer as one `Error` packet; suspends end the
/// handler silently. Panics are caught and logged so they never take the
/// connection down.
pub async fn run(kind: HandlerKind, ctx: HandlerContext, mut inbox: PacketReceiver) {
    let operation_id = ctx.operation_id();
    let outcome = std::panic::AssertUnwindSafe(execute(kind, &ctx, &mut inbox))
        .catch_unwind()
        .await;
    let label = match outcome {
        Ok(Ok(())) => {
            debug!(kind = kind.as_str(), operation_id, "handler finished");
            "ok"
        }
        Ok(Err(RequestError::Suspended)) => {
            debug!(kind = kind.as_str(), operation_id, "handler aborted by suspend");
            "aborted"
        }
        Ok(Err(e)) => {
            report(kind, &ctx, &e);
            "error"
        }
        Err(panic) => {
            log_panic(kind, operation_id, panic.as_ref());
            "panic"
        }
    };
    metrics::inc_handlers(kind.as_str(), label);
}

async fn execute(
    kind: HandlerKind,
    ctx: &HandlerContext,
    inbox: &mut PacketReceiver,
) -> Result<(), RequestError> {
    match kind {
        HandlerKind::Download => download::serve(ctx, inbox).await,
        HandlerKind::Upload => upload::receive(ctx, inbox).await,
        HandlerKind::Allocate => allocate::allocate(ctx, inbox).await,
    }
}

fn report(kind: HandlerKind, ctx: &HandlerContext, error: &RequestError) {
    let Some(code) = error.code() else { return };
    warn!(
        kind = kind.as_str(),
        operation_id = ctx.operation_id(),
        %code,
        %error,
        "request failed"
    );
    let packet = Packet::error(kind.request_type(), code, ctx.operation_id());
    if ctx.send(packet).is_err() {
        debug!(operation_id = ctx.operation_id(), "error reply dropped: session closed");
    }
}

fn log_panic(kind: HandlerKind, operation_id: u8, payload: &(dyn Any + Send)) {
    metrics::inc_panics();
    let panic = PanicMessage::new(payload);
    error!(kind = kind.as_str(), operation_id, %panic, "handler panicked");
}

/// Take the next packet addressed to this handler.
///
/// A `Suspend`, a peer `Error` or a closed queue all end the operation
/// silently.
async fn next_packet(inbox: &mut PacketReceiver) -> Result<Packet, RequestError> {
    match inbox.recv().await {
        Some(packet)
            if matches!(
                packet.request_type(),
                RequestType::Suspend | RequestType::Error
            ) =>
        {
            Err(RequestError::Suspended)
        }
        Some(packet) => Ok(packet),
        None => Err(RequestError::Suspended),
    }
}
