//! Inbound frame routing.
//!
//! The dispatch table is keyed by the closed set of [`MessageKind`]s and is
//! fixed once the router is built. Nothing that goes wrong in here closes
//! the connection: bad frames are logged, counted and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use parley_core::wire::InboundFrame;
use parley_core::{Event, HandlerError, MessageKind, UserId};

use crate::handlers::HandlerContext;
use crate::metrics::{HANDLER_DURATION_SECONDS, WS_FRAMES_DROPPED_TOTAL};

/// Trait implemented by every message handler.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Validate, persist, and describe the result as an event.
    ///
    /// An `Err` means nothing was written and nothing is broadcast.
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError>;
}

/// Why a frame produced no event.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The frame is not a JSON object with a string `type`.
    #[error("malformed frame: {0}")]
    Malformed(HandlerError),

    /// The `type` tag is outside the supported set.
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// The handler refused or failed the request.
    #[error("{kind} rejected: {source}")]
    Rejected {
        /// Which handler ran.
        kind: MessageKind,
        /// What it reported.
        source: HandlerError,
    },
}

impl RouteError {
    /// Label for the dropped-frames counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownType(_) => "unknown_type",
            Self::Rejected { source, .. } => source.kind(),
        }
    }
}

/// Fixed map from message kind to handler.
pub struct MessageRouter {
    handlers: HashMap<MessageKind, Arc<dyn FrameHandler>>,
    ctx: HandlerContext,
}

impl MessageRouter {
    /// An empty router. Use [`with_default_handlers`](Self::with_default_handlers) in production.
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            handlers: HashMap::new(),
            ctx,
        }
    }

    /// A router with every built-in handler registered.
    pub fn with_default_handlers(ctx: HandlerContext) -> Self {
        let mut router = Self::new(ctx);
        crate::handlers::register_all(&mut router);
        router
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: MessageKind, handler: impl FrameHandler + 'static) {
        let _ = self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Decode one text frame and run its handler.
    #[instrument(skip_all, fields(user_id = %caller, message_type = tracing::field::Empty))]
    pub async fn route(&self, text: &str, caller: UserId) -> Result<Event, RouteError> {
        let result = self.route_inner(text, caller).await;
        match &result {
            Ok(event) => {
                debug!(event_type = %event.kind(), rule = event.audience().rule(), "frame handled");
            }
            Err(err) => {
                counter!(WS_FRAMES_DROPPED_TOTAL, "reason" => err.reason()).increment(1);
                match err {
                    RouteError::Rejected {
                        source: HandlerError::Persistence(_),
                        ..
                    } => warn!(error = %err, "frame dropped"),
                    RouteError::Rejected { .. } => info!(error = %err, "frame dropped"),
                    _ => debug!(error = %err, "frame dropped"),
                }
            }
        }
        result
    }

    async fn route_inner(&self, text: &str, caller: UserId) -> Result<Event, RouteError> {
        let frame = InboundFrame::parse(text).map_err(RouteError::Malformed)?;
        let _ = tracing::Span::current().record("message_type", frame.tag.as_str());

        let Some((kind, handler)) = MessageKind::from_tag(&frame.tag)
            .and_then(|kind| self.handlers.get(&kind).map(|h| (kind, h)))
        else {
            return Err(RouteError::UnknownType(frame.tag));
        };

        let start = Instant::now();
        let result = handler.handle(&frame, caller, &self.ctx).await;
        histogram!(HANDLER_DURATION_SECONDS, "type" => kind.tag()).record(start.elapsed().as_secs_f64());

        result.map_err(|source| RouteError::Rejected { kind, source })
    }
}
