//! Server-side dispatch engine.
//!
//! [`Dispatcher`] owns one service: its message registry and a handler
//! per request type. An inbound frame flows decode → handle → encode,
//! and every path through that flow ends in exactly one reply:
//!
//! - registered request, successful handler: the paired response,
//! - handler reports a declared exception: that exception,
//! - handler reports an undeclared failure: a generic internal
//!   exception (the failure text stays server-side in the log),
//! - unregistered request type or undecodable payload: a generic
//!   exception, so the caller unblocks instead of waiting out a
//!   timeout,
//! - response too large to frame: a generic exception in its place.
//!
//! Only frames that cannot be answered at all — unreadable header,
//! wrong service, bad version — surface as [`ProtocolError`] to the
//! transport, which has no caller to answer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use quasar_wire::{HeapBuffer, StructValue, XdrMarshaller, XdrUnmarshaller};

use crate::call::ReplyTarget;
use crate::error::{HandlerError, ProtocolError};
use crate::except::GenericException;
use crate::frame::{FrameHeader, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::message::{Reply, Request, Response};
use crate::registry::MessageRegistry;

/// Implements one or more operations of a service.
///
/// Handlers run concurrently; implementations hold their own state
/// behind the usual sync primitives.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Performs the operation a request describes.
    ///
    /// The concrete request type is recovered with
    /// [`Message::as_any`](crate::message::Message::as_any); the
    /// dispatcher only routes by type identifier.
    async fn handle(&self, request: Box<dyn Request>) -> Result<Box<dyn Response>, HandlerError>;
}

/// A decoded request paired with where its reply must go.
///
/// Used for in-process dispatch, where the caller holds the other end
/// of the reply channel directly instead of a connection.
#[derive(Debug)]
pub struct RequestEnvelope {
    request: Box<dyn Request>,
    reply_target: ReplyTarget,
}

impl RequestEnvelope {
    /// Pairs a request with its reply target.
    #[must_use]
    pub fn new(request: Box<dyn Request>, reply_target: ReplyTarget) -> Self {
        Self {
            request,
            reply_target,
        }
    }

    /// The carried request.
    #[must_use]
    pub fn request(&self) -> &dyn Request {
        self.request.as_ref()
    }

    fn into_parts(self) -> (Box<dyn Request>, ReplyTarget) {
        (self.request, self.reply_target)
    }
}

/// Routes requests for one service to their handlers.
pub struct Dispatcher {
    service_id: u16,
    registry: Arc<MessageRegistry>,
    handlers: HashMap<u32, Box<dyn Handler>>,
}

impl Dispatcher {
    /// Creates a dispatcher for the given service.
    #[must_use]
    pub fn new(service_id: u16, registry: Arc<MessageRegistry>) -> Self {
        Self {
            service_id,
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Routes a request type to a handler.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register_handler(&mut self, request_type_id: u32, handler: impl Handler + 'static) {
        self.handlers.insert(request_type_id, Box::new(handler));
    }

    /// The service this dispatcher serves.
    #[must_use]
    pub fn service_id(&self) -> u16 {
        self.service_id
    }

    /// The registry requests are decoded against.
    #[must_use]
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Dispatches one raw frame, returning the encoded reply frame.
    ///
    /// `Err` means the frame could not be answered at all; anything
    /// answerable comes back as `Ok`, exceptions included.
    pub async fn dispatch_frame(&self, frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::InvalidFrameHeader(format!(
                "frame of {} bytes is shorter than the header",
                frame.len()
            )));
        }
        let header_bytes: [u8; FRAME_HEADER_SIZE] = frame[..FRAME_HEADER_SIZE]
            .try_into()
            .map_err(|_| ProtocolError::InvalidFrameHeader("header slice".to_owned()))?;
        let header = FrameHeader::decode(&header_bytes);
        self.dispatch_parts(&header, &frame[FRAME_HEADER_SIZE..]).await
    }

    /// Dispatches an already-split frame, returning the encoded reply.
    pub async fn dispatch_parts(
        &self,
        header: &FrameHeader,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        header.validate()?;
        if header.service_id != self.service_id {
            return Err(ProtocolError::UnknownService(header.service_id));
        }
        if payload.len() < header.payload_len as usize {
            return Err(ProtocolError::Wire(quasar_wire::WireError::Truncated {
                needed: header.payload_len as usize,
                available: payload.len(),
            }));
        }

        let reply = match self.decode_request(header, payload) {
            Ok(request) => self.invoke(request).await,
            Err(reply) => reply,
        };
        Ok(self.encode_reply(header.call_id, reply))
    }

    /// Dispatches an in-process request, fulfilling its reply target.
    pub async fn dispatch(&self, envelope: RequestEnvelope) {
        let (request, reply_target) = envelope.into_parts();
        reply_target.fulfil(self.invoke(request).await);
    }

    fn decode_request(
        &self,
        header: &FrameHeader,
        payload: &[u8],
    ) -> Result<Box<dyn Request>, Reply> {
        let Some(mut request) = self.registry.create_request(header.type_id) else {
            warn!(
                type_id = header.type_id,
                call_id = header.call_id,
                "request type not registered"
            );
            return Err(Reply::Exception(Box::new(
                GenericException::unknown_operation(header.type_id),
            )));
        };

        let mut buffer = HeapBuffer::from_vec(payload[..header.payload_len as usize].to_vec());
        let mut unmarshaller = XdrUnmarshaller::new(&mut buffer);
        if let Err(e) = request.unmarshal(&mut unmarshaller) {
            warn!(
                type_id = header.type_id,
                call_id = header.call_id,
                error = %e,
                "request payload failed to decode"
            );
            return Err(Reply::Exception(Box::new(GenericException::malformed(e))));
        }
        Ok(request)
    }

    async fn invoke(&self, request: Box<dyn Request>) -> Reply {
        let type_id = request.type_id();
        let Some(handler) = self.handlers.get(&type_id) else {
            // Registered in the registry but nobody serves it here.
            warn!(type_id, "no handler for request type");
            return Reply::Exception(Box::new(GenericException::unknown_operation(type_id)));
        };

        debug!(type_id, type_name = request.type_name(), "dispatching");
        match handler.handle(request).await {
            Ok(response) => Reply::Response(response),
            Err(HandlerError::Exception(exception)) => Reply::Exception(exception),
            Err(HandlerError::Internal(detail)) => {
                // The detail stays in the server log; the caller only
                // learns that the operation failed internally.
                warn!(type_id, %detail, "handler failed");
                Reply::Exception(Box::new(GenericException::internal("internal error")))
            }
        }
    }

    fn encode_reply(&self, call_id: u64, reply: Reply) -> Vec<u8> {
        let mut marshaller = XdrMarshaller::new();
        let mut type_id = match &reply {
            Reply::Response(response) => {
                response.marshal(&mut marshaller);
                response.type_id()
            }
            Reply::Exception(exception) => {
                exception.marshal(&mut marshaller);
                exception.type_id()
            }
        };
        let mut payload = marshaller.into_bytes();
        if payload.len() > MAX_MESSAGE_SIZE {
            // The response cannot travel, but the caller still gets an
            // answer instead of waiting out its timeout.
            warn!(
                call_id,
                type_id,
                size = payload.len(),
                "reply exceeds the frame limit"
            );
            let exception = GenericException::too_large(payload.len(), MAX_MESSAGE_SIZE);
            let mut marshaller = XdrMarshaller::new();
            exception.marshal(&mut marshaller);
            type_id = GenericException::TYPE_ID;
            payload = marshaller.into_bytes();
        }

        let header = FrameHeader::new(self.service_id, type_id, call_id, payload.len() as u32);
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(&payload);
        frame
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("service_id", &self.service_id)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
