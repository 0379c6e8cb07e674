//! Client-side correlation: reply channels and the RPC client.
//!
//! Every in-flight call owns a single-use reply channel. The sender
//! half ([`ReplyTarget`]) travels with the request; whoever completes
//! the operation fulfils it exactly once. The receiver half
//! ([`CallChannel`]) is what the caller blocks on, with or without a
//! deadline. Fulfilling a channel nobody is waiting on is silently
//! discarded — late replies after a timeout land here.
//!
//! [`RpcClient`] drives remote calls over one connection: it assigns
//! monotonically increasing call ids, keeps a pending table from call
//! id to reply target, and runs a reader task that decodes inbound
//! reply frames and fulfils the matching entry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use quasar_wire::{HeapBuffer, XdrMarshaller, XdrUnmarshaller};

use crate::error::{CallError, ProtocolError};
use crate::except::GenericException;
use crate::frame::{FrameHeader, MAX_MESSAGE_SIZE};
use crate::message::{Call, Reply, Request, Response};
use crate::registry::{MessageKind, MessageRegistry};
use crate::transport::{read_frame, write_frame, Connection};

/// Creates a linked reply-target/call-channel pair for one call.
#[must_use]
pub fn reply_channel() -> (ReplyTarget, CallChannel) {
    let (tx, rx) = oneshot::channel();
    (ReplyTarget { tx }, CallChannel { rx })
}

/// Single-use sender half of a call's reply channel.
pub struct ReplyTarget {
    tx: oneshot::Sender<Reply>,
}

impl ReplyTarget {
    /// Delivers the reply, consuming the target.
    ///
    /// If the caller has already given up (timed out or dropped the
    /// channel), the reply is discarded.
    pub fn fulfil(self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            trace!("reply discarded: caller no longer waiting");
        }
    }
}

impl std::fmt::Debug for ReplyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTarget").finish_non_exhaustive()
    }
}

/// Receiver half of a call's reply channel.
pub struct CallChannel {
    rx: oneshot::Receiver<Reply>,
}

impl CallChannel {
    /// Waits indefinitely for the reply.
    ///
    /// An exception reply re-surfaces as [`CallError::Exception`]; the
    /// sender disappearing without a reply is [`CallError::ConnectionClosed`].
    pub async fn recv(self) -> Result<Box<dyn Response>, CallError> {
        match self.rx.await {
            Ok(reply) => reply.into_result(),
            Err(_) => Err(CallError::ConnectionClosed),
        }
    }

    /// Waits for the reply with a deadline.
    ///
    /// On timeout the channel is dropped, so a reply arriving later is
    /// discarded by its sender.
    pub async fn recv_timeout(self, timeout: Duration) -> Result<Box<dyn Response>, CallError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(CallError::ConnectionClosed),
            Err(_) => Err(CallError::Timeout),
        }
    }
}

type PendingTable = Arc<DashMap<u64, ReplyTarget>>;

/// Client side of one RPC connection.
///
/// Cheap to share behind an [`Arc`]; calls from any task interleave on
/// the single connection and replies find their callers by call id.
pub struct RpcClient {
    service_id: u16,
    registry: Arc<MessageRegistry>,
    writer: Mutex<WriteHalf<Box<dyn Connection>>>,
    pending: PendingTable,
    next_call_id: AtomicU64,
    default_timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Wraps an established connection.
    ///
    /// Spawns the reader task immediately; it runs until the connection
    /// closes or the client is dropped.
    #[must_use]
    pub fn new(
        connection: Box<dyn Connection>,
        registry: Arc<MessageRegistry>,
        service_id: u16,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(connection);
        let pending: PendingTable = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            service_id,
            registry,
            writer: Mutex::new(write_half),
            pending,
            next_call_id: AtomicU64::new(1),
            default_timeout: None,
            closed,
            reader,
        }
    }

    /// Sets the deadline applied by [`RpcClient::call`].
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// The registry this client decodes replies with.
    #[must_use]
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Issues a typed call and waits for its typed reply.
    ///
    /// Uses the default timeout if one is configured, otherwise waits
    /// indefinitely.
    pub async fn call<C: Call>(&self, request: C) -> Result<C::Reply, CallError> {
        self.call_inner(request, self.default_timeout).await
    }

    /// Issues a typed call with an explicit deadline.
    pub async fn call_with_timeout<C: Call>(
        &self,
        request: C,
        timeout: Duration,
    ) -> Result<C::Reply, CallError> {
        self.call_inner(request, Some(timeout)).await
    }

    async fn call_inner<C: Call>(
        &self,
        request: C,
        timeout: Option<Duration>,
    ) -> Result<C::Reply, CallError> {
        let response = self.call_dyn(Box::new(request), timeout).await?;
        let type_id = response.type_id();
        response
            .into_any()
            .downcast::<C::Reply>()
            .map(|reply| *reply)
            .map_err(|_| CallError::Protocol(ProtocolError::UnexpectedReplyType(type_id)))
    }

    /// Issues an untyped call and waits for its reply.
    pub async fn call_dyn(
        &self,
        request: Box<dyn Request>,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn Response>, CallError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);

        let mut marshaller = XdrMarshaller::new();
        request.marshal(&mut marshaller);
        let payload = marshaller.into_bytes();
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(CallError::Protocol(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            }));
        }

        let header = FrameHeader::new(
            self.service_id,
            request.type_id(),
            call_id,
            payload.len() as u32,
        );

        let (target, channel) = reply_channel();
        self.pending.insert(call_id, target);
        // The reader publishes `closed` before draining the table, so a
        // call racing its exit either observes the flag here or has its
        // target dropped by the drain; both surface ConnectionClosed.
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&call_id);
            return Err(CallError::ConnectionClosed);
        }
        debug!(call_id, type_id = request.type_id(), "call issued");

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &header, &payload).await {
                self.pending.remove(&call_id);
                return Err(CallError::Protocol(ProtocolError::Io(e)));
            }
        }

        let result = match timeout {
            Some(timeout) => channel.recv_timeout(timeout).await,
            None => channel.recv().await,
        };

        // A timed-out entry must not linger in the pending table; the
        // reader would otherwise fulfil a dead channel forever later.
        if matches!(result, Err(CallError::Timeout)) {
            self.pending.remove(&call_id);
        }

        result
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("service_id", &self.service_id)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Decodes inbound reply frames and fulfils their pending calls.
///
/// Exits when the connection closes or desynchronises; all calls still
/// pending at that point observe [`CallError::ConnectionClosed`], and
/// calls issued afterwards fail the same way instead of registering
/// with a table nobody drains.
async fn read_loop(
    mut reader: ReadHalf<Box<dyn Connection>>,
    registry: Arc<MessageRegistry>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
) {
    loop {
        let (header, payload) = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(error = %e, "reply stream failed");
                break;
            }
        };

        let Some((_, target)) = pending.remove(&header.call_id) else {
            trace!(call_id = header.call_id, "late or unknown reply discarded");
            continue;
        };

        target.fulfil(decode_reply(&registry, &header, payload));
    }

    // The store must precede the clear: a caller that misses the flag
    // inserted its target before the drain and gets woken by it.
    closed.store(true, Ordering::Release);
    // Dropping the targets wakes every remaining caller with
    // ConnectionClosed.
    pending.clear();
}

fn decode_reply(registry: &MessageRegistry, header: &FrameHeader, payload: Vec<u8>) -> Reply {
    let mut buffer = HeapBuffer::from_vec(payload);
    let mut unmarshaller = XdrUnmarshaller::new(&mut buffer);

    match registry.classify_id(header.type_id) {
        Some(MessageKind::Response) => {
            // Registered response ids always have a factory.
            let Some(mut response) = registry.create_response(header.type_id) else {
                return malform(header, "response factory missing");
            };
            match response.unmarshal(&mut unmarshaller) {
                Ok(()) => Reply::Response(response),
                Err(e) => malform(header, e),
            }
        }
        Some(MessageKind::Exception) => {
            let Some(mut exception) = registry.create_exception_response(header.type_id) else {
                return malform(header, "exception factory missing");
            };
            match exception.unmarshal(&mut unmarshaller) {
                Ok(()) => Reply::Exception(exception),
                Err(e) => malform(header, e),
            }
        }
        Some(MessageKind::Request) | None => malform(header, "not a reply type"),
    }
}

fn malform(header: &FrameHeader, detail: impl std::fmt::Display) -> Reply {
    warn!(
        call_id = header.call_id,
        type_id = header.type_id,
        %detail,
        "undecodable reply"
    );
    Reply::Exception(Box::new(GenericException::malformed(format!(
        "reply type {}: {detail}",
        header.type_id
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::except::ExceptionResponse;

    #[derive(Debug, Default)]
    struct Pong;

    impl quasar_wire::RttiObject for Pong {
        fn type_id(&self) -> u32 {
            6002
        }

        fn type_name(&self) -> &'static str {
            "Pong"
        }
    }

    impl quasar_wire::StructValue for Pong {
        fn marshal(&self, _marshaller: &mut dyn quasar_wire::Marshaller) {}

        fn unmarshal(
            &mut self,
            _unmarshaller: &mut dyn quasar_wire::Unmarshaller,
        ) -> Result<(), quasar_wire::WireError> {
            Ok(())
        }
    }

    impl Response for Pong {}

    #[tokio::test]
    async fn reply_channel_delivers_once() {
        let (target, channel) = reply_channel();
        target.fulfil(Reply::Response(Box::new(Pong)));
        let response = channel.recv().await.unwrap();
        assert_eq!(response.type_id(), 6002);
    }

    #[tokio::test]
    async fn dropped_target_closes_the_channel() {
        let (target, channel) = reply_channel();
        drop(target);
        assert!(matches!(
            channel.recv().await,
            Err(CallError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn timeout_leaves_late_fulfilment_harmless() {
        let (target, channel) = reply_channel();

        let result = channel.recv_timeout(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CallError::Timeout)));

        // The waiter is gone; fulfilment is a silent no-op.
        target.fulfil(Reply::Response(Box::new(Pong)));
    }

    #[tokio::test]
    async fn exception_reply_re_raises() {
        let (target, channel) = reply_channel();
        target.fulfil(Reply::Exception(Box::new(GenericException::internal(
            "no quorum",
        ))));

        match channel.recv().await {
            Err(CallError::Exception(e)) => assert_eq!(e.error_message(), "no quorum"),
            other => panic!("expected exception, got {other:?}"),
        }
    }
}
