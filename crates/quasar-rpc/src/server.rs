//! Connection-serving loop around a dispatcher.
//!
//! [`RpcServer`] accepts connections from a [`Listener`], reads frames
//! off each one, and hands them to its [`Dispatcher`]. Each frame is
//! dispatched on its own task, so one slow operation does not stall the
//! connection; replies are serialised back through a shared writer.
//! Shutdown is cooperative through a [`CancellationToken`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::frame::FrameHeader;
use crate::transport::{read_frame, Connection, Listener, TcpListener};

/// Serves one dispatcher over a listener.
pub struct RpcServer {
    listener: Box<dyn Listener>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
}

impl RpcServer {
    /// Binds a TCP listener for the dispatcher.
    pub async fn bind(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::with_listener(Box::new(listener), dispatcher))
    }

    /// Serves over an existing listener.
    #[must_use]
    pub fn with_listener(listener: Box<dyn Listener>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            listener,
            dispatcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the accept loop until cancelled.
    ///
    /// Accept failures are logged and the loop continues; only
    /// cancellation ends it.
    pub async fn serve(self) {
        info!(
            service_id = self.dispatcher.service_id(),
            "server accepting connections"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(connection) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let cancel = self.cancel.clone();
                        tokio::spawn(serve_connection(connection, dispatcher, cancel));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        info!("server shutdown complete");
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Reads frames off one connection, dispatching each on its own task.
async fn serve_connection(
    connection: Box<dyn Connection>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    let (mut reader, writer) = tokio::io::split(connection);
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Some((header, payload))) => {
                let dispatcher = Arc::clone(&dispatcher);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    dispatch_one(&dispatcher, header, &payload, &writer).await;
                });
            }
            Ok(None) => {
                debug!("connection closed by peer");
                break;
            }
            Err(e) => {
                // The stream is desynchronised; nothing sensible can
                // follow a frame that failed this early.
                warn!(error = %e, "dropping connection");
                break;
            }
        }
    }
}

type SharedWriter = Mutex<tokio::io::WriteHalf<Box<dyn Connection>>>;

async fn dispatch_one(
    dispatcher: &Dispatcher,
    header: FrameHeader,
    payload: &[u8],
    writer: &SharedWriter,
) {
    match dispatcher.dispatch_parts(&header, payload).await {
        Ok(reply_frame) => {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_all(&reply_frame).await {
                warn!(call_id = header.call_id, error = %e, "failed to write reply");
                return;
            }
            if let Err(e) = writer.flush().await {
                warn!(call_id = header.call_id, error = %e, "failed to flush reply");
            }
        }
        Err(e) => {
            // Unanswerable frame; the caller will time out.
            error!(
                call_id = header.call_id,
                type_id = header.type_id,
                error = %e,
                "frame could not be answered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MessageRegistry;

    #[tokio::test]
    async fn cancellation_stops_the_accept_loop() {
        let registry = Arc::new(MessageRegistry::builder().finish());
        let dispatcher = Arc::new(Dispatcher::new(1, registry));
        let server = RpcServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
            .await
            .unwrap();

        let cancel = server.cancellation_token();
        let handle = tokio::spawn(server.serve());

        cancel.cancel();
        handle.await.unwrap();
    }
}
