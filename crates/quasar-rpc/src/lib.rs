//! RPC runtime for the Quasar distributed file system.
//!
//! The runtime moves typed messages between services over framed byte
//! streams:
//!
//! ```text
//! caller ──> RpcClient ──frame──> RpcServer ──> Dispatcher ──> Handler
//!    ^                                                            │
//!    └────────────── reply (response or exception) <──────────────┘
//! ```
//!
//! - [`message`]: the request/response taxonomy and the [`Call`] pairing,
//! - [`except`]: exception responses and runtime error codes,
//! - [`registry`]: per-service factories keyed by numeric type id,
//! - [`frame`]: the 20-byte frame header,
//! - [`dispatch`]: decode → handle → encode, one reply per request,
//! - [`call`]: reply channels, call-id correlation and [`RpcClient`],
//! - [`transport`]: connection traits, TCP and in-memory transports,
//! - [`server`]: the accept/serve loop with cooperative shutdown,
//! - [`config`]: TOML endpoint configuration.
//!
//! Payload bytes are XDR, via [`quasar_wire`]; type identity travels in
//! the frame header, never in the payload.

pub mod call;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod except;
pub mod frame;
pub mod message;
pub mod registry;
pub mod server;
pub mod transport;

pub use call::{reply_channel, CallChannel, ReplyTarget, RpcClient};
pub use config::{ConfigError, RpcConfig};
pub use dispatch::{Dispatcher, Handler, RequestEnvelope};
pub use error::{CallError, HandlerError, ProtocolError, TransportError};
pub use except::{
    ConcurrentModificationException, ErrorKind, ExceptionResponse, GenericException,
    RedirectException,
};
pub use frame::{FrameHeader, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use message::{Call, Message, Reply, Request, Response};
pub use registry::{MessageKind, MessageRegistry, MessageRegistryBuilder};
pub use server::RpcServer;
pub use transport::{connect_tcp, memory_pair, Connection, Listener, TcpListener};
