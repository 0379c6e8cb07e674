//! The message taxonomy: requests, responses and typed calls.
//!
//! Every RPC message is a [`StructValue`] with a stable numeric type
//! identifier, carried in frame headers so the receiving side can build
//! the right concrete type before decoding the payload. Requests and
//! responses are paired by identifier through the
//! [`MessageRegistry`](crate::registry::MessageRegistry); the [`Call`]
//! trait expresses that pairing in the type system for client-side use.

use std::any::Any;
use std::fmt;

use quasar_wire::{RttiObject, StructValue};

use crate::error::CallError;
use crate::except::ExceptionResponse;

/// Base trait for everything that travels as an RPC payload.
///
/// Blanket-implemented for every eligible structured value; concrete
/// message types only implement [`Request`] or [`Response`] on top.
pub trait Message: StructValue + fmt::Debug + Send + 'static {
    /// Borrows the message for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Consumes the message for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: StructValue + fmt::Debug + Send + 'static> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A message that initiates an operation and expects exactly one reply.
pub trait Request: Message {
    /// Type identifier of the paired success response.
    fn response_type_id(&self) -> u32;
}

/// A message that answers a request: either a success payload or an
/// exception (see [`ExceptionResponse`]).
pub trait Response: Message {}

/// A request/response pair declared together, for typed client calls.
///
/// `Default` bounds exist so registries and clients can construct blank
/// instances to decode into.
pub trait Call: Request + Default {
    /// The success reply type paired with this request.
    type Reply: Response + Default;
}

/// One reply to one request: success or exception.
#[derive(Debug)]
pub enum Reply {
    /// The operation succeeded.
    Response(Box<dyn Response>),
    /// The operation failed with a declared exception.
    Exception(Box<dyn ExceptionResponse>),
}

impl Reply {
    /// Type identifier of the carried payload.
    ///
    /// Called through the trait explicitly: with `Any` in scope, method
    /// syntax on the box would resolve to `Any::type_id` instead.
    #[must_use]
    pub fn type_id(&self) -> u32 {
        match self {
            Self::Response(r) => RttiObject::type_id(r.as_ref()),
            Self::Exception(e) => RttiObject::type_id(e.as_ref()),
        }
    }

    /// Converts the reply into a caller-facing result, re-raising a
    /// carried exception as [`CallError::Exception`].
    pub fn into_result(self) -> Result<Box<dyn Response>, CallError> {
        match self {
            Self::Response(r) => Ok(r),
            Self::Exception(e) => Err(CallError::Exception(e)),
        }
    }
}
