//! Per-service message registry.
//!
//! Maps numeric type identifiers to factories producing blank message
//! instances for the decoder to fill in, and records which response
//! type answers which request. The registry is immutable after
//! construction and shared behind an [`Arc`](std::sync::Arc); lookup of
//! an unknown identifier returns `None` and is never an error here —
//! callers decide how to react.
//!
//! [`MessageRegistryBuilder::register_call`] registers a request and
//! its paired response together, so the pairing cannot drift: the
//! association is taken from the [`Call`] declaration, not repeated at
//! registration time.

use std::collections::HashMap;

use crate::except::{
    ConcurrentModificationException, ExceptionResponse, GenericException, RedirectException,
};
use crate::message::{Call, Message, Request, Response};

/// Classification of a type identifier within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Identifier names a registered request type.
    Request,
    /// Identifier names a registered success response type.
    Response,
    /// Identifier names a registered exception type.
    Exception,
}

struct RequestEntry {
    factory: fn() -> Box<dyn Request>,
    response_type_id: u32,
}

/// Immutable factory table for one service's message types.
pub struct MessageRegistry {
    requests: HashMap<u32, RequestEntry>,
    responses: HashMap<u32, fn() -> Box<dyn Response>>,
    exceptions: HashMap<u32, fn() -> Box<dyn ExceptionResponse>>,
}

impl MessageRegistry {
    /// Starts building a registry.
    ///
    /// The runtime's own exception types are pre-registered.
    #[must_use]
    pub fn builder() -> MessageRegistryBuilder {
        MessageRegistryBuilder::new()
    }

    /// Creates a blank request for the identifier, if registered.
    #[must_use]
    pub fn create_request(&self, type_id: u32) -> Option<Box<dyn Request>> {
        self.requests.get(&type_id).map(|entry| (entry.factory)())
    }

    /// Creates a blank success response for the identifier, if registered.
    #[must_use]
    pub fn create_response(&self, type_id: u32) -> Option<Box<dyn Response>> {
        self.responses.get(&type_id).map(|factory| factory())
    }

    /// Creates a blank exception for the identifier, if registered.
    #[must_use]
    pub fn create_exception_response(&self, type_id: u32) -> Option<Box<dyn ExceptionResponse>> {
        self.exceptions.get(&type_id).map(|factory| factory())
    }

    /// Identifier of the response paired with the given request type.
    #[must_use]
    pub fn response_type_id(&self, request_type_id: u32) -> Option<u32> {
        self.requests
            .get(&request_type_id)
            .map(|entry| entry.response_type_id)
    }

    /// Classifies an identifier, or `None` when it is not registered.
    #[must_use]
    pub fn classify_id(&self, type_id: u32) -> Option<MessageKind> {
        if self.requests.contains_key(&type_id) {
            Some(MessageKind::Request)
        } else if self.responses.contains_key(&type_id) {
            Some(MessageKind::Response)
        } else if self.exceptions.contains_key(&type_id) {
            Some(MessageKind::Exception)
        } else {
            None
        }
    }

    /// Classifies a message instance by its type identifier.
    #[must_use]
    pub fn classify(&self, message: &dyn Message) -> Option<MessageKind> {
        self.classify_id(message.type_id())
    }

    /// True when the identifier is registered in any role.
    #[must_use]
    pub fn contains(&self, type_id: u32) -> bool {
        self.classify_id(type_id).is_some()
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("requests", &self.requests.len())
            .field("responses", &self.responses.len())
            .field("exceptions", &self.exceptions.len())
            .finish()
    }
}

/// Builder for [`MessageRegistry`].
pub struct MessageRegistryBuilder {
    registry: MessageRegistry,
}

impl MessageRegistryBuilder {
    /// Creates a builder with the runtime exceptions pre-registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: MessageRegistry {
                requests: HashMap::new(),
                responses: HashMap::new(),
                exceptions: HashMap::new(),
            },
        }
        .register_exception::<GenericException>()
        .register_exception::<RedirectException>()
        .register_exception::<ConcurrentModificationException>()
    }

    /// Registers a request/response pair from its [`Call`] declaration.
    ///
    /// Panics on a duplicate type identifier; identifiers are assigned
    /// statically per service and a collision is a build-time bug.
    #[must_use]
    pub fn register_call<C: Call>(mut self) -> Self {
        let probe = C::default();
        let request_type_id = probe.type_id();
        let response_type_id = probe.response_type_id();

        let request_factory: fn() -> Box<dyn Request> = || Box::new(C::default());
        let response_factory: fn() -> Box<dyn Response> = || Box::new(C::Reply::default());

        let previous = self.registry.requests.insert(
            request_type_id,
            RequestEntry {
                factory: request_factory,
                response_type_id,
            },
        );
        assert!(
            previous.is_none(),
            "duplicate request type id {request_type_id}"
        );

        let previous = self
            .registry
            .responses
            .insert(response_type_id, response_factory);
        assert!(
            previous.is_none(),
            "duplicate response type id {response_type_id}"
        );

        self
    }

    /// Registers an exception type.
    ///
    /// Panics on a duplicate type identifier.
    #[must_use]
    pub fn register_exception<E: ExceptionResponse + Default>(mut self) -> Self {
        let type_id = E::default().type_id();
        let factory: fn() -> Box<dyn ExceptionResponse> = || Box::new(E::default());

        let previous = self.registry.exceptions.insert(type_id, factory);
        assert!(previous.is_none(), "duplicate exception type id {type_id}");

        self
    }

    /// Finishes the registry.
    #[must_use]
    pub fn finish(self) -> MessageRegistry {
        self.registry
    }
}

impl Default for MessageRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_wire::{Field, Marshaller, RttiObject, StructValue, Unmarshaller, WireError};

    #[derive(Debug, Default)]
    struct Stat {
        path: String,
    }

    impl RttiObject for Stat {
        fn type_id(&self) -> u32 {
            2001
        }

        fn type_name(&self) -> &'static str {
            "Stat"
        }
    }

    impl StructValue for Stat {
        fn marshal(&self, marshaller: &mut dyn Marshaller) {
            marshaller.write_str(Field::new("path", 1), &self.path);
        }

        fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
            self.path = unmarshaller.read_string(Field::new("path", 1))?;
            Ok(())
        }
    }

    impl Request for Stat {
        fn response_type_id(&self) -> u32 {
            2002
        }
    }

    #[derive(Debug, Default)]
    struct StatResponse {
        size_bytes: u64,
    }

    impl RttiObject for StatResponse {
        fn type_id(&self) -> u32 {
            2002
        }

        fn type_name(&self) -> &'static str {
            "StatResponse"
        }
    }

    impl StructValue for StatResponse {
        fn marshal(&self, marshaller: &mut dyn Marshaller) {
            marshaller.write_u64(Field::new("size_bytes", 1), self.size_bytes);
        }

        fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
            self.size_bytes = unmarshaller.read_u64(Field::new("size_bytes", 1))?;
            Ok(())
        }
    }

    impl Response for StatResponse {}

    impl Call for Stat {
        type Reply = StatResponse;
    }

    #[test]
    fn registered_call_creates_both_sides() {
        let registry = MessageRegistry::builder().register_call::<Stat>().finish();

        let request = registry.create_request(2001).unwrap();
        assert_eq!(request.type_name(), "Stat");
        assert_eq!(request.response_type_id(), 2002);

        let response = registry.create_response(2002).unwrap();
        assert_eq!(response.type_name(), "StatResponse");

        assert_eq!(registry.response_type_id(2001), Some(2002));
    }

    #[test]
    fn unknown_id_fails_closed() {
        let registry = MessageRegistry::builder().register_call::<Stat>().finish();

        assert!(registry.create_request(9999).is_none());
        assert!(registry.create_response(9999).is_none());
        assert!(registry.create_exception_response(9999).is_none());
        assert_eq!(registry.classify_id(9999), None);
        assert!(!registry.contains(9999));
    }

    #[test]
    fn runtime_exceptions_are_pre_registered() {
        let registry = MessageRegistry::builder().finish();

        let exception = registry
            .create_exception_response(GenericException::TYPE_ID)
            .unwrap();
        assert_eq!(exception.type_name(), "GenericException");

        assert!(registry.contains(RedirectException::TYPE_ID));
        assert_eq!(
            registry.classify_id(ConcurrentModificationException::TYPE_ID),
            Some(MessageKind::Exception)
        );
    }

    #[test]
    fn classify_distinguishes_roles() {
        let registry = MessageRegistry::builder().register_call::<Stat>().finish();

        assert_eq!(registry.classify_id(2001), Some(MessageKind::Request));
        assert_eq!(registry.classify_id(2002), Some(MessageKind::Response));
        assert_eq!(
            registry.classify(&Stat::default()),
            Some(MessageKind::Request)
        );
    }
}
