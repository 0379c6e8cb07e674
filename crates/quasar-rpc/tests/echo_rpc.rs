//! End-to-end tests: typed calls over a real TCP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use quasar_rpc::{
    connect_tcp, CallError, Dispatcher, ErrorKind, ExceptionResponse, Handler, HandlerError,
    Listener, Message, MessageRegistry, RedirectException, Request, Response, RpcClient,
    RpcServer, TcpListener,
};
use quasar_wire::{Field, Marshaller, RttiObject, StructValue, Unmarshaller, WireError};

const SERVICE_ID: u16 = 7;

macro_rules! rpc_struct {
    ($name:ident, $type_id:expr, { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct $name {
            $($field: $ty),*
        }

        impl RttiObject for $name {
            fn type_id(&self) -> u32 {
                $type_id
            }

            fn type_name(&self) -> &'static str {
                stringify!($name)
            }
        }
    };
}

rpc_struct!(Echo, 1001, { text: String });
rpc_struct!(EchoResponse, 1002, { text: String });
rpc_struct!(Slow, 1003, { delay_ms: u64 });
rpc_struct!(SlowResponse, 1004, {});
rpc_struct!(Unrouted, 9999, {});

impl StructValue for Echo {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_str(Field::new("text", 1), &self.text);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.text = unmarshaller.read_string(Field::new("text", 1))?;
        Ok(())
    }
}

impl Request for Echo {
    fn response_type_id(&self) -> u32 {
        1002
    }
}

impl quasar_rpc::Call for Echo {
    type Reply = EchoResponse;
}

impl StructValue for EchoResponse {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_str(Field::new("text", 1), &self.text);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.text = unmarshaller.read_string(Field::new("text", 1))?;
        Ok(())
    }
}

impl Response for EchoResponse {}

impl StructValue for Slow {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_u64(Field::new("delay_ms", 1), self.delay_ms);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.delay_ms = unmarshaller.read_u64(Field::new("delay_ms", 1))?;
        Ok(())
    }
}

impl Request for Slow {
    fn response_type_id(&self) -> u32 {
        1004
    }
}

impl quasar_rpc::Call for Slow {
    type Reply = SlowResponse;
}

impl StructValue for SlowResponse {
    fn marshal(&self, _marshaller: &mut dyn Marshaller) {}

    fn unmarshal(&mut self, _unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        Ok(())
    }
}

impl Response for SlowResponse {}

impl StructValue for Unrouted {
    fn marshal(&self, _marshaller: &mut dyn Marshaller) {}

    fn unmarshal(&mut self, _unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        Ok(())
    }
}

impl Request for Unrouted {
    fn response_type_id(&self) -> u32 {
        1002
    }
}

struct EchoHandler {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, request: Box<dyn Request>) -> Result<Box<dyn Response>, HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let echo = request
            .as_any()
            .downcast_ref::<Echo>()
            .ok_or_else(|| HandlerError::Internal("wrong request type".to_owned()))?;
        Ok(Box::new(EchoResponse {
            text: echo.text.clone(),
        }))
    }
}

struct SlowHandler;

#[async_trait]
impl Handler for SlowHandler {
    async fn handle(&self, request: Box<dyn Request>) -> Result<Box<dyn Response>, HandlerError> {
        let slow = request
            .as_any()
            .downcast_ref::<Slow>()
            .ok_or_else(|| HandlerError::Internal("wrong request type".to_owned()))?;
        tokio::time::sleep(Duration::from_millis(slow.delay_ms)).await;
        Ok(Box::new(SlowResponse {}))
    }
}

struct RedirectHandler;

#[async_trait]
impl Handler for RedirectHandler {
    async fn handle(&self, _request: Box<dyn Request>) -> Result<Box<dyn Response>, HandlerError> {
        Err(HandlerError::Exception(Box::new(RedirectException::new(
            "replica-2", 32641,
        ))))
    }
}

fn build_registry() -> Arc<MessageRegistry> {
    Arc::new(
        MessageRegistry::builder()
            .register_call::<Echo>()
            .register_call::<Slow>()
            .finish(),
    )
}

struct TestService {
    client: RpcClient,
    echo_invocations: Arc<AtomicUsize>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn start_service(redirect_echo: bool) -> TestService {
    init_tracing();
    let registry = build_registry();
    let echo_invocations = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new(SERVICE_ID, Arc::clone(&registry));
    if redirect_echo {
        dispatcher.register_handler(1001, RedirectHandler);
    } else {
        dispatcher.register_handler(
            1001,
            EchoHandler {
                invocations: Arc::clone(&echo_invocations),
            },
        );
    }
    dispatcher.register_handler(1003, SlowHandler);

    let server = RpcServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(dispatcher))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());

    let connection = connect_tcp(addr).await.unwrap();
    TestService {
        client: RpcClient::new(connection, registry, SERVICE_ID)
            .with_default_timeout(Duration::from_secs(10)),
        echo_invocations,
    }
}

#[tokio::test]
async fn echo_roundtrip() {
    let service = start_service(false).await;

    let reply = service
        .client
        .call(Echo {
            text: "hello quasar".into(),
        })
        .await
        .unwrap();

    assert_eq!(reply.text, "hello quasar");
    assert_eq!(service.echo_invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_calls_correlate_by_call_id() {
    let service = start_service(false).await;
    let client = Arc::new(service.client);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            let text = format!("message-{i}");
            let reply = client.call(Echo { text: text.clone() }).await.unwrap();
            assert_eq!(reply.text, text);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(service.echo_invocations.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn unknown_operation_answers_instead_of_hanging() {
    let service = start_service(false).await;

    let result = service
        .client
        .call_dyn(Box::new(Unrouted::default()), Some(Duration::from_secs(5)))
        .await;

    match result {
        Err(CallError::Exception(e)) => {
            assert_eq!(e.error_code(), ErrorKind::UnknownOperation.as_u32());
        }
        other => panic!("expected unknown-operation exception, got {other:?}"),
    }

    // The echo handler never saw the frame.
    assert_eq!(service.echo_invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn redirect_exception_reaches_the_caller_typed() {
    let service = start_service(true).await;

    let result = service.client.call(Echo { text: "x".into() }).await;
    let error = result.unwrap_err();
    let exception = error.as_exception().expect("expected an exception");
    let redirect = exception
        .as_any()
        .downcast_ref::<RedirectException>()
        .expect("expected a redirect");
    assert_eq!(redirect.address, "replica-2");
    assert_eq!(redirect.port, 32641);
}

#[tokio::test]
async fn timed_out_call_leaves_the_connection_usable() {
    let service = start_service(false).await;

    let result = service
        .client
        .call_with_timeout(Slow { delay_ms: 30_000 }, Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(CallError::Timeout)));

    // The late reply is discarded by the reader; the connection keeps
    // serving subsequent calls.
    let reply = service
        .client
        .call(Echo {
            text: "still here".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.text, "still here");
}

#[tokio::test]
async fn calls_after_the_peer_hangs_up_fail_without_a_deadline() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept one connection and hang up immediately.
        let _ = listener.accept().await;
    });

    let connection = connect_tcp(addr).await.unwrap();
    let client = RpcClient::new(connection, build_registry(), SERVICE_ID);

    // Let the reader observe the hang-up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // No per-call deadline: the call must still come back.
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        client.call_dyn(Box::new(Echo { text: "?".into() }), None),
    )
    .await
    .expect("call must not block on a dead connection");
    assert!(matches!(result, Err(CallError::ConnectionClosed)));
}

#[tokio::test]
async fn calls_fail_fast_when_the_server_goes_away() {
    let registry = build_registry();
    let dispatcher = Arc::new(Dispatcher::new(SERVICE_ID, Arc::clone(&registry)));
    let server = RpcServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = server.cancellation_token();
    let server_task = tokio::spawn(server.serve());

    let connection = connect_tcp(addr).await.unwrap();
    let client = RpcClient::new(connection, registry, SERVICE_ID);

    cancel.cancel();
    server_task.await.unwrap();

    let result = client
        .call_with_timeout(Echo { text: "?".into() }, Duration::from_secs(5))
        .await;
    assert!(matches!(
        result,
        Err(CallError::ConnectionClosed) | Err(CallError::Timeout) | Err(CallError::Protocol(_))
    ));
}
