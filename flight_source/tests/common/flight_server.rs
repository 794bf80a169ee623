use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::IpcWriteOptions;
use arrow::record_batch::RecordBatch;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaAsIpc, SchemaResult, Ticket,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};

type TonicStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// What the test server serves and which credentials it demands.
#[derive(Clone)]
pub struct ServerConfig {
    pub schema: SchemaRef,
    /// One entry per partition; the ticket of partition `i` is `part-{i}`.
    pub partitions: Vec<Vec<RecordBatch>>,
    /// Number of batches sent before every `DoGet` stream fails.
    pub fail_after: Option<usize>,
    /// Credentials accepted by `Handshake`.
    pub basic_credentials: Option<(String, String)>,
    /// Bearer token required on data calls, also handed out by `Handshake`.
    pub required_bearer: Option<String>,
    /// Serve over TLS instead of cleartext.
    pub tls: Option<ServerTls>,
}

/// Server identity and, for mutual TLS, the CA that client certificates must
/// chain to.
#[derive(Clone)]
pub struct ServerTls {
    certificate: String,
    key: String,
    client_ca: Option<String>,
}

impl ServerTls {
    pub fn new(certificate: &str, key: &str) -> Self {
        ServerTls {
            certificate: certificate.to_string(),
            key: key.to_string(),
            client_ca: None,
        }
    }

    pub fn requiring_client_certificate(mut self, client_ca: &str) -> Self {
        self.client_ca = Some(client_ca.to_string());
        self
    }

    fn config(&self) -> ServerTlsConfig {
        let config =
            ServerTlsConfig::new().identity(Identity::from_pem(&self.certificate, &self.key));
        match &self.client_ca {
            Some(client_ca) => config.client_ca_root(Certificate::from_pem(client_ca)),
            None => config,
        }
    }
}

impl ServerConfig {
    pub fn new(schema: SchemaRef, partitions: Vec<Vec<RecordBatch>>) -> Self {
        ServerConfig {
            schema,
            partitions,
            fail_after: None,
            basic_credentials: None,
            required_bearer: None,
            tls: None,
        }
    }
}

/// `authorization` values seen by the server, per call name.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, Vec<String>)>>>);

impl CallLog {
    fn record(&self, call: &str, request_metadata: &tonic::metadata::MetadataMap) {
        let values = request_metadata
            .get_all("authorization")
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect();
        self.0.lock().unwrap().push((call.to_string(), values));
    }

    pub fn authorization_for(&self, call: &str) -> Vec<Vec<String>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == call)
            .map(|(_, values)| values.clone())
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.authorization_for(call).len()
    }
}

#[derive(Clone)]
struct TestFlightService {
    config: Arc<ServerConfig>,
    tickets: Arc<HashMap<Vec<u8>, usize>>,
    uri: String,
    calls: CallLog,
}

impl TestFlightService {
    fn check_bearer<T>(&self, call: &str, request: &Request<T>) -> Result<(), Status> {
        self.calls.record(call, request.metadata());
        let Some(token) = &self.config.required_bearer else {
            return Ok(());
        };
        let expected = format!("Bearer {token}");
        let presented = request
            .metadata()
            .get_all("authorization")
            .iter()
            .any(|value| value.to_str().is_ok_and(|value| value == expected));
        if presented {
            Ok(())
        } else {
            Err(Status::unauthenticated("missing or invalid bearer token"))
        }
    }
}

#[tonic::async_trait]
impl FlightService for TestFlightService {
    type HandshakeStream = TonicStream<HandshakeResponse>;
    type ListFlightsStream = TonicStream<FlightInfo>;
    type DoGetStream = TonicStream<FlightData>;
    type DoPutStream = TonicStream<PutResult>;
    type DoActionStream = TonicStream<arrow_flight::Result>;
    type ListActionsStream = TonicStream<ActionType>;
    type DoExchangeStream = TonicStream<FlightData>;

    async fn handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        self.calls.record("handshake", request.metadata());
        let Some((username, password)) = &self.config.basic_credentials else {
            return Err(Status::unimplemented("handshake"));
        };
        let expected = format!("Basic {}", BASE64.encode(format!("{username}:{password}")));
        let accepted = request
            .metadata()
            .get("authorization")
            .is_some_and(|value| value.to_str().is_ok_and(|value| value == expected));
        if !accepted {
            return Err(Status::unauthenticated("invalid username or password"));
        }

        let output: Self::HandshakeStream =
            Box::pin(futures::stream::iter(vec![Ok(HandshakeResponse::default())]));
        let mut response = Response::new(output);
        if let Some(token) = &self.config.required_bearer {
            response
                .metadata_mut()
                .insert("authorization", format!("Bearer {token}").parse().unwrap());
        }
        Ok(response)
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        Err(Status::unimplemented("list_flights"))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_bearer("get_flight_info", &request)?;
        let descriptor = request.into_inner();
        let mut info = FlightInfo::new()
            .try_with_schema(&self.config.schema)
            .map_err(|e| Status::internal(e.to_string()))?
            .with_descriptor(descriptor);
        for index in 0..self.config.partitions.len() {
            info = info.with_endpoint(
                FlightEndpoint::new()
                    .with_ticket(Ticket::new(format!("part-{index}")))
                    .with_location(self.uri.clone()),
            );
        }
        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        self.check_bearer("get_schema", &request)?;
        let result: SchemaResult =
            SchemaAsIpc::new(&self.config.schema, &IpcWriteOptions::default())
                .try_into()
                .map_err(|e: arrow::error::ArrowError| Status::internal(e.to_string()))?;
        Ok(Response::new(result))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        self.check_bearer("do_get", &request)?;
        let ticket = request.into_inner();
        let index = self
            .tickets
            .get(ticket.ticket.as_ref())
            .copied()
            .ok_or_else(|| Status::not_found("unknown ticket"))?;

        let mut items: Vec<Result<RecordBatch, FlightError>> = self.config.partitions[index]
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        if let Some(fail_after) = self.config.fail_after {
            items.truncate(fail_after);
            items.push(Err(FlightError::ProtocolError(
                "partition source went away".to_string(),
            )));
        }

        let stream = FlightDataEncoderBuilder::new()
            .with_schema(self.config.schema.clone())
            .build(futures::stream::iter(items))
            .map_err(Status::from)
            .boxed();
        Ok(Response::new(stream))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("do_action"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("list_actions"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }
}

/// Flight server running on its own runtime thread for the lifetime of the
/// handle.
pub struct TestFlightServer {
    uri: String,
    calls: CallLog,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestFlightServer {
    pub fn start(config: ServerConfig) -> Self {
        let calls = CallLog::default();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_calls = calls.clone();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                // Clients reach a TLS server through trusted certificates on
                // the same grpc:// location.
                let uri = format!("grpc://{}", listener.local_addr().unwrap());
                let tls = config.tls.as_ref().map(ServerTls::config);
                let tickets = (0..config.partitions.len())
                    .map(|index| (format!("part-{index}").into_bytes(), index))
                    .collect();
                let service = TestFlightService {
                    config: Arc::new(config),
                    tickets: Arc::new(tickets),
                    uri: uri.clone(),
                    calls: server_calls,
                };
                ready_tx.send(uri).unwrap();

                let mut builder = Server::builder();
                if let Some(tls) = tls {
                    builder = builder.tls_config(tls).unwrap();
                }
                builder
                    .add_service(FlightServiceServer::new(service))
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        let uri = ready_rx.recv().unwrap();
        TestFlightServer {
            uri,
            calls,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

impl Drop for TestFlightServer {
    fn drop(&mut self) {
        // The server thread winds down on its own once the signal is seen.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
