use std::sync::Arc;
use std::time::Duration;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{FlightDescriptor, FlightInfo};
use futures::{StreamExt, TryStreamExt};
use snafu::{OptionExt, ResultExt};
use tokio::runtime::Runtime;
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tracing::{Level, span};

use super::*;
use crate::auth;
use crate::middleware::MiddlewareInterceptor;
use crate::tls;

pub type FlightClient = FlightServiceClient<InterceptedService<Channel, MiddlewareInterceptor>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens Arrow Flight connections over gRPC.
///
/// The public API is blocking, so each factory owns a small current-thread
/// runtime that drives the underlying async client. The runtime is shared
/// with the client handle and stream it creates and goes away with the last
/// of them.
pub struct GrpcClientFactory {
    runtime: Option<Arc<Runtime>>,
    channel: Option<Channel>,
}

impl Default for GrpcClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl GrpcClientFactory {
    pub fn new() -> Self {
        GrpcClientFactory {
            runtime: None,
            channel: None,
        }
    }

    fn runtime(&mut self) -> Result<Arc<Runtime>, ClientError> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.clone());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context(RuntimeCreationSnafu)?;
        let runtime = Arc::new(runtime);
        self.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    /// Like [`ClientFactory::create`] but keeps the concrete handle type, which
    /// also exposes the metadata calls.
    pub fn create_grpc(
        &mut self,
        location: &FlightLocation,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(GrpcClientHandle, CallCredential), ClientError> {
        let span = span!(target: "client_factory", Level::INFO, "GrpcClientFactory::create", %location);
        let _enter = span.enter();

        let runtime = self.runtime()?;
        let channel = connect_channel(&runtime, location, descriptor)?;
        self.channel = Some(channel.clone());

        let interceptor = MiddlewareInterceptor::new(descriptor.middleware_factories().to_vec());
        let mut client = FlightServiceClient::with_interceptor(channel, interceptor);

        let credential = if descriptor.has_basic_credentials() {
            tracing::debug!(target: "client_factory", "Authenticating as {}", descriptor.username());
            runtime
                .block_on(auth::authenticate_basic(
                    &mut client,
                    descriptor.username(),
                    descriptor.password(),
                ))
                .map_err(|status| handshake_error(location, status))?
        } else {
            CallCredential::None
        };

        tracing::info!(target: "client_factory", "Connected to {location}");
        Ok((
            GrpcClientHandle {
                client: Some(client),
                runtime,
            },
            credential,
        ))
    }
}

fn handshake_error(location: &FlightLocation, status: tonic::Status) -> ClientError {
    let target = location.to_string();
    if is_auth_status(&status) {
        AuthenticationSnafu { target, status }.build()
    } else {
        HandshakeSnafu { target, status }.build()
    }
}

fn connect_channel(
    runtime: &Runtime,
    location: &FlightLocation,
    descriptor: &ConnectionDescriptor,
) -> Result<Channel, ClientError> {
    let target = location.to_string();
    let tls = tls::client_tls_config(location, descriptor);
    let uri = location
        .endpoint_uri(tls.is_some())
        .context(EndpointSnafu { target: &target })?;
    let mut endpoint = Endpoint::from_shared(uri)
        .context(TransportSnafu { target: &target })?
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(tls) = tls {
        endpoint = endpoint
            .tls_config(tls)
            .context(TransportSnafu { target: &target })?;
    }
    runtime
        .block_on(endpoint.connect())
        .context(TransportSnafu { target })
}

impl ClientFactory for GrpcClientFactory {
    fn create(
        &mut self,
        location: &FlightLocation,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(Box<dyn ClientHandle>, CallCredential), ClientError> {
        let (handle, credential) = self.create_grpc(location, descriptor)?;
        Ok((Box::new(handle), credential))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.channel = None;
        self.runtime = None;
        tracing::debug!(target: "client_factory", "Client factory closed");
        Ok(())
    }
}

pub struct GrpcClientHandle {
    client: Option<FlightClient>,
    runtime: Arc<Runtime>,
}

impl GrpcClientHandle {
    fn client(&mut self) -> Result<&mut FlightClient, ClientError> {
        self.client.as_mut().context(ClosedSnafu { resource: "client" })
    }

    pub fn get_schema(
        &mut self,
        descriptor: FlightDescriptor,
        credential: &CallCredential,
    ) -> Result<SchemaRef, ClientError> {
        let runtime = self.runtime.clone();
        let client = self.client()?;
        let mut request = tonic::Request::new(descriptor);
        auth::attach_credential(request.metadata_mut(), credential)
            .map_err(|status| CallSnafu { status }.build())?;
        let result = runtime
            .block_on(client.get_schema(request))
            .map_err(|status| CallSnafu { status }.build())?
            .into_inner();
        let schema = Schema::try_from(&result)
            .map_err(|e| CallSnafu {
                status: tonic::Status::internal(format!("Cannot decode schema: {e}")),
            }
            .build())?;
        Ok(Arc::new(schema))
    }

    pub fn get_flight_info(
        &mut self,
        descriptor: FlightDescriptor,
        credential: &CallCredential,
    ) -> Result<FlightInfo, ClientError> {
        let runtime = self.runtime.clone();
        let client = self.client()?;
        let mut request = tonic::Request::new(descriptor);
        auth::attach_credential(request.metadata_mut(), credential)
            .map_err(|status| CallSnafu { status }.build())?;
        let info = runtime
            .block_on(client.get_flight_info(request))
            .map_err(|status| CallSnafu { status }.build())?
            .into_inner();
        Ok(info)
    }
}

impl ClientHandle for GrpcClientHandle {
    fn do_get(
        &mut self,
        ticket: &Ticket,
        credential: &CallCredential,
    ) -> Result<Box<dyn BatchStream>, ClientError> {
        let runtime = self.runtime.clone();
        let client = self.client()?;
        let mut request = tonic::Request::new(arrow_flight::Ticket::from(ticket));
        auth::attach_credential(request.metadata_mut(), credential)
            .map_err(|status| OpenStreamSnafu { status }.build())?;
        let response = runtime
            .block_on(client.do_get(request))
            .map_err(|status| OpenStreamSnafu { status }.build())?;
        let stream = FlightRecordBatchStream::new_from_flight_data(
            response.into_inner().map_err(FlightError::from),
        );
        Ok(Box::new(GrpcBatchStream {
            stream: Some(stream),
            runtime,
        }))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.client = None;
        Ok(())
    }
}

struct GrpcBatchStream {
    stream: Option<FlightRecordBatchStream>,
    runtime: Arc<Runtime>,
}

impl BatchStream for GrpcBatchStream {
    fn schema(&self) -> Option<SchemaRef> {
        self.stream.as_ref()?.schema().cloned()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>, ClientError> {
        let stream = self
            .stream
            .as_mut()
            .context(ClosedSnafu { resource: "stream" })?;
        self.runtime
            .block_on(stream.next())
            .transpose()
            .context(StreamSnafu)
    }

    fn close(&mut self) -> Result<(), ClientError> {
        // Dropping the decoder cancels the call if it is still in flight.
        self.stream = None;
        Ok(())
    }
}

/// Hands out [`GrpcClientFactory`] instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrpcClientFactoryProvider;

impl ClientFactoryProvider for GrpcClientFactoryProvider {
    fn new_factory(&self) -> Box<dyn ClientFactory> {
        Box::new(GrpcClientFactory::new())
    }
}
