//! Client-side resources used by a partition read.
//!
//! A read holds three resources, acquired in this order and released in the
//! reverse one: the [`ClientFactory`] (transport connection), the
//! [`ClientHandle`] it creates, and the [`BatchStream`] opened through the
//! handle. The traits let the reader drive any transport; [`grpc`] provides
//! the Arrow Flight implementation.

pub mod grpc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use snafu::{Location, Snafu};

use crate::descriptor::ConnectionDescriptor;
use crate::location::{Location as FlightLocation, LocationError};
use crate::partition::Ticket;

pub use grpc::{GrpcClientFactory, GrpcClientFactoryProvider};

/// Per-call credential negotiated when a client is created.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum CallCredential {
    #[default]
    None,
    Bearer(String),
}

impl CallCredential {
    pub fn is_none(&self) -> bool {
        matches!(self, CallCredential::None)
    }
}

impl std::fmt::Debug for CallCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallCredential::None => write!(f, "None"),
            CallCredential::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

pub trait ClientFactory: Send {
    /// Connects to `location` and negotiates the call credential.
    fn create(
        &mut self,
        location: &FlightLocation,
        descriptor: &ConnectionDescriptor,
    ) -> Result<(Box<dyn ClientHandle>, CallCredential), ClientError>;

    /// Releases the transport connection. Called once by the owner.
    fn close(&mut self) -> Result<(), ClientError>;
}

pub trait ClientHandle: Send {
    fn do_get(
        &mut self,
        ticket: &Ticket,
        credential: &CallCredential,
    ) -> Result<Box<dyn BatchStream>, ClientError>;

    fn close(&mut self) -> Result<(), ClientError>;
}

pub trait BatchStream: Send {
    /// Schema announced by the stream, once it is known.
    fn schema(&self) -> Option<SchemaRef>;

    /// Blocks until the next batch arrives; `None` at the end of the stream.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, ClientError>;

    fn close(&mut self) -> Result<(), ClientError>;
}

/// Makes one fresh [`ClientFactory`] per partition read.
pub trait ClientFactoryProvider: Send + Sync {
    fn new_factory(&self) -> Box<dyn ClientFactory>;
}

impl<F> ClientFactoryProvider for F
where
    F: Fn() -> Box<dyn ClientFactory> + Send + Sync,
{
    fn new_factory(&self) -> Box<dyn ClientFactory> {
        self()
    }
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("Failed to create runtime"))]
    RuntimeCreation {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Cannot build endpoint for {target}"))]
    Endpoint {
        target: String,
        source: LocationError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Transport error: {source}"))]
    Transport {
        target: String,
        source: tonic::transport::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Authentication rejected by {target}: {}", status.message()))]
    Authentication {
        target: String,
        status: tonic::Status,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Handshake with {target} failed: {}", status.message()))]
    Handshake {
        target: String,
        status: tonic::Status,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to open stream: {}", status.message()))]
    OpenStream {
        status: tonic::Status,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to read from stream: {source}"))]
    Stream {
        source: arrow_flight::error::FlightError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Call failed: {}", status.message()))]
    Call {
        status: tonic::Status,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{resource} used after close"))]
    Closed {
        resource: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{message}"))]
    Release {
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl ClientError {
    /// Whether the failure means the credentials were rejected, as opposed to
    /// the server being unreachable or the stream breaking.
    pub fn is_authentication(&self) -> bool {
        match self {
            ClientError::Authentication { .. } => true,
            ClientError::OpenStream { status, .. } => is_auth_status(status),
            _ => false,
        }
    }

    /// Whether the failure happened while establishing the transport.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ClientError::RuntimeCreation { .. }
                | ClientError::Endpoint { .. }
                | ClientError::Transport { .. }
                | ClientError::Handshake { .. }
        )
    }
}

pub(crate) fn is_auth_status(status: &tonic::Status) -> bool {
    matches!(
        status.code(),
        tonic::Code::Unauthenticated | tonic::Code::PermissionDenied
    )
}
