//! Partition readers.
//!
//! A reader turns one [`PartitionDescriptor`] into a pull-based sequence of
//! batches. It resolves the server location, obtains a client through a
//! [`ClientFactory`], opens the `DoGet` stream and then serves the engine's
//! `next` / `get` / `close` protocol. Stream, client and factory are released
//! in that order by a single teardown routine, on every exit path.

mod factory;
mod row;

pub use factory::PartitionReaderFactory;
pub use row::{Row, RowPartitionReader};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use snafu::{IntoError, Location, OptionExt, Snafu};
use tracing::{Level, span};

use crate::client::{
    BatchStream, CallCredential, ClientError, ClientFactory, ClientFactoryProvider, ClientHandle,
};
use crate::descriptor::{ConnectionDescriptor, LocationPolicy};
use crate::location::Location as FlightLocation;
use crate::materialize::{ArrowColumnAdapter, ColumnAdapter, ColumnarBatch, materialize};
use crate::partition::PartitionDescriptor;

/// Engine-facing read protocol.
pub trait PartitionReader {
    type Item;

    /// Moves to the next item. Returns `false` once the partition is exhausted.
    fn next(&mut self) -> Result<bool, PartitionReadError>;

    /// Item positioned by the last successful [`PartitionReader::next`].
    fn get(&self) -> Result<Self::Item, PartitionReadError>;

    /// Releases every resource held by the reader. Safe to call repeatedly.
    fn close(&mut self) -> Result<(), PartitionReadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Created,
    LocationResolved,
    Connected,
    Streaming,
    Exhausted,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Stream,
    Client,
    ClientFactory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub resource: Resource,
    pub message: String,
}

fn describe_close_failure(failures: &[ReleaseFailure], prior_read_error: &Option<String>) -> String {
    let details = failures
        .iter()
        .map(|failure| format!("{:?}: {}", failure.resource, failure.message))
        .collect::<Vec<_>>()
        .join("; ");
    match prior_read_error {
        Some(read_error) => format!(
            "Failed to release {} resource(s) ({details}) after read failure: {read_error}",
            failures.len()
        ),
        None => format!("Failed to release {} resource(s) ({details})", failures.len()),
    }
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum PartitionReadError {
    #[snafu(display("Location {target} cannot be used as a Flight endpoint: {source}"))]
    MalformedLocation {
        target: String,
        source: ClientError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to connect to {target}: {source}"))]
    Connection {
        target: String,
        source: ClientError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Authentication failed at {target}: {source}"))]
    Authentication {
        target: String,
        source: ClientError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Stream read failed after {batches_read} batch(es): {source}"))]
    StreamRead {
        batches_read: usize,
        source: ClientError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{}", describe_close_failure(failures, prior_read_error)))]
    Close {
        failures: Vec<ReleaseFailure>,
        prior_read_error: Option<String>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No batch is positioned, call next() first"))]
    NoCurrentBatch {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Reader is closed"))]
    ReaderClosed {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Partition has no location to connect to"))]
    NoCandidateLocation {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Location a reader connects to under the default policy: the partition's
/// first candidate, or the descriptor's default location when there is none.
pub fn resolve_location<'a>(
    partition: &'a PartitionDescriptor,
    descriptor: &'a ConnectionDescriptor,
) -> &'a FlightLocation {
    partition
        .locations()
        .first()
        .unwrap_or_else(|| descriptor.default_location())
}

/// Locations to try, in order, under the descriptor's location policy.
pub fn candidate_locations(
    partition: &PartitionDescriptor,
    descriptor: &ConnectionDescriptor,
) -> Vec<FlightLocation> {
    match descriptor.location_policy() {
        LocationPolicy::Failover if !partition.locations().is_empty() => {
            partition.locations().to_vec()
        }
        _ => vec![resolve_location(partition, descriptor).clone()],
    }
}

fn connect_error(target: &FlightLocation, source: ClientError) -> PartitionReadError {
    let target = target.to_string();
    if source.is_authentication() {
        AuthenticationSnafu { target }.into_error(source)
    } else if matches!(source, ClientError::Endpoint { .. }) {
        MalformedLocationSnafu { target }.into_error(source)
    } else {
        ConnectionSnafu { target }.into_error(source)
    }
}

fn open_stream_error(target: &FlightLocation, source: ClientError) -> PartitionReadError {
    if source.is_authentication() {
        AuthenticationSnafu {
            target: target.to_string(),
        }
        .into_error(source)
    } else {
        StreamReadSnafu { batches_read: 0usize }.into_error(source)
    }
}

fn connect_first_reachable(
    factory: &mut dyn ClientFactory,
    candidates: &[FlightLocation],
    descriptor: &ConnectionDescriptor,
) -> Result<(FlightLocation, Box<dyn ClientHandle>, CallCredential), PartitionReadError> {
    for (attempt, location) in candidates.iter().enumerate() {
        match factory.create(location, descriptor) {
            Ok((client, credential)) => return Ok((location.clone(), client, credential)),
            Err(source) => {
                let has_next = attempt + 1 < candidates.len();
                let try_next = has_next && source.is_connection();
                let err = connect_error(location, source);
                if !try_next {
                    return Err(err);
                }
                tracing::warn!(target: "partition_reader", "{err}, trying next location");
            }
        }
    }
    NoCandidateLocationSnafu.fail()
}

/// Columnar reader over one partition.
pub struct ColumnarPartitionReader<A: ColumnAdapter = ArrowColumnAdapter> {
    id: u64,
    partition: PartitionDescriptor,
    adapter: A,
    state: ReaderState,
    location: Option<FlightLocation>,
    factory: Option<Box<dyn ClientFactory>>,
    client: Option<Box<dyn ClientHandle>>,
    stream: Option<Box<dyn BatchStream>>,
    current: Option<RecordBatch>,
    batches_read: usize,
    read_failure: Option<String>,
}

impl ColumnarPartitionReader<ArrowColumnAdapter> {
    pub fn open(
        descriptor: &ConnectionDescriptor,
        partition: PartitionDescriptor,
        provider: &dyn ClientFactoryProvider,
    ) -> Result<Self, PartitionReadError> {
        Self::open_with_adapter(descriptor, partition, provider, ArrowColumnAdapter)
    }
}

impl<A: ColumnAdapter> ColumnarPartitionReader<A> {
    pub fn open_with_adapter(
        descriptor: &ConnectionDescriptor,
        partition: PartitionDescriptor,
        provider: &dyn ClientFactoryProvider,
        adapter: A,
    ) -> Result<Self, PartitionReadError> {
        let mut reader = ColumnarPartitionReader {
            id: rand::random::<u64>(),
            partition,
            adapter,
            state: ReaderState::Created,
            location: None,
            factory: None,
            client: None,
            stream: None,
            current: None,
            batches_read: 0,
            read_failure: None,
        };

        let span = span!(target: "partition_reader", Level::INFO, "PartitionReader::open", id = reader.id);
        let _enter = span.enter();

        if let Err(err) = reader.acquire(descriptor, provider) {
            tracing::error!(target: "partition_reader", "Failed to open partition: {err}");
            if let Err(close_err) = reader.close() {
                tracing::error!(target: "partition_reader", "{close_err}");
            }
            return Err(err);
        }
        Ok(reader)
    }

    fn acquire(
        &mut self,
        descriptor: &ConnectionDescriptor,
        provider: &dyn ClientFactoryProvider,
    ) -> Result<(), PartitionReadError> {
        let candidates = candidate_locations(&self.partition, descriptor);
        self.state = ReaderState::LocationResolved;
        tracing::debug!(target: "partition_reader", "Candidate locations: {candidates:?}");

        let factory = self.factory.insert(provider.new_factory());
        let (location, mut client, credential) =
            connect_first_reachable(factory.as_mut(), &candidates, descriptor)?;
        self.state = ReaderState::Connected;

        let stream = client.do_get(self.partition.ticket(), &credential);
        self.client = Some(client);
        let stream = stream.map_err(|source| open_stream_error(&location, source))?;
        self.stream = Some(stream);
        tracing::info!(target: "partition_reader", "Streaming partition from {location}");
        self.location = Some(location);
        self.state = ReaderState::Streaming;
        Ok(())
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Location the reader is streaming from, once connected.
    pub fn location(&self) -> Option<&FlightLocation> {
        self.location.as_ref()
    }

    pub fn partition(&self) -> &PartitionDescriptor {
        &self.partition
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.stream.as_ref()?.schema()
    }

    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    fn release(&mut self) -> Result<(), PartitionReadError> {
        let mut failures = Vec::new();
        let mut record = |resource: Resource, result: Result<(), ClientError>| {
            if let Err(err) = result {
                tracing::warn!(target: "partition_reader", "Failed to release {resource:?}: {err}");
                failures.push(ReleaseFailure {
                    resource,
                    message: err.to_string(),
                });
            }
        };
        if let Some(mut stream) = self.stream.take() {
            record(Resource::Stream, stream.close());
        }
        if let Some(mut client) = self.client.take() {
            record(Resource::Client, client.close());
        }
        if let Some(mut factory) = self.factory.take() {
            record(Resource::ClientFactory, factory.close());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            CloseSnafu {
                failures,
                prior_read_error: self.read_failure.clone(),
            }
            .fail()
        }
    }
}

impl<A: ColumnAdapter> PartitionReader for ColumnarPartitionReader<A> {
    type Item = ColumnarBatch<A::Column>;

    fn next(&mut self) -> Result<bool, PartitionReadError> {
        self.current = None;
        match self.state {
            ReaderState::Streaming => {}
            ReaderState::Closed => return ReaderClosedSnafu.fail(),
            _ => return Ok(false),
        }
        let stream = self.stream.as_mut().context(ReaderClosedSnafu)?;
        match stream.next_batch() {
            Ok(Some(batch)) => {
                self.batches_read += 1;
                tracing::trace!(target: "partition_reader", id = self.id, rows = batch.num_rows(), "Batch received");
                self.current = Some(batch);
                Ok(true)
            }
            Ok(None) => {
                tracing::debug!(target: "partition_reader", id = self.id, "Stream exhausted after {} batch(es)", self.batches_read);
                self.state = ReaderState::Exhausted;
                Ok(false)
            }
            Err(source) => {
                tracing::error!(target: "partition_reader", id = self.id, "Stream failed: {source}");
                self.state = ReaderState::Failed;
                self.read_failure = Some(source.to_string());
                Err(StreamReadSnafu {
                    batches_read: self.batches_read,
                }
                .into_error(source))
            }
        }
    }

    fn get(&self) -> Result<Self::Item, PartitionReadError> {
        let batch = self.current.as_ref().context(NoCurrentBatchSnafu)?;
        Ok(materialize(&self.adapter, batch))
    }

    fn close(&mut self) -> Result<(), PartitionReadError> {
        if self.state == ReaderState::Closed {
            return Ok(());
        }
        let span = span!(target: "partition_reader", Level::INFO, "PartitionReader::close", id = self.id);
        let _enter = span.enter();
        self.current = None;
        let result = self.release();
        self.state = ReaderState::Closed;
        tracing::debug!(target: "partition_reader", "Reader closed");
        result
    }
}

impl<A: ColumnAdapter> Drop for ColumnarPartitionReader<A> {
    fn drop(&mut self) {
        if self.state != ReaderState::Closed {
            if let Err(err) = self.close() {
                tracing::error!(target: "partition_reader", "Failed to close dropped reader: {err}");
            }
        }
    }
}
