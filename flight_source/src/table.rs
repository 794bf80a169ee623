//! Table-level entry point: schema discovery and partition planning for one
//! Flight command.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow_flight::{FlightDescriptor, FlightInfo};
use snafu::{Location, ResultExt, Snafu};
use tracing::{Level, span};

use crate::client::{
    CallCredential, ClientError, ClientFactory, ClientHandle, GrpcClientFactory,
    grpc::GrpcClientHandle,
};
use crate::config::ConfigError;
use crate::config::settings::Settings;
use crate::config::source_options::FlightSourceOptions;
use crate::descriptor::ConnectionDescriptor;
use crate::location::{Location as FlightLocation, LocationError};
use crate::partition::{PartitionDescriptor, Ticket};
use crate::reader::PartitionReaderFactory;

pub const SHORT_NAME: &str = "flight";

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum TableError {
    #[snafu(display("Invalid source options: {source}"))]
    Config {
        source: ConfigError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Flight call failed: {source}"))]
    Client {
        source: ClientError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Endpoint location '{uri}' is malformed"))]
    EndpointLocation {
        uri: String,
        source: LocationError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A Flight command exposed as a table.
#[derive(Debug)]
pub struct FlightTable {
    options: FlightSourceOptions,
    descriptor: Arc<ConnectionDescriptor>,
    schema: SchemaRef,
}

impl FlightTable {
    pub fn open_settings(settings: &dyn Settings) -> Result<Self, TableError> {
        let options = FlightSourceOptions::from_settings(settings).context(ConfigSnafu)?;
        Self::open(options)
    }

    pub fn open(options: FlightSourceOptions) -> Result<Self, TableError> {
        let span = span!(target: "flight_table", Level::INFO, "FlightTable::open", uri = %options.uri);
        let _enter = span.enter();

        let descriptor = ConnectionDescriptor::from_options(&options).context(ConfigSnafu)?;
        let command = command_descriptor(&options.path);
        let schema = with_client(&descriptor, |client, credential| {
            client.get_schema(command, credential)
        })?;
        tracing::info!(target: "flight_table", "Resolved schema with {} field(s)", schema.fields().len());

        Ok(FlightTable {
            options,
            descriptor: Arc::new(descriptor),
            schema,
        })
    }

    pub fn name(&self) -> &str {
        SHORT_NAME
    }

    pub fn description(&self) -> String {
        format!(
            "{SHORT_NAME} Location {} Command {}",
            self.options.uri, self.options.path
        )
    }

    /// Schema fetched when the table was opened.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        &self.descriptor
    }

    pub fn plan_partitions(&self) -> Result<Vec<PartitionDescriptor>, TableError> {
        let span = span!(target: "flight_table", Level::INFO, "FlightTable::plan_partitions");
        let _enter = span.enter();

        let command = command_descriptor(&self.options.path);
        let info = with_client(&self.descriptor, |client, credential| {
            client.get_flight_info(command, credential)
        })?;
        let partitions = partitions_from_info(info)?;
        tracing::info!(target: "flight_table", "Planned {} partition(s)", partitions.len());
        Ok(partitions)
    }

    pub fn reader_factory(&self) -> PartitionReaderFactory {
        PartitionReaderFactory::new(self.descriptor.clone())
    }
}

fn command_descriptor(path: &str) -> FlightDescriptor {
    FlightDescriptor::new_cmd(path.to_string())
}

/// Endpoints without a ticket cannot be redeemed and are skipped.
fn partitions_from_info(info: FlightInfo) -> Result<Vec<PartitionDescriptor>, TableError> {
    info.endpoint
        .into_iter()
        .filter_map(|endpoint| {
            let Some(ticket) = endpoint.ticket else {
                tracing::warn!(target: "flight_table", "Skipping endpoint without ticket");
                return None;
            };
            let locations = endpoint
                .location
                .into_iter()
                .map(|location| {
                    FlightLocation::new(&location.uri)
                        .context(EndpointLocationSnafu { uri: &location.uri })
                })
                .collect::<Result<Vec<_>, _>>();
            Some(locations.map(|locations| PartitionDescriptor::new(Ticket::from(ticket), locations)))
        })
        .collect()
}

/// Runs one metadata call against the default location and releases the
/// connection before returning.
fn with_client<T>(
    descriptor: &ConnectionDescriptor,
    call: impl FnOnce(&mut GrpcClientHandle, &CallCredential) -> Result<T, ClientError>,
) -> Result<T, TableError> {
    let mut factory = GrpcClientFactory::new();
    let result = factory
        .create_grpc(descriptor.default_location(), descriptor)
        .and_then(|(mut client, credential)| {
            let result = call(&mut client, &credential);
            let closed = client.close();
            result.and_then(|value| closed.map(|()| value))
        });
    let closed = factory.close();
    let value = result.context(ClientSnafu)?;
    closed.context(ClientSnafu)?;
    Ok(value)
}
