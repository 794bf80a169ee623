//! Reads Arrow Flight result partitions as engine batches.
//!
//! A [`ConnectionDescriptor`] is built once per read from the source options
//! and shared by every partition. Each partition is served by its own
//! [`ColumnarPartitionReader`] (or the row-oriented [`RowPartitionReader`]),
//! which owns a private client stack and releases it deterministically on
//! close.

pub mod auth;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod location;
pub mod logging;
pub mod materialize;
pub mod middleware;
pub mod partition;
pub mod reader;
pub mod table;
mod tls;

#[cfg(test)]
mod test_utils;

pub use client::{ClientFactory, ClientFactoryProvider, GrpcClientFactory, GrpcClientFactoryProvider};
pub use config::settings::{CaseInsensitiveSettings, Setting, Settings};
pub use config::source_options::FlightSourceOptions;
pub use descriptor::{ConnectionDescriptor, LocationPolicy};
pub use location::Location;
pub use materialize::{ArrowColumnAdapter, ArrowColumnVector, ColumnAdapter, ColumnarBatch};
pub use middleware::MiddlewareFactory;
pub use partition::{PartitionDescriptor, Ticket};
pub use reader::{
    ColumnarPartitionReader, PartitionReadError, PartitionReader, PartitionReaderFactory, Row,
    RowPartitionReader,
};
pub use table::{FlightTable, TableError};
