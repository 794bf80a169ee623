use std::sync::Arc;

use super::{ColumnarPartitionReader, PartitionReadError, RowPartitionReader};
use crate::client::{ClientFactoryProvider, GrpcClientFactoryProvider};
use crate::descriptor::ConnectionDescriptor;
use crate::materialize::{ArrowColumnAdapter, ColumnAdapter};
use crate::partition::PartitionDescriptor;

/// Creates one reader per partition. Every reader gets its own client factory
/// while sharing the immutable connection descriptor.
#[derive(Clone)]
pub struct PartitionReaderFactory {
    descriptor: Arc<ConnectionDescriptor>,
    provider: Arc<dyn ClientFactoryProvider>,
}

impl PartitionReaderFactory {
    pub fn new(descriptor: Arc<ConnectionDescriptor>) -> Self {
        Self::with_provider(descriptor, Arc::new(GrpcClientFactoryProvider))
    }

    pub fn with_provider(
        descriptor: Arc<ConnectionDescriptor>,
        provider: Arc<dyn ClientFactoryProvider>,
    ) -> Self {
        PartitionReaderFactory {
            descriptor,
            provider,
        }
    }

    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        &self.descriptor
    }

    pub fn create_columnar_reader(
        &self,
        partition: PartitionDescriptor,
    ) -> Result<ColumnarPartitionReader<ArrowColumnAdapter>, PartitionReadError> {
        self.create_columnar_reader_with_adapter(partition, ArrowColumnAdapter)
    }

    pub fn create_columnar_reader_with_adapter<A: ColumnAdapter>(
        &self,
        partition: PartitionDescriptor,
        adapter: A,
    ) -> Result<ColumnarPartitionReader<A>, PartitionReadError> {
        ColumnarPartitionReader::open_with_adapter(
            &self.descriptor,
            partition,
            self.provider.as_ref(),
            adapter,
        )
    }

    pub fn create_reader(
        &self,
        partition: PartitionDescriptor,
    ) -> Result<RowPartitionReader, PartitionReadError> {
        self.create_columnar_reader(partition)
            .map(RowPartitionReader::new)
    }

    /// Flight streams are always columnar.
    pub fn supports_columnar_reads(&self, _partition: &PartitionDescriptor) -> bool {
        true
    }
}

impl std::fmt::Debug for PartitionReaderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionReaderFactory")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
