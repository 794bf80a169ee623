use std::sync::{Arc, Mutex};

use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::error::FlightError;
use snafu::IntoError;

use crate::client::{
    AuthenticationSnafu, BatchStream, CallCredential, ClientError, ClientFactory,
    ClientFactoryProvider, ClientHandle, HandshakeSnafu, OpenStreamSnafu, ReleaseSnafu,
    StreamSnafu,
};
use crate::descriptor::ConnectionDescriptor;
use crate::location::Location;
use crate::partition::Ticket;
use crate::reader::Resource;

/// Sets up logging for tests
pub fn setup_logging() {
    use tracing::Level;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env()
        .unwrap();
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

pub fn int_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]))
}

pub fn int_batch(values: &[i64]) -> RecordBatch {
    RecordBatch::try_new(int_schema(), vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
}

/// Ordered record of what the mock resources were asked to do.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn release_events(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("close"))
            .collect()
    }
}

/// Behaviour of the mock client stack.
#[derive(Clone, Default)]
pub struct MockScript {
    pub batches: Vec<RecordBatch>,
    /// Index of the pull that fails instead of yielding a batch.
    pub fail_after: Option<usize>,
    pub unreachable: Vec<String>,
    pub reject_auth: bool,
    pub open_failure: Option<tonic::Status>,
    pub failing_release: Vec<Resource>,
}

pub struct MockProvider {
    script: MockScript,
    log: EventLog,
}

impl MockProvider {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            log: EventLog::default(),
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}

impl ClientFactoryProvider for MockProvider {
    fn new_factory(&self) -> Box<dyn ClientFactory> {
        Box::new(MockFactory {
            script: self.script.clone(),
            log: self.log.clone(),
        })
    }
}

fn release_result(script: &MockScript, resource: Resource) -> Result<(), ClientError> {
    if script.failing_release.contains(&resource) {
        ReleaseSnafu {
            message: format!("{resource:?} refused to close"),
        }
        .fail()
    } else {
        Ok(())
    }
}

struct MockFactory {
    script: MockScript,
    log: EventLog,
}

impl ClientFactory for MockFactory {
    fn create(
        &mut self,
        location: &Location,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<(Box<dyn ClientHandle>, CallCredential), ClientError> {
        let target = location.to_string();
        self.log.push(format!("connect {target}"));
        if self.script.unreachable.contains(&target) {
            return HandshakeSnafu {
                target,
                status: tonic::Status::unavailable("connection refused"),
            }
            .fail();
        }
        if self.script.reject_auth {
            return AuthenticationSnafu {
                target,
                status: tonic::Status::unauthenticated("bad credentials"),
            }
            .fail();
        }
        Ok((
            Box::new(MockClient {
                script: self.script.clone(),
                log: self.log.clone(),
            }),
            CallCredential::None,
        ))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.log.push("close factory");
        release_result(&self.script, Resource::ClientFactory)
    }
}

struct MockClient {
    script: MockScript,
    log: EventLog,
}

impl ClientHandle for MockClient {
    fn do_get(
        &mut self,
        ticket: &Ticket,
        _credential: &CallCredential,
    ) -> Result<Box<dyn BatchStream>, ClientError> {
        self.log
            .push(format!("do_get {}", String::from_utf8_lossy(ticket.as_bytes())));
        if let Some(status) = self.script.open_failure.clone() {
            return OpenStreamSnafu { status }.fail();
        }
        Ok(Box::new(MockStream {
            script: self.script.clone(),
            log: self.log.clone(),
            pulled: 0,
        }))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.log.push("close client");
        release_result(&self.script, Resource::Client)
    }
}

struct MockStream {
    script: MockScript,
    log: EventLog,
    pulled: usize,
}

impl BatchStream for MockStream {
    fn schema(&self) -> Option<SchemaRef> {
        Some(
            self.script
                .batches
                .first()
                .map(|batch| batch.schema())
                .unwrap_or_else(int_schema),
        )
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>, ClientError> {
        let index = self.pulled;
        self.pulled += 1;
        self.log.push(format!("pull {index}"));
        if self.script.fail_after == Some(index) {
            return Err(StreamSnafu.into_error(FlightError::ProtocolError(
                "injected stream failure".to_string(),
            )));
        }
        Ok(self.script.batches.get(index).cloned())
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.log.push("close stream");
        release_result(&self.script, Resource::Stream)
    }
}
