//! Client call middleware.
//!
//! Middleware factories travel inside the connection descriptor, so they are
//! plain serializable values. When a client is built, the factories are
//! composed in list order into a single [`MiddlewareInterceptor`]; for every
//! outgoing call each factory produces a fresh [`CallMiddleware`] which may
//! edit the call metadata.

use serde::{Deserialize, Serialize};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};

pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Per-call hook invoked before the call headers are sent.
pub trait CallMiddleware: Send {
    fn on_before_send(&mut self, metadata: &mut MetadataMap) -> Result<(), Status>;
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MiddlewareFactory {
    BearerToken { token: String },
}

impl MiddlewareFactory {
    pub fn bearer_token(token: impl Into<String>) -> Self {
        MiddlewareFactory::BearerToken {
            token: token.into(),
        }
    }

    pub fn on_call_started(&self) -> Box<dyn CallMiddleware> {
        match self {
            MiddlewareFactory::BearerToken { token } => Box::new(BearerTokenMiddleware {
                token: token.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for MiddlewareFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareFactory::BearerToken { .. } => f
                .debug_struct("BearerToken")
                .field("token", &"***")
                .finish(),
        }
    }
}

struct BearerTokenMiddleware {
    token: String,
}

impl CallMiddleware for BearerTokenMiddleware {
    fn on_before_send(&mut self, metadata: &mut MetadataMap) -> Result<(), Status> {
        let value = bearer_value(&self.token)?;
        metadata.append(AUTHORIZATION_HEADER, value);
        Ok(())
    }
}

pub(crate) fn bearer_value(token: &str) -> Result<AsciiMetadataValue, Status> {
    format!("Bearer {token}")
        .parse()
        .map_err(|_| Status::invalid_argument("Bearer token is not valid header text"))
}

#[derive(Clone, Debug, Default)]
pub struct MiddlewareInterceptor {
    factories: Vec<MiddlewareFactory>,
}

impl MiddlewareInterceptor {
    pub fn new(factories: Vec<MiddlewareFactory>) -> Self {
        Self { factories }
    }
}

impl Interceptor for MiddlewareInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        for factory in &self.factories {
            factory
                .on_call_started()
                .on_before_send(request.metadata_mut())?;
        }
        Ok(request)
    }
}
