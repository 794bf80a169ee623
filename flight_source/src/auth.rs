use arrow_flight::HandshakeRequest;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Request, Status};

use crate::client::CallCredential;
use crate::client::grpc::FlightClient;
use crate::middleware::{AUTHORIZATION_HEADER, bearer_value};

fn basic_authorization(username: &str, password: &str) -> Result<AsciiMetadataValue, Status> {
    let encoded = BASE64.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
        .parse()
        .map_err(|_| Status::invalid_argument("Basic credentials are not valid header text"))
}

/// Reads the bearer token a server hands back in its `authorization` header.
pub fn credential_from_metadata(metadata: &MetadataMap) -> CallCredential {
    metadata
        .get(AUTHORIZATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .filter(|token| !token.is_empty())
        .map(|token| CallCredential::Bearer(token.to_string()))
        .unwrap_or_default()
}

pub fn attach_credential(
    metadata: &mut MetadataMap,
    credential: &CallCredential,
) -> Result<(), Status> {
    if let CallCredential::Bearer(token) = credential {
        metadata.insert(AUTHORIZATION_HEADER, bearer_value(token)?);
    }
    Ok(())
}

/// Exchanges username and password for a bearer credential through the
/// Flight `Handshake` call.
pub async fn authenticate_basic(
    client: &mut FlightClient,
    username: &str,
    password: &str,
) -> Result<CallCredential, Status> {
    let mut request = Request::new(futures::stream::iter(vec![HandshakeRequest::default()]));
    request
        .metadata_mut()
        .insert(AUTHORIZATION_HEADER, basic_authorization(username, password)?);

    let response = client.handshake(request).await?;
    let credential = credential_from_metadata(response.metadata());

    let mut responses = response.into_inner();
    while responses.message().await?.is_some() {}

    if credential.is_none() {
        tracing::warn!(
            target: "client_factory",
            "Handshake succeeded without a bearer token, calls will carry no credential"
        );
    }
    Ok(credential)
}
