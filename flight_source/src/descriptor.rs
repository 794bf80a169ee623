use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::config::source_options::{CLIENT_CERTIFICATE, CLIENT_KEY, FlightSourceOptions};
use crate::config::{ConfigError, IncompleteParametersSnafu, MalformedLocationSnafu};
use crate::location::Location;
use crate::middleware::MiddlewareFactory;

/// How a reader picks among the candidate locations of a partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Use the first candidate only.
    #[default]
    FirstLocation,
    /// Try candidates in order, moving on when a connection cannot be established.
    Failover,
}

/// Immutable connection settings shared by every partition of one read.
///
/// Holds no live connections, so it can be cloned, serialized and shipped to
/// other workers freely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    default_location: Location,
    username: String,
    password: String,
    trusted_certificates: String,
    client_certificate: String,
    client_key: String,
    middleware_factories: Vec<MiddlewareFactory>,
    location_policy: LocationPolicy,
}

impl ConnectionDescriptor {
    pub fn from_options(options: &FlightSourceOptions) -> Result<Self, ConfigError> {
        let default_location = Location::new(&options.uri).context(MalformedLocationSnafu)?;
        ensure!(
            options.client_key.is_empty() || !options.client_certificate.is_empty(),
            IncompleteParametersSnafu {
                parameter: CLIENT_KEY,
                required: CLIENT_CERTIFICATE,
            }
        );
        ensure!(
            options.client_certificate.is_empty() || !options.client_key.is_empty(),
            IncompleteParametersSnafu {
                parameter: CLIENT_CERTIFICATE,
                required: CLIENT_KEY,
            }
        );

        let mut middleware_factories = Vec::new();
        if !options.token.is_empty() {
            middleware_factories.push(MiddlewareFactory::bearer_token(&options.token));
        }

        Ok(Self {
            default_location,
            username: options.username.clone(),
            password: options.password.clone(),
            trusted_certificates: options.trusted_certificates.clone(),
            client_certificate: options.client_certificate.clone(),
            client_key: options.client_key.clone(),
            middleware_factories,
            location_policy: options.location_policy,
        })
    }

    /// Descriptor for an unauthenticated cleartext connection to `location`.
    pub fn for_location(location: Location) -> Self {
        Self {
            default_location: location,
            username: String::new(),
            password: String::new(),
            trusted_certificates: String::new(),
            client_certificate: String::new(),
            client_key: String::new(),
            middleware_factories: Vec::new(),
            location_policy: LocationPolicy::FirstLocation,
        }
    }

    pub fn with_middleware(mut self, factory: MiddlewareFactory) -> Self {
        self.middleware_factories.push(factory);
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_location_policy(mut self, policy: LocationPolicy) -> Self {
        self.location_policy = policy;
        self
    }

    pub fn default_location(&self) -> &Location {
        &self.default_location
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn trusted_certificates(&self) -> &str {
        &self.trusted_certificates
    }

    pub fn client_certificate(&self) -> &str {
        &self.client_certificate
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn middleware_factories(&self) -> &[MiddlewareFactory] {
        &self.middleware_factories
    }

    pub fn location_policy(&self) -> LocationPolicy {
        self.location_policy
    }

    /// Basic credentials are only used when both parts are present.
    pub fn has_basic_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn has_client_identity(&self) -> bool {
        !self.client_certificate.is_empty() && !self.client_key.is_empty()
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("default_location", &self.default_location)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("trusted_certificates", &!self.trusted_certificates.is_empty())
            .field("client_identity", &self.has_client_identity())
            .field("middleware_factories", &self.middleware_factories)
            .field("location_policy", &self.location_policy)
            .finish()
    }
}
