use crate::config::settings::Settings;
use crate::config::{ConfigError, InvalidParameterValueSnafu};
use crate::descriptor::LocationPolicy;
use crate::location::DEFAULT_URI;

pub const URI: &str = "uri";
pub const PATH: &str = "path";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const TRUSTED_CERTIFICATES: &str = "trustedCertificates";
pub const CLIENT_CERTIFICATE: &str = "clientCertificate";
pub const CLIENT_KEY: &str = "clientKey";
pub const TOKEN: &str = "token";
pub const LOCATION_POLICY: &str = "locationPolicy";

/// Options accepted when a Flight source is opened. Every optional value is
/// kept as a string where empty means "not set".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FlightSourceOptions {
    pub uri: String,
    /// Command text sent to the service to describe the result set.
    pub path: String,
    pub username: String,
    pub password: String,
    pub trusted_certificates: String,
    pub client_certificate: String,
    pub client_key: String,
    pub token: String,
    pub location_policy: LocationPolicy,
}

impl FlightSourceOptions {
    pub fn from_settings(settings: &dyn Settings) -> Result<Self, ConfigError> {
        let string = |key: &str| settings.get_string(key).unwrap_or_default();
        Ok(Self {
            uri: settings
                .get_non_empty_string(URI)
                .unwrap_or_else(|| DEFAULT_URI.to_string()),
            path: string(PATH),
            username: string(USERNAME),
            password: string(PASSWORD),
            trusted_certificates: string(TRUSTED_CERTIFICATES),
            client_certificate: string(CLIENT_CERTIFICATE),
            client_key: string(CLIENT_KEY),
            token: string(TOKEN),
            location_policy: Self::location_policy(settings)?,
        })
    }

    fn location_policy(settings: &dyn Settings) -> Result<LocationPolicy, ConfigError> {
        match settings
            .get_non_empty_string(LOCATION_POLICY)
            .map(|value| value.to_lowercase())
            .as_deref()
        {
            None | Some("first") => Ok(LocationPolicy::FirstLocation),
            Some("failover") => Ok(LocationPolicy::Failover),
            Some(other) => InvalidParameterValueSnafu {
                parameter: LOCATION_POLICY,
                value: other,
                explanation: "Allowed values are first and failover",
            }
            .fail(),
        }
    }
}

impl std::fmt::Debug for FlightSourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |value: &str| if value.is_empty() { "" } else { "***" };
        f.debug_struct("FlightSourceOptions")
            .field("uri", &self.uri)
            .field("path", &self.path)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("trusted_certificates", &!self.trusted_certificates.is_empty())
            .field("client_certificate", &!self.client_certificate.is_empty())
            .field("client_key", &redacted(&self.client_key))
            .field("token", &redacted(&self.token))
            .field("location_policy", &self.location_policy)
            .finish()
    }
}
