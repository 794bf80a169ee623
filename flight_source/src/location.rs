//! Server locations where Flight tickets can be redeemed.
//!
//! A [`Location`] is a validated URI such as `grpc://localhost:47470` or
//! `grpc+tls://flight.example.com:443`. The Flight URI schemes are mapped to
//! plain `http`/`https` endpoints when a transport channel is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{Location as ErrorLocation, ResultExt, Snafu, ensure};
use url::Url;

pub const DEFAULT_URI: &str = "grpc://localhost:47470";

const CLEARTEXT_SCHEMES: [&str; 3] = ["grpc", "grpc+tcp", "http"];
const TLS_SCHEMES: [&str; 2] = ["grpc+tls", "https"];

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    uri: Url,
}

impl Location {
    pub fn new(uri: &str) -> Result<Self, LocationError> {
        let parsed = Url::parse(uri).context(InvalidUriSnafu { uri })?;
        ensure!(
            parsed.host_str().is_some_and(|host| !host.is_empty()),
            MissingHostSnafu { uri }
        );
        Ok(Self { uri: parsed })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme()
    }

    pub fn is_tls(&self) -> bool {
        TLS_SCHEMES.contains(&self.scheme())
    }

    /// Transport endpoint URI for this location: `https://host:port` when the
    /// connection uses TLS, `http://host:port` otherwise.
    pub fn endpoint_uri(&self, tls: bool) -> Result<String, LocationError> {
        ensure!(
            self.is_tls() || CLEARTEXT_SCHEMES.contains(&self.scheme()),
            UnsupportedSchemeSnafu {
                scheme: self.scheme().to_string(),
            }
        );
        let transport_scheme = if tls { "https" } else { "http" };
        // Checked at construction.
        let host = self.uri.host_str().unwrap_or_default();
        Ok(match self.uri.port() {
            Some(port) => format!("{transport_scheme}://{host}:{port}"),
            None => format!("{transport_scheme}://{host}"),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", self.uri)
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::new(s)
    }
}

impl TryFrom<String> for Location {
    type Error = LocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Location::new(&value)
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.uri.to_string()
    }
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum LocationError {
    #[snafu(display("Malformed location URI '{uri}'"))]
    InvalidUri {
        uri: String,
        source: url::ParseError,
        #[snafu(implicit)]
        location: ErrorLocation,
    },
    #[snafu(display("Location URI '{uri}' has no host"))]
    MissingHost {
        uri: String,
        #[snafu(implicit)]
        location: ErrorLocation,
    },
    #[snafu(display("Unsupported location scheme '{scheme}'"))]
    UnsupportedScheme {
        scheme: String,
        #[snafu(implicit)]
        location: ErrorLocation,
    },
}
