use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::descriptor::ConnectionDescriptor;
use crate::location::Location;

/// Where server certificates are anchored.
#[derive(Debug, PartialEq, Eq)]
pub enum TrustRoots<'a> {
    Webpki,
    Pem(&'a str),
}

/// TLS choices for one connection, before they are handed to tonic.
#[derive(Debug, PartialEq, Eq)]
pub struct TlsSettings<'a> {
    pub domain: Option<&'a str>,
    pub roots: TrustRoots<'a>,
    /// Client certificate and key PEM for mutual TLS.
    pub identity: Option<(&'a str, &'a str)>,
}

impl TlsSettings<'_> {
    pub fn to_config(&self) -> ClientTlsConfig {
        let mut config = ClientTlsConfig::new();
        if let Some(domain) = self.domain {
            config = config.domain_name(domain);
        }
        config = match self.roots {
            TrustRoots::Webpki => config.with_webpki_roots(),
            TrustRoots::Pem(pem) => config.ca_certificate(Certificate::from_pem(pem)),
        };
        if let Some((certificate, key)) = self.identity {
            config = config.identity(Identity::from_pem(certificate, key));
        }
        config
    }
}

/// TLS is used when the location scheme asks for it or when trusted
/// certificates were supplied. Trusted certificates replace the bundled
/// webpki roots; a client certificate and key enable mutual TLS.
pub fn tls_settings<'a>(
    location: &'a Location,
    descriptor: &'a ConnectionDescriptor,
) -> Option<TlsSettings<'a>> {
    let trusted = descriptor.trusted_certificates();
    if !location.is_tls() && trusted.is_empty() {
        return None;
    }

    let roots = if trusted.is_empty() {
        TrustRoots::Webpki
    } else {
        TrustRoots::Pem(trusted)
    };
    let identity = descriptor
        .has_client_identity()
        .then(|| (descriptor.client_certificate(), descriptor.client_key()));
    Some(TlsSettings {
        domain: location.uri().host_str(),
        roots,
        identity,
    })
}

/// TLS settings for a connection to `location`, or `None` for cleartext.
pub fn client_tls_config(
    location: &Location,
    descriptor: &ConnectionDescriptor,
) -> Option<ClientTlsConfig> {
    let settings = tls_settings(location, descriptor)?;
    tracing::debug!(
        target: "client_factory",
        "TLS enabled for {location} (custom roots: {}, client identity: {})",
        settings.roots != TrustRoots::Webpki,
        settings.identity.is_some()
    );
    Some(settings.to_config())
}
