//! Parsing of cluster-local sink URLs.

use reqwest::Url;

/// Where a sink URL points to inside the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub service: String,
    pub namespace: String,
    pub port: u32,
    /// Path of the sink, `/` when empty
    pub path: String,
    pub host: String,
}

/// Sink URL errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SinkUrlError {
    #[error("failed to parse sink URL {url}: {reason}")]
    Parse { url: String, reason: String },
    #[error("sink URL {0} must use http or https")]
    Scheme(String),
    #[error("sink URL {0} has no host")]
    MissingHost(String),
    #[error("sink host {0} does not follow <service>.<namespace>.svc.cluster.local")]
    InvalidHost(String),
}

impl SinkTarget {
    /// Parse a sink of the form `http(s)://<service>.<namespace>[.svc...][:port]/path`
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is malformed or its host does not carry
    /// service and namespace.
    pub fn parse(sink: &str) -> Result<Self, SinkUrlError> {
        let url = Url::parse(sink).map_err(|e| SinkUrlError::Parse {
            url: sink.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SinkUrlError::Scheme(sink.to_string()));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SinkUrlError::MissingHost(sink.to_string()))?;

        let mut segments = host.split('.');
        let (Some(service), Some(namespace)) = (segments.next(), segments.next()) else {
            return Err(SinkUrlError::InvalidHost(host.to_string()));
        };
        if service.is_empty() || namespace.is_empty() {
            return Err(SinkUrlError::InvalidHost(host.to_string()));
        }

        let port = url
            .port_or_known_default()
            .map(u32::from)
            .ok_or_else(|| SinkUrlError::MissingHost(sink.to_string()))?;
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            service: service.to_string(),
            namespace: namespace.to_string(),
            port,
            path,
            host: host.to_string(),
        })
    }

    /// Same service and port
    #[must_use]
    pub fn same_backend(&self, other: &SinkTarget) -> bool {
        self.namespace == other.namespace && self.service == other.service && self.port == other.port
    }
}
