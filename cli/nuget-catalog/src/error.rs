use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogClientError {
    #[error("service index of {index_url} has no {which} resource")]
    EndpointNotFound { index_url: String, which: String },

    #[error("package not found at {url}")]
    PackageNotFound { url: String },

    #[error("couldn't reach {url}: {err}")]
    SourceUnreachable {
        url: String,
        err: reqwest::Error,
    },

    #[error("unexpected document at {url}: {err}")]
    InvalidDocument {
        url: String,
        err: reqwest::Error,
    },

    #[error("invalid url {url}: {err}")]
    InvalidUrl {
        url: String,
        err: url::ParseError,
    },

    #[error("couldn't build http client: {0}")]
    BuildClient(String),

    #[error("no package sources configured")]
    NoSources,
}

impl CatalogClientError {
    /// The URL a request failed for, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            CatalogClientError::EndpointNotFound { index_url: url, .. }
            | CatalogClientError::PackageNotFound { url }
            | CatalogClientError::SourceUnreachable { url, .. }
            | CatalogClientError::InvalidDocument { url, .. }
            | CatalogClientError::InvalidUrl { url, .. } => Some(url),
            CatalogClientError::BuildClient(_) | CatalogClientError::NoSources => None,
        }
    }
}
