#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("unable to parse certificate: {0}")]
    DecodingError(String),
    #[error("certificate chain validation error: {0}")]
    ValidationError(String),
}

impl From<x509_cert::der::Error> for Error {
    fn from(e: x509_cert::der::Error) -> Self {
        Error::DecodingError(e.to_string())
    }
}

impl From<ecdsa::Error> for Error {
    fn from(e: ecdsa::Error) -> Self {
        Error::ValidationError(e.to_string())
    }
}
