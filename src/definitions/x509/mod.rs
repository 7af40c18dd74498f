pub mod error;
pub mod trust_anchor;
pub mod x5chain;

pub use error::Error;
pub use trust_anchor::TrustAnchorRegistry;
pub use x5chain::{X5Chain, X509, X5CHAIN_HEADER_LABEL};
