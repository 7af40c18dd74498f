//! Presenting mdocs: selective disclosure and device authentication bound
//! to an OID4VP session transcript.

mod builder;

pub use builder::{DeviceResponseBuilder, DeviceSigningKey, Error};
