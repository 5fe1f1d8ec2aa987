//! Shared protocol, classification and error definitions for the envsense
//! services.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized service error type and its mapping to
//!   [`tonic::Status`].
//! - [`quality`] - Air and water quality classification helpers.
//! - [`types`] - Sampling profiles and protocol constants.
//! - [`proto`] - Generated message types, clients and server traits.

pub mod error;
pub mod quality;
pub mod types;

pub use error::{Error, Result};

/// Generated gRPC bindings for every envsense package.
pub mod proto {
    pub mod air {
        tonic::include_proto!("air");
    }

    pub mod water {
        tonic::include_proto!("water");
    }

    pub mod support {
        tonic::include_proto!("support");
    }

    /// Encoded descriptor set covering all three packages, used by the
    /// reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("envsense_descriptor");
}
