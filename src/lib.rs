//! Vocalis: voice biometric enrollment and verification with a one-time-code
//! second factor

pub mod audio;
pub mod auth;
pub mod baseline;
pub mod capabilities;
pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod otp;
pub mod paths;
pub mod store;
pub mod validation;
pub mod voice;

pub use auth::{Authenticator, Identity};
pub use error::{AuthError, AuthResult, ErrorKind};
