// Tokengate JWT Authentication Library

pub mod auth;
pub mod claims;
pub mod config;
pub mod error;

pub use auth::{Authenticator, AuthRequest, SimpleRequest, User};
pub use config::AuthConfig;
pub use error::AuthError;
