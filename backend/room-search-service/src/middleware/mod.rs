pub mod auth;

pub use auth::{AdminToken, AuthenticatedUser};
