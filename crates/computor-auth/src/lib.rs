//! # computor-auth
//!
//! Identity and principal building, and the session/token store.

pub mod credentials;
pub mod password;
pub mod principal;
pub mod session;

pub use credentials::Credentials;
pub use principal::{PrincipalBuilder, PrincipalCache, PrincipalRepository};
pub use session::{IssuedTokens, SessionStore};
