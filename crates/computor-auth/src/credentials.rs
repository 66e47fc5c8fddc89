//! The four credential kinds that resolve to a unique user.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    BearerSession { access_token: String },
    ProviderToken { provider_url: String, provider_token: String },
    ApiToken { token: String },
}

/// Resolved identity of a credential, before the full [`Principal`] is
/// assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUser {
    pub user_id: Uuid,
}
