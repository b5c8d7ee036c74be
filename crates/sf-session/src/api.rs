//! Wire types for the commerce API's authentication endpoints

use crate::session::Session;
use serde::{Deserialize, Serialize};
use sf_common::{Identity, Role};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/refresh-token";
pub const PROFILE_PATH: &str = "/users/profile";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Fields collected by the sign-up forms.
///
/// `role` is set by the vendor sign-up flow; shoppers leave it empty and the API
/// assigns `USER`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Response body of login and registration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: Identity,
}

impl AuthResponse {
    pub fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            identity: self.user,
        }
    }
}

/// Response body of the refresh exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}
