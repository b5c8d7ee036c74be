use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod logging;

// ============================================================================
// Roles
// ============================================================================

/// Closed set of roles a storefront identity can hold.
///
/// Serialized in upper case to match the commerce API (`"USER"`, `"VENDOR"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Vendor,
    Support,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Vendor, Role::Support, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Vendor => "VENDOR",
            Role::Support => "SUPPORT",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn is_vendor(&self) -> bool {
        matches!(self, Role::Vendor)
    }

    pub fn is_support(&self) -> bool {
        matches!(self, Role::Support)
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "VENDOR" => Ok(Role::Vendor),
            "SUPPORT" => Ok(Role::Support),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The resolved user record attached to a session.
///
/// Field names follow the API's camelCase JSON. Unknown fields are ignored so the
/// same type can be read from `/auth/login`, `/auth/register` and `/users/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Name to show in navigation: display name, then "first last", then email.
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.email.clone()
        } else {
            full
        }
    }

    /// Merge a patch into this identity. Absent patch fields leave values untouched.
    pub fn apply(&mut self, patch: IdentityPatch) {
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(display_name) = patch.display_name {
            self.display_name = Some(display_name);
        }
        if let Some(first_name) = patch.first_name {
            self.first_name = Some(first_name);
        }
        if let Some(last_name) = patch.last_name {
            self.last_name = Some(last_name);
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
    }
}

/// Partial identity update applied after a confirmed profile edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl IdentityPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.display_name.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
    }
}

/// Some API deployments send numeric ids, others UUID strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
