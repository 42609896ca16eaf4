use serde::{Deserialize, Serialize};
use std::fmt;

/// Marketplace role of an authenticated caller: admin > cleaner > client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Cleaner,
    #[default]
    Client,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Cleaner => write!(f, "cleaner"),
            Role::Client => write!(f, "client"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "cleaner" => Ok(Role::Cleaner),
            "client" | "user" => Ok(Role::Client),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Identity of the caller behind an HTTP request, as reported by the auth
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// True when the caller owns the resource or is an admin.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.role.is_admin() || self.user_id == owner_id
    }
}
