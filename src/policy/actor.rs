use serde::{Deserialize, Serialize};

/// The acting principal as reported by the users service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub uid: String,
    pub role_name: String,
    #[serde(default)]
    pub profile_image_id: Option<u64>,
}

impl Actor {
    pub fn new(uid: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role_name: role_name.into(),
            profile_image_id: None,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_name(&self.role_name)
    }
}

/// Parsed role name. Unknown names are kept so they can still be logged, but
/// no permission rule is ever registered for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Root,
    Admin,
    Client,
    Other(String),
}

impl Role {
    pub fn from_name(name: &str) -> Self {
        match name {
            "root" => Role::Root,
            "admin" => Role::Admin,
            "client" => Role::Client,
            other => Role::Other(other.to_string()),
        }
    }

    /// Position in the role hierarchy; a higher rank outranks a lower one.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Other(_) => 0,
            Role::Client => 1,
            Role::Admin => 2,
            Role::Root => 3,
        }
    }

    /// Admins and root see admin-only files and other users' listings.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Root | Role::Admin)
    }
}
