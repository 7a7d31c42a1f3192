mod builder;
mod repository;
mod service;

pub use builder::*;
pub use repository::*;
pub use service::*;

use serde::{Deserialize, Serialize};

/// User as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    #[serde(rename = "ID")]
    pub id: String,
    pub username: String,
    #[serde(skip)]
    pub password: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub deleted: bool,
}

impl User {
    /// Whether `viewer` may see private fields and act on this account.
    pub fn is_managed_by(&self, viewer: &User) -> bool {
        viewer.is_admin || viewer.id == self.id
    }

    /// Strip fields that only the owner and administrators can read.
    pub fn view_for(mut self, viewer: Option<&User>) -> Self {
        if !viewer.is_some_and(|viewer| self.is_managed_by(viewer)) {
            self.email = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, admin: bool) -> User {
        User {
            id: id.into(),
            username: id.into(),
            password: "$argon2id$hash".into(),
            email: Some(format!("{id}@example.org")),
            is_admin: admin,
            deleted: false,
        }
    }

    #[test]
    fn test_serialization_hides_password() {
        let json = serde_json::to_value(user("alice", false)).unwrap();
        assert_eq!(json["ID"], "alice");
        assert_eq!(json["Username"], "alice");
        assert_eq!(json["IsAdmin"], false);
        assert!(json.get("Password").is_none());
    }

    #[test]
    fn test_view_for() {
        let alice = user("alice", false);
        let bob = user("bob", false);
        let root = user("root", true);

        assert!(alice.clone().view_for(Some(&alice)).email.is_some());
        assert!(alice.clone().view_for(Some(&root)).email.is_some());
        assert!(alice.clone().view_for(Some(&bob)).email.is_none());
        assert!(alice.view_for(None).email.is_none());
    }
}
