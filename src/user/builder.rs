//! Typed builder for User.

use std::sync::Arc;

use crate::crypto::PasswordManager;
use crate::database::Database;
use crate::user::{User, UserService};

/// [`User`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Username, Password> {
    username: Username,
    password: Password,
    email: Option<String>,
    is_admin: bool,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            username: Missing,
            password: Missing,
            email: None,
            is_admin: false,
        }
    }
}

impl<Password> UserBuilder<Missing, Password> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(
        self,
        username: impl Into<String>,
    ) -> UserBuilder<Present<String>, Password> {
        UserBuilder {
            username: Present(username.into()),
            password: self.password,
            email: self.email,
            is_admin: self.is_admin,
        }
    }
}

impl<Username> UserBuilder<Username, Missing> {
    /// Update clear `password` field on [`UserBuilder`].
    pub fn password(
        self,
        password: impl Into<String>,
    ) -> UserBuilder<Username, Present<String>> {
        UserBuilder {
            username: self.username,
            password: Present(password.into()),
            email: self.email,
            is_admin: self.is_admin,
        }
    }
}

impl<Username, Password> UserBuilder<Username, Password> {
    /// Update `email` field on [`UserBuilder`].
    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|email| !email.is_empty());
        self
    }

    /// Update `is_admin` field on [`UserBuilder`].
    pub fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Build a [`User`] ready to be created.
    ///
    /// The password is still clear and gets hashed by
    /// [`UserService::create_user`].
    pub fn build(self, db: Database, crypto: Arc<PasswordManager>) -> UserService {
        let user = User {
            username: self.username.0,
            password: self.password.0,
            email: self.email,
            is_admin: self.is_admin,
            ..Default::default()
        };

        UserService::new(user, db, crypto)
    }
}
