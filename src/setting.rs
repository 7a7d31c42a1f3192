//! Key/value settings stored on database.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::database::{Database, QueryParam};
use crate::error::DatabaseError;

type Result<T> = std::result::Result<T, DatabaseError>;

/// Known setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Port,
    Interface,
    DBVersion,
    CustomPath,
    SiteTitle,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Port => "Port",
            Self::Interface => "Interface",
            Self::DBVersion => "DBVersion",
            Self::CustomPath => "CustomPath",
            Self::SiteTitle => "SiteTitle",
        }
    }

    /// Value used when the key is absent.
    pub fn default_value(&self) -> Option<&'static str> {
        match self {
            Self::Port => Some("8080"),
            Self::Interface => Some("localhost"),
            Self::DBVersion => Some("0"),
            Self::CustomPath | Self::SiteTitle => None,
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Setting as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Clone)]
pub struct SettingRepository {
    db: Database,
}

impl SettingRepository {
    /// Create a new [`SettingRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stored value of `key`.
    pub async fn get(
        &self,
        conn: Option<&mut SqliteConnection>,
        key: SettingKey,
    ) -> Result<Option<String>> {
        let mut conn = self.db.scoped(conn).await?;
        let setting = Database::fetch_optional::<Setting>(
            &mut conn,
            "SELECT key, value FROM settings WHERE key = ? LIMIT 1",
            &[key.as_str().into()],
        )
        .await?;

        Ok(setting.map(|s| s.value))
    }

    /// Stored value of `key`, or its default.
    pub async fn get_or_default(
        &self,
        conn: Option<&mut SqliteConnection>,
        key: SettingKey,
    ) -> Result<Option<String>> {
        Ok(self
            .get(conn, key)
            .await?
            .or_else(|| key.default_value().map(str::to_owned)))
    }

    /// Every stored setting.
    pub async fn get_all(
        &self,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<HashMap<String, String>> {
        let mut conn = self.db.scoped(conn).await?;
        let (settings, _) = Database::fetch::<Setting>(
            &mut conn,
            "SELECT key, value FROM settings ORDER BY key",
            &[],
        )
        .await?;

        Ok(settings.into_iter().map(|s| (s.key, s.value)).collect())
    }

    /// Upsert `key`. An empty value removes it.
    pub async fn set(
        &self,
        conn: Option<&mut SqliteConnection>,
        key: SettingKey,
        value: &str,
    ) -> Result<()> {
        let mut conn = self.db.scoped(conn).await?;

        if value.is_empty() {
            Database::execute(
                &mut conn,
                "DELETE FROM settings WHERE key = ?",
                &[key.as_str().into()],
            )
            .await?;
        } else {
            Database::execute(
                &mut conn,
                "INSERT INTO settings (key, value) VALUES (?, ?)
                    ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                &[key.as_str().into(), QueryParam::from(value)],
            )
            .await?;
        }

        Ok(())
    }

    /// `Interface:Port` to listen on.
    ///
    /// Missing values are defaulted and written back.
    pub async fn listen_address(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(2);

        for key in [SettingKey::Interface, SettingKey::Port] {
            let value = match self.get(None, key).await? {
                Some(value) if !value.is_empty() => value,
                _ => {
                    let value = key.default_value().unwrap_or_default();
                    tracing::warn!(%key, %value, "setting missing, using default");
                    self.set(None, key, value).await?;
                    value.to_owned()
                },
            };
            parts.push(value);
        }

        Ok(parts.join(":"))
    }
}
