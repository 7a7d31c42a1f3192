//! Numbered schema migrations.
//!
//! The schema version lives in the `DBVersion` setting. Scripts are named
//! `m-1.sql`, `m-2.sql`, ... and the latest one is the last of an unbroken
//! sequence starting at 1.

use sqlx::Connection;

use super::{Database, QueryParam};
use crate::error::DatabaseError;
use crate::setting::{SettingKey, SettingRepository};

type Result<T> = std::result::Result<T, DatabaseError>;

/// Creates the settings table on a fresh database.
const BOOTSTRAP: &str = include_str!("../../migrations/init.sql");

const EMBEDDED: &[&str] = &[
    include_str!("../../migrations/m-1.sql"),
    include_str!("../../migrations/m-2.sql"),
];

/// Applies migration scripts in ascending order.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    scripts: &'a [&'a str],
}

impl Migrator<'static> {
    /// Scripts shipped within the binary.
    pub fn embedded() -> Self {
        Self { scripts: EMBEDDED }
    }
}

impl<'a> Migrator<'a> {
    /// Use `scripts[0]` as `m-1`, `scripts[1]` as `m-2` and so on.
    pub fn new(scripts: &'a [&'a str]) -> Self {
        Self { scripts }
    }

    /// Script for a given version, if any.
    pub fn script(&self, version: u32) -> Option<&'a str> {
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        self.scripts.get(index).copied()
    }

    /// Probe `m-1`, `m-2`, ... until one is missing.
    pub fn find_last_migration(&self) -> u32 {
        let mut version = 0;
        while self.script(version + 1).is_some() {
            version += 1;
        }
        version
    }

    /// Create the settings table and the initial `DBVersion` if needed.
    pub async fn bootstrap(&self, db: &Database) -> Result<()> {
        let mut conn = db.scoped(None).await?;
        sqlx::raw_sql(BOOTSTRAP).execute(&mut *conn).await?;
        Ok(())
    }

    /// Version currently recorded on the database.
    pub async fn current_version(&self, db: &Database) -> Result<u32> {
        let version = SettingRepository::new(db.clone())
            .get_or_default(None, SettingKey::DBVersion)
            .await?
            .unwrap_or_default();

        Ok(version.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(%version, "unreadable `DBVersion`, starting from 0");
            0
        }))
    }

    /// Apply every script after `from` up to `to`. `to == 0` means latest.
    ///
    /// Each script commits along with its `DBVersion` update. On failure the
    /// database stays at the last committed version.
    pub async fn migrate_from(
        &self,
        db: &Database,
        from: u32,
        to: u32,
    ) -> Result<u32> {
        let target = if to == 0 { self.find_last_migration() } else { to };
        if target != 0 && self.script(target).is_none() {
            return Err(DatabaseError::UnknownMigration(target));
        }

        let mut conn = db.scoped(None).await?;
        for version in (from + 1)..=target {
            let script = self
                .script(version)
                .ok_or(DatabaseError::UnknownMigration(version))?;

            let mut tx = conn.begin().await?;
            sqlx::raw_sql(script)
                .execute(&mut *tx)
                .await
                .map_err(|source| DatabaseError::Migration { version, source })?;
            Database::execute(
                &mut tx,
                "INSERT INTO settings (key, value) VALUES (?, ?)
                    ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                &[
                    SettingKey::DBVersion.as_str().into(),
                    QueryParam::Text(version.to_string()),
                ],
            )
            .await?;
            tx.commit().await?;

            tracing::info!(version, "migration applied");
        }

        Ok(target.max(from))
    }

    /// Bootstrap then migrate to the latest version.
    pub async fn run(&self, db: &Database) -> Result<u32> {
        self.bootstrap(db).await?;
        let current = self.current_version(db).await?;
        let version = self.migrate_from(db, current, 0).await?;
        tracing::info!(version, "database schema up to date");
        Ok(version)
    }
}
