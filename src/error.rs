//! Error handler for notekeeper.

use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised by the data-access layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("no connection with the database: {0}")]
    NoConnection(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("unable to build request result: {0}")]
    Mapping(#[source] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration script m-{0} does not exist")]
    UnknownMigration(u32),

    #[error("migration m-{version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: sqlx::Error,
    },
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match err {
            E::RowNotFound => Self::NotFound,
            E::PoolTimedOut | E::PoolClosed | E::Io(_) | E::Tls(_) => {
                Self::NoConnection(err)
            },
            E::ColumnNotFound(_)
            | E::ColumnDecode { .. }
            | E::ColumnIndexOutOfBounds { .. }
            | E::TypeNotFound { .. }
            | E::Decode(_) => Self::Mapping(err),
            _ => Self::Query(err),
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("unable to read request body: {0}")]
    Payload(#[from] axum::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("missing or invalid 'Authorization' header")]
    Unauthorized,

    #[error("not allowed to access this resource")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("{friendly}")]
    Context {
        friendly: String,
        #[source]
        source: Box<ServerError>,
    },
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.into())
    }
}

/// How an error is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Unauthorized,
    Internal,
}

impl ServerError {
    /// Attach a user-facing message to the error.
    pub fn context(self, friendly: impl Into<String>) -> Self {
        Self::Context {
            friendly: friendly.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Body(_) | Self::Payload(_) => {
                ErrorKind::Invalid
            },
            Self::Database(DatabaseError::NotFound) | Self::NotFound => {
                ErrorKind::NotFound
            },
            Self::Unauthorized | Self::Forbidden => ErrorKind::Unauthorized,
            Self::Context { source, .. } => source.kind(),
            Self::Database(_) | Self::Crypto(_) | Self::Panic(_) => {
                ErrorKind::Internal
            },
        }
    }

    /// Message that can be shown to any user.
    pub fn friendly(&self) -> String {
        match self {
            Self::Validation(errors) => {
                let messages = parse_validation_errors(errors);
                if messages.is_empty() {
                    "The request is invalid.".to_owned()
                } else {
                    messages.join(" ")
                }
            },
            Self::Body(_) | Self::Payload(_) => {
                "The request body is malformed.".to_owned()
            },
            Self::Database(DatabaseError::NotFound) | Self::NotFound => {
                "The requested resource does not exist.".to_owned()
            },
            Self::Unauthorized => "You must be logged in.".to_owned(),
            Self::Forbidden => {
                "You are not allowed to perform this action.".to_owned()
            },
            Self::Context { friendly, .. } => friendly.clone(),
            Self::Database(_) | Self::Crypto(_) | Self::Panic(_) => {
                "An unexpected error occurred. Please retry later.".to_owned()
            },
        }
    }

    /// Full cause chain, only shown to administrators.
    pub fn stack(&self) -> String {
        let mut stack = format!("{self:?}");
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&err.to_string());
            source = err.source();
        }
        stack
    }
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| match &issue.message {
                Some(message) => message.to_string(),
                None => format!("Field '{field}' is invalid."),
            })
        })
        .collect()
}

/// Build a single-field validation error.
pub fn invalid_field(field: &'static str, message: &'static str) -> ServerError {
    let mut errors = ValidationErrors::new();
    errors.add(
        field,
        validator::ValidationError::new("invalid").with_message(message.into()),
    );
    ServerError::Validation(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_classification() {
        assert!(matches!(
            DatabaseError::from(sqlx::Error::RowNotFound),
            DatabaseError::NotFound
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::PoolTimedOut),
            DatabaseError::NoConnection(_)
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::ColumnNotFound("title".into())),
            DatabaseError::Mapping(_)
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::Protocol("broken".into())),
            DatabaseError::Query(_)
        ));
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = ServerError::NotFound.context("Note does not exist.");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.friendly(), "Note does not exist.");
        assert!(err.stack().contains("NotFound"));
    }

    #[test]
    fn test_validation_friendly() {
        let err = invalid_field("password", "Password is too short.");
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(err.friendly(), "Password is too short.");
    }
}
