use std::collections::BTreeMap;

use serde::Serialize;

/// Per-field validation messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), BlogError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BlogError::Validation(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{message}")]
    PermissionDenied { message: String, redirect_to: String },
    #[error("invalid input")]
    Validation(FieldErrors),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<sqlx::Error> for BlogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.into())
    }
}

pub type BlogResult<T> = Result<T, BlogError>;

/// Constraint violations the services translate into user-facing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Unique(String),
    ForeignKey(String),
}

pub fn violation(err: &sqlx::Error) -> Option<Violation> {
    let db_err = err.as_database_error()?;
    let constraint = db_err.constraint().unwrap_or_default().to_string();
    let code = db_err.code()?;
    match &*code {
        "23505" => Some(Violation::Unique(constraint)),
        "23503" => Some(Violation::ForeignKey(constraint)),
        _ => None,
    }
}
