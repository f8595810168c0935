//! Typed request bodies and the field constraints they are checked against
//! before any service touches the store.

use serde::Deserialize;
use uuid::Uuid;

use crate::app::error::{BlogResult, FieldErrors};
use crate::domain::category::CATEGORY_NAME_MAX_LEN;
use crate::domain::post::POST_TITLE_MAX_LEN;
use crate::domain::vote::VoteValue;

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

const REQUIRED: &str = "This field is required.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<Uuid>,
}

impl PostForm {
    /// Trims text fields and checks them. Returns the cleaned form.
    pub fn clean(self) -> BlogResult<Self> {
        let form = Self {
            title: self.title.trim().to_string(),
            content: self.content.trim().to_string(),
            category: self.category,
        };

        let mut errors = FieldErrors::new();
        required_with_max(&mut errors, "title", &form.title, POST_TITLE_MAX_LEN);
        if form.content.is_empty() {
            errors.add("content", REQUIRED);
        }
        errors.into_result()?;
        Ok(form)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

impl CommentForm {
    pub fn clean(self) -> BlogResult<Self> {
        let content = self.content.trim().to_string();
        if content.is_empty() {
            FieldErrors::single("content", REQUIRED).into_result()?;
        }
        Ok(Self { content })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub name: String,
}

impl CategoryForm {
    pub fn clean(self) -> BlogResult<Self> {
        let name = self.name.trim().to_string();
        let mut errors = FieldErrors::new();
        required_with_max(&mut errors, "name", &name, CATEGORY_NAME_MAX_LEN);
        errors.into_result()?;
        Ok(Self { name })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteForm {
    /// Taken as raw JSON so a string, a float or a missing value reads as "no
    /// vote" instead of a rejected body.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl VoteForm {
    /// `Some` only for the integers +1 and -1.
    pub fn vote_value(&self) -> Option<VoteValue> {
        self.value.as_i64().and_then(VoteValue::from_i64)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterForm {
    pub fn clean(self) -> BlogResult<Self> {
        let username = self.username.trim().to_string();
        let mut errors = FieldErrors::new();
        required_with_max(&mut errors, "username", &username, USERNAME_MAX_LEN);
        if username
            .chars()
            .any(|ch| !(ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_')))
        {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let password_len = self.password.chars().count();
        if password_len < PASSWORD_MIN_LEN {
            errors.add(
                "password",
                format!("Password must be at least {} characters.", PASSWORD_MIN_LEN),
            );
        } else if password_len > PASSWORD_MAX_LEN {
            errors.add(
                "password",
                format!("Password must be at most {} characters.", PASSWORD_MAX_LEN),
            );
        }
        errors.into_result()?;

        Ok(Self {
            username,
            password: self.password,
        })
    }
}

fn required_with_max(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) {
    if value.is_empty() {
        errors.add(field, REQUIRED);
        return;
    }
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, len
            ),
        );
    }
}
