pub mod auth;
pub mod authz;
pub mod categories;
pub mod comments;
pub mod error;
pub mod forms;
pub mod posts;
pub mod votes;
