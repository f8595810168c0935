pub mod category;
pub mod comment;
pub mod post;
pub mod user;
pub mod vote;
