use uuid::Uuid;

use crate::app::error::{BlogError, BlogResult};
use crate::domain::comment::Comment;
use crate::domain::post::Post;

/// Something owned by exactly one author.
pub trait Authored {
    const KIND: &'static str;

    fn author_id(&self) -> Uuid;

    /// Post page a refused mutation sends the user back to.
    fn post_id(&self) -> Uuid;
}

impl Authored for Post {
    const KIND: &'static str = "post";

    fn author_id(&self) -> Uuid {
        self.author.id
    }

    fn post_id(&self) -> Uuid {
        self.id
    }
}

impl Authored for Comment {
    const KIND: &'static str = "comment";

    fn author_id(&self) -> Uuid {
        self.author.id
    }

    fn post_id(&self) -> Uuid {
        self.post_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Edit,
    Delete,
}

impl Modification {
    fn verb(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

pub fn can_modify<E: Authored>(entity: &E, acting_user: Uuid) -> bool {
    entity.author_id() == acting_user
}

pub fn ensure_can_modify<E: Authored>(
    entity: &E,
    acting_user: Uuid,
    modification: Modification,
) -> BlogResult<()> {
    if can_modify(entity, acting_user) {
        return Ok(());
    }

    Err(BlogError::PermissionDenied {
        message: format!(
            "You do not have permission to {} this {}.",
            modification.verb(),
            E::KIND
        ),
        redirect_to: format!("/posts/{}", entity.post_id()),
    })
}
