use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CATEGORY_NAME_MAX_LEN: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}
