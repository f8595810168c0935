use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::app::error::{violation, BlogError, BlogResult, Violation};
use crate::app::forms::CategoryForm;
use crate::domain::category::Category;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct CategoryService {
    db: Db,
}

impl CategoryService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY name ASC")
            .fetch_all(self.db.pool())
            .await?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in rows {
            categories.push(Category {
                id: row.get("id"),
                name: row.get("name"),
            });
        }

        Ok(categories)
    }

    pub async fn create_category(&self, form: CategoryForm) -> BlogResult<Category> {
        let form = form.clean()?;

        let row = sqlx::query("INSERT INTO categories (name) VALUES ($1) RETURNING id, name")
            .bind(&form.name)
            .fetch_one(self.db.pool())
            .await
            .map_err(|err| match violation(&err) {
                Some(Violation::Unique(_)) => {
                    BlogError::Conflict("Category with this Name already exists.".into())
                }
                _ => err.into(),
            })?;

        Ok(Category {
            id: row.get("id"),
            name: row.get("name"),
        })
    }

    /// Posts in the category stay and lose their category (`ON DELETE SET NULL`).
    pub async fn delete_category(&self, category_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
