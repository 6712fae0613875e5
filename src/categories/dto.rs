use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::repo::{Category, CategoryChanges, CategoryFields};
use crate::{error::AppResult, sheets::SheetRow, validate};

const MAX_NAME: usize = 50;
const MAX_DESCRIPTION: usize = 1000;

/// Body of create and update, and one record of a CSV import.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl CategoryRequest {
    pub fn into_fields(self) -> AppResult<CategoryFields> {
        Ok(CategoryFields {
            name: validate::required(self.name, "name", MAX_NAME)?,
            description: validate::required(self.description, "description", MAX_DESCRIPTION)?,
        })
    }

    pub fn into_changes(self) -> AppResult<CategoryChanges> {
        Ok(CategoryChanges {
            name: validate::optional(self.name, "name", MAX_NAME)?,
            description: validate::optional(self.description, "description", MAX_DESCRIPTION)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CategorySheetRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: String,
    pub description: String,
    pub created_at: String,
}

impl SheetRow for CategorySheetRow {
    const HEADERS: &'static [&'static str] =
        &["id", "name", "slug", "image", "description", "created_at"];
}

impl From<Category> for CategorySheetRow {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
            image: c.image,
            description: c.description,
            created_at: c.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}
