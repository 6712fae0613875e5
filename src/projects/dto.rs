use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use super::repo::{NewProject, Project, ProjectChanges, ProjectFields};
use crate::{
    error::{AppError, AppResult},
    response::Pagination,
    sheets::SheetRow,
    validate,
};

const MAX_NAME: usize = 50;
const MAX_DESCRIPTION: usize = 1000;
const MAX_ADDRESS: usize = 200;
const MAX_SHORT: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub address: Option<String>,
    pub architecture: Option<String>,
    pub client: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub complete_day: Option<OffsetDateTime>,
    pub area: Option<f64>,
    /// Only read by `POST /projects`; the nested route takes it from the path.
    pub category_id: Option<Uuid>,
}

fn check_cost(cost: f64) -> AppResult<f64> {
    if !cost.is_finite() || cost < 1.0 {
        return Err(AppError::validation("Cost must be at least 1"));
    }
    Ok(cost)
}

fn check_area(area: f64) -> AppResult<f64> {
    if !area.is_finite() || area <= 0.0 {
        return Err(AppError::validation("Area must be positive"));
    }
    Ok(area)
}

impl ProjectRequest {
    pub fn into_fields(self) -> AppResult<ProjectFields> {
        Ok(ProjectFields {
            name: validate::required(self.name, "name", MAX_NAME)?,
            description: validate::required(self.description, "description", MAX_DESCRIPTION)?,
            cost: check_cost(self.cost.ok_or_else(|| validate::missing("cost"))?)?,
            address: validate::required(self.address, "address", MAX_ADDRESS)?,
            architecture: validate::required(self.architecture, "architecture", MAX_SHORT)?,
            client: validate::required(self.client, "client", MAX_SHORT)?,
            complete_day: self.complete_day,
            area: check_area(self.area.ok_or_else(|| validate::missing("area"))?)?,
        })
    }

    pub fn into_changes(self) -> AppResult<ProjectChanges> {
        Ok(ProjectChanges {
            name: validate::optional(self.name, "name", MAX_NAME)?,
            description: validate::optional(self.description, "description", MAX_DESCRIPTION)?,
            cost: self.cost.map(check_cost).transpose()?,
            address: validate::optional(self.address, "address", MAX_ADDRESS)?,
            architecture: validate::optional(self.architecture, "architecture", MAX_SHORT)?,
            client: validate::optional(self.client, "client", MAX_SHORT)?,
            complete_day: self.complete_day,
            area: self.area.map(check_area).transpose()?,
            category_id: self.category_id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    pub category: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ProjectListQuery {
    pub fn page(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
        .normalized()
    }
}

/// One record of a project import. `complete_day` takes `2024-05-01` or a
/// full RFC 3339 timestamp.
#[derive(Debug, Deserialize)]
pub struct ProjectImportRow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub address: Option<String>,
    pub architecture: Option<String>,
    pub client: Option<String>,
    pub complete_day: Option<String>,
    pub area: Option<f64>,
    pub category_id: Option<Uuid>,
}

impl ProjectImportRow {
    pub fn into_new(self) -> AppResult<NewProject> {
        let category_id = self.category_id.ok_or_else(|| validate::missing("category"))?;
        let complete_day = validate::optional_day(self.complete_day, "complete day")?;
        let fields = ProjectRequest {
            name: self.name,
            description: self.description,
            cost: self.cost,
            address: self.address,
            architecture: self.architecture,
            client: self.client,
            complete_day,
            area: self.area,
            category_id: None,
        }
        .into_fields()?;
        let slug = validate::slugify(&fields.name);
        Ok(NewProject {
            category_id,
            fields,
            slug,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectSheetRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub cost: f64,
    pub address: String,
    pub architecture: String,
    pub client: String,
    pub complete_day: String,
    pub area: f64,
    pub average_rating: Option<f64>,
    pub photo: String,
    pub category_id: Uuid,
    pub created_at: String,
}

impl SheetRow for ProjectSheetRow {
    const HEADERS: &'static [&'static str] = &[
        "id",
        "name",
        "slug",
        "description",
        "cost",
        "address",
        "architecture",
        "client",
        "complete_day",
        "area",
        "average_rating",
        "photo",
        "category_id",
        "created_at",
    ];
}

impl From<Project> for ProjectSheetRow {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            slug: p.slug,
            description: p.description,
            cost: p.cost,
            address: p.address,
            architecture: p.architecture,
            client: p.client,
            complete_day: p.complete_day.format(&Rfc3339).unwrap_or_default(),
            area: p.area,
            average_rating: p.average_rating,
            photo: p.photo,
            category_id: p.category_id,
            created_at: p.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}
