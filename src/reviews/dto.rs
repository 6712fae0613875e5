use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::repo::{NewReview, Review, ReviewChanges, ReviewFields};
use crate::{
    error::{AppError, AppResult},
    sheets::SheetRow,
    validate,
};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 10;
const MAX_TITLE: usize = 100;
const MAX_COMMENT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i32>,
}

fn check_rating(rating: i32) -> AppResult<i32> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::validation(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(rating)
}

impl ReviewRequest {
    pub fn into_fields(self) -> AppResult<ReviewFields> {
        Ok(ReviewFields {
            title: validate::required(self.title, "title", MAX_TITLE)?,
            comment: validate::required(self.comment, "comment", MAX_COMMENT)?,
            rating: check_rating(self.rating.ok_or_else(|| validate::missing("rating"))?)?,
        })
    }

    pub fn into_changes(self) -> AppResult<ReviewChanges> {
        Ok(ReviewChanges {
            title: validate::optional(self.title, "title", MAX_TITLE)?,
            comment: validate::optional(self.comment, "comment", MAX_COMMENT)?,
            rating: self.rating.map(check_rating).transpose()?,
        })
    }
}

/// One record of a review import. Imported reviews name their author.
#[derive(Debug, Deserialize)]
pub struct ReviewImportRow {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i32>,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl ReviewImportRow {
    pub fn into_new(self) -> AppResult<NewReview> {
        let fields = ReviewRequest {
            title: self.title,
            comment: self.comment,
            rating: self.rating,
        }
        .into_fields()?;
        Ok(NewReview {
            project_id: self.project_id.ok_or_else(|| validate::missing("project"))?,
            user_id: self
                .user_id
                .ok_or_else(|| AppError::validation("Please add a user"))?,
            fields,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewSheetRow {
    pub id: Uuid,
    pub title: String,
    pub comment: String,
    pub rating: i32,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub created_at: String,
}

impl SheetRow for ReviewSheetRow {
    const HEADERS: &'static [&'static str] = &[
        "id",
        "title",
        "comment",
        "rating",
        "project_id",
        "user_id",
        "created_at",
    ];
}

impl From<Review> for ReviewSheetRow {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            title: r.title,
            comment: r.comment,
            rating: r.rating,
            project_id: r.project_id,
            user_id: r.user_id,
            created_at: r.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(check_rating(0).is_err());
        assert_eq!(check_rating(1).unwrap(), 1);
        assert_eq!(check_rating(10).unwrap(), 10);
        assert!(check_rating(11).is_err());
    }

    #[test]
    fn create_needs_every_field() {
        let err = ReviewRequest {
            title: Some("Great".into()),
            comment: Some("Lovely light".into()),
            rating: None,
        }
        .into_fields()
        .unwrap_err();
        assert_eq!(err.to_string(), "Please add a rating");

        let err = ReviewRequest {
            title: Some("Great".into()),
            comment: Some("c".repeat(501)),
            rating: Some(8),
        }
        .into_fields()
        .unwrap_err();
        assert_eq!(err.to_string(), "Comment can not be more than 500 characters");
    }

    #[test]
    fn import_row_names_project_and_author() {
        let row = || ReviewImportRow {
            title: Some("Great".into()),
            comment: Some("Lovely light".into()),
            rating: Some(9),
            project_id: Some(Uuid::new_v4()),
            user_id: Some(Uuid::new_v4()),
        };
        let ok = row().into_new().unwrap();
        assert_eq!(ok.fields.rating, 9);

        let err = ReviewImportRow { user_id: None, ..row() }.into_new().unwrap_err();
        assert_eq!(err.to_string(), "Please add a user");
        let err = ReviewImportRow { project_id: None, ..row() }.into_new().unwrap_err();
        assert_eq!(err.to_string(), "Please add a project");
        let err = ReviewImportRow { rating: Some(12), ..row() }.into_new().unwrap_err();
        assert_eq!(err.to_string(), "Rating must be between 1 and 10");
    }
}
