use serde::Deserialize;

use super::repo::{MessageChanges, NewMessage};
use crate::{
    auth::services::validate_email,
    error::AppResult,
    response::Pagination,
    validate,
};

const MAX_NAME: usize = 50;
const MAX_PHONE: usize = 20;
const MAX_MESSAGE: usize = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    /// Ignored on create.
    pub is_contacted: Option<bool>,
}

impl MessageRequest {
    pub fn into_new(self) -> AppResult<NewMessage> {
        Ok(NewMessage {
            name: validate::required(self.name, "name", MAX_NAME)?,
            email: validate_email(self.email)?,
            phone: validate::bounded(self.phone, "phone", MAX_PHONE)?.unwrap_or_default(),
            message: validate::required(self.message, "message", MAX_MESSAGE)?,
        })
    }

    pub fn into_changes(self) -> AppResult<MessageChanges> {
        let email = match self.email {
            Some(e) => Some(validate_email(Some(e))?),
            None => None,
        };
        Ok(MessageChanges {
            name: validate::optional(self.name, "name", MAX_NAME)?,
            email,
            phone: validate::bounded(self.phone, "phone", MAX_PHONE)?,
            message: validate::optional(self.message, "message", MAX_MESSAGE)?,
            is_contacted: self.is_contacted,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageListQuery {
    pub contacted: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MessageListQuery {
    pub fn page(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
        .normalized()
    }
}
