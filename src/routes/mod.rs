pub mod auth;
pub mod comments;
pub mod health;
pub mod posts;

use axum::extract::multipart::Field;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::media::Upload;

/// `{"message": ...}` acknowledgement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Buffer a multipart file field in memory.
pub(crate) async fn read_upload(field: Field<'_>) -> AppResult<Upload> {
    let content_type = field.content_type().map(str::to_string);
    let file_name = field.file_name().map(str::to_string);
    let data = field.bytes().await?;
    Ok(Upload {
        data,
        content_type,
        file_name,
    })
}
