use std::time::Duration;

use axum::extract::Multipart;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    storage::ObjectStore,
};

/// Stored key of an avatar or photo that was never uploaded.
pub const DEFAULT_PHOTO: &str = "no-photo.jpg";

/// How long presigned photo links stay valid.
pub const PRESIGN_TTL: Duration = Duration::from_secs(30 * 60);

/// Request body cap for upload routes. The per-image cap is `MAX_FILE_UPLOAD`.
pub const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// An image taken from the `file` field of a multipart request.
#[derive(Debug)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
}

/// Reads the `file` field, rejecting anything that is not `image/*` or is
/// larger than `max_bytes`.
pub async fn read_image_field(mp: &mut Multipart, max_bytes: usize) -> AppResult<ImageUpload> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !content_type.starts_with("image") {
            return Err(AppError::validation("Please upload an image file"));
        }
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("Malformed upload: {}", e)))?;
        if body.len() > max_bytes {
            return Err(AppError::validation(format!(
                "Please upload an image less than {} bytes",
                max_bytes
            )));
        }
        return Ok(ImageUpload { body, content_type });
    }
    Err(AppError::validation("Please upload a file"))
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub fn is_placeholder(key: &str) -> bool {
    key.is_empty() || key == DEFAULT_PHOTO
}

/// Object key for the photo of `owner` under `prefix`, e.g. `avatars/photo_<id>.png`.
pub fn photo_key(prefix: &str, owner: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("{}/photo_{}.{}", prefix, owner, ext)
}

/// Uploads the image and returns its key. The previous object is removed when
/// it lived under a different key; failing to remove it is only logged.
pub async fn replace_photo(
    storage: &dyn ObjectStore,
    prefix: &str,
    owner: Uuid,
    previous: &str,
    upload: ImageUpload,
) -> AppResult<String> {
    let key = photo_key(prefix, owner, &upload.content_type);
    storage
        .put(&key, upload.body, &upload.content_type)
        .await
        .map_err(|e| AppError::dependency("Problem with file upload", e))?;

    if previous != key && !is_placeholder(previous) {
        if let Err(e) = storage.remove(previous).await {
            warn!(error = %e, key = %previous, "failed to delete replaced photo");
        }
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::FakeStorage;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn photo_key_uses_owner_and_extension() {
        let id = Uuid::nil();
        assert_eq!(
            photo_key("avatars", id, "image/png"),
            format!("avatars/photo_{}.png", id)
        );
        assert!(photo_key("projects", id, "image/x-unknown").ends_with(".bin"));
    }

    #[tokio::test]
    async fn replace_photo_deletes_the_old_object() {
        let storage = FakeStorage::default();
        let id = Uuid::new_v4();
        let upload = ImageUpload {
            body: Bytes::from_static(b"png"),
            content_type: "image/png".into(),
        };
        let key = replace_photo(&storage, "avatars", id, "avatars/old.jpg", upload)
            .await
            .unwrap();
        assert_eq!(key, format!("avatars/photo_{}.png", id));
        assert!(storage.contains(&key));
        assert_eq!(storage.deleted(), vec!["avatars/old.jpg".to_string()]);
    }

    #[tokio::test]
    async fn replace_photo_keeps_the_default_placeholder() {
        let storage = FakeStorage::default();
        let upload = ImageUpload {
            body: Bytes::from_static(b"jpg"),
            content_type: "image/jpeg".into(),
        };
        replace_photo(&storage, "avatars", Uuid::new_v4(), DEFAULT_PHOTO, upload)
            .await
            .unwrap();
        assert!(storage.deleted().is_empty());
    }
}
