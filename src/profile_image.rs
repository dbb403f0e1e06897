//! Replacing a user's profile image.
//!
//! The new image is stored first and then attached to the user. If the
//! identity update fails the new image is removed again; once it succeeds the
//! previous image is no longer referenced and is deleted.

use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;

use crate::engine::{StorageEngine, StorageError};
use crate::metadata::{FileRecord, FileRepository, Visibility};
use crate::policy::Actor;
use crate::remote::IdentityService;

static IMAGE_CONTENT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^image/[a-z0-9.+-]{2,}").expect("valid image content type pattern"));

/// Content types accepted as profile images.
pub fn image_filter() -> Regex {
    IMAGE_CONTENT_TYPE.clone()
}

pub async fn replace_profile_image(
    engine: &StorageEngine,
    repo: &dyn FileRepository,
    identity: &dyn IdentityService,
    actor: &Actor,
    content: Bytes,
    filename: &str,
) -> Result<FileRecord, StorageError> {
    let image = engine
        .upload(content, filename, &actor.uid, Visibility::Public, Some(image_filter()))
        .await?;

    if let Err(e) = identity.update_profile_image_id(&actor.uid, image.id).await {
        tracing::error!(user_id = %actor.uid, file_id = image.id, error = %e, "Failed to update profile image");
        if let Err(cleanup) = engine.delete(&image).await {
            tracing::error!(
                user_id = %actor.uid,
                file_id = image.id,
                error = %cleanup,
                "Failed to delete unused profile image"
            );
        }
        return Err(e.into());
    }

    if let Some(previous_id) = actor.profile_image_id.filter(|id| *id != image.id) {
        remove_previous_image(engine, repo, actor, previous_id).await;
    }

    tracing::info!(user_id = %actor.uid, file_id = image.id, "Profile image replaced");
    Ok(image)
}

/// The swap already succeeded, so a failure here only leaves an unreferenced
/// file behind.
async fn remove_previous_image(
    engine: &StorageEngine,
    repo: &dyn FileRepository,
    actor: &Actor,
    previous_id: u64,
) {
    let previous = match repo.find_by_id(previous_id) {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            tracing::warn!(user_id = %actor.uid, file_id = previous_id, "Previous profile image not found");
            return;
        }
        Err(e) => {
            tracing::error!(user_id = %actor.uid, file_id = previous_id, error = %e, "Failed to load previous profile image");
            return;
        }
    };

    if let Err(e) = engine.delete(&previous).await {
        tracing::error!(user_id = %actor.uid, file_id = previous_id, error = %e, "Failed to delete previous profile image");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::{BackendKind, Database};
    use crate::storage::FilesystemBackend;
    use crate::testutil::{FakeIdentity, FakeQuota};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    fn setup(dir: &tempfile::TempDir) -> (Database, StorageEngine) {
        let db = Database::open(dir.path().join("data")).unwrap();
        let repo: Arc<dyn FileRepository> = Arc::new(db.clone());
        let fs = FilesystemBackend::new(dir.path().join("files"), repo.clone()).unwrap();
        let engine = StorageEngine::new(BackendKind::Local, repo, Arc::new(FakeQuota::new(1024, 1024)))
            .with_backend(Arc::new(fs));
        (db, engine)
    }

    #[test]
    fn test_image_filter() {
        let filter = image_filter();
        assert!(filter.is_match("image/png"));
        assert!(filter.is_match("image/x-icon"));
        assert!(!filter.is_match("text/plain; charset=utf-8"));
        assert!(!filter.is_match("application/pdf"));
    }

    #[tokio::test]
    async fn test_first_profile_image() {
        let dir = tempfile::tempdir().unwrap();
        let (db, engine) = setup(&dir);
        let identity = FakeIdentity::with_users([Actor::new("c1", "client")]);
        let actor = identity.user("c1").unwrap();

        let image = replace_profile_image(&engine, &db, &identity, &actor, Bytes::from_static(PNG), "me.png")
            .await
            .unwrap();

        assert_eq!(image.content_type, "image/png");
        assert!(!image.is_private());
        assert_eq!(identity.user("c1").unwrap().profile_image_id, Some(image.id));
    }

    #[tokio::test]
    async fn test_replacing_deletes_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let (db, engine) = setup(&dir);
        let identity = FakeIdentity::with_users([Actor::new("c1", "client")]);

        let actor = identity.user("c1").unwrap();
        let first = replace_profile_image(&engine, &db, &identity, &actor, Bytes::from_static(PNG), "a.png")
            .await
            .unwrap();

        let actor = identity.user("c1").unwrap();
        let second = replace_profile_image(&engine, &db, &identity, &actor, Bytes::from_static(PNG), "b.png")
            .await
            .unwrap();

        assert_eq!(db.find_file(first.id).unwrap(), None);
        assert!(db.find_file(second.id).unwrap().is_some());
        assert_eq!(identity.user("c1").unwrap().profile_image_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_identity_failure_removes_new_image() {
        let dir = tempfile::tempdir().unwrap();
        let (db, engine) = setup(&dir);
        let identity = FakeIdentity::with_users([Actor::new("c1", "client")]);
        identity.fail_updates(true);
        let actor = identity.user("c1").unwrap();

        let err = replace_profile_image(&engine, &db, &identity, &actor, Bytes::from_static(PNG), "me.png")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::RemoteLookup(_)));
        assert!(db.get_all_files().unwrap().is_empty());
        assert_eq!(identity.user("c1").unwrap().profile_image_id, None);
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let (db, engine) = setup(&dir);
        let identity = FakeIdentity::with_users([Actor::new("c1", "client")]);
        let actor = identity.user("c1").unwrap();

        let err = replace_profile_image(&engine, &db, &identity, &actor, Bytes::from_static(b"not an image"), "me.png")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::UnsupportedContentType(_)));
        assert!(db.get_all_files().unwrap().is_empty());
    }
}
