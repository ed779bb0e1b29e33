use reelsmith_core::artifact::{
    ArtifactError, ArtifactName, ArtifactStore, FsArtifactStore, MemoryArtifactStore,
};

/// Behaviour every store must share.
async fn exercise(store: &dyn ArtifactStore) {
    assert!(!store.exists(&ArtifactName::Script).await.unwrap());
    assert!(matches!(
        store.read(&ArtifactName::Script).await,
        Err(ArtifactError::NotFound(_))
    ));

    store.write_text(&ArtifactName::Script, "first").await.unwrap();
    store.write_text(&ArtifactName::Script, "second").await.unwrap();
    store
        .write(&ArtifactName::FinalVideo, &[0u8, 1, 2, 3])
        .await
        .unwrap();

    assert_eq!(store.read_text(&ArtifactName::Script).await.unwrap(), "second");

    let entries = store.list().await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["final_video.mp4", "video_script.txt"]);
    assert_eq!(entries[0].size, 4);
    assert_eq!(entries[1].size, 6);

    assert_eq!(
        store.path_of(&ArtifactName::FinalVideo).file_name().unwrap(),
        "final_video.mp4"
    );
}

#[tokio::test]
async fn filesystem_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    exercise(&store).await;
    assert!(dir.path().join("final_video.mp4").is_file());
}

#[tokio::test]
async fn memory_store_contract() {
    let store = MemoryArtifactStore::new();
    exercise(&store).await;
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn custom_names_cannot_escape_the_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();

    for bad in ["../etc/passwd", "..", "a/b.mp4", ".hidden", ""] {
        assert!(
            matches!(ArtifactName::custom(bad), Err(ArtifactError::InvalidName(_))),
            "{bad:?}"
        );
    }
    assert!(store.scoped("../escape").is_err());

    let name = ArtifactName::custom("final_video.mp4").unwrap();
    assert_eq!(name, ArtifactName::FinalVideo);
}
