use chrono::Utc;
use pretty_assertions::assert_eq;
use warden_credentials::Fingerprint;
use warden_queue::{
    Applied, Artifact, Decision, FileSystemArchive, FileSystemPolicyQueue, PolicyQueueProcessor,
    PolicyQueueStore, QueueEntry, QueueError, Suite, SuiteCatalog,
};

fn moderator() -> Fingerprint {
    Fingerprint::from([0x0a; 20])
}

fn stage(archive: &FileSystemArchive, entry: &QueueEntry) -> anyhow::Result<()> {
    for artifact in &entry.artifacts {
        let path = archive.queued_path(&entry.queue, &artifact.filename)?;
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, format!("contents of {}", artifact.filename))?;
    }
    Ok(())
}

#[tokio::test]
async fn it_promotes_an_accepted_upload_through_the_suite_override() -> anyhow::Result<()> {
    let tempdir = tempfile::tempdir()?;
    let store = FileSystemPolicyQueue::new(tempdir.path().join("db")).await?;
    let archive = FileSystemArchive::new(tempdir.path().join("archive"));
    let catalog = SuiteCatalog::new([
        Suite {
            name: "stable".into(),
            override_suite: None,
        },
        Suite {
            name: "stable-new".into(),
            override_suite: Some("stable".into()),
        },
    ]);

    let mut entry = QueueEntry::new("new", "hello", "2.10-3", "stable-new")
        .with_artifact(Artifact::new("source", "main", "hello_2.10-3.dsc"))
        .with_artifact(Artifact::new("amd64", "main", "hello_2.10-3_amd64.deb"));
    catalog.apply_override(&mut entry);
    stage(&archive, &entry)?;
    let key = entry.key();
    store.insert(entry).await?;

    store
        .attach_decision(
            &key,
            Decision::Accepted {
                by: moderator(),
                at: Utc::now(),
                reason: None,
            },
        )
        .await?;

    let report = PolicyQueueProcessor::new(store.clone(), archive.clone())
        .process("new")
        .await?;
    assert_eq!(
        report.applied,
        vec![(
            key.clone(),
            Ok(Applied::Promoted {
                suite: "stable".into()
            })
        )]
    );

    let promoted = archive.pool_path("stable", "main", "hello", "hello_2.10-3_amd64.deb")?;
    assert_eq!(
        std::fs::read_to_string(promoted)?,
        "contents of hello_2.10-3_amd64.deb"
    );
    assert!(
        !tempdir
            .path()
            .join("archive/suites/stable-new")
            .exists()
    );
    assert_eq!(
        store.find("new", "hello", "2.10-3").await,
        Err(QueueError::NotFound(key))
    );
    Ok(())
}

#[tokio::test]
async fn it_retries_a_rejection_once_the_artifacts_appear() -> anyhow::Result<()> {
    let tempdir = tempfile::tempdir()?;
    let store = FileSystemPolicyQueue::new(tempdir.path().join("db")).await?;
    let archive = FileSystemArchive::new(tempdir.path().join("archive"));

    let entry = QueueEntry::new("unchecked", "foo", "1.0", "unstable")
        .with_artifact(Artifact::new("source", "main", "foo_1.0.dsc"));
    let key = entry.key();
    store.insert(entry.clone()).await?;
    store
        .attach_decision(
            &key,
            Decision::Rejected {
                by: moderator(),
                at: Utc::now(),
                reason: Some("not distributable".into()),
            },
        )
        .await?;

    let processor = PolicyQueueProcessor::new(store.clone(), archive.clone());

    // Nothing has been uploaded yet, so the move fails and the entry stays
    let report = processor.process("unchecked").await?;
    assert!(report.has_failures());
    let kept = store.find("unchecked", "foo", "1.0").await?;
    assert_eq!(kept.decision.label(), "rejected");

    stage(&archive, &entry)?;
    let report = processor.process("unchecked").await?;
    assert_eq!(report.applied, vec![(key, Ok(Applied::Rejected))]);
    assert!(store.list("unchecked").await?.is_empty());
    assert!(
        !archive
            .queued_path("unchecked", "foo_1.0.dsc")?
            .exists()
    );
    Ok(())
}
