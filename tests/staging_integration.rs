//! Staging ground integration tests: replace semantics, commit atomicity,
//! validation gating and persistence across restarts

mod common;

use common::{staging, FakeRemote};
use dak_engine::cache::api::KeyValueStore;
use dak_engine::remote::api::RepositoryRef;
use dak_engine::staging::api::{SessionState, Severity, StagingError, StagingGround};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const ACTORS: &str = "input/fsh/actors.fsh";
const CONFIG: &str = "input/config.json";
const NOTES: &str = "input/notes.md";

fn repo() -> RepositoryRef {
    RepositoryRef::new("who", "smart-demo")
}

fn fsh(name: &str) -> Vec<u8> {
    format!("Profile: {}\nParent: Patient\n", name).into_bytes()
}

/// Remote with the actors and config files already present
fn seeded() -> (Arc<FakeRemote>, String, String) {
    let remote = FakeRemote::new();
    let actors_fp = remote.put_file("who", "smart-demo", ACTORS, "Profile: Old\n");
    let config_fp = remote.put_file("who", "smart-demo", CONFIG, "{}");
    (remote, actors_fp, config_fp)
}

#[tokio::test]
async fn test_restaging_a_path_replaces_it() {
    let (remote, actors_fp, _) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("First"), Some(actors_fp.clone()), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", "/input/fsh/actors.fsh", fsh("Second"), Some(actors_fp), "cli")
        .await
        .unwrap();

    let session = ground.session(&repo(), "main").await.unwrap().unwrap();
    assert_eq!(session.file_count(), 1);
    assert_eq!(session.files[ACTORS].content, fsh("Second"));
    assert_eq!(session.files[ACTORS].editor, "cli");
    assert_eq!(ground.state(&repo(), "main").unwrap(), SessionState::Dirty);
}

#[tokio::test]
async fn test_sessions_are_per_branch() {
    let (remote, actors_fp, _) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("Main"), Some(actors_fp), "web")
        .await
        .unwrap();

    assert!(ground.session(&repo(), "feature").await.unwrap().is_none());
    assert_eq!(ground.state(&repo(), "feature").unwrap(), SessionState::Empty);
    let keys: Vec<String> = ground
        .sessions()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(keys, vec!["who/smart-demo@main"]);
}

#[tokio::test]
async fn test_commit_writes_every_file_and_clears_session() {
    let (remote, actors_fp, config_fp) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("Updated"), Some(actors_fp.clone()), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", CONFIG, br#"{"id":"demo"}"#.to_vec(), Some(config_fp), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", NOTES, b"# Notes\n".to_vec(), None, "web")
        .await
        .unwrap();

    let result = ground
        .commit(&repo(), "main", Some("Update demo"), false)
        .await
        .unwrap();

    assert_eq!(result.message, "Update demo");
    assert_eq!(result.files.len(), 3);
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 3);
    let actors = remote.file("who", "smart-demo", ACTORS).unwrap();
    assert_eq!(actors.content, fsh("Updated"));
    assert_ne!(actors.fingerprint, actors_fp);
    assert!(remote.file("who", "smart-demo", NOTES).is_some());

    assert!(ground.session(&repo(), "main").await.unwrap().is_none());
    assert_eq!(ground.state(&repo(), "main").unwrap(), SessionState::Empty);
    assert!(ground.sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_conflict_writes_nothing() {
    let (remote, actors_fp, config_fp) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("Mine"), Some(actors_fp), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", CONFIG, b"{\"a\":1}".to_vec(), Some(config_fp), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", NOTES, b"new".to_vec(), None, "web")
        .await
        .unwrap();

    remote.put_file("who", "smart-demo", CONFIG, "{\"b\":2}");
    remote.put_file("who", "smart-demo", NOTES, "created elsewhere");

    let err = ground.commit(&repo(), "main", None, true).await.unwrap_err();
    match err {
        StagingError::Conflict { session, paths } => {
            assert_eq!(session, "who/smart-demo@main");
            assert_eq!(paths, vec![CONFIG.to_string(), NOTES.to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        remote.file("who", "smart-demo", ACTORS).unwrap().content,
        b"Profile: Old\n".to_vec()
    );
    let session = ground.session(&repo(), "main").await.unwrap().unwrap();
    assert_eq!(session.file_count(), 3);
}

#[tokio::test]
async fn test_remote_drift_is_reported_as_conflict() {
    let (remote, actors_fp, config_fp) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("Mine"), Some(actors_fp), "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", CONFIG, b"{\"a\":1}".to_vec(), Some(config_fp), "web")
        .await
        .unwrap();
    remote.put_file("who", "smart-demo", ACTORS, "Profile: Theirs\n");

    let validation = ground.validate(&repo(), "main").await.unwrap();
    assert!(!validation.blocks_commit(false));
    assert_eq!(validation.warning_count, 0);
    assert!(validation
        .issues
        .iter()
        .any(|issue| issue.path == ACTORS
            && issue.severity == Severity::Info
            && issue.message.contains("changed remotely")));

    let err = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    match err {
        StagingError::Conflict { paths, .. } => assert_eq!(paths, vec![ACTORS.to_string()]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(ground.session(&repo(), "main").await.unwrap().unwrap().file_count(), 2);
}

#[tokio::test]
async fn test_remote_deletion_is_reported_as_conflict() {
    let (remote, actors_fp, _) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, fsh("Mine"), Some(actors_fp), "web")
        .await
        .unwrap();
    remote.delete_file("who", "smart-demo", ACTORS);

    let err = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    assert!(matches!(err, StagingError::Conflict { .. }));
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_errors_block_even_when_warnings_allowed() {
    let (remote, _, config_fp) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", CONFIG, b"{ not json".to_vec(), Some(config_fp), "web")
        .await
        .unwrap();

    let err = ground.commit(&repo(), "main", None, true).await.unwrap_err();
    match err {
        StagingError::ValidationBlocked(result) => {
            assert!(result.has_errors());
            assert_eq!(result.blocking_issues.len(), 1);
            assert_eq!(result.blocking_issues[0].severity, Severity::Error);
            assert_eq!(result.blocking_issues[0].path, CONFIG);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
    assert!(ground.session(&repo(), "main").await.unwrap().is_some());
}

#[tokio::test]
async fn test_warnings_pass_when_allowed() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", "input/fsh/empty.fsh", b"  \n".to_vec(), None, "web")
        .await
        .unwrap();

    let blocked = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    assert!(matches!(blocked, StagingError::ValidationBlocked(ref r) if !r.has_errors()));

    let result = ground.commit(&repo(), "main", None, true).await.unwrap();
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.message, "Update 1 file(s) via DAK staging");
}

#[tokio::test]
async fn test_unchanged_content_is_informational() {
    let (remote, actors_fp, _) = seeded();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", ACTORS, b"Profile: Old\n".to_vec(), Some(actors_fp), "web")
        .await
        .unwrap();

    let validation = ground.validate(&repo(), "main").await.unwrap();
    assert_eq!(validation.info_count, 1);
    assert!(!validation.blocks_commit(false));
}

#[tokio::test]
async fn test_partial_commit_keeps_unwritten_files() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    for path in ["a.json", "b.json", "c.json"] {
        ground
            .stage_file(&repo(), "main", path, b"{}".to_vec(), None, "web")
            .await
            .unwrap();
    }
    remote.fail_writes_to("b.json");

    let err = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    match err {
        StagingError::PartialCommit {
            written,
            failed_path,
            ..
        } => {
            assert_eq!(written, vec!["a.json".to_string()]);
            assert_eq!(failed_path, "b.json");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let session = ground.session(&repo(), "main").await.unwrap().unwrap();
    let remaining: Vec<&str> = session.files.keys().map(String::as_str).collect();
    assert_eq!(remaining, vec!["b.json", "c.json"]);
    assert!(remote.file("who", "smart-demo", "a.json").is_some());
}

#[tokio::test]
async fn test_first_write_failure_is_not_partial() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    remote.fail_writes_to("a.json");

    let err = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    assert!(matches!(err, StagingError::Remote(_)));
    assert_eq!(
        ground.session(&repo(), "main").await.unwrap().unwrap().file_count(),
        1
    );
}

#[tokio::test]
async fn test_nothing_to_commit() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    let err = ground.commit(&repo(), "main", None, false).await.unwrap_err();
    assert!(matches!(err, StagingError::NothingToCommit { .. }));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_draft_message_is_used() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    assert!(!ground
        .set_commit_message(&repo(), "main", "No session yet")
        .await
        .unwrap());
    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    assert!(ground
        .set_commit_message(&repo(), "main", "Add actor definitions")
        .await
        .unwrap());

    let result = ground.commit(&repo(), "main", None, false).await.unwrap();
    assert_eq!(result.message, "Add actor definitions");
}

#[tokio::test]
async fn test_removing_last_file_destroys_session() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    ground
        .stage_file(&repo(), "main", "b.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();

    assert!(ground.remove_file(&repo(), "main", "a.json").await.unwrap());
    assert!(!ground.remove_file(&repo(), "main", "a.json").await.unwrap());
    assert_eq!(ground.sessions().unwrap().len(), 1);

    assert!(ground.remove_file(&repo(), "main", "b.json").await.unwrap());
    assert!(ground.session(&repo(), "main").await.unwrap().is_none());
    assert!(ground.sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_discard_all() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    for path in ["a.json", "b.json"] {
        ground
            .stage_file(&repo(), "main", path, b"{}".to_vec(), None, "web")
            .await
            .unwrap();
    }

    assert_eq!(ground.discard_all(&repo(), "main").await.unwrap(), 2);
    assert_eq!(ground.discard_all(&repo(), "main").await.unwrap(), 0);
    assert!(ground.sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_paths_are_rejected() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = staging(&remote, &store);

    let err = ground
        .stage_file(&repo(), "main", "input/../../etc/passwd", b"x".to_vec(), None, "web")
        .await
        .unwrap_err();
    assert!(matches!(err, StagingError::InvalidPath { .. }));
    assert!(ground.sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_sessions_survive_restart() {
    let remote = FakeRemote::new();
    let store = common::memory_store();

    {
        let ground = staging(&remote, &store);
        ground
            .stage_file(&repo(), "main", "a.json", br#"{"x":1}"#.to_vec(), None, "web")
            .await
            .unwrap();
        ground
            .set_commit_message(&repo(), "main", "Persisted draft")
            .await
            .unwrap();
        ground
            .stage_file(&repo(), "develop", "b.json", b"{}".to_vec(), None, "web")
            .await
            .unwrap();
    }

    let restarted = staging(&remote, &store);
    assert_eq!(restarted.restore().unwrap(), 2);
    assert_eq!(restarted.restore().unwrap(), 0);

    let session = restarted.session(&repo(), "main").await.unwrap().unwrap();
    assert_eq!(session.files["a.json"].content, br#"{"x":1}"#.to_vec());
    assert_eq!(session.commit_message_draft, "Persisted draft");
    assert_eq!(restarted.state(&repo(), "develop").unwrap(), SessionState::Dirty);
}

#[tokio::test]
async fn test_sessions_load_lazily_without_restore() {
    let remote = FakeRemote::new();
    let store = common::memory_store();

    staging(&remote, &store)
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();

    let restarted = staging(&remote, &store);
    let result = restarted.commit(&repo(), "main", None, false).await.unwrap();
    assert_eq!(result.files.len(), 1);
}

#[tokio::test]
async fn test_unreadable_session_record_can_be_discarded() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    store.put("staging:who/smart-demo@main", b"not json").unwrap();

    let ground = staging(&remote, &store);
    assert!(ground.session(&repo(), "main").await.unwrap().is_none());
    assert_eq!(ground.discard_all(&repo(), "main").await.unwrap(), 0);
    assert!(ground.sessions().unwrap().is_empty());

    store.put("staging:who/smart-demo@main", b"not json").unwrap();
    let ground = staging(&remote, &store);
    assert_eq!(ground.restore().unwrap(), 0);
    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    let restarted = staging(&remote, &store);
    let session = restarted.session(&repo(), "main").await.unwrap().unwrap();
    assert_eq!(session.file_count(), 1);
}

/// Wait until the commit running in the background holds the session lock
async fn wait_for_commit(ground: &StagingGround) {
    while ground.state(&repo(), "main").unwrap() != SessionState::Committing {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_staging_waits_for_running_commit() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = Arc::new(staging(&remote, &store));
    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    remote.make_slow("who", "smart-demo");

    let committing = Arc::clone(&ground);
    let commit = tokio::spawn(async move {
        committing.commit(&repo(), "main", Some("First"), false).await
    });
    wait_for_commit(&ground).await;

    ground
        .stage_file(&repo(), "main", "b.json", b"{}".to_vec(), None, "cli")
        .await
        .unwrap();

    let result = commit.await.unwrap().unwrap();
    let written: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(written, vec!["a.json"]);
    assert!(remote.file("who", "smart-demo", "b.json").is_none());

    let session = ground.session(&repo(), "main").await.unwrap().unwrap();
    let staged: Vec<&str> = session.files.keys().map(String::as_str).collect();
    assert_eq!(staged, vec!["b.json"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commits_write_once() {
    let remote = FakeRemote::new();
    let store = common::memory_store();
    let ground = Arc::new(staging(&remote, &store));
    ground
        .stage_file(&repo(), "main", "a.json", b"{}".to_vec(), None, "web")
        .await
        .unwrap();
    remote.make_slow("who", "smart-demo");

    let commits: Vec<_> = (0..2)
        .map(|_| {
            let ground = Arc::clone(&ground);
            tokio::spawn(async move { ground.commit(&repo(), "main", None, false).await })
        })
        .collect();

    let mut committed = 0;
    let mut empty = 0;
    for commit in commits {
        match commit.await.unwrap() {
            Ok(result) => {
                assert_eq!(result.files.len(), 1);
                committed += 1;
            }
            Err(StagingError::NothingToCommit { .. }) => empty += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((committed, empty), (1, 1));
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 1);
}
