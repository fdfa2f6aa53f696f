use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use vigil_storage::atomic::{atomic_write, temp_path};
use vigil_storage::{RepositoryStore, REPOSITORY_SUFFIX};

// ── RepositoryStore ──────────────────────────────────────────────

#[test]
fn path_is_hash_of_endpoint() {
    let store = RepositoryStore::new("/var/lib/vigil/repository");
    let path = store.path_for("sat-1.example.org");
    let file_name = path.file_name().unwrap().to_str().unwrap();

    assert!(file_name.ends_with(REPOSITORY_SUFFIX));
    let stem = file_name.trim_end_matches(REPOSITORY_SUFFIX);
    assert_eq!(stem.len(), 64);
    assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!file_name.contains("sat-1"));
}

#[test]
fn path_is_stable_and_distinct() {
    let store = RepositoryStore::new("repo");
    assert_eq!(store.path_for("a"), store.path_for("a"));
    assert_ne!(store.path_for("a"), store.path_for("b"));
    assert_eq!(
        store.path_for("").file_name().unwrap().to_str().unwrap(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.repo"
    );
}

#[tokio::test]
async fn write_then_read() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(dir.path().join("repository"));
    let payload = json!({ "endpoint": "sat-1", "repository": { "h1": ["disk"] } });

    let path = store.write("sat-1", &payload).await.unwrap();

    assert!(path.exists());
    assert_eq!(store.read("sat-1").await.unwrap(), Some(payload));
    assert!(!temp_path(&path).exists());
}

#[tokio::test]
async fn read_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(dir.path());
    assert_eq!(store.read("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn write_overwrites_previous() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(dir.path());

    store.write("sat-1", &json!({ "seen": 1 })).await.unwrap();
    store.write("sat-1", &json!({ "seen": 2 })).await.unwrap();

    assert_eq!(store.read("sat-1").await.unwrap(), Some(json!({ "seen": 2 })));
}

// ── atomic ───────────────────────────────────────────────────────

#[test]
fn temp_path_appends_suffix() {
    assert_eq!(
        temp_path(std::path::Path::new("/tmp/state.dat")),
        std::path::PathBuf::from("/tmp/state.dat.tmp")
    );
}

#[tokio::test]
async fn atomic_write_creates_parents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a").join("b").join("file.json");

    atomic_write(&path, b"{}").await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"{}");
}

#[tokio::test]
async fn failed_atomic_write_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("taken");
    std::fs::create_dir(&target).unwrap();

    assert!(atomic_write(&target, b"{}").await.is_err());

    assert!(!temp_path(&target).exists());
    assert!(target.is_dir());
}
