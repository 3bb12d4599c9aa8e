//! Push and checkout through the HTTP client against a live server.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use ro_sync_core::local::REGISTRY_FILE;
use ro_sync_core::model::METADATA_DIR;
use ro_sync_core::{
    Annotation, ClientConfig, IdentityRegistry, LocalRo, RemoteStore, ResourceId, RosrsClient,
    Subject, SyncEngine, SyncError,
};
use rosync::{router, AppState, TokenStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "roundtrip-token";
const RO_NAME: &str = "RO test ro push";

async fn start_server() -> SocketAddr {
    let app = router(AppState::new(TokenStore::new([TOKEN.to_string()]), None));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn engine(addr: SocketAddr, token: &str) -> SyncEngine<RosrsClient> {
    let config = ClientConfig::new(format!("http://{}/ROs/", addr)).with_token(token);
    SyncEngine::new(RosrsClient::new(config).unwrap())
}

fn id(s: &str) -> ResourceId {
    ResourceId::new(s).unwrap()
}

fn sample_ro(root: &Path) -> LocalRo {
    let mut ro = LocalRo::create(root, RO_NAME).unwrap();
    fs::write(root.join("README.txt"), "readme").unwrap();
    fs::create_dir_all(root.join("subdir1")).unwrap();
    fs::write(root.join("subdir1/subdir1-file.txt"), "first").unwrap();
    fs::create_dir_all(root.join("subdir2")).unwrap();
    fs::write(root.join("subdir2/data.bin"), [0u8, 159, 146, 150]).unwrap();
    ro.add_annotation(Annotation::new(Subject::Ro, "title", RO_NAME))
        .unwrap();
    ro.add_annotation(Annotation::new(
        id("subdir1/subdir1-file.txt").into(),
        "type",
        "Test file",
    ))
    .unwrap();
    ro.add_annotation(Annotation::new(
        id("subdir1/subdir1-file.txt").into(),
        "description",
        "File in test research object",
    ))
    .unwrap();
    ro
}

#[tokio::test]
async fn test_push_then_checkout_reproduces_tree() {
    let addr = start_server().await;
    let engine = engine(addr, TOKEN);
    let temp = TempDir::new().unwrap();
    let source = sample_ro(&temp.path().join("ro-testRoPush"));

    let mut registry = source.load_registry().unwrap();
    let report = engine
        .push(&source, &mut registry, &CancellationToken::new())
        .await
        .unwrap();
    source.save_registry(&registry).unwrap();

    assert_eq!(report.uploaded.len(), 3);
    assert_eq!(report.deleted.len(), 0);
    assert_eq!(report.annotations_pushed.len(), 3);
    assert_eq!(report.annotations_retracted.len(), 0);
    assert!(report.check().is_ok());

    let again = engine
        .push(&source, &mut registry, &CancellationToken::new())
        .await
        .unwrap();
    assert!(again.deleted.is_empty());
    assert!(again.annotations_retracted.is_empty());

    let base = temp.path().join("checkouts");
    let checkout = engine
        .checkout(RO_NAME, &base, false, &CancellationToken::new())
        .await
        .unwrap();
    assert!(checkout.check().is_ok());
    assert_eq!(checkout.resources.len(), 3);
    assert_eq!(checkout.annotations, 3);

    let copy = LocalRo::open(&checkout.root).unwrap();
    let ids = source.list_resources().unwrap();
    assert_eq!(copy.list_resources().unwrap(), ids);
    for resource in &ids {
        assert_eq!(
            copy.read_resource(resource).unwrap(),
            source.read_resource(resource).unwrap()
        );
    }
    assert_eq!(
        fs::read(copy.manifest_path()).unwrap(),
        fs::read(source.manifest_path()).unwrap()
    );
    assert!(source.root().join(METADATA_DIR).join(REGISTRY_FILE).exists());
    assert!(!copy.root().join(METADATA_DIR).join(REGISTRY_FILE).exists());

    let ro = engine.remote().resolve(RO_NAME);
    engine.remote().delete_ro(&ro).await.unwrap();
    assert!(engine.remote().describe(&ro).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_local_deletion_reaches_server() {
    let addr = start_server().await;
    let engine = engine(addr, TOKEN);
    let temp = TempDir::new().unwrap();
    let source = sample_ro(&temp.path().join("ro"));
    let mut registry = IdentityRegistry::new();
    engine
        .push(&source, &mut registry, &CancellationToken::new())
        .await
        .unwrap();

    source.remove(&id("subdir2/data.bin")).unwrap();
    let report = engine
        .push(&source, &mut registry, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.deleted, vec![id("subdir2/data.bin")]);

    let ro = engine.remote().resolve(RO_NAME);
    let listed: Vec<_> = engine
        .remote()
        .list_resources(&ro)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![id("README.txt"), id("subdir1/subdir1-file.txt")]);
}

#[tokio::test]
async fn test_wrong_token_is_fatal() {
    let addr = start_server().await;
    let engine = engine(addr, "not-the-token");
    let temp = TempDir::new().unwrap();
    let source = sample_ro(&temp.path().join("ro"));

    let result = engine
        .push(&source, &mut IdentityRegistry::new(), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SyncError::Unauthorized(_))));
}

#[tokio::test]
async fn test_checkout_of_unknown_ro_is_not_found() {
    let addr = start_server().await;
    let temp = TempDir::new().unwrap();

    let result = engine(addr, TOKEN)
        .checkout("no such ro", temp.path(), false, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SyncError::NotFound(_))));
}
