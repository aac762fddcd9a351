//! Integration tests for refcache

mod local_lifecycle {
    use refcache::{
        CacheConfig, CacheError, CacheManager, CacheRegister, ProcessRegister,
    };
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config(root: &TempDir) -> CacheConfig {
        let mut config = CacheConfig::default();
        config.local.root = Some(root.path().to_path_buf());
        config
    }

    fn manager(root: &TempDir, register: &Arc<ProcessRegister>) -> CacheManager {
        CacheManager::with_parts(config(root), Some(register.clone() as Arc<dyn CacheRegister>), None)
    }

    #[tokio::test]
    async fn fresh_cache_exists_with_empty_meta_and_count_one() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());
        let mut mgr = manager(&root, &register);

        mgr.create(None).await.unwrap();
        let path = mgr.cache_path().unwrap();

        assert!(Path::new(&path).is_dir());
        assert!(Path::new(&path).join("meta.json").is_file());
        assert!(mgr.meta().await.unwrap().is_empty());
        assert_eq!(register.count(&path).await.unwrap(), Some(1));

        mgr.wipe().await.unwrap();
    }

    #[tokio::test]
    async fn second_handle_counts_to_two_and_last_release_deletes() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());

        let mut first = manager(&root, &register);
        first.create(None).await.unwrap();
        let path = first.cache_path().unwrap();

        let mut second = manager(&root, &register);
        second.create(Some(&path)).await.unwrap();
        assert_eq!(register.count(&path).await.unwrap(), Some(2));

        second.wipe().await.unwrap();
        assert!(Path::new(&path).is_dir());
        assert_eq!(register.count(&path).await.unwrap(), Some(1));

        first.wipe().await.unwrap();
        assert!(!Path::new(&path).is_dir());
        assert_eq!(register.count(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn locked_cache_survives_release_and_reattach_inherits() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());

        let mut mgr = manager(&root, &register);
        mgr.create(None).await.unwrap();
        let path = mgr.cache_path().unwrap();

        mgr.lock().await.unwrap();
        mgr.wipe().await.unwrap();
        assert!(Path::new(&path).is_dir());

        // A fresh handle attaches and inherits the persisted lock without
        // calling lock() itself
        let mut reattached = manager(&root, &register);
        reattached.create(Some(&path)).await.unwrap();
        assert!(reattached.handle().unwrap().locked);

        // Still locked, so another release leaves it alone
        reattached.wipe().await.unwrap();
        assert!(Path::new(&path).is_dir());
    }

    #[tokio::test]
    async fn unlock_after_locked_attach_allows_deletion() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());

        let mut mgr = manager(&root, &register);
        mgr.create(None).await.unwrap();
        let path = mgr.cache_path().unwrap();
        mgr.lock().await.unwrap();
        mgr.wipe().await.unwrap();

        let mut mgr = manager(&root, &register);
        mgr.create(Some(&path)).await.unwrap();
        mgr.unlock().await.unwrap();
        assert_eq!(mgr.meta().await.unwrap()["locked"], json!(false));

        mgr.wipe().await.unwrap();
        assert!(!Path::new(&path).is_dir());
    }

    #[tokio::test]
    async fn insert_meta_is_idempotent_and_preserves_keys() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());
        let mut mgr = manager(&root, &register);

        mgr.create(None).await.unwrap();
        mgr.insert_meta("x", 1).await.unwrap();
        mgr.insert_meta("y", vec!["a", "b"]).await.unwrap();
        mgr.insert_meta("x", 1).await.unwrap();
        mgr.insert_meta("x", 1).await.unwrap();

        let meta = mgr.meta().await.unwrap();
        assert_eq!(meta["x"], json!(1));
        assert_eq!(meta["y"], json!(["a", "b"]));
        assert_eq!(meta.len(), 2);

        mgr.wipe().await.unwrap();
    }

    #[tokio::test]
    async fn deregister_of_unknown_path_is_an_error() {
        let register = ProcessRegister::new();

        let err = register
            .deregister("/never/registered/", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NotRegistered(_)));
        assert!(register.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_handles_merge_metadata_then_last_release_deletes() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());

        // Create cache A and annotate it
        let mut a = manager(&root, &register);
        a.create(None).await.unwrap();
        let path = a.cache_path().unwrap();
        a.insert_meta("x", 1).await.unwrap();

        // B attaches to A's path and adds its own key
        let mut b = manager(&root, &register);
        b.create(Some(&path)).await.unwrap();
        b.insert_meta("y", 2).await.unwrap();
        b.wipe().await.unwrap();

        // A observes both keys, then the final release removes the cache
        let meta = a.meta().await.unwrap();
        assert_eq!(meta["x"], json!(1));
        assert_eq!(meta["y"], json!(2));

        a.wipe().await.unwrap();
        assert!(!Path::new(&path).is_dir());
    }

    #[tokio::test]
    async fn scoped_acquisition_releases_on_error_path() {
        let root = TempDir::new().unwrap();
        let register = Arc::new(ProcessRegister::new());
        let mut mgr = manager(&root, &register);

        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let seen_in = seen.clone();
        let result = mgr
            .with_cache(None, |m| {
                Box::pin(async move {
                    *seen_in.lock().unwrap() = m.cache_path().unwrap();
                    m.insert_meta("step", "one").await?;
                    Err::<(), _>(CacheError::NoActiveCache("interrupted"))
                })
            })
            .await;

        assert!(result.is_err());
        let path = seen.lock().unwrap().clone();
        assert!(!Path::new(&path).is_dir());
        assert_eq!(register.count(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_less_manager_tracks_nothing_but_cleans_up() {
        let root = TempDir::new().unwrap();
        let mut mgr = CacheManager::with_parts(config(&root), None, None);

        mgr.create(None).await.unwrap();
        let path = mgr.cache_path().unwrap();
        assert!(Path::new(&path).is_dir());

        mgr.wipe().await.unwrap();
        assert!(!Path::new(&path).is_dir());
    }
}

mod object_lifecycle {
    use refcache::{
        ActiveWorker, BackendKind, CacheConfig, CacheManager, MemoryObjectStore, ObjectStore,
    };
    use serde_json::json;
    use std::sync::Arc;

    const ROOT: &str = "s3://test-bucket/caches/";

    fn config() -> CacheConfig {
        let mut config = CacheConfig::default();
        config.backend = BackendKind::ObjectStorage;
        config.object_storage.cache_root = Some(ROOT.to_string());
        config
    }

    fn manager(store: &Arc<MemoryObjectStore>) -> CacheManager {
        CacheManager::with_parts(config(), None, Some(store.clone() as Arc<dyn ObjectStore>))
    }

    #[tokio::test]
    async fn create_writes_meta_then_delete_removes_it() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut mgr = manager(&store);

        mgr.create(None).await.unwrap();

        let worker = match mgr.worker() {
            Some(ActiveWorker::Object(worker)) => worker,
            _ => panic!("expected an object worker"),
        };
        assert!(worker.check_file("meta.json").await.unwrap());

        mgr.delete_storage().await.unwrap();
        let worker = match mgr.worker() {
            Some(ActiveWorker::Object(worker)) => worker,
            _ => panic!("expected an object worker"),
        };
        assert!(!worker.check_file("meta.json").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn wipe_detaches_without_deleting_storage() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut mgr = manager(&store);

        mgr.create(None).await.unwrap();
        let path = mgr.cache_path().unwrap();
        mgr.insert_meta("artifact", "model.bin").await.unwrap();

        mgr.wipe().await.unwrap();
        assert!(mgr.cache_path().is_none());

        // The prefix survives the wipe; a new manager can attach to it
        let mut reattached = manager(&store);
        reattached.create(Some(&path)).await.unwrap();
        assert_eq!(reattached.cache_path().unwrap(), path);
        assert_eq!(reattached.meta().await.unwrap()["artifact"], json!("model.bin"));
    }

    #[tokio::test]
    async fn lock_persists_into_object_metadata() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut mgr = manager(&store);

        mgr.create(None).await.unwrap();
        mgr.lock().await.unwrap();

        assert!(mgr.handle().unwrap().locked);
        assert_eq!(mgr.meta().await.unwrap()["locked"], json!(true));
    }
}
