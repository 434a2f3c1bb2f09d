#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::expiring_cache::error::ExpiringCacheError;
    use crate::expiring_cache::hm::ExpiringMap;
    use crate::expiring_cache::options::CacheOptions;

    const NO_SWEEP: Duration = Duration::from_secs(24 * 60 * 60);

    fn options(ttl_secs: u64) -> CacheOptions {
        CacheOptions::new(Duration::from_secs(ttl_secs))
    }

    fn recording_map(
        options: CacheOptions,
    ) -> (ExpiringMap<&'static str, i32>, Arc<Mutex<Vec<&'static str>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let hm = ExpiringMap::with_eviction_hook(options, move |key: &'static str, _val: i32| {
            sink.lock().unwrap().push(key);
        });
        (hm, evicted)
    }

    #[tokio::test]
    async fn test_set_get() {
        let hm = ExpiringMap::<&str, i32>::new(options(60));
        assert!(hm.set("a", 10, None).await.unwrap());
        assert_eq!(hm.get("a").await.unwrap(), Some(10));
        assert_eq!(hm.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrite() {
        let hm = ExpiringMap::<&str, i32>::new(options(60));
        assert!(hm.set("a", 10, None).await.unwrap());
        assert!(!hm.set("a", 20, None).await.unwrap());
        assert_eq!(hm.get("a").await.unwrap(), Some(20));
        assert_eq!(hm.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_hidden_before_sweep() {
        let hm = ExpiringMap::<&str, i32>::new(options(5).sweep_interval(NO_SWEEP));
        hm.set("a", 10, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(hm.get("a").await.unwrap(), None);
        assert_eq!(hm.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_counts_only_live() {
        let hm = ExpiringMap::<&str, i32>::new(options(5).sweep_interval(NO_SWEEP));
        hm.set("a", 10, Some(Duration::from_secs(2))).await.unwrap();
        hm.set("b", 20, None).await.unwrap();
        assert_eq!(hm.len().await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(hm.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_expiration() {
        let hm = ExpiringMap::<&str, i32>::new(options(5));
        hm.set("a", 10, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        hm.set("a", 10, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(hm.get("a").await.unwrap(), Some(10));
        assert_eq!(hm.ttl("a").await.unwrap(), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_boundary() {
        let hm = ExpiringMap::<&str, i32>::new(options(5).sweep_interval(NO_SWEEP));
        hm.set("a", 10, None).await.unwrap();
        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(hm.get("a").await.unwrap(), Some(10));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(hm.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl() {
        let hm = ExpiringMap::<&str, i32>::new(options(1));
        hm.set("a", 10, None).await.unwrap();
        let ttl = hm.ttl("a").await.unwrap();
        assert!(Some(Duration::from_secs(1)) >= ttl);
        assert_eq!(hm.ttl("b").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_fires_eviction_hook() {
        let (hm, evicted) = recording_map(options(5).sweep_interval(Duration::from_secs(1)));
        hm.set("a", 10, None).await.unwrap();
        hm.set("b", 20, Some(Duration::from_secs(60))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(*evicted.lock().unwrap(), vec!["a"]);
        assert_eq!(hm.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_get_fires_eviction_hook() {
        let (hm, evicted) = recording_map(options(5).sweep_interval(NO_SWEEP));
        hm.set("a", 10, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(evicted.lock().unwrap().is_empty());
        assert_eq!(hm.get("a").await.unwrap(), None);
        assert_eq!(*evicted.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_insert_with_refresh() {
        let hm = ExpiringMap::<&str, i32>::new(options(10));
        assert_eq!(hm.get_or_insert_with("k", false, || 1).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(hm.get_or_insert_with("k", false, || 2).await.unwrap(), 1);
        assert_eq!(hm.ttl("k").await.unwrap(), Some(Duration::from_secs(4)));

        assert_eq!(hm.get_or_insert_with("k", true, || 3).await.unwrap(), 1);
        assert_eq!(hm.ttl("k").await.unwrap(), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_insert_with_replaces_expired() {
        let (hm, evicted) = recording_map(options(10).sweep_interval(NO_SWEEP));
        hm.get_or_insert_with("k", false, || 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(hm.get_or_insert_with("k", false, || 2).await.unwrap(), 2);
        assert_eq!(*evicted.lock().unwrap(), vec!["k"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_or_insert_with_runs_init_once() {
        let hm = ExpiringMap::<&str, i32>::new(options(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let hm = hm.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                hm.get_or_insert_with("k", false, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    7
                })
                .await
                .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hm.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_if() {
        let (hm, evicted) = recording_map(options(10).sweep_interval(NO_SWEEP));
        hm.set("a", 10, None).await.unwrap();
        hm.set("b", 20, Some(Duration::from_secs(2))).await.unwrap();

        assert_eq!(hm.remove_if("a", |val| *val > 10).await.unwrap(), None);
        assert_eq!(hm.get("a").await.unwrap(), Some(10));

        assert_eq!(hm.remove_if("a", |val| *val == 10).await.unwrap(), Some(10));
        assert_eq!(hm.get("a").await.unwrap(), None);
        assert!(evicted.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(hm.remove_if("b", |_| true).await.unwrap(), None);
        assert_eq!(*evicted.lock().unwrap(), vec!["b"]);
        assert_eq!(hm.remove_if("missing", |_| true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop() {
        let hm = ExpiringMap::<&str, i32>::new(options(60));
        hm.set("a", 10, None).await.unwrap();
        hm.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hm.is_closed());
        assert_eq!(hm.get("a").await, Err(ExpiringCacheError::Send));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_hook_stops_nested_map() {
        let outer = ExpiringMap::<&str, ExpiringMap<&str, ()>>::with_eviction_hook(
            options(10).sweep_interval(NO_SWEEP),
            |_key, inner| inner.shutdown(),
        );
        let inner = ExpiringMap::<&str, ()>::new(options(60));
        inner.set("1.1.1.1", (), None).await.unwrap();
        outer.set("a.com", inner.clone(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(outer.len().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(inner.is_closed());
        assert_eq!(
            inner.set("2.2.2.2", (), None).await,
            Err(ExpiringCacheError::Send)
        );
    }
}
