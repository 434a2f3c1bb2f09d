use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use crate::expiring_cache::data_struct::ValueEx;
use crate::expiring_cache::error::ExpiringCacheError;
use crate::expiring_cache::options::CacheOptions;

use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, trace};

/// Called with every entry the map physically drops because it expired.
pub type EvictionHook<K, V> = Box<dyn FnMut(K, V) + Send>;

type Init<V> = Box<dyn FnOnce() -> V + Send>;

type Predicate<V> = Box<dyn FnOnce(&V) -> bool + Send>;

enum HashMapCmd<K, V> {
    Set {
        key: K,
        val: V,
        ttl: Option<Duration>,
        resp_tx: oneshot::Sender<bool>,
    },
    Get {
        key: K,
        resp_tx: oneshot::Sender<Option<V>>,
    },
    GetOrInsertWith {
        key: K,
        refresh: bool,
        init: Init<V>,
        resp_tx: oneshot::Sender<V>,
    },
    RemoveIf {
        key: K,
        pred: Predicate<V>,
        resp_tx: oneshot::Sender<Option<V>>,
    },
    Len {
        resp_tx: oneshot::Sender<usize>,
    },
    TTL {
        key: K,
        resp_tx: oneshot::Sender<Option<Duration>>,
    },
    Stop,
}

/// Handle to a key-value map whose entries expire a fixed time after their
/// last write.
///
/// The map itself lives inside a tokio task; handles are cheap to clone and
/// talk to it over a bounded channel. Entries whose deadline has passed are
/// invisible to every read even before the periodic sweep reclaims them.
/// The task exits on [`stop`](Self::stop) or once every handle is dropped.
pub struct ExpiringMap<K, V> {
    tx: Sender<HashMapCmd<K, V>>,
    ttl: Duration,
}

impl<K, V> Clone for ExpiringMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ttl: self.ttl,
        }
    }
}

impl<K, V> fmt::Debug for ExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("ttl", &self.ttl)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(options: CacheOptions) -> Self {
        Self::spawn(options, None)
    }

    pub fn with_eviction_hook<F>(options: CacheOptions, hook: F) -> Self
    where
        F: FnMut(K, V) + Send + 'static,
    {
        Self::spawn(options, Some(Box::new(hook)))
    }

    /// Inserts or overwrites `key`, pushing its deadline to now + `ttl`
    /// (or the map's TTL). Returns `true` if the key was not live before.
    pub async fn set(
        &self,
        key: K,
        val: V,
        ttl: Option<Duration>,
    ) -> Result<bool, ExpiringCacheError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let set_cmd = HashMapCmd::Set {
            key,
            val,
            ttl,
            resp_tx,
        };
        self.request(set_cmd, resp_rx).await
    }

    pub async fn get(&self, key: K) -> Result<Option<V>, ExpiringCacheError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let get_cmd = HashMapCmd::Get { key, resp_tx };
        self.request(get_cmd, resp_rx).await
    }

    /// Returns the live value under `key`, or stores and returns `init()`.
    ///
    /// The check and the insert happen in one step on the map's task, so
    /// concurrent callers for the same key all observe the same value and
    /// `init` runs at most once. When `refresh` is set an existing entry's
    /// deadline is pushed out as if it had been written again.
    pub async fn get_or_insert_with<F>(
        &self,
        key: K,
        refresh: bool,
        init: F,
    ) -> Result<V, ExpiringCacheError>
    where
        F: FnOnce() -> V + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let get_or_insert_cmd = HashMapCmd::GetOrInsertWith {
            key,
            refresh,
            init: Box::new(init),
            resp_tx,
        };
        self.request(get_or_insert_cmd, resp_rx).await
    }

    /// Removes `key` if it is live and `pred` holds for its value, handing
    /// the value back. The eviction hook does not fire.
    pub async fn remove_if<F>(&self, key: K, pred: F) -> Result<Option<V>, ExpiringCacheError>
    where
        F: FnOnce(&V) -> bool + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let remove_if_cmd = HashMapCmd::RemoveIf {
            key,
            pred: Box::new(pred),
            resp_tx,
        };
        self.request(remove_if_cmd, resp_rx).await
    }

    /// Number of live entries.
    pub async fn len(&self) -> Result<usize, ExpiringCacheError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let len_cmd = HashMapCmd::Len { resp_tx };
        self.request(len_cmd, resp_rx).await
    }

    /// Remaining lifetime of a live key.
    pub async fn ttl(&self, key: K) -> Result<Option<Duration>, ExpiringCacheError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let ttl_cmd = HashMapCmd::TTL { key, resp_tx };
        self.request(ttl_cmd, resp_rx).await
    }

    pub async fn stop(&self) -> Result<(), ExpiringCacheError> {
        self.tx
            .send(HashMapCmd::Stop)
            .await
            .map_err(|_| ExpiringCacheError::Send)
    }

    /// Non-blocking [`stop`](Self::stop), usable from synchronous contexts
    /// such as an eviction hook. Must be called within a tokio runtime.
    pub fn shutdown(&self) {
        match self.tx.try_send(HashMapCmd::Stop) {
            Ok(()) | Err(TrySendError::Closed(_)) => (),
            Err(TrySendError::Full(stop_cmd)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(stop_cmd).await;
                });
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<R>(
        &self,
        cmd: HashMapCmd<K, V>,
        resp_rx: oneshot::Receiver<R>,
    ) -> Result<R, ExpiringCacheError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ExpiringCacheError::Send)?;
        resp_rx.await.map_err(|_| ExpiringCacheError::Receive)
    }

    fn spawn(options: CacheOptions, mut on_evict: Option<EvictionHook<K, V>>) -> Self {
        let ttl = options.ttl;
        let (tx, mut rx) = mpsc::channel::<HashMapCmd<K, V>>(options.buffer.max(1));

        tokio::spawn(async move {
            let mut hm = HashMap::<K, ValueEx<V>>::new();
            let mut ticker = interval(options.sweep_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {

                    // Expire key-val.
                    _ = ticker.tick() => {
                        let evicted = evict_expired(&mut hm, Instant::now(), &mut on_evict);
                        if evicted > 0 {
                            trace!(evicted, remaining = hm.len(), "swept expired entries");
                        }
                    }

                    // Handle commands.
                    command = rx.recv() => {
                        let Some(cmd) = command else {
                            trace!("all handles dropped, expiring map exits");
                            break;
                        };
                        match cmd {
                            HashMapCmd::Set { key, val, ttl: ex, resp_tx } => {
                                let now = Instant::now();
                                let val_ex = ValueEx::new(val, ex.unwrap_or(ttl));
                                let was_live = match hm.insert(key.clone(), val_ex) {
                                    Some(old) if old.is_live(now) => true,
                                    Some(old) => {
                                        evict(&mut on_evict, key, old.val);
                                        false
                                    }
                                    None => false,
                                };
                                let _ = resp_tx.send(!was_live);
                            }
                            HashMapCmd::Get { key, resp_tx } => {
                                let val = get_live(&mut hm, &key, Instant::now(), &mut on_evict)
                                    .map(|val_ex| val_ex.val.clone());
                                let _ = resp_tx.send(val);
                            }
                            HashMapCmd::GetOrInsertWith { key, refresh, init, resp_tx } => {
                                let now = Instant::now();
                                let val = match get_live(&mut hm, &key, now, &mut on_evict) {
                                    Some(val_ex) => {
                                        if refresh {
                                            val_ex.expiration = now + ttl;
                                        }
                                        val_ex.val.clone()
                                    }
                                    None => {
                                        let val = init();
                                        hm.insert(key, ValueEx::new(val.clone(), ttl));
                                        val
                                    }
                                };
                                let _ = resp_tx.send(val);
                            }
                            HashMapCmd::RemoveIf { key, pred, resp_tx } => {
                                let matched = get_live(&mut hm, &key, Instant::now(), &mut on_evict)
                                    .is_some_and(|val_ex| pred(&val_ex.val));
                                let val = if matched {
                                    hm.remove(&key).map(|val_ex| val_ex.val)
                                } else {
                                    None
                                };
                                let _ = resp_tx.send(val);
                            }
                            HashMapCmd::Len { resp_tx } => {
                                evict_expired(&mut hm, Instant::now(), &mut on_evict);
                                let _ = resp_tx.send(hm.len());
                            }
                            HashMapCmd::TTL { key, resp_tx } => {
                                let now = Instant::now();
                                let ttl = get_live(&mut hm, &key, now, &mut on_evict)
                                    .map(|val_ex| val_ex.expiration.duration_since(now));
                                let _ = resp_tx.send(ttl);
                            }
                            HashMapCmd::Stop => {
                                debug!(entries = hm.len(), "expiring map stopped");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self { tx, ttl }
    }
}

fn evict<K, V>(on_evict: &mut Option<EvictionHook<K, V>>, key: K, val: V) {
    if let Some(hook) = on_evict.as_mut() {
        hook(key, val);
    }
}

/// Looks `key` up, dropping it on the spot if its deadline has passed.
fn get_live<'a, K, V>(
    hm: &'a mut HashMap<K, ValueEx<V>>,
    key: &K,
    now: Instant,
    on_evict: &mut Option<EvictionHook<K, V>>,
) -> Option<&'a mut ValueEx<V>>
where
    K: Eq + Hash,
{
    let expired = hm.get(key).is_some_and(|val_ex| !val_ex.is_live(now));
    if expired {
        if let Some((key, val_ex)) = hm.remove_entry(key) {
            evict(on_evict, key, val_ex.val);
        }
        return None;
    }
    hm.get_mut(key)
}

fn evict_expired<K, V>(
    hm: &mut HashMap<K, ValueEx<V>>,
    now: Instant,
    on_evict: &mut Option<EvictionHook<K, V>>,
) -> usize
where
    K: Clone + Eq + Hash,
{
    let expired = hm
        .iter()
        .filter(|(_key, val_ex)| !val_ex.is_live(now))
        .map(|(key, _val_ex)| key.clone())
        .collect::<Vec<K>>();
    for key in &expired {
        if let Some((key, val_ex)) = hm.remove_entry(key) {
            evict(on_evict, key, val_ex.val);
        }
    }
    expired.len()
}
