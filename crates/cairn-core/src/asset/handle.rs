// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The bundle-backed asset handle and its load state machine.

use super::{
    downcast_resource, payload_identity, release_payload, AssetError, Bundle, BundleError,
    LoadState, QueryResult, Resource, ResourceType,
};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;

/// Identity of the group that created a handle. Identity only, never ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupId(pub u32);

/// Mutable state of a handle. Every field is read and written under one lock so
/// that the check-and-transition to `Loading` is atomic.
struct HandleState {
    payload: Option<Arc<dyn Resource>>,
    load_state: LoadState,
    bundle: Option<Weak<dyn Bundle>>,
    ref_count: usize,
    content_hash: Option<u64>,
    /// Set while exactly one caller is fetching from the bundle.
    fetch_in_flight: bool,
    /// Bumped every time a fetch completes, so waiters can tell theirs finished.
    fetch_epoch: u64,
    /// The failure of the most recently completed fetch, if it failed.
    last_fetch_error: Option<BundleError>,
}

struct HandleInner {
    query: QueryResult,
    group: GroupId,
    state: Mutex<HandleState>,
    /// Wakes blocking `load` callers waiting on another caller's fetch.
    fetch_finished: Condvar,
    /// Wakes `load_async` callers waiting on another caller's fetch.
    fetch_notify: Notify,
}

impl HandleInner {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn path(&self) -> &str {
        self.query.asset_path_lower()
    }

    /// Checks the load preconditions and, if a fetch is needed and nobody else is
    /// fetching, claims the in-flight slot and moves to `Loading`.
    fn begin_load(&self, state: &mut HandleState) -> Result<LoadStep, AssetError> {
        if state.load_state == LoadState::Unloaded {
            return Err(AssetError::AlreadyUnloaded {
                path: self.path().to_string(),
            });
        }
        let bundle = state
            .bundle
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| AssetError::MissingBundle {
                path: self.path().to_string(),
            })?;
        if bundle.load_state() != LoadState::Loaded {
            return Err(AssetError::BundleNotReady {
                path: self.path().to_string(),
            });
        }
        if state.payload.is_some() && state.load_state == LoadState::Loaded {
            return Ok(LoadStep::Ready(bundle));
        }
        if state.fetch_in_flight {
            return Ok(LoadStep::Wait);
        }

        let previous = state.load_state;
        state.load_state = LoadState::Loading;
        state.fetch_in_flight = true;
        Ok(LoadStep::Fetch { bundle, previous })
    }

    /// The failure of the fetch a waiter attached to at `epoch`, once it completed.
    fn attached_failure(&self, state: &HandleState, epoch: u64) -> Option<AssetError> {
        if state.fetch_epoch == epoch {
            return None;
        }
        state
            .last_fetch_error
            .as_ref()
            .map(|source| AssetError::Fetch {
                path: self.path().to_string(),
                source: source.clone(),
            })
    }

    fn detach(state: &mut HandleState, terminal: bool) -> Detached {
        let detached = Detached {
            payload: state.payload.take(),
            bundle: state.bundle.take(),
        };
        state.content_hash = None;
        if terminal {
            state.load_state = LoadState::Unloaded;
        }
        detached
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(payload) = state.payload.take() {
            log::debug!("Finalizing dropped asset '{}'", self.query.asset_path_lower());
            release_payload(&payload);
        }
    }
}

enum LoadStep {
    /// Already materialized; only the bundle registration is refreshed.
    Ready(Arc<dyn Bundle>),
    /// Another caller owns the in-flight fetch.
    Wait,
    /// This caller owns the in-flight fetch.
    Fetch {
        bundle: Arc<dyn Bundle>,
        previous: LoadState,
    },
}

/// What `unload`/`dispose` took out of the handle, processed once the lock is gone.
struct Detached {
    payload: Option<Arc<dyn Resource>>,
    bundle: Option<Weak<dyn Bundle>>,
}

enum FetchOutcome {
    Loaded,
    Discarded(Arc<dyn Resource>, AssetError),
    Failed(AssetError),
}

/// Releases the in-flight slot when a fetch completes or its future is dropped.
///
/// An abandoned fetch leaves the handle in `Loading`; the next load fetches again.
struct FetchGuard<'a> {
    inner: &'a HandleInner,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().fetch_in_flight = false;
        self.inner.fetch_finished.notify_all();
        self.inner.fetch_notify.notify_waiters();
    }
}

/// A reference-counted cache line for one resource streamed from a [`Bundle`].
///
/// Cloning an `AssetHandle` is cheap and yields another pointer to the same cache
/// line; the logical retain count is tracked separately through
/// [`retain`](Self::retain) and [`release`](Self::release).
///
/// When the retain count drops to zero the payload is physically released, the
/// handle unregisters from its bundle, and the handle becomes `Unloaded` for good.
#[derive(Clone)]
pub struct AssetHandle {
    inner: Arc<HandleInner>,
}

/// A non-owning reference to an [`AssetHandle`], as held by bundles.
#[derive(Clone)]
pub struct WeakAssetHandle {
    inner: Weak<HandleInner>,
}

impl WeakAssetHandle {
    /// Returns the handle if it is still alive.
    pub fn upgrade(&self) -> Option<AssetHandle> {
        self.inner.upgrade().map(|inner| AssetHandle { inner })
    }

    /// Returns `true` if this points at `handle`.
    pub fn points_to(&self, handle: &AssetHandle) -> bool {
        Weak::as_ptr(&self.inner) == Arc::as_ptr(&handle.inner)
    }

    /// Returns `true` while at least one clone of the handle is alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl AssetHandle {
    /// Creates an idle handle with no bundle relation.
    pub fn new(group: GroupId, query: QueryResult) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                query,
                group,
                state: Mutex::new(HandleState {
                    payload: None,
                    load_state: LoadState::Idle,
                    bundle: None,
                    ref_count: 0,
                    content_hash: None,
                    fetch_in_flight: false,
                    fetch_epoch: 0,
                    last_fetch_error: None,
                }),
                fetch_finished: Condvar::new(),
                fetch_notify: Notify::new(),
            }),
        }
    }

    /// Creates an idle handle that will stream from `bundle`.
    pub fn with_bundle<B: Bundle + 'static>(
        group: GroupId,
        query: QueryResult,
        bundle: &Arc<B>,
    ) -> Self {
        let handle = Self::new(group, query);
        handle.bind_bundle(bundle);
        handle
    }

    /// Sets the owning bundle. Refused once the handle is `Unloaded`.
    pub fn bind_bundle<B: Bundle + 'static>(&self, bundle: &Arc<B>) -> bool {
        let weak: Weak<B> = Arc::downgrade(bundle);
        let weak: Weak<dyn Bundle> = weak;
        let mut state = self.inner.lock();
        if state.load_state == LoadState::Unloaded {
            log::warn!(
                "Refusing to bind {} to unloaded asset '{}'",
                bundle.id(),
                self.inner.path()
            );
            return false;
        }
        state.bundle = Some(weak);
        true
    }

    /// The canonical path as requested.
    pub fn asset_path(&self) -> &str {
        self.inner.query.asset_path()
    }

    /// The normalized identity key.
    pub fn asset_path_lower(&self) -> &str {
        self.inner.path()
    }

    /// The identity descriptor this handle was created from.
    pub fn query(&self) -> &QueryResult {
        &self.inner.query
    }

    /// The group that created this handle.
    pub fn group(&self) -> GroupId {
        self.inner.group
    }

    /// The owning bundle, if the relation is set and the bundle is still alive.
    pub fn bundle(&self) -> Option<Arc<dyn Bundle>> {
        self.inner.lock().bundle.as_ref().and_then(Weak::upgrade)
    }

    /// The current load state.
    pub fn load_state(&self) -> LoadState {
        self.inner.lock().load_state
    }

    /// The number of outstanding retains.
    pub fn ref_count(&self) -> usize {
        self.inner.lock().ref_count
    }

    /// The identity token of the loaded payload. `None` unless `Loaded`.
    pub fn content_hash(&self) -> Option<u64> {
        let state = self.inner.lock();
        match state.load_state {
            LoadState::Loaded => state.content_hash,
            _ => None,
        }
    }

    /// The current payload, if one is materialized.
    pub fn get(&self) -> Option<Arc<dyn Resource>> {
        self.inner.lock().payload.clone()
    }

    /// The current payload projected onto `T`. `None` if absent or another type.
    pub fn get_as<T: Resource>(&self) -> Option<Arc<T>> {
        self.get().and_then(downcast_resource::<T>)
    }

    /// Returns a weak reference to this handle.
    pub fn downgrade(&self) -> WeakAssetHandle {
        WeakAssetHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles point at the same cache line.
    pub fn ptr_eq(&self, other: &AssetHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks one more consumer as depending on this asset.
    pub fn retain(&self) {
        let mut state = self.inner.lock();
        state.ref_count += 1;
        log::trace!(
            "Retained '{}' (refs: {})",
            self.inner.path(),
            state.ref_count
        );
    }

    /// Ends one consumer's dependency on this asset.
    ///
    /// One release is always propagated to the owning bundle. When the count
    /// reaches zero the asset unloads. Releasing at zero is a caller bug: the count
    /// is clamped and the asset still unloads, exactly once.
    pub fn release(&self) {
        let bundle = {
            let mut state = self.inner.lock();
            if state.ref_count == 0 {
                log::warn!(
                    "Over-release of '{}', ref count clamped at zero",
                    self.inner.path()
                );
            } else {
                state.ref_count -= 1;
            }
            log::trace!(
                "Released '{}' (refs: {})",
                self.inner.path(),
                state.ref_count
            );
            state.bundle.as_ref().and_then(Weak::upgrade)
        };

        // The bundle may tear down and unload this very handle from here.
        if let Some(bundle) = bundle {
            bundle.release();
        }

        let detached = {
            let mut state = self.inner.lock();
            if state.ref_count == 0 && state.load_state != LoadState::Unloaded {
                Some(HandleInner::detach(&mut state, true))
            } else {
                None
            }
        };
        if let Some(detached) = detached {
            log::debug!("Unloading '{}' after last release", self.inner.path());
            self.finish_detach(detached);
        }
    }

    /// Releases the payload, unregisters from the bundle, and moves to the terminal
    /// `Unloaded` state.
    pub fn unload(&self) {
        let detached = HandleInner::detach(&mut self.inner.lock(), true);
        log::debug!("Unloaded '{}'", self.inner.path());
        self.finish_detach(detached);
    }

    /// Releases the payload and unregisters from the bundle like
    /// [`unload`](Self::unload), but leaves the reported state untouched.
    ///
    /// A disposed handle must not be reused: with its bundle relation cut, any
    /// further load fails with [`AssetError::MissingBundle`].
    pub fn dispose(&self) {
        let detached = HandleInner::detach(&mut self.inner.lock(), false);
        log::debug!("Disposed '{}'", self.inner.path());
        self.finish_detach(detached);
    }

    fn finish_detach(&self, detached: Detached) {
        if let Some(payload) = detached.payload {
            release_payload(&payload);
        }
        if let Some(bundle) = detached.bundle.as_ref().and_then(Weak::upgrade) {
            bundle.unregister_asset(self);
        }
    }

    /// Loads the payload as `T`, blocking the calling thread during the fetch.
    pub fn load<T: Resource>(&self) -> Result<(), AssetError> {
        self.load_as(ResourceType::of::<T>())
    }

    /// Loads the payload as `ty`, blocking the calling thread during the fetch.
    ///
    /// If another caller is already fetching this asset, waits for that fetch
    /// instead of starting a second one, and shares its failure if it fails.
    /// Calling this from inside an async task while a
    /// [`load_async`](Self::load_async) of the same handle is pending on the same
    /// thread never completes.
    pub fn load_as(&self, ty: ResourceType) -> Result<(), AssetError> {
        let mut state = self.inner.lock();
        let mut attached = None;
        loop {
            if let Some(err) =
                attached.and_then(|epoch| self.inner.attached_failure(&state, epoch))
            {
                return Err(err);
            }
            match self.inner.begin_load(&mut state)? {
                LoadStep::Ready(bundle) => {
                    drop(state);
                    bundle.register_asset(self);
                    return Ok(());
                }
                LoadStep::Wait => {
                    attached = Some(state.fetch_epoch);
                    state = self
                        .inner
                        .fetch_finished
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                LoadStep::Fetch { bundle, previous } => {
                    drop(state);
                    let guard = FetchGuard { inner: &self.inner };
                    log::debug!("Loading '{}' as {}", self.inner.path(), ty.name());
                    let fetched = bundle.load_resource(self.inner.path(), ty);
                    return self.finish_load(guard, &bundle, previous, fetched);
                }
            }
        }
    }

    /// Loads the payload as `T`, suspending while the bundle fetches.
    pub async fn load_async<T: Resource>(&self) -> Result<(), AssetError> {
        self.load_async_as(ResourceType::of::<T>()).await
    }

    /// Loads the payload as `ty`, suspending while the bundle fetches.
    ///
    /// Concurrent callers attach to the fetch already in flight and share its
    /// failure if it fails.
    pub async fn load_async_as(&self, ty: ResourceType) -> Result<(), AssetError> {
        let mut attached = None;
        loop {
            let notified = self.inner.fetch_notify.notified();
            let step = {
                let mut state = self.inner.lock();
                if let Some(err) =
                    attached.and_then(|epoch| self.inner.attached_failure(&state, epoch))
                {
                    return Err(err);
                }
                let step = self.inner.begin_load(&mut state)?;
                if let LoadStep::Wait = step {
                    attached = Some(state.fetch_epoch);
                }
                step
            };
            match step {
                LoadStep::Ready(bundle) => {
                    bundle.register_asset(self);
                    return Ok(());
                }
                LoadStep::Wait => notified.await,
                LoadStep::Fetch { bundle, previous } => {
                    let guard = FetchGuard { inner: &self.inner };
                    log::debug!("Loading '{}' as {} (async)", self.inner.path(), ty.name());
                    let fetched = bundle.load_resource_async(self.inner.path(), ty).await;
                    return self.finish_load(guard, &bundle, previous, fetched);
                }
            }
        }
    }

    fn finish_load(
        &self,
        guard: FetchGuard<'_>,
        bundle: &Arc<dyn Bundle>,
        previous: LoadState,
        fetched: Result<Arc<dyn Resource>, BundleError>,
    ) -> Result<(), AssetError> {
        let path = || self.inner.path().to_string();
        let outcome = {
            let mut state = self.inner.lock();
            state.fetch_epoch += 1;
            state.last_fetch_error = None;
            match fetched {
                Err(source) => {
                    if state.load_state == LoadState::Loading {
                        state.load_state = previous;
                    }
                    state.last_fetch_error = Some(source.clone());
                    FetchOutcome::Failed(AssetError::Fetch {
                        path: path(),
                        source,
                    })
                }
                Ok(payload) if state.load_state == LoadState::Unloaded => {
                    FetchOutcome::Discarded(payload, AssetError::AlreadyUnloaded { path: path() })
                }
                Ok(payload) if state.bundle.is_none() => {
                    FetchOutcome::Discarded(payload, AssetError::MissingBundle { path: path() })
                }
                // The bundle was torn down while the fetch was running.
                Ok(payload) if bundle.load_state() != LoadState::Loaded => {
                    if state.load_state == LoadState::Loading {
                        state.load_state = previous;
                    }
                    FetchOutcome::Discarded(payload, AssetError::BundleNotReady { path: path() })
                }
                Ok(payload) => {
                    state.content_hash = Some(payload_identity(&payload));
                    state.payload = Some(payload);
                    state.load_state = LoadState::Loaded;
                    FetchOutcome::Loaded
                }
            }
        };
        drop(guard);

        match outcome {
            FetchOutcome::Loaded => {
                bundle.register_asset(self);
                // A teardown that ran before the registration landed never saw
                // this handle, so unload it the way that teardown would have.
                if bundle.load_state() != LoadState::Loaded {
                    log::debug!(
                        "Bundle of '{}' was torn down while it loaded",
                        self.inner.path()
                    );
                    self.unload();
                    return Err(AssetError::BundleNotReady { path: path() });
                }
                log::debug!("Loaded '{}'", self.inner.path());
                Ok(())
            }
            FetchOutcome::Discarded(payload, err) => {
                log::debug!(
                    "Discarding payload of '{}' after an interrupted fetch",
                    self.inner.path()
                );
                release_payload(&payload);
                Err(err)
            }
            FetchOutcome::Failed(err) => {
                log::warn!("{err}");
                Err(err)
            }
        }
    }
}

impl PartialEq for AssetHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for AssetHandle {}

impl fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("AssetHandle")
            .field("asset_path_lower", &self.inner.path())
            .field("group", &self.inner.group)
            .field("load_state", &state.load_state)
            .field("ref_count", &state.ref_count)
            .field("has_payload", &state.payload.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::BundleId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[derive(Debug, Default)]
    struct Texture {
        releases: AtomicUsize,
    }

    impl Resource for Texture {
        fn release_memory(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct Mesh;
    impl Resource for Mesh {}

    #[derive(Debug)]
    struct SceneNode;

    impl Resource for SceneNode {
        fn release_memory(&self) {
            panic!("scene objects must never be force-released");
        }

        fn is_scene_object(&self) -> bool {
            true
        }
    }

    struct MockBundle {
        state: Mutex<LoadState>,
        texture: Arc<Texture>,
        fetches: AtomicUsize,
        releases: AtomicUsize,
        registrations: AtomicUsize,
        unregistrations: AtomicUsize,
        registered: Mutex<Vec<WeakAssetHandle>>,
        ref_count: Mutex<usize>,
        fetch_delay: Option<Duration>,
        gate: Option<Semaphore>,
    }

    impl MockBundle {
        fn build(
            state: LoadState,
            fetch_delay: Option<Duration>,
            gate: Option<Semaphore>,
        ) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state),
                texture: Arc::new(Texture::default()),
                fetches: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                registrations: AtomicUsize::new(0),
                unregistrations: AtomicUsize::new(0),
                registered: Mutex::new(Vec::new()),
                ref_count: Mutex::new(0),
                fetch_delay,
                gate,
            })
        }

        fn loaded() -> Arc<Self> {
            Self::build(LoadState::Loaded, None, None)
        }

        fn gated() -> Arc<Self> {
            Self::build(LoadState::Loaded, None, Some(Semaphore::new(0)))
        }

        fn open_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }

        fn retain(&self) {
            *self.ref_count.lock().unwrap() += 1;
        }

        fn teardown(&self) {
            *self.state.lock().unwrap() = LoadState::Unloaded;
            let registered: Vec<_> = self.registered.lock().unwrap().drain(..).collect();
            for handle in registered.iter().filter_map(WeakAssetHandle::upgrade) {
                handle.unload();
            }
        }

        fn texture_releases(&self) -> usize {
            self.texture.releases.load(Ordering::SeqCst)
        }

        fn materialize(
            &self,
            key: &str,
            ty: ResourceType,
        ) -> Result<Arc<dyn Resource>, BundleError> {
            if key.starts_with("scenes/") {
                return Ok(Arc::new(SceneNode));
            }
            if !ty.accepts(ResourceType::of::<Texture>()) {
                return Err(BundleError::TypeMismatch {
                    key: key.to_string(),
                    requested: ty.name(),
                    stored: "texture".to_string(),
                });
            }
            let texture: Arc<dyn Resource> = self.texture.clone();
            Ok(texture)
        }
    }

    #[async_trait]
    impl Bundle for MockBundle {
        fn id(&self) -> BundleId {
            BundleId(7)
        }

        fn load_state(&self) -> LoadState {
            *self.state.lock().unwrap()
        }

        fn load_resource(
            &self,
            key: &str,
            ty: ResourceType,
        ) -> Result<Arc<dyn Resource>, BundleError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.fetch_delay {
                std::thread::sleep(delay);
            }
            self.materialize(key, ty)
        }

        async fn load_resource_async(
            &self,
            key: &str,
            ty: ResourceType,
        ) -> Result<Arc<dyn Resource>, BundleError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            self.materialize(key, ty)
        }

        fn register_asset(&self, asset: &AssetHandle) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            let mut registered = self.registered.lock().unwrap();
            if !registered.iter().any(|weak| weak.points_to(asset)) {
                registered.push(asset.downgrade());
            }
        }

        fn unregister_asset(&self, asset: &AssetHandle) {
            self.unregistrations.fetch_add(1, Ordering::SeqCst);
            self.registered
                .lock()
                .unwrap()
                .retain(|weak| !weak.points_to(asset));
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            let torn_down = {
                let mut count = self.ref_count.lock().unwrap();
                if *count == 0 {
                    return;
                }
                *count -= 1;
                *count == 0
            };
            if torn_down {
                self.teardown();
            }
        }
    }

    fn hero(bundle: &Arc<MockBundle>) -> AssetHandle {
        AssetHandle::with_bundle(GroupId(1), QueryResult::new("textures/hero.png"), bundle)
    }

    #[test]
    fn load_materializes_the_payload_from_an_idle_handle() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        assert_eq!(handle.load_state(), LoadState::Idle);
        assert!(handle.content_hash().is_none());

        handle.load::<Texture>().unwrap();

        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert!(handle.get_as::<Texture>().is_some());
        assert!(handle.get_as::<Mesh>().is_none());
        assert!(handle.content_hash().is_some());
        assert_eq!(bundle.registered.lock().unwrap().len(), 1);
    }

    #[test]
    fn loading_twice_fetches_once_and_reregisters() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);

        handle.load::<Texture>().unwrap();
        let hash = handle.content_hash();
        handle.load::<Texture>().unwrap();

        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(bundle.registrations.load(Ordering::SeqCst), 2);
        assert_eq!(bundle.registered.lock().unwrap().len(), 1);
        assert_eq!(handle.content_hash(), hash);
    }

    #[test]
    fn load_without_a_bundle_fails_without_touching_state() {
        let handle = AssetHandle::new(GroupId(1), QueryResult::new("textures/hero.png"));
        let err = handle.load::<Texture>().unwrap_err();
        assert!(matches!(err, AssetError::MissingBundle { .. }));
        assert_eq!(handle.load_state(), LoadState::Idle);
    }

    #[test]
    fn load_after_the_bundle_is_dropped_reports_a_missing_bundle() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        drop(bundle);

        let err = handle.load::<Texture>().unwrap_err();
        assert!(matches!(err, AssetError::MissingBundle { .. }));
        assert!(handle.bundle().is_none());
    }

    #[test]
    fn load_from_a_bundle_that_is_not_ready_fails() {
        let bundle = MockBundle::build(LoadState::Loading, None, None);
        let handle = hero(&bundle);

        let err = handle.load::<Texture>().unwrap_err();
        assert!(matches!(err, AssetError::BundleNotReady { .. }));
        assert_eq!(handle.load_state(), LoadState::Idle);
        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn load_after_unload_fails_and_stays_unloaded() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.load::<Texture>().unwrap();
        handle.unload();

        let err = handle.load::<Texture>().unwrap_err();
        assert!(matches!(err, AssetError::AlreadyUnloaded { .. }));
        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert!(!handle.bind_bundle(&bundle));
    }

    #[test]
    fn failed_fetch_restores_the_previous_state() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);

        let err = handle.load::<Mesh>().unwrap_err();
        assert!(matches!(
            err,
            AssetError::Fetch {
                source: BundleError::TypeMismatch { .. },
                ..
            }
        ));
        assert_eq!(handle.load_state(), LoadState::Idle);
        assert!(handle.get().is_none());

        handle.load_as(ResourceType::any()).unwrap();
        assert_eq!(handle.load_state(), LoadState::Loaded);
    }

    #[test]
    fn retain_load_release_round_trip_unloads() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);

        handle.retain();
        handle.load::<Texture>().unwrap();
        handle.release();

        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert_eq!(handle.ref_count(), 0);
        assert!(handle.get().is_none());
        assert!(handle.bundle().is_none());
        assert_eq!(bundle.texture_releases(), 1);
        assert_eq!(bundle.releases.load(Ordering::SeqCst), 1);
        assert_eq!(bundle.unregistrations.load(Ordering::SeqCst), 1);
        assert!(bundle.registered.lock().unwrap().is_empty());
    }

    #[test]
    fn retain_release_sequences_ending_at_zero_unload() {
        let sequences: [&[bool]; 4] = [
            &[true, false],
            &[true, true, false, false],
            &[true, false, true, false],
            &[true, true, false, true, false, false],
        ];
        for sequence in sequences {
            let bundle = MockBundle::loaded();
            let handle = hero(&bundle);
            handle.load::<Texture>().unwrap();

            for &retain in sequence {
                if retain {
                    handle.retain();
                } else {
                    handle.release();
                }
            }

            assert_eq!(handle.ref_count(), 0, "sequence {sequence:?}");
            assert_eq!(handle.load_state(), LoadState::Unloaded);
            assert!(handle.get().is_none());
        }
    }

    #[test]
    fn partial_release_keeps_the_payload() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.retain();
        handle.retain();
        handle.load::<Texture>().unwrap();

        handle.release();

        assert_eq!(handle.ref_count(), 1);
        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert!(handle.get().is_some());
        assert_eq!(bundle.releases.load(Ordering::SeqCst), 1);
        assert_eq!(bundle.texture_releases(), 0);
    }

    #[test]
    fn release_at_zero_unloads_and_releases_the_bundle_once() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.load::<Texture>().unwrap();

        handle.release();

        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert_eq!(handle.ref_count(), 0);
        assert_eq!(bundle.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn over_release_is_clamped_and_unloads_once() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.retain();
        handle.load::<Texture>().unwrap();

        handle.release();
        handle.release();
        handle.release();

        assert_eq!(handle.ref_count(), 0);
        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert_eq!(bundle.texture_releases(), 1);
        assert_eq!(bundle.unregistrations.load(Ordering::SeqCst), 1);
        assert_eq!(bundle.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bundle_teardown_during_release_unloads_exactly_once() {
        let bundle = MockBundle::loaded();
        bundle.retain();
        let handle = hero(&bundle);
        handle.retain();
        handle.load::<Texture>().unwrap();

        handle.release();

        assert_eq!(bundle.load_state(), LoadState::Unloaded);
        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert_eq!(bundle.texture_releases(), 1);
        assert_eq!(bundle.unregistrations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scene_objects_are_cleared_but_never_force_released() {
        let bundle = MockBundle::loaded();
        let handle =
            AssetHandle::with_bundle(GroupId(1), QueryResult::new("scenes/level1.scene"), &bundle);
        handle.load_as(ResourceType::any()).unwrap();
        assert!(handle.get_as::<SceneNode>().is_some());

        handle.unload();

        assert!(handle.get().is_none());
        assert_eq!(handle.load_state(), LoadState::Unloaded);
    }

    #[test]
    fn dispose_detaches_without_the_terminal_marker() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.load::<Texture>().unwrap();

        handle.dispose();

        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert!(handle.get().is_none());
        assert!(handle.content_hash().is_none());
        assert_eq!(bundle.texture_releases(), 1);
        assert_eq!(bundle.unregistrations.load(Ordering::SeqCst), 1);

        let err = handle.load::<Texture>().unwrap_err();
        assert!(matches!(err, AssetError::MissingBundle { .. }));

        handle.dispose();
        assert_eq!(bundle.texture_releases(), 1);
    }

    #[test]
    fn dropping_a_loaded_handle_releases_its_payload() {
        let bundle = MockBundle::loaded();
        let handle = hero(&bundle);
        handle.load::<Texture>().unwrap();
        let weak = handle.downgrade();

        drop(handle);

        assert!(weak.upgrade().is_none());
        assert_eq!(bundle.texture_releases(), 1);
    }

    #[test]
    fn concurrent_blocking_loads_fetch_once() {
        let bundle = MockBundle::build(LoadState::Loaded, Some(Duration::from_millis(20)), None);
        let handle = hero(&bundle);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| handle.load::<Texture>().unwrap());
            }
        });

        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(handle.load_state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn concurrent_async_loads_attach_to_the_pending_fetch() {
        let bundle = MockBundle::gated();
        let handle = hero(&bundle);

        let first = handle.load_async::<Texture>();
        let second = handle.load_async::<Texture>();
        let observer = async {
            tokio::task::yield_now().await;
            assert_eq!(handle.load_state(), LoadState::Loading);
            assert!(handle.get().is_none());
            bundle.open_gate();
        };
        let (first, second, ()) = tokio::join!(first, second, observer);

        first.unwrap();
        second.unwrap();
        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert!(handle.get_as::<Texture>().is_some());
    }

    #[tokio::test]
    async fn abandoned_async_load_leaves_loading_and_can_be_retried() {
        let bundle = MockBundle::gated();
        let handle = hero(&bundle);

        {
            let pending = handle.load_async::<Texture>();
            tokio::pin!(pending);
            tokio::select! {
                biased;
                _ = &mut pending => panic!("fetch should still be gated"),
                _ = async {} => {}
            }
        }
        assert_eq!(handle.load_state(), LoadState::Loading);

        bundle.open_gate();
        handle.load_async::<Texture>().await.unwrap();

        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unload_during_fetch_discards_the_payload() {
        let bundle = MockBundle::gated();
        let handle = hero(&bundle);

        let load = handle.load_async::<Texture>();
        let unloader = async {
            tokio::task::yield_now().await;
            handle.unload();
            bundle.open_gate();
        };
        let (result, ()) = tokio::join!(load, unloader);

        assert!(matches!(result, Err(AssetError::AlreadyUnloaded { .. })));
        assert_eq!(handle.load_state(), LoadState::Unloaded);
        assert!(handle.get().is_none());
        assert_eq!(bundle.texture_releases(), 1);
    }

    #[tokio::test]
    async fn bundle_teardown_during_fetch_discards_the_payload() {
        let bundle = MockBundle::gated();
        let handle = hero(&bundle);

        let load = handle.load_async::<Texture>();
        let teardown = async {
            tokio::task::yield_now().await;
            bundle.teardown();
            bundle.open_gate();
        };
        let (result, ()) = tokio::join!(load, teardown);

        assert!(matches!(result, Err(AssetError::BundleNotReady { .. })));
        assert_eq!(handle.load_state(), LoadState::Idle);
        assert!(handle.get().is_none());
        assert!(handle.content_hash().is_none());
        assert_eq!(bundle.texture_releases(), 1);
        assert!(bundle.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn waiters_share_the_failure_of_the_pending_fetch() {
        let bundle = MockBundle::gated();
        let handle = hero(&bundle);

        let first = handle.load_async::<Mesh>();
        let second = handle.load_async::<Mesh>();
        let opener = async {
            tokio::task::yield_now().await;
            bundle.open_gate();
        };
        let (first, second, ()) = tokio::join!(first, second, opener);

        for result in [first, second] {
            assert!(matches!(
                result,
                Err(AssetError::Fetch {
                    source: BundleError::TypeMismatch { .. },
                    ..
                })
            ));
        }
        assert_eq!(bundle.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(handle.load_state(), LoadState::Idle);
    }

    #[test]
    fn handles_sharing_a_key_are_all_unloaded_by_teardown() {
        let bundle = MockBundle::loaded();
        let first = hero(&bundle);
        let second = hero(&bundle);
        first.load::<Texture>().unwrap();
        second.load::<Texture>().unwrap();
        assert_eq!(bundle.registered.lock().unwrap().len(), 2);

        bundle.teardown();

        assert_eq!(first.load_state(), LoadState::Unloaded);
        assert_eq!(second.load_state(), LoadState::Unloaded);
        assert!(first.get().is_none());
        assert!(second.get().is_none());
    }
}
