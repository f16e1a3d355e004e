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

use super::{
    downcast_resource, payload_identity, release_payload, BundleError, LoadState, QueryResult,
    Resource, ResourceType,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A development-time source that materializes resources directly, bypassing
/// bundle streaming entirely.
pub trait EditorSource: Send + Sync {
    /// Materializes the resource at `path` as `ty`.
    fn load_resource(&self, path: &str, ty: ResourceType)
        -> Result<Arc<dyn Resource>, BundleError>;
}

struct EditorState {
    payload: Option<Arc<dyn Resource>>,
    load_state: LoadState,
    ref_count: usize,
}

struct EditorInner {
    asset_path_lower: String,
    content_hash: u64,
    state: Mutex<EditorState>,
}

impl EditorInner {
    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EditorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(payload) = state.payload.take() {
            release_payload(&payload);
        }
    }
}

/// A handle whose payload is already materialized at construction.
///
/// It shares the retain/release/get surface of [`AssetHandle`](super::AssetHandle)
/// but has no state machine and no bundle: it starts `Loaded`, and its only way
/// out is its retain count reaching zero.
#[derive(Clone)]
pub struct EditorAsset {
    inner: Arc<EditorInner>,
}

impl EditorAsset {
    /// Wraps an already loaded payload.
    pub fn new(payload: Arc<dyn Resource>, asset_path_lower: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                asset_path_lower: asset_path_lower.into(),
                content_hash: payload_identity(&payload),
                state: Mutex::new(EditorState {
                    payload: Some(payload),
                    load_state: LoadState::Loaded,
                    ref_count: 0,
                }),
            }),
        }
    }

    /// Materializes `query` from `source` and wraps the result.
    pub fn from_source(
        source: &dyn EditorSource,
        query: &QueryResult,
        ty: ResourceType,
    ) -> Result<Self, BundleError> {
        let payload = source.load_resource(query.asset_path(), ty)?;
        Ok(Self::new(payload, query.asset_path_lower()))
    }

    /// The normalized identity key.
    pub fn asset_path_lower(&self) -> &str {
        &self.inner.asset_path_lower
    }

    /// `Loaded` until the last release, `Unloaded` afterwards.
    pub fn load_state(&self) -> LoadState {
        self.inner.lock().load_state
    }

    /// The number of outstanding retains.
    pub fn ref_count(&self) -> usize {
        self.inner.lock().ref_count
    }

    /// The identity token of the payload. `None` once unloaded.
    pub fn content_hash(&self) -> Option<u64> {
        match self.load_state() {
            LoadState::Loaded => Some(self.inner.content_hash),
            _ => None,
        }
    }

    /// The payload, until the asset unloads.
    pub fn get(&self) -> Option<Arc<dyn Resource>> {
        self.inner.lock().payload.clone()
    }

    /// The payload projected onto `T`.
    pub fn get_as<T: Resource>(&self) -> Option<Arc<T>> {
        self.get().and_then(downcast_resource::<T>)
    }

    /// Returns `true` if both handles point at the same asset.
    pub fn ptr_eq(&self, other: &EditorAsset) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks one more consumer as depending on this asset.
    pub fn retain(&self) {
        self.inner.lock().ref_count += 1;
    }

    /// Ends one consumer's dependency; the last release unloads the payload.
    pub fn release(&self) {
        let payload = {
            let mut state = self.inner.lock();
            state.ref_count = state.ref_count.saturating_sub(1);
            if state.ref_count > 0 {
                return;
            }
            state.load_state = LoadState::Unloaded;
            state.payload.take()
        };
        if let Some(payload) = payload {
            log::debug!("Unloaded editor asset '{}'", self.inner.asset_path_lower);
            release_payload(&payload);
        }
    }

    /// Releases the payload regardless of outstanding retains.
    ///
    /// With no bundle to reload from, a disposed editor asset is `Unloaded`.
    pub fn dispose(&self) {
        let payload = {
            let mut state = self.inner.lock();
            state.load_state = LoadState::Unloaded;
            state.payload.take()
        };
        if let Some(payload) = payload {
            log::debug!("Disposed editor asset '{}'", self.inner.asset_path_lower);
            release_payload(&payload);
        }
    }
}

impl fmt::Debug for EditorAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("EditorAsset")
            .field("asset_path_lower", &self.inner.asset_path_lower)
            .field("load_state", &state.load_state)
            .field("ref_count", &state.ref_count)
            .finish()
    }
}
