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

//! A [`Bundle`] serving resources out of a `data.pack` archive.

use super::{PackIndex, PackLoadingLane, ResourceLoaderRegistry};
use anyhow::{bail, Context, Result};
use cairn_core::asset::{
    AssetHandle, Bundle, BundleError, BundleId, LoadState, Resource, ResourceType,
    WeakAssetHandle,
};
use cairn_core::VfsSettings;
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The decoded archive: its entry table plus an open pack file.
struct PackArchive {
    index: PackIndex,
    lane: Mutex<PackLoadingLane>,
}

impl PackArchive {
    fn fetch(
        &self,
        loaders: &ResourceLoaderRegistry,
        key: &str,
        ty: ResourceType,
    ) -> Result<Arc<dyn Resource>, BundleError> {
        let entry = self
            .index
            .get(key)
            .ok_or_else(|| BundleError::EntryNotFound {
                key: key.to_string(),
            })?;
        loaders.load(key, &entry.type_name, ty, || {
            self.lane
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .load_entry_bytes(entry)
        })
    }
}

struct BundleState {
    load_state: LoadState,
    archive: Option<Arc<PackArchive>>,
    ref_count: usize,
    /// Registered handles, by identity. Several handles may share a key.
    assets: Vec<WeakAssetHandle>,
}

/// A bundle backed by an `index.bin`/`data.pack` pair.
///
/// A `PackBundle` starts `Idle`, becomes `Loaded` once [`open`](Self::open)
/// decodes its index, and is torn down for good when its retain count drops to
/// zero (or [`teardown`](Self::teardown) is called). Teardown drops the archive
/// and unloads every asset still registered with the bundle.
pub struct PackBundle {
    id: BundleId,
    name: String,
    loaders: Arc<ResourceLoaderRegistry>,
    state: Mutex<BundleState>,
}

impl PackBundle {
    /// Creates an idle bundle that decodes its entries with `loaders`.
    pub fn new(
        id: BundleId,
        name: impl Into<String>,
        loaders: Arc<ResourceLoaderRegistry>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            loaders,
            state: Mutex::new(BundleState {
                load_state: LoadState::Idle,
                archive: None,
                ref_count: 0,
                assets: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BundleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn archive(&self) -> Result<Arc<PackArchive>, BundleError> {
        self.lock().archive.clone().ok_or(BundleError::NotLoaded)
    }

    /// The bundle's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes `index_bytes` and takes ownership of the pack file.
    ///
    /// # Errors
    /// Fails if the index cannot be decoded or the bundle was already torn down.
    pub fn open(&self, index_bytes: &[u8], data_file: File) -> Result<()> {
        let index = PackIndex::from_bytes(index_bytes)
            .with_context(|| format!("Failed to decode index of bundle '{}'", self.name))?;
        let entries = index.len();

        let mut state = self.lock();
        if state.load_state == LoadState::Unloaded {
            bail!("Bundle '{}' was torn down and cannot be reopened", self.name);
        }
        state.archive = Some(Arc::new(PackArchive {
            index,
            lane: Mutex::new(PackLoadingLane::new(data_file)),
        }));
        state.load_state = LoadState::Loaded;
        log::info!("Opened bundle '{}' ({}) with {} entries", self.name, self.id, entries);
        Ok(())
    }

    /// Opens the archive described by `settings`.
    pub fn open_files(&self, settings: &VfsSettings) -> Result<()> {
        let index_bytes = std::fs::read(&settings.index_path).with_context(|| {
            format!("Failed to read pack index {}", settings.index_path.display())
        })?;
        let data_file = File::open(&settings.pack_path).with_context(|| {
            format!("Failed to open pack file {}", settings.pack_path.display())
        })?;
        self.open(&index_bytes, data_file)
    }

    /// Adds one retain on the bundle.
    pub fn retain(&self) {
        self.lock().ref_count += 1;
    }

    /// The number of outstanding retains.
    pub fn ref_count(&self) -> usize {
        self.lock().ref_count
    }

    /// The number of entries in the open archive, or zero if not open.
    pub fn entry_count(&self) -> usize {
        self.lock()
            .archive
            .as_ref()
            .map_or(0, |archive| archive.index.len())
    }

    /// The number of registered assets that are still alive.
    pub fn registered_count(&self) -> usize {
        self.lock()
            .assets
            .iter()
            .filter(|weak| weak.is_alive())
            .count()
    }

    /// Returns `true` if a live asset stored under `key` is registered.
    pub fn is_registered(&self, key: &str) -> bool {
        let assets: Vec<AssetHandle> = self
            .lock()
            .assets
            .iter()
            .filter_map(WeakAssetHandle::upgrade)
            .collect();
        assets.iter().any(|asset| asset.asset_path_lower() == key)
    }

    /// Drops the archive and unloads every registered asset. Terminal.
    pub fn teardown(&self) {
        let assets: Vec<WeakAssetHandle> = {
            let mut state = self.lock();
            if state.load_state == LoadState::Unloaded {
                return;
            }
            state.load_state = LoadState::Unloaded;
            state.archive = None;
            std::mem::take(&mut state.assets)
        };

        log::info!("Tearing down bundle '{}' ({})", self.name, self.id);
        for handle in assets.iter().filter_map(WeakAssetHandle::upgrade) {
            handle.unload();
        }
    }
}

#[async_trait::async_trait]
impl Bundle for PackBundle {
    fn id(&self) -> BundleId {
        self.id
    }

    fn load_state(&self) -> LoadState {
        self.lock().load_state
    }

    fn load_resource(&self, key: &str, ty: ResourceType) -> Result<Arc<dyn Resource>, BundleError> {
        self.archive()?.fetch(&self.loaders, key, ty)
    }

    async fn load_resource_async(
        &self,
        key: &str,
        ty: ResourceType,
    ) -> Result<Arc<dyn Resource>, BundleError> {
        let archive = self.archive()?;
        let loaders = self.loaders.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || archive.fetch(&loaders, &key, ty))
            .await
            .map_err(|err| BundleError::Task(err.to_string()))?
    }

    fn register_asset(&self, asset: &AssetHandle) {
        let mut state = self.lock();
        // Handles registering after teardown unload themselves on their own.
        if state.load_state == LoadState::Unloaded {
            return;
        }
        state.assets.retain(WeakAssetHandle::is_alive);
        if !state.assets.iter().any(|weak| weak.points_to(asset)) {
            state.assets.push(asset.downgrade());
        }
    }

    fn unregister_asset(&self, asset: &AssetHandle) {
        self.lock().assets.retain(|weak| !weak.points_to(asset));
    }

    fn release(&self) {
        let torn_down = {
            let mut state = self.lock();
            if state.ref_count == 0 {
                log::warn!(
                    "Over-release of bundle '{}', ref count clamped at zero",
                    self.name
                );
                return;
            }
            state.ref_count -= 1;
            state.ref_count == 0
        };
        if torn_down {
            self.teardown();
        }
    }
}
