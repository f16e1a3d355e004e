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

//! A named container of asset handles keyed by normalized path.

use cairn_core::asset::{
    AnyAsset, AssetHandle, Bundle, EditorAsset, GroupId, LoadState, QueryResult, Queryable,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The in-memory cache of one asset group.
///
/// This structure maps a normalized asset path to the single handle serving it,
/// so that any given asset has at most one cache line. Subsequent queries for the
/// same path receive a clone of the cached handle until that handle unloads.
pub struct AssetGroup {
    id: GroupId,
    name: String,
    storage: HashMap<String, AnyAsset>,
}

impl AssetGroup {
    /// Creates a new, empty group.
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            storage: HashMap::new(),
        }
    }

    /// The group's identifier, stamped on every handle it creates.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the live bundled handle for `query`, creating and binding one to
    /// `bundle` on first query.
    ///
    /// A cached handle that already reached `Unloaded` is replaced, since an
    /// unloaded handle can never load again. An editor asset stored under the same
    /// key is replaced as well.
    pub fn query<B: Bundle + 'static>(
        &mut self,
        query: QueryResult,
        bundle: &Arc<B>,
    ) -> AssetHandle {
        if let Some(AnyAsset::Bundled(handle)) = self.storage.get(query.asset_path_lower()) {
            if handle.load_state() != LoadState::Unloaded {
                return handle.clone();
            }
        }

        log::debug!(
            "Group '{}' creating handle for '{}' from {}",
            self.name,
            query.asset_path_lower(),
            bundle.id()
        );
        let key = query.asset_path_lower().to_string();
        let handle = AssetHandle::with_bundle(self.id, query, bundle);
        self.storage.insert(key, AnyAsset::Bundled(handle.clone()));
        handle
    }

    /// Stores an editor asset under its normalized path, replacing any previous entry.
    pub fn insert_editor(&mut self, asset: EditorAsset) -> AnyAsset {
        let any = AnyAsset::Editor(asset);
        self.storage
            .insert(any.asset_path_lower().to_string(), any.clone());
        any
    }

    /// Retrieves the asset stored under the normalized `key`.
    pub fn get(&self, key: &str) -> Option<&AnyAsset> {
        self.storage.get(key)
    }

    /// Checks if an asset is stored under the normalized `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }

    /// Removes and returns the asset stored under `key`, without unloading it.
    pub fn remove(&mut self, key: &str) -> Option<AnyAsset> {
        self.storage.remove(key)
    }

    /// The number of stored assets.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if the group stores no asset.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Iterates over the stored normalized keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.storage.keys().map(String::as_str)
    }

    /// Drops every entry whose handle reached `Unloaded`. Returns how many were dropped.
    pub fn sweep_unloaded(&mut self) -> usize {
        let before = self.storage.len();
        self.storage
            .retain(|_, asset| asset.load_state() != LoadState::Unloaded);
        let swept = before - self.storage.len();
        if swept > 0 {
            log::trace!("Group '{}' swept {} unloaded assets", self.name, swept);
        }
        swept
    }

    /// Disposes every bundled handle and empties the group.
    pub fn dispose_all(&mut self) {
        for (_, asset) in self.storage.drain() {
            if let AnyAsset::Bundled(handle) = asset {
                handle.dispose();
            }
        }
    }
}
