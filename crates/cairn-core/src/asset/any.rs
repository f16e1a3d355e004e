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

use super::{AssetHandle, Disposable, EditorAsset, LoadState, Queryable, RefCounted, Resource};
use std::sync::Arc;

/// Either kind of handle, selected when the asset is created from the kind of
/// source that resolved it.
#[derive(Debug, Clone)]
pub enum AnyAsset {
    /// Streamed from a bundle.
    Bundled(AssetHandle),
    /// Materialized by an editor source.
    Editor(EditorAsset),
}

impl AnyAsset {
    /// The current load state of the underlying handle.
    pub fn load_state(&self) -> LoadState {
        match self {
            AnyAsset::Bundled(handle) => handle.load_state(),
            AnyAsset::Editor(asset) => asset.load_state(),
        }
    }

    /// The identity token of the loaded payload, if loaded.
    pub fn content_hash(&self) -> Option<u64> {
        match self {
            AnyAsset::Bundled(handle) => handle.content_hash(),
            AnyAsset::Editor(asset) => asset.content_hash(),
        }
    }

    /// The bundle-backed handle, if this is one.
    pub fn as_bundled(&self) -> Option<&AssetHandle> {
        match self {
            AnyAsset::Bundled(handle) => Some(handle),
            AnyAsset::Editor(_) => None,
        }
    }

    /// The editor handle, if this is one.
    pub fn as_editor(&self) -> Option<&EditorAsset> {
        match self {
            AnyAsset::Editor(asset) => Some(asset),
            AnyAsset::Bundled(_) => None,
        }
    }
}

impl Queryable for AnyAsset {
    fn get(&self) -> Option<Arc<dyn Resource>> {
        match self {
            AnyAsset::Bundled(handle) => handle.get(),
            AnyAsset::Editor(asset) => asset.get(),
        }
    }

    fn asset_path_lower(&self) -> &str {
        match self {
            AnyAsset::Bundled(handle) => handle.asset_path_lower(),
            AnyAsset::Editor(asset) => asset.asset_path_lower(),
        }
    }
}

impl RefCounted for AnyAsset {
    fn retain(&self) {
        match self {
            AnyAsset::Bundled(handle) => handle.retain(),
            AnyAsset::Editor(asset) => asset.retain(),
        }
    }

    fn release(&self) {
        match self {
            AnyAsset::Bundled(handle) => handle.release(),
            AnyAsset::Editor(asset) => asset.release(),
        }
    }

    fn ref_count(&self) -> usize {
        match self {
            AnyAsset::Bundled(handle) => handle.ref_count(),
            AnyAsset::Editor(asset) => asset.ref_count(),
        }
    }
}

impl Disposable for AnyAsset {
    fn dispose(&self) {
        match self {
            AnyAsset::Bundled(handle) => handle.dispose(),
            AnyAsset::Editor(asset) => asset.dispose(),
        }
    }
}

impl From<AssetHandle> for AnyAsset {
    fn from(handle: AssetHandle) -> Self {
        AnyAsset::Bundled(handle)
    }
}

impl From<EditorAsset> for AnyAsset {
    fn from(asset: EditorAsset) -> Self {
        AnyAsset::Editor(asset)
    }
}
