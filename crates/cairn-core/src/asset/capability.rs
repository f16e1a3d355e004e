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

use super::{downcast_resource, Resource};
use std::sync::Arc;

/// Read access to a handle's payload and identity.
pub trait Queryable {
    /// The current payload, if any.
    fn get(&self) -> Option<Arc<dyn Resource>>;

    /// The current payload projected onto `T`. Never fails: a mismatch is `None`.
    fn get_as<T: Resource>(&self) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        self.get().and_then(downcast_resource::<T>)
    }

    /// The normalized identity key.
    fn asset_path_lower(&self) -> &str;
}

/// The retain/release protocol.
///
/// Every `retain` must eventually be paired with exactly one `release`.
pub trait RefCounted {
    /// Marks one more consumer as depending on the asset.
    fn retain(&self);

    /// Ends one consumer's dependency.
    fn release(&self);

    /// The number of outstanding retains.
    fn ref_count(&self) -> usize;
}

/// Deterministic teardown of a payload's native memory.
///
/// Whichever exit path runs first (`unload`, `dispose`, or the last drop) releases
/// the payload; the others find nothing left to release.
pub trait Disposable {
    /// Releases the payload and cuts the bundle relation.
    fn dispose(&self);
}

impl Queryable for super::AssetHandle {
    fn get(&self) -> Option<Arc<dyn Resource>> {
        super::AssetHandle::get(self)
    }

    fn asset_path_lower(&self) -> &str {
        super::AssetHandle::asset_path_lower(self)
    }
}

impl RefCounted for super::AssetHandle {
    fn retain(&self) {
        super::AssetHandle::retain(self)
    }

    fn release(&self) {
        super::AssetHandle::release(self)
    }

    fn ref_count(&self) -> usize {
        super::AssetHandle::ref_count(self)
    }
}

impl Disposable for super::AssetHandle {
    fn dispose(&self) {
        super::AssetHandle::dispose(self)
    }
}

impl Queryable for super::EditorAsset {
    fn get(&self) -> Option<Arc<dyn Resource>> {
        super::EditorAsset::get(self)
    }

    fn asset_path_lower(&self) -> &str {
        super::EditorAsset::asset_path_lower(self)
    }
}

impl RefCounted for super::EditorAsset {
    fn retain(&self) {
        super::EditorAsset::retain(self)
    }

    fn release(&self) {
        super::EditorAsset::release(self)
    }

    fn ref_count(&self) -> usize {
        super::EditorAsset::ref_count(self)
    }
}

impl Disposable for super::EditorAsset {
    fn dispose(&self) {
        super::EditorAsset::dispose(self)
    }
}
