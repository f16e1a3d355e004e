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

use super::{AssetHandle, BundleError, LoadState, Resource, ResourceType};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A stable identifier for a bundle inside its owning system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BundleId(pub u32);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle#{}", self.0)
    }
}

/// An archive-like container that serves many named resources by key.
///
/// Asset handles only keep a `Weak` reference to their bundle, and a bundle only
/// keeps weak handles to the assets registered with it, so the two never own each
/// other. Every `release()` of a handle propagates one `release()` to its bundle;
/// bundle teardown timing is therefore driven by the sum of its handles' releases.
///
/// Implementors must not call back into an [`AssetHandle`] while holding their own
/// internal locks: a handle calls [`Bundle::unregister_asset`] from `unload`, and a
/// bundle tearing down is expected to unload its registered handles.
#[async_trait]
pub trait Bundle: Send + Sync {
    /// The bundle's identifier.
    fn id(&self) -> BundleId;

    /// The bundle's own lifecycle state. Handles only load from a `Loaded` bundle.
    fn load_state(&self) -> LoadState;

    /// Materializes the resource stored under `key` as `ty`.
    fn load_resource(&self, key: &str, ty: ResourceType)
        -> Result<Arc<dyn Resource>, BundleError>;

    /// Asynchronously materializes the resource stored under `key` as `ty`.
    ///
    /// The default implementation performs the synchronous fetch inline.
    async fn load_resource_async(
        &self,
        key: &str,
        ty: ResourceType,
    ) -> Result<Arc<dyn Resource>, BundleError> {
        self.load_resource(key, ty)
    }

    /// Records that `asset` holds a payload from this bundle.
    ///
    /// Called on every successful load, including no-op reloads, so it must be
    /// idempotent.
    fn register_asset(&self, asset: &AssetHandle);

    /// Forgets `asset`. Called once when the asset unloads or is disposed.
    fn unregister_asset(&self, asset: &AssetHandle);

    /// Drops one retain on the bundle.
    fn release(&self);
}
