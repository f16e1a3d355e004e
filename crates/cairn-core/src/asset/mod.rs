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

//! Provides the lifecycle core of Cairn's asset system.
//!
//! This module owns everything needed to track a single loaded resource from the
//! moment a consumer first queries it until its payload is physically released:
//! - The [`Resource`] trait: the contract every loaded payload fulfils.
//! - [`AssetHandle`]: a reference-counted cache line streamed from a [`Bundle`].
//! - [`EditorAsset`]: a pre-materialized handle that never touches a bundle.
//! - [`AnyAsset`]: the tagged union selecting between the two at construction time.
//! - The [`Queryable`], [`RefCounted`] and [`Disposable`] capability traits.
//!
//! How bundles are located, how archives are read, and how payloads are consumed
//! are all left to other crates.

mod any;
mod bundle;
mod capability;
mod editor;
mod error;
mod handle;
mod query;
mod state;

pub use any::*;
pub use bundle::*;
pub use capability::*;
pub use editor::*;
pub use error::*;
pub use handle::*;
pub use query::*;
pub use state::*;

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

/// Upcasting helpers that let a `dyn Resource` be downcast to its concrete type.
///
/// Implemented automatically for every `Any + Send + Sync` type.
pub trait AsAny: Any + Send + Sync {
    /// Returns `self` as a `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared pointer to `self` into a shared `dyn Any` pointer.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A payload that can be held by an asset handle.
///
/// Resources are shared between every consumer that retains the owning handle, so
/// they must be `Send + Sync`. When the last retain is released the handle calls
/// [`Resource::release_memory`] exactly once, unless the resource reports itself as
/// a scene object.
///
/// # Examples
///
/// ```
/// use cairn_core::asset::Resource;
///
/// #[derive(Debug)]
/// struct Texture {
///     width: u32,
///     height: u32,
/// }
///
/// impl Resource for Texture {}
/// ```
pub trait Resource: AsAny + Debug {
    /// Physically releases the native memory behind this resource.
    fn release_memory(&self) {}

    /// Scene objects may still be referenced by owners outside the cache and are
    /// never force-released.
    fn is_scene_object(&self) -> bool {
        false
    }
}

/// The type a load request asks a bundle to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceType {
    id: TypeId,
    name: &'static str,
}

impl ResourceType {
    /// The type descriptor for a concrete resource type `T`.
    pub fn of<T: Resource>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// A wildcard descriptor accepting whatever type the bundle stores.
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<dyn Resource>(),
            name: "any",
        }
    }

    /// The [`TypeId`] of the described type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The human-readable name of the described type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this is the [`ResourceType::any`] wildcard.
    pub fn is_any(&self) -> bool {
        self.id == TypeId::of::<dyn Resource>()
    }

    /// Returns `true` if a resource of type `stored` satisfies a request for `self`.
    pub fn accepts(&self, stored: ResourceType) -> bool {
        self.is_any() || self.id == stored.id
    }

    /// Returns `true` if `resource` is an instance of the described type.
    pub fn matches(&self, resource: &dyn Resource) -> bool {
        self.is_any() || <dyn Resource as AsAny>::as_any(resource).type_id() == self.id
    }
}

/// Projects a shared resource onto its concrete type, or `None` if it is another type.
pub fn downcast_resource<T: Resource>(resource: Arc<dyn Resource>) -> Option<Arc<T>> {
    resource.into_any_arc().downcast::<T>().ok()
}

/// Physically releases `resource` unless it is a scene object.
pub(crate) fn release_payload(resource: &Arc<dyn Resource>) {
    if resource.is_scene_object() {
        log::trace!("Skipping physical release of scene object {resource:?}");
        return;
    }
    resource.release_memory();
}

/// The identity token of a materialized payload. Two loads that produce the same
/// shared allocation report the same token.
pub(crate) fn payload_identity(resource: &Arc<dyn Resource>) -> u64 {
    Arc::as_ptr(resource) as *const () as usize as u64
}
