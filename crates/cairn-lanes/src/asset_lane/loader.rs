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

use cairn_core::asset::{BundleError, Resource, ResourceType};
use std::{collections::HashMap, error::Error, io, marker::PhantomData, sync::Arc};

/// A trait for types that can decode a specific kind of resource from a byte slice.
///
/// Implementors are responsible for the potentially CPU-intensive work of
/// parsing raw entry data into a usable resource. Each `AssetLoader` is
/// specialized for a single resource type `A`.
pub trait AssetLoader<A: Resource> {
    /// Parses a byte slice and converts it into an instance of `A`.
    ///
    /// # Parameters
    /// - `bytes`: The raw byte data read from a pack entry.
    ///
    /// # Returns
    /// A `Result` containing the decoded resource on success, or a boxed dynamic
    /// error on failure. The error must be thread-safe.
    fn load(&self, bytes: &[u8]) -> Result<A, Box<dyn Error + Send + Sync>>;
}

/// Internal trait for decoding any resource type.
trait AnyLoader: Send + Sync {
    fn resource_type(&self) -> ResourceType;
    fn load_any(&self, bytes: &[u8]) -> Result<Arc<dyn Resource>, Box<dyn Error + Send + Sync>>;
}

/// Takes a generic `AssetLoader<A>` and implements `AnyLoader`.
struct AssetLoaderWrapper<A: Resource, L: AssetLoader<A>>(L, PhantomData<A>);

impl<A: Resource, L: AssetLoader<A> + Send + Sync> AnyLoader for AssetLoaderWrapper<A, L> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::of::<A>()
    }

    fn load_any(&self, bytes: &[u8]) -> Result<Arc<dyn Resource>, Box<dyn Error + Send + Sync>> {
        let resource: A = self.0.load(bytes)?;
        Ok(Arc::new(resource))
    }
}

/// Maps the type names stored in a pack index to the loaders that decode them.
#[derive(Default)]
pub struct ResourceLoaderRegistry {
    loaders: HashMap<String, Box<dyn AnyLoader>>,
}

impl ResourceLoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` for entries stored under `type_name`, replacing any
    /// previous loader for that name.
    pub fn register<A: Resource>(
        &mut self,
        type_name: &str,
        loader: impl AssetLoader<A> + Send + Sync + 'static,
    ) {
        let wrapped = AssetLoaderWrapper(loader, PhantomData);
        self.loaders.insert(type_name.to_string(), Box::new(wrapped));
    }

    /// Returns `true` if a loader is registered for `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.loaders.contains_key(type_name)
    }

    /// Decodes the entry `key`, stored as `type_name`, into a resource satisfying
    /// `requested`.
    ///
    /// The loader and the requested type are checked before `read` is called, so
    /// no I/O happens for a request that cannot succeed.
    pub fn load(
        &self,
        key: &str,
        type_name: &str,
        requested: ResourceType,
        read: impl FnOnce() -> io::Result<Vec<u8>>,
    ) -> Result<Arc<dyn Resource>, BundleError> {
        let loader = self
            .loaders
            .get(type_name)
            .ok_or_else(|| BundleError::NoLoader {
                type_name: type_name.to_string(),
            })?;

        if !requested.accepts(loader.resource_type()) {
            return Err(BundleError::TypeMismatch {
                key: key.to_string(),
                requested: requested.name(),
                stored: type_name.to_string(),
            });
        }

        let bytes = read()?;
        loader.load_any(&bytes).map_err(|err| BundleError::Decode {
            key: key.to_string(),
            message: err.to_string(),
        })
    }
}
