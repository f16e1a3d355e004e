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

use std::sync::Arc;
use thiserror::Error;

/// An error raised by a bundle (or an editor source) while producing a payload.
///
/// Cloning is cheap, so one failed fetch can be reported to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum BundleError {
    /// The archive has no entry under the requested key.
    #[error("No entry '{key}' in bundle")]
    EntryNotFound {
        /// The normalized key that was looked up.
        key: String,
    },
    /// No decoder is registered for the entry's stored type.
    #[error("No loader registered for resource type '{type_name}'")]
    NoLoader {
        /// The stored type name of the entry.
        type_name: String,
    },
    /// The entry is stored as another type than the one requested.
    #[error("Entry '{key}' is a '{stored}' but '{requested}' was requested")]
    TypeMismatch {
        /// The normalized key of the entry.
        key: String,
        /// The type the caller asked for.
        requested: &'static str,
        /// The type the entry is stored as.
        stored: String,
    },
    /// The decoder rejected the entry's bytes.
    #[error("Failed to decode '{key}': {message}")]
    Decode {
        /// The normalized key of the entry.
        key: String,
        /// The decoder's error message.
        message: String,
    },
    /// The bundle has no open archive to read from.
    #[error("Bundle is not loaded")]
    NotLoaded,
    /// Reading the archive failed.
    #[error("Bundle I/O failed: {0}")]
    Io(#[source] Arc<std::io::Error>),
    /// A background fetch task did not run to completion.
    #[error("Background fetch task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::Io(Arc::new(err))
    }
}

/// A precondition violation (or fetch failure) reported by an asset load.
///
/// None of these are retried by the handle; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The handle has no owning bundle, or the bundle no longer exists.
    #[error("Load asset but bundle is missing, asset: {path}")]
    MissingBundle {
        /// The normalized key of the asset.
        path: String,
    },
    /// The owning bundle exists but is not in the `Loaded` state.
    #[error("Load asset but bundle is not ready, asset: {path}")]
    BundleNotReady {
        /// The normalized key of the asset.
        path: String,
    },
    /// The handle already reached the terminal `Unloaded` state.
    #[error("Attempt to load an unloaded asset: {path}")]
    AlreadyUnloaded {
        /// The normalized key of the asset.
        path: String,
    },
    /// The bundle failed to produce the payload.
    #[error("Bundle failed to provide asset {path}")]
    Fetch {
        /// The normalized key of the asset.
        path: String,
        /// The underlying bundle failure.
        #[source]
        source: BundleError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn asset_error_display() {
        let err = AssetError::MissingBundle {
            path: "textures/hero.png".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Load asset but bundle is missing, asset: textures/hero.png"
        );
    }

    #[test]
    fn fetch_error_exposes_its_source() {
        let err = AssetError::Fetch {
            path: "textures/hero.png".to_string(),
            source: BundleError::EntryNotFound {
                key: "textures/hero.png".to_string(),
            },
        };
        assert_eq!(
            format!("{}", err.source().unwrap()),
            "No entry 'textures/hero.png' in bundle"
        );
    }

    #[test]
    fn io_errors_survive_a_clone() {
        let err: BundleError = std::io::Error::other("data.pack truncated").into();
        let copy = err.clone();
        assert_eq!(format!("{copy}"), "Bundle I/O failed: data.pack truncated");
        assert!(copy.source().is_some());
    }
}
