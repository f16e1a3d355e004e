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

/// The immutable identity of a resource, as produced by a resolver.
///
/// `asset_path` keeps the caller's spelling for diagnostics, while
/// `asset_path_lower` is the normalized key used for every cache and bundle lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryResult {
    asset_path: String,
    asset_path_lower: String,
}

impl QueryResult {
    /// Resolves `path` into an identity, deriving the normalized key from it.
    ///
    /// The key is lower-cased, uses `/` as separator, and has no leading `./` or `/`.
    pub fn new(path: impl Into<String>) -> Self {
        let asset_path = path.into();
        let asset_path_lower = normalize_path(&asset_path);
        Self {
            asset_path,
            asset_path_lower,
        }
    }

    /// Builds an identity from an already-normalized pair.
    pub fn from_parts(asset_path: impl Into<String>, asset_path_lower: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            asset_path_lower: asset_path_lower.into(),
        }
    }

    /// The canonical path as requested.
    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    /// The normalized lookup key.
    pub fn asset_path_lower(&self) -> &str {
        &self.asset_path_lower
    }
}

/// Normalizes an asset path into a lookup key.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/").to_lowercase();
    let mut key = unified.as_str();
    loop {
        if let Some(rest) = key.strip_prefix("./") {
            key = rest;
        } else if let Some(rest) = key.strip_prefix('/') {
            key = rest;
        } else {
            break;
        }
    }
    key.to_string()
}
