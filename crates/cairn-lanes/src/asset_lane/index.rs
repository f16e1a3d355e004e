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

use cairn_core::asset::normalize_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The location and stored type of one resource inside `data.pack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    /// The normalized key the entry is looked up by.
    pub asset_path_lower: String,
    /// The name of the loader that decodes the entry (e.g. "texture").
    pub type_name: String,
    /// Byte offset of the entry in the pack file.
    pub offset: u64,
    /// Byte length of the entry.
    pub size: u64,
}

/// The runtime representation of a pack's `index.bin`.
///
/// Provides O(1) lookups of entries by normalized key.
#[derive(Debug, Default)]
pub struct PackIndex {
    entries: HashMap<String, PackEntry>,
}

impl PackIndex {
    /// Decodes an index from the raw bytes of `index.bin`.
    ///
    /// # Errors
    /// Returns a `DecodeError` if the byte slice is not a valid, bincode-encoded
    /// list of `PackEntry`.
    pub fn from_bytes(index_bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let config = bincode::config::standard();
        let (entries, _): (Vec<PackEntry>, _) =
            bincode::serde::decode_from_slice(index_bytes, config)?;

        let entries = entries
            .into_iter()
            .map(|entry| (entry.asset_path_lower.clone(), entry))
            .collect();

        Ok(Self { entries })
    }

    /// Retrieves the entry stored under the normalized `key`.
    pub fn get(&self, key: &str) -> Option<&PackEntry> {
        self.entries.get(key)
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index has no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds an `index.bin`/`data.pack` pair in memory.
#[derive(Debug, Default)]
pub struct PackBuilder {
    entries: Vec<PackEntry>,
    data: Vec<u8>,
}

impl PackBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` under the normalized form of `path`.
    pub fn add(&mut self, path: &str, type_name: &str, bytes: &[u8]) -> &mut Self {
        self.entries.push(PackEntry {
            asset_path_lower: normalize_path(path),
            type_name: type_name.to_string(),
            offset: self.data.len() as u64,
            size: bytes.len() as u64,
        });
        self.data.extend_from_slice(bytes);
        self
    }

    /// Encodes the index and returns `(index_bytes, pack_bytes)`.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<u8>), bincode::error::EncodeError> {
        let config = bincode::config::standard();
        let index_bytes = bincode::serde::encode_to_vec(&self.entries, config)?;
        Ok((index_bytes, self.data))
    }
}
