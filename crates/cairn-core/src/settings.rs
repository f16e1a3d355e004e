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

//! Configuration for opening packed bundles.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a bundle's archive lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsSettings {
    /// The bincode-encoded entry table of the archive.
    pub index_path: PathBuf,
    /// The raw archive data the index points into.
    pub pack_path: PathBuf,
}

impl Default for VfsSettings {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("index.bin"),
            pack_path: PathBuf::from("data.pack"),
        }
    }
}

impl VfsSettings {
    /// Parses settings from RON. Missing fields keep their default value.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse VFS settings")
    }

    /// Reads and parses a RON settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read VFS settings from {}", path.display()))?;
        Self::from_ron_str(&source)
    }

    /// Resolves both archive paths against `root`.
    pub fn rooted_at(&self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            index_path: root.join(&self.index_path),
            pack_path: root.join(&self.pack_path),
        }
    }
}
