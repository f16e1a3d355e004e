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

use super::PackEntry;
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
};

/// A "Lane" responsible for the I/O task of reading raw entry bytes from a `data.pack` file.
///
/// This struct encapsulates the low-level logic of seeking to an entry's
/// location in the pack file and reading exactly its bytes.
pub struct PackLoadingLane {
    /// An open file handle to the `data.pack` file.
    pack_file: File,
}

impl PackLoadingLane {
    /// Creates a new lane with a handle to the pack file.
    pub fn new(pack_file: File) -> Self {
        Self { pack_file }
    }

    /// Reads the raw bytes of `entry` from the pack file.
    ///
    /// An entry reaching past the end of the file is rejected with
    /// [`io::ErrorKind::InvalidData`] before anything is allocated.
    pub fn load_entry_bytes(&mut self, entry: &PackEntry) -> io::Result<Vec<u8>> {
        let pack_len = self.pack_file.metadata()?.len();
        let in_bounds = entry
            .offset
            .checked_add(entry.size)
            .is_some_and(|end| end <= pack_len);
        if !in_bounds {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "entry '{}' ({} bytes at offset {}) exceeds the {}-byte pack file",
                    entry.asset_path_lower, entry.size, entry.offset, pack_len
                ),
            ));
        }
        let size = usize::try_from(entry.size)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let mut buffer = vec![0; size];
        self.pack_file.seek(SeekFrom::Start(entry.offset))?;
        self.pack_file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}
