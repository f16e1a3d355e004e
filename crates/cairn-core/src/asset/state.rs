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

use std::fmt;

/// The position of an asset (or a bundle) in its load lifecycle.
///
/// `Idle → Loading → Loaded → Unloaded`. `Unloaded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Created but never asked to load.
    #[default]
    Idle,
    /// A fetch has started and has not completed yet.
    Loading,
    /// The payload is materialized.
    Loaded,
    /// The payload was released and the relation to the bundle was cut.
    Unloaded,
}

impl LoadState {
    /// Returns `true` for the terminal [`LoadState::Unloaded`] state.
    pub fn is_terminal(self) -> bool {
        self == LoadState::Unloaded
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Unloaded => "unloaded",
        };
        f.write_str(label)
    }
}
