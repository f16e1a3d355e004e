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

//! # Cairn Core
//!
//! Foundational crate containing the asset lifecycle core: the reference-counted
//! [`asset::AssetHandle`], its editor counterpart, the [`asset::Bundle`] contract
//! that handles stream from, and the capability traits shared by every handle kind.

#![warn(missing_docs)]

pub mod asset;
pub mod settings;

pub use settings::VfsSettings;
