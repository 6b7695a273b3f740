// Copyright 2024 kasane
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The read side of kasane: resolve a file's chunk list into the bytes a
//! reader sees and fetch them from the content store.

pub mod content;
pub mod err;
pub mod reader;

pub use content::{ContentStore, ContentStoreRef, ObjectContentStore};
pub use reader::FileReader;
