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

//! Interval resolution shared by the read and the write path.
//!
//! [resolve_visible_intervals] turns the chunk list of an object into the
//! byte ranges a reader sees, [WrittenIntervalTracker] records which parts of
//! a storage unit hold valid data.

mod point;
pub mod view;
pub mod visible;
pub mod written;

pub use view::{resolve_chunk_views, view_from_visible_intervals, ChunkView};
pub use visible::{resolve_visible_intervals, VisibleInterval};
pub use written::{MarkOutcome, WrittenIntervalTracker, WrittenRange};
