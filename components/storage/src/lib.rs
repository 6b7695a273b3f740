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

pub mod config;
pub mod device;
pub mod err;
pub mod page_writer;
pub mod sink;
pub mod swap_file;
pub mod unit;

pub use config::StorageConfig;
pub use page_writer::PageWriter;
pub use sink::{FlushSink, ObjectStorageSink};
pub use swap_file::SwapFile;
pub use unit::SwapUnit;
