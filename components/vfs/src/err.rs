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

use kasane_utils::object_storage::ObjectStorageError;
use snafu::{Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to fetch {} [{}, +{})", file_id, offset, length))]
    FetchFailed {
        file_id:  String,
        offset:   u64,
        length:   u64,
        #[snafu(implicit)]
        location: Location,
        source:   ObjectStorageError,
    },

    #[snafu(display("fetch of {} returned {} bytes, expected {}", file_id, got, expected))]
    ShortFetch {
        file_id:  String,
        expected: u64,
        got:      u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("content {} is encrypted or compressed", file_id))]
    UnsupportedContent {
        file_id:  String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FetchFailed { source, .. } if kasane_utils::object_storage::is_not_found_error(source))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
