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

use kasane_common::{LogicUnitIndex, SlotIndex};
use kasane_utils::object_storage::ObjectStorageError;
use snafu::{Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    DeviceMmapError {
        #[snafu(implicit)]
        location: Location,
        source:   fmmap::error::Error,
    },

    DeviceIoError {
        #[snafu(implicit)]
        location: Location,
        source:   std::io::Error,
    },

    #[snafu(display("device {} cannot hold [{}, +{})", device, offset, len))]
    DeviceOutOfRange {
        device:   String,
        offset:   u64,
        len:      usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("swap file is full, all {} slots are in use", slots))]
    SwapFileFull {
        slots:    SlotIndex,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("write [{}, +{}) does not fit in unit {}", offset, len, unit_idx))]
    OutOfUnitBounds {
        unit_idx: LogicUnitIndex,
        offset:   u64,
        len:      usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("unit {} is sealed for flushing", unit_idx))]
    UnitSealed {
        unit_idx: LogicUnitIndex,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("flush of [{}, +{}) rejected: {}", offset, len, reason))]
    FlushRejected {
        offset:   u64,
        len:      u64,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    ObjectStorageError {
        #[snafu(implicit)]
        location: Location,
        source:   ObjectStorageError,
    },

    InvalidChunk {
        #[snafu(implicit)]
        location: Location,
        source:   kasane_types::chunk::Error,
    },
}

impl Error {
    pub fn is_sealed(&self) -> bool { matches!(self, Error::UnitSealed { .. }) }

    pub fn is_swap_full(&self) -> bool { matches!(self, Error::SwapFileFull { .. }) }
}

pub type Result<T> = std::result::Result<T, Error>;
