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

use kasane_common::KASANE_LOG_ENV;
use snafu::{ResultExt, Whatever};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the process wide subscriber.
///
/// The filter is read from the `KASANE_LOG` environment variable and falls
/// back to `default_filter` when it is unset or invalid.
pub fn init_logging(default_filter: &str) -> Result<(), Whatever> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(create_env_filter(default_filter))
        .with(fmt_layer)
        .try_init()
        .whatever_context("failed to install the tracing subscriber")?;
    tracing::info!("logging started");
    Ok(())
}

/// For tests. Safe to call from every test, only the first call installs.
pub fn install_fmt_log() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
    let _ = tracing_subscriber::registry()
        .with(create_env_filter("debug"))
        .with(fmt_layer)
        .try_init();
}

fn create_env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(KASANE_LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter))
}
