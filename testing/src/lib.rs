// Copyright (C) 2019-2021 Aleo Systems Inc.
// This file is part of the meshring library.

// The meshring library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The meshring library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the meshring library. If not, see <https://www.gnu.org/licenses/>.

use tracing_subscriber::filter::EnvFilter;

use std::time::{Duration, Instant};

/// How often `wait_for` re-checks its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Initializes a log collector for a test run; `RUST_LOG` syntax applies,
/// with noisy low-level targets silenced. Safe to call from several tests.
pub fn start_logger() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "off".to_owned());
    let filter = EnvFilter::new(format!("{},mio=off", directives));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Polls `condition` until it holds, panicking once `limit` has elapsed.
///
/// Convergence assertions (mesh links, ring pointers) go through this so a
/// hung network fails the test instead of wedging it.
pub async fn wait_for<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;

    while !condition() {
        assert!(
            Instant::now() < deadline,
            "the condition didn't hold within {:?}",
            limit
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
