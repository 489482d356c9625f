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

use crate::{NetworkType, CONNECTION_TIMEOUT, PING_FREQUENCY, UPDATE_NETWORK_FREQUENCY};

use std::time::Duration;

/// The pre-configured parameters of a node.
#[derive(Clone, Debug)]
pub struct Config {
    /// The overlay this node declares during approval handshakes.
    pub network_type: NetworkType,
    /// How often approved neighbors are pinged.
    pub ping_interval: Duration,
    /// How long an approved peer may stay silent before it is dropped;
    /// twice the ping interval by default.
    pub connection_timeout: Duration,
    /// How often overlay maintenance runs.
    pub update_interval: Duration,
    /// Pins the Chord identifier instead of drawing one; intended for tests.
    pub chord_id: Option<u32>,
}

impl Config {
    pub fn new(network_type: NetworkType) -> Self {
        Self {
            network_type,
            ping_interval: PING_FREQUENCY,
            connection_timeout: CONNECTION_TIMEOUT,
            update_interval: UPDATE_NETWORK_FREQUENCY,
            chord_id: None,
        }
    }

    pub fn mesh() -> Self {
        Self::new(NetworkType::Mesh)
    }

    pub fn chord() -> Self {
        Self::new(NetworkType::Chord)
    }
}
