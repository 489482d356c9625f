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

#[macro_use]
extern crate log;

pub mod address;
pub use self::address::*;

pub mod config;
pub use self::config::*;

pub mod errors;
pub use self::errors::*;

pub mod inbound;

pub mod message;
pub use self::message::{Frame, FrameBuffer, MessageKind, RemoteMessage};

pub mod node;
pub use self::node::*;

pub mod outbound;
pub use self::outbound::{
    ResponseOutcome,
    ResponseProgress,
    ResponseResult,
    SendOutcome,
    SendProgress,
    SendResult,
};

pub mod overlay;
pub use self::overlay::{ChordOverlay, MeshOverlay, NetworkType, Overlay, RingEntry};

pub mod peers;
pub use self::peers::*;

pub mod stats;

use std::time::Duration;

/// How often approved neighbors are pinged.
pub const PING_FREQUENCY: Duration = Duration::from_secs(10);

/// How long an approved peer may stay silent before it is considered dead.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// How often overlay maintenance (reconnection, ring stabilization) runs.
pub const UPDATE_NETWORK_FREQUENCY: Duration = Duration::from_secs(30);

/// How long internal request RPCs wait for their response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The maximum number of bytes pulled off an inbound stream in one pass.
pub const READ_CHUNK_SIZE: usize = 1024;

/// The number of entries in a Chord finger table.
pub const FINGER_TABLE_SIZE: usize = 31;

/// The size of the Chord identifier space; ids are 31-bit.
pub const ID_SPACE: u64 = 1 << 31;
