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

pub mod chord;
pub use self::chord::{ChordOverlay, RingEntry};

pub mod mesh;
pub use self::mesh::MeshOverlay;

use crate::{message::RemoteMessage, Node, NodeAddress};

use async_trait::async_trait;

use std::fmt;

/// The overlay flavor a node runs; declared during the approval handshake,
/// and only matching declarations may join one another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkType {
    Mesh,
    Chord,
}

impl NetworkType {
    pub fn tag(self) -> &'static str {
        match self {
            NetworkType::Mesh => "mesh",
            NetworkType::Chord => "chord",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The overlay-maintenance strategy plugged into the node runtime.
///
/// The approval hooks run on the approval-events task, never on the
/// dispatcher, so they may synchronously wait on further RPCs without
/// deadlocking the node.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// The overlay type declared during approval handshakes.
    fn network_type(&self) -> NetworkType;

    /// Runs after this node has approved `peer` into the network.
    async fn on_approval_granted(&self, node: &Node, peer: NodeAddress);

    /// Runs after `peer` has approved this node into the network.
    async fn on_approval_request_granted(&self, node: &Node, peer: NodeAddress);

    /// Handles an overlay control message; must not block the dispatcher.
    async fn on_system_message(&self, node: &Node, message: RemoteMessage);

    /// Periodic maintenance, driven by the node's update loop.
    async fn update_network(&self, node: &Node);
}
