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

use crate::{
    address::parse_neighbor_list,
    message::RemoteMessage,
    overlay::{NetworkType, Overlay},
    Node,
    NodeAddress,
    ResponseOutcome,
    REQUEST_TIMEOUT,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use std::collections::HashSet;

/// The fully-connected overlay: whenever a peer joins, its neighbor list is
/// fetched and approval requested from every entry, so that at steady state
/// every approved pair is mutually connected.
pub struct MeshOverlay {
    /// Every peer this node has ever learned about; reconnection candidates.
    known_peers: Mutex<HashSet<NodeAddress>>,
}

impl MeshOverlay {
    pub fn new() -> Self {
        Self {
            known_peers: Mutex::new(HashSet::new()),
        }
    }

    fn remember(&self, address: NodeAddress) {
        self.known_peers.lock().insert(address);
    }

    /// Pulls `peer`'s neighbor list and requests approval from each entry.
    async fn mesh_with_neighbors_of(&self, node: &Node, peer: NodeAddress) {
        self.remember(peer);

        let handle = node.remote_neighbors(peer);
        let (outcome, response) = handle.response_within(REQUEST_TIMEOUT).await;
        if outcome != ResponseOutcome::Success {
            debug!("Couldn't fetch the neighbor list of {}: {:?}", peer, outcome);
            return;
        }
        let message = match response {
            Some(message) => message,
            None => return,
        };

        for address in parse_neighbor_list(&message.payload) {
            if node.is_self(address) {
                continue;
            }
            self.remember(address);

            if node.get_approval(address).await {
                trace!("Meshed with {}, a neighbor of {}", address, peer);
            }
        }
    }
}

impl Default for MeshOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Overlay for MeshOverlay {
    fn network_type(&self) -> NetworkType {
        NetworkType::Mesh
    }

    async fn on_approval_granted(&self, node: &Node, peer: NodeAddress) {
        self.mesh_with_neighbors_of(node, peer).await;
    }

    async fn on_approval_request_granted(&self, node: &Node, peer: NodeAddress) {
        self.mesh_with_neighbors_of(node, peer).await;
    }

    async fn on_system_message(&self, _node: &Node, message: RemoteMessage) {
        trace!("The mesh overlay ignores system messages ({})", message.sender);
    }

    /// Reconnection attempts towards the seeds and every known peer.
    async fn update_network(&self, node: &Node) {
        let mut candidates: HashSet<NodeAddress> = self.known_peers.lock().clone();
        candidates.extend(node.seeds());

        for address in candidates {
            if node.is_self(address) || node.peer_book.ensure_approved(address).is_some() {
                continue;
            }

            if node.get_approval(address).await {
                debug!("Re-established the mesh link to {}", address);
            }
        }
    }
}
