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

#![allow(dead_code)]

use meshring_network::{Config, ConnectionResult, NetworkType, Node, NodeAddress};

use std::time::Duration;

/// A config with intervals tightened so convergence is observable quickly.
pub fn test_config(network_type: NetworkType) -> Config {
    let mut config = Config::new(network_type);
    config.ping_interval = Duration::from_millis(200);
    config.update_interval = Duration::from_millis(250);

    config
}

/// Starts a node on an ephemeral port and connects it through `seeds`.
pub async fn spawn_node(config: Config, seeds: &[NodeAddress]) -> (Node, ConnectionResult) {
    let node = Node::new(config);
    let result = node.connect(0, seeds).await.unwrap();

    (node, result)
}

pub async fn spawn_mesh_node(seeds: &[NodeAddress]) -> (Node, ConnectionResult) {
    spawn_node(test_config(NetworkType::Mesh), seeds).await
}

pub async fn spawn_chord_node(id: u32, seeds: &[NodeAddress]) -> (Node, ConnectionResult) {
    let mut config = test_config(NetworkType::Chord);
    config.chord_id = Some(id);

    spawn_node(config, seeds).await
}

pub fn address_of(node: &Node) -> NodeAddress {
    node.local_address().unwrap()
}
