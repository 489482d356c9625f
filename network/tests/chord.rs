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

mod common;

use common::{address_of, spawn_chord_node, spawn_mesh_node};
use meshring_network::{ConnectionResult, NetworkError, SendOutcome};
use meshring_testing::wait_for;

use serial_test::serial;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

#[tokio::test(flavor = "multi_thread")]
async fn lone_chord_node_owns_every_id() {
    let (node, result) = spawn_chord_node(10, &[]).await;

    assert_eq!(result, ConnectionResult::NewNetworkCreated);
    assert_eq!(node.chord_id().unwrap(), 10);
    assert_eq!(node.successor().unwrap(), None);

    // with no other members, every id maps back to this node
    let handle = node.send_chord_message(1234, "to myself").await.unwrap();
    assert_eq!(handle.outcome().await, SendOutcome::SelfFailure);

    node.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn chord_surface_is_rejected_on_a_mesh_node() {
    let (node, _) = spawn_mesh_node(&[]).await;

    assert!(matches!(node.chord_id(), Err(NetworkError::WrongNetworkType)));
    assert!(matches!(node.successor(), Err(NetworkError::WrongNetworkType)));
    assert!(matches!(node.fingers(), Err(NetworkError::WrongNetworkType)));
    assert!(node.send_chord_message(1, "nope").await.is_err());

    node.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn three_node_ring_converges() {
    // 1. X starts the ring alone.
    let (node_x, _) = spawn_chord_node(10, &[]).await;
    let addr_x = address_of(&node_x);

    // 2. Y joins through X; the two-node ring closes.
    let (node_y, result) = spawn_chord_node(40, &[addr_x]).await;
    assert_eq!(result, ConnectionResult::ConnectionSuccessful);

    wait_for(Duration::from_secs(15), || {
        node_x.successor().unwrap().map(|e| e.id) == Some(40)
    })
    .await;
    wait_for(Duration::from_secs(15), || {
        node_y.successor().unwrap().map(|e| e.id) == Some(10)
    })
    .await;

    // 3. Z joins through X as well.
    let (node_z, result) = spawn_chord_node(70, &[addr_x]).await;
    assert_eq!(result, ConnectionResult::ConnectionSuccessful);

    // 4. Following the successors walks the whole ring: 10 -> 40 -> 70 -> 10.
    let ring = [(&node_x, 40), (&node_y, 70), (&node_z, 10)];
    for (node, successor_id) in ring {
        wait_for(Duration::from_secs(15), || {
            node.successor().unwrap().map(|e| e.id) == Some(successor_id)
        })
        .await;
    }

    // 5. Predecessors are the inverse walk.
    let inverse = [(&node_x, 70), (&node_y, 10), (&node_z, 40)];
    for (node, predecessor_id) in inverse {
        wait_for(Duration::from_secs(15), || {
            node.predecessor().unwrap().map(|e| e.id) == Some(predecessor_id)
        })
        .await;
    }

    // 6. Id 50 lies in (40, 70], so Z owns it; a message routed to 50 from
    //    X lands on Z.
    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let received_clone = received.clone();
    let responder = node_z.clone();
    node_z.on_received_message(move |message| {
        received_clone.lock().unwrap().push(message.payload.clone());
        if message.awaiting_response {
            responder.send_response(&message, "owned here");
        }
    });

    let handle = node_x.send_chord_message(50, "for the owner of 50").await.unwrap();
    assert_eq!(handle.outcome().await, SendOutcome::Success);
    wait_for(Duration::from_secs(15), || {
        received.lock().unwrap().as_slice() == ["for the owner of 50".to_owned()]
    })
    .await;

    // 7. The await-response variant routes the same way and comes back.
    let handle = node_x
        .send_chord_message_await_response(50, "who owns 50?")
        .await
        .unwrap();
    let (outcome, response) = handle.response().await;
    assert_eq!(outcome, meshring_network::ResponseOutcome::Success);
    assert_eq!(response.unwrap().payload, "owned here");

    node_x.disconnect().await;
    node_y.disconnect().await;
    node_z.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn fingers_point_at_ring_members() {
    let (node_x, _) = spawn_chord_node(10, &[]).await;
    let addr_x = address_of(&node_x);
    let (node_y, _) = spawn_chord_node(40, &[addr_x]).await;

    wait_for(Duration::from_secs(15), || {
        node_x.successor().unwrap().map(|e| e.id) == Some(40)
    })
    .await;
    wait_for(Duration::from_secs(15), || {
        node_y.successor().unwrap().map(|e| e.id) == Some(10)
    })
    .await;

    // once fix_fingers has run, every resolved entry points at a member
    wait_for(Duration::from_secs(15), || {
        let fingers = node_x.fingers().unwrap();
        fingers.iter().flatten().count() > 0
            && fingers.iter().flatten().all(|entry| entry.id == 10 || entry.id == 40)
    })
    .await;

    node_x.disconnect().await;
    node_y.disconnect().await;
}
