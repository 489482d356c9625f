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
    address::encode_neighbor_list,
    message::{Frame, MessageKind, RemoteMessage},
    node::ApprovalEvent,
    stats,
    Node,
};

use tokio::task;

use std::net::{IpAddr, SocketAddr};

/// The approval verdicts exchanged during the admission handshake.
pub(crate) const APPROVAL_GRANTED: &str = "approved";
pub(crate) const APPROVAL_DENIED: &str = "failure";

impl Node {
    /// Classifies one decoded frame and routes it.
    ///
    /// Responses are stored into the pending-response table before any
    /// kind-specific handling, so that response frames of every kind reach
    /// their waiters; request handling below only ever sees non-responses.
    pub(crate) async fn process_frame(&self, source: SocketAddr, frame: Frame) {
        let observed_ip = match source.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                trace!("Dropping a frame from the non-IPv4 source {}", source);
                return;
            }
        };

        if frame.kind == MessageKind::Unknown {
            metrics::increment_counter!(stats::INBOUND_UNKNOWN);
            trace!("Dropping a frame with an unknown kind from {}", source);
            return;
        }

        let message = RemoteMessage::from_frame(observed_ip, &frame);
        // remember which listening address this stream belongs to, so the
        // pairing can be torn down as one later
        self.peer_book.note_listening_address(source, message.sender);

        if message.in_response_to_message {
            if !self.responses.complete(frame.message_id, message) {
                trace!("No waiter for the response with id {}", frame.message_id);
            }
            return;
        }

        match frame.kind {
            MessageKind::Approval => {
                metrics::increment_counter!(stats::INBOUND_APPROVALS);
                self.handle_approval_request(message);
            }
            MessageKind::Neighbors => {
                metrics::increment_counter!(stats::INBOUND_NEIGHBORS);
                self.handle_neighbors_request(&message);
            }
            MessageKind::Ping => {
                metrics::increment_counter!(stats::INBOUND_PINGS);
                self.handle_ping(&message);
            }
            MessageKind::System => {
                metrics::increment_counter!(stats::INBOUND_SYSTEM);
                self.overlay().on_system_message(self, message).await;
            }
            MessageKind::User => {
                metrics::increment_counter!(stats::INBOUND_USER);
                self.deliver_user_message(message);
            }
            MessageKind::Unknown => unreachable!(),
        }
    }

    /// Decides an admission request.
    ///
    /// Runs on its own task: granting approval dials back to the requester,
    /// and the dispatcher must not stall behind that dial.
    fn handle_approval_request(&self, message: RemoteMessage) {
        let node = self.clone();

        task::spawn(async move {
            let declared = message.payload.as_str();
            if declared != node.config.network_type.tag() {
                debug!(
                    "Denying {} approval: it declared \"{}\", this network is \"{}\"",
                    message.sender,
                    declared,
                    node.config.network_type
                );
                node.send_response_frame(MessageKind::Approval, &message, APPROVAL_DENIED);
                return;
            }

            match node.peer_book.ensure_outbound(message.sender).await {
                Some(connection) => {
                    connection.set_approved();
                    info!("Approved {} into the network", message.sender);
                    node.send_response_frame(MessageKind::Approval, &message, APPROVAL_GRANTED);
                    node.enqueue_approval_event(ApprovalEvent::Granted(message.sender));
                }
                None => {
                    warn!("Couldn't connect back to {}; denying approval", message.sender);
                    node.send_response_frame(MessageKind::Approval, &message, APPROVAL_DENIED);
                }
            }
        });
    }

    /// Answers with the `;`-separated list of currently approved neighbors.
    fn handle_neighbors_request(&self, message: &RemoteMessage) {
        let neighbors = self.peer_book.approved_addresses();
        let payload = encode_neighbor_list(&neighbors);

        self.send_response_frame(MessageKind::Neighbors, message, &payload);
    }

    /// A ping proves the sender is alive; refresh its approved pairing.
    fn handle_ping(&self, message: &RemoteMessage) {
        if let Some(connection) = self.peer_book.ensure_approved(message.sender) {
            connection.refresh_last_ping();
        }
    }

    /// Queues a user message for the consumer's handler task.
    fn deliver_user_message(&self, message: RemoteMessage) {
        if !self.enqueue_user_message(message) {
            trace!("The user message queue is closed; dropping a message");
        }
    }
}
