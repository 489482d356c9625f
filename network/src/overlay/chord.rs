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

//! The Chord ring overlay: a successor, a predecessor and a 31-entry finger
//! table per node, maintained with the classic stabilize / notify /
//! fix_fingers loop, all carried over the library's own system-message
//! plane.

use crate::{
    message::RemoteMessage,
    overlay::{NetworkType, Overlay},
    NetworkError,
    Node,
    NodeAddress,
    ResponseOutcome,
    FINGER_TABLE_SIZE,
    ID_SPACE,
    REQUEST_TIMEOUT,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{thread_rng, Rng};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task,
};

const SYSTEM_SUCCESSOR: &str = "successor";
const SYSTEM_PREDECESSOR: &str = "predecessor";
const SYSTEM_ID: &str = "id";
const SYSTEM_NOTIFY: &str = "notify";
const SYSTEM_FIND_SUCCESSOR: &str = "findsuccessor";

/// A ring member: its address paired with its 31-bit identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingEntry {
    pub address: NodeAddress,
    pub id: u32,
}

impl RingEntry {
    /// The `ip:port|id` wire form used in `findsuccessor` replies.
    fn encode(&self) -> String {
        format!("{}|{}", self.address, self.id)
    }

    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(2, '|');
        let address = NodeAddress::from_literal(parts.next()?)?;
        let id = parts.next()?.trim().parse::<u32>().ok()?;

        Some(Self { address, id })
    }
}

#[derive(Default)]
struct RingState {
    successor: Option<RingEntry>,
    predecessor: Option<RingEntry>,
}

/// An incoming `findsuccessor` request, queued for the lookup worker so the
/// recursive resolution never runs on the dispatcher.
pub(crate) struct LookupRequest {
    pub requester: NodeAddress,
    pub message_id: u64,
    pub target: u32,
}

/// The Chord overlay state of one node.
pub struct ChordOverlay {
    /// This node's identifier; drawn once and stable for its lifetime.
    id: u32,
    ring: Mutex<RingState>,
    fingers: Mutex<[Option<RingEntry>; FINGER_TABLE_SIZE]>,
    lookup_sender: UnboundedSender<LookupRequest>,
    lookup_receiver: Mutex<Option<UnboundedReceiver<LookupRequest>>>,
}

impl ChordOverlay {
    /// Creates the overlay state; `fixed_id` pins the identifier (tests),
    /// otherwise one is drawn at random from the 31-bit space.
    pub fn new(fixed_id: Option<u32>) -> Self {
        let id = fixed_id.unwrap_or_else(|| thread_rng().gen_range(1..ID_SPACE as u32));
        let (lookup_sender, lookup_receiver) = unbounded_channel();

        Self {
            id,
            ring: Mutex::new(RingState::default()),
            fingers: Mutex::new([None; FINGER_TABLE_SIZE]),
            lookup_sender,
            lookup_receiver: Mutex::new(Some(lookup_receiver)),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn successor(&self) -> Option<RingEntry> {
        self.ring.lock().successor
    }

    pub fn predecessor(&self) -> Option<RingEntry> {
        self.ring.lock().predecessor
    }

    pub fn fingers(&self) -> Vec<Option<RingEntry>> {
        self.fingers.lock().to_vec()
    }

    /// The modular "between" predicate over 31-bit ids; a negative value
    /// means "unset" and makes the corresponding bound unbounded (or, for
    /// `x` itself, fails the test outright).
    fn id_between(min: i64, max: i64, x: i64) -> bool {
        if x < 0 {
            return false;
        }
        if min < 0 || max < 0 {
            return true;
        }
        if min < max {
            min < x && x < max
        } else {
            x > min || x < max
        }
    }

    /// Joins the ring through `seed`; the approval handshake has already
    /// succeeded at this point.
    pub(crate) async fn join(&self, node: &Node, seed: NodeAddress) {
        match self.remote_find_successor(node, seed, self.id).await {
            Ok(entry) => {
                debug!("Joined the ring; successor is {} ({})", entry.address, entry.id);
                self.ring.lock().successor = Some(entry);
            }
            Err(error) => {
                warn!("Couldn't resolve a successor through {}: {}", seed, error);
            }
        }
    }

    /// Resolves the node responsible for `target`.
    ///
    /// `Ok(None)` means this node has no successor yet, which a remote
    /// caller reads as "the callee itself is the best candidate".
    pub(crate) async fn find_successor(
        &self,
        node: &Node,
        target: u32,
    ) -> Result<Option<RingEntry>, NetworkError> {
        let successor = match self.successor() {
            Some(successor) => successor,
            None => return Ok(None),
        };

        // ids in (self.id, successor.id] belong to the successor
        if target == successor.id
            || Self::id_between(self.id as i64, successor.id as i64, target as i64)
        {
            return Ok(Some(successor));
        }

        let next_hop = self.closest_preceding(target).unwrap_or(successor);
        if node.is_self(next_hop.address) {
            return Ok(Some(successor));
        }

        self.remote_find_successor(node, next_hop.address, target)
            .await
            .map(Some)
    }

    /// Scans the finger table from high to low for the first entry strictly
    /// between this node and `target`.
    fn closest_preceding(&self, target: u32) -> Option<RingEntry> {
        let fingers = self.fingers.lock();
        for entry in fingers.iter().rev().flatten() {
            if Self::id_between(self.id as i64, target as i64, entry.id as i64) {
                return Some(*entry);
            }
        }

        None
    }

    /// Asks `peer` to resolve `target`; an empty reply downgrades to "the
    /// callee is the successor" (its id is then fetched separately).
    async fn remote_find_successor(
        &self,
        node: &Node,
        peer: NodeAddress,
        target: u32,
    ) -> Result<RingEntry, NetworkError> {
        let reply = self
            .system_request(node, peer, format!("{}|{}", SYSTEM_FIND_SUCCESSOR, target))
            .await?;

        if reply.is_empty() {
            let id = self.remote_id_of(node, peer).await?;
            return Ok(RingEntry { address: peer, id });
        }

        RingEntry::parse(&reply).ok_or(NetworkError::RequestFailed)
    }

    async fn remote_id_of(&self, node: &Node, peer: NodeAddress) -> Result<u32, NetworkError> {
        let reply = self.system_request(node, peer, SYSTEM_ID.to_owned()).await?;

        reply.trim().parse::<u32>().map_err(|_| NetworkError::RequestFailed)
    }

    /// One system-plane request/response exchange with a bounded wait.
    async fn system_request(
        &self,
        node: &Node,
        peer: NodeAddress,
        payload: String,
    ) -> Result<String, NetworkError> {
        let handle = node.send_system_request(peer, &payload);
        let (outcome, response) = handle.response_within(REQUEST_TIMEOUT).await;

        match (outcome, response) {
            (ResponseOutcome::Success, Some(message)) => Ok(message.payload),
            _ => Err(NetworkError::RequestFailed),
        }
    }

    /// Corrects the successor pointer using the successor's current
    /// predecessor, then offers this node as that successor's predecessor.
    async fn stabilize(&self, node: &Node) {
        let (successor, predecessor) = {
            let ring = self.ring.lock();
            (ring.successor, ring.predecessor)
        };

        let successor = match successor {
            Some(successor) => successor,
            None => {
                // with no successor there is no ring order to violate yet;
                // a known predecessor is the only way to close the loop
                match predecessor {
                    Some(predecessor) => {
                        debug!(
                            "No successor; adopting the predecessor {} ({})",
                            predecessor.address, predecessor.id
                        );
                        self.ring.lock().successor = Some(predecessor);
                        predecessor
                    }
                    None => return,
                }
            }
        };

        if let Ok(reply) = self
            .system_request(node, successor.address, SYSTEM_PREDECESSOR.to_owned())
            .await
        {
            if !reply.is_empty() {
                if let Some(address) = NodeAddress::from_literal(&reply) {
                    if !node.is_self(address) {
                        if let Ok(id) = self.remote_id_of(node, address).await {
                            if Self::id_between(self.id as i64, successor.id as i64, id as i64) {
                                debug!("Adopting {} ({}) as the new successor", address, id);
                                self.ring.lock().successor = Some(RingEntry { address, id });
                            }
                        }
                    }
                }
            }
        }

        // fire-and-forget: the successor decides whether we become its predecessor
        if let Some(successor) = self.successor() {
            node.send_system_oneway(successor.address, SYSTEM_NOTIFY);
        }
    }

    /// Recomputes every finger; a failed lookup leaves the entry for the
    /// next cycle.
    async fn fix_fingers(&self, node: &Node) {
        for i in 0..FINGER_TABLE_SIZE {
            let target = ((self.id as u64 + (1u64 << i)) % ID_SPACE) as u32;

            if let Ok(Some(entry)) = self.find_successor(node, target).await {
                self.fingers.lock()[i] = Some(entry);
            }
        }
    }

    /// Applies a `notify` from `peer`: it becomes the predecessor when none
    /// is set or when its id falls between the current predecessor and us.
    async fn accept_notify(&self, node: &Node, peer: NodeAddress) {
        let peer_id = match self.remote_id_of(node, peer).await {
            Ok(id) => id,
            Err(_) => return,
        };

        let mut ring = self.ring.lock();
        let predecessor_id = ring.predecessor.map_or(-1, |p| p.id as i64);
        if ring.predecessor.is_none()
            || Self::id_between(predecessor_id, self.id as i64, peer_id as i64)
        {
            trace!("{} ({}) is now the predecessor", peer, peer_id);
            ring.predecessor = Some(RingEntry {
                address: peer,
                id: peer_id,
            });
        }
    }

    pub(crate) fn take_lookup_receiver(&self) -> UnboundedReceiver<LookupRequest> {
        self.lookup_receiver
            .lock()
            .take()
            .expect("the lookup receiver was taken twice!")
    }

    /// Serves one queued `findsuccessor` request; runs on the lookup worker.
    pub(crate) async fn serve_lookup(&self, node: &Node, request: LookupRequest) {
        let payload = match self.find_successor(node, request.target).await {
            Ok(Some(entry)) => entry.encode(),
            // no successor yet: an empty reply tells the caller to fall
            // back to us
            Ok(None) => String::new(),
            Err(_) => String::new(),
        };

        node.send_system_response_to(request.requester, request.message_id, &payload);
    }
}

#[async_trait]
impl Overlay for ChordOverlay {
    fn network_type(&self) -> NetworkType {
        NetworkType::Chord
    }

    async fn on_approval_granted(&self, _node: &Node, peer: NodeAddress) {
        // ring membership is driven by the joiner; nothing to fan out here
        trace!("Approved {} into the ring", peer);
    }

    async fn on_approval_request_granted(&self, _node: &Node, peer: NodeAddress) {
        trace!("{} approved us into its ring", peer);
    }

    async fn on_system_message(&self, node: &Node, message: RemoteMessage) {
        let payload = message.payload.as_str();

        if message.awaiting_response {
            match payload {
                SYSTEM_SUCCESSOR => {
                    let reply = self
                        .successor()
                        .map(|entry| entry.address.to_string())
                        .unwrap_or_default();
                    node.send_system_response(&message, &reply);
                }
                SYSTEM_PREDECESSOR => {
                    let reply = self
                        .predecessor()
                        .map(|entry| entry.address.to_string())
                        .unwrap_or_default();
                    node.send_system_response(&message, &reply);
                }
                SYSTEM_ID => {
                    node.send_system_response(&message, &self.id.to_string());
                }
                _ => {
                    let mut parts = payload.splitn(2, '|');
                    if parts.next() == Some(SYSTEM_FIND_SUCCESSOR) {
                        match parts.next().and_then(|t| t.trim().parse::<u32>().ok()) {
                            Some(target) => {
                                let request = LookupRequest {
                                    requester: message.sender,
                                    message_id: message.message_id,
                                    target,
                                };
                                if self.lookup_sender.send(request).is_err() {
                                    trace!("The lookup worker is gone; dropping a request");
                                }
                            }
                            None => {
                                debug!("Malformed findsuccessor request from {}", message.sender);
                                node.send_system_response(&message, "");
                            }
                        }
                    } else {
                        debug!("Unrecognized system request from {}: {}", message.sender, payload);
                    }
                }
            }
        } else if payload == SYSTEM_NOTIFY {
            // fetching the notifier's id takes an RPC; never on the dispatcher
            if let Some(chord) = node.chord() {
                let chord = chord.clone();
                let node = node.clone();
                let peer = message.sender;
                task::spawn(async move {
                    chord.accept_notify(&node, peer).await;
                });
            }
        } else {
            trace!("Ignoring a system message from {}: {}", message.sender, payload);
        }
    }

    /// One maintenance round of the ring.
    async fn update_network(&self, node: &Node) {
        self.stabilize(node).await;
        self.fix_fingers(node).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    fn entry(id: u32) -> RingEntry {
        RingEntry {
            address: NodeAddress::new(Ipv4Addr::LOCALHOST, 5000 + id as u16),
            id,
        }
    }

    #[test]
    fn between_rejects_negative_x() {
        assert!(!ChordOverlay::id_between(10, 40, -1));
    }

    #[test]
    fn between_is_unbounded_with_unset_bounds() {
        assert!(ChordOverlay::id_between(-1, 40, 20));
        assert!(ChordOverlay::id_between(10, -1, 20));
        assert!(ChordOverlay::id_between(-1, -1, 0));
    }

    #[test]
    fn between_ordinary_interval() {
        assert!(ChordOverlay::id_between(10, 40, 20));
        assert!(!ChordOverlay::id_between(10, 40, 10));
        assert!(!ChordOverlay::id_between(10, 40, 40));
        assert!(!ChordOverlay::id_between(10, 40, 50));
    }

    #[test]
    fn between_wrapping_interval() {
        // (70, 10) wraps through zero
        assert!(ChordOverlay::id_between(70, 10, 80));
        assert!(ChordOverlay::id_between(70, 10, 5));
        assert!(!ChordOverlay::id_between(70, 10, 40));
        assert!(!ChordOverlay::id_between(70, 10, 70));
        assert!(!ChordOverlay::id_between(70, 10, 10));
    }

    #[test]
    fn ring_entry_wire_form_round_trips() {
        let original = entry(42);
        let encoded = original.encode();

        assert_eq!(encoded, format!("{}|42", original.address));
        assert_eq!(RingEntry::parse(&encoded), Some(original));
    }

    #[test]
    fn ring_entry_parse_rejects_garbage() {
        assert_eq!(RingEntry::parse(""), None);
        assert_eq!(RingEntry::parse("1.2.3.4:5000"), None);
        assert_eq!(RingEntry::parse("1.2.3.4:5000|notanid"), None);
        assert_eq!(RingEntry::parse("nonsense|17"), None);
    }

    #[test]
    fn closest_preceding_scans_high_to_low() {
        let overlay = ChordOverlay::new(Some(10));
        {
            let mut fingers = overlay.fingers.lock();
            fingers[0] = Some(entry(12));
            fingers[3] = Some(entry(40));
            fingers[7] = Some(entry(90));
        }

        // 90 is not in (10, 70); 40 is
        assert_eq!(overlay.closest_preceding(70), Some(entry(40)));
        // everything up to 90 precedes 100
        assert_eq!(overlay.closest_preceding(100), Some(entry(90)));
        // nothing lies in (10, 11)
        assert_eq!(overlay.closest_preceding(11), None);
    }

    #[test]
    fn fixed_id_is_honored() {
        assert_eq!(ChordOverlay::new(Some(77)).id(), 77);

        let drawn = ChordOverlay::new(None).id();
        assert!(drawn >= 1 && (drawn as u64) < ID_SPACE);
    }
}
