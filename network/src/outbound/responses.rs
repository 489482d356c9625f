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
    message::RemoteMessage,
    outbound::{ResponseOutcome, ResponseResult},
    NodeAddress,
};

use parking_lot::Mutex;

use std::collections::HashMap;

struct PendingResponse {
    destination: NodeAddress,
    handle: ResponseResult,
}

/// The map of in-flight request ids to their waiters.
///
/// Every exit path removes the entry, so a completed request never leaves a
/// slot behind; stray entries from timed-out public waits are swept by the
/// maintenance loop.
#[derive(Default)]
pub(crate) struct PendingResponses {
    map: Mutex<HashMap<u64, PendingResponse>>,
}

impl PendingResponses {
    pub fn register(&self, message_id: u64, destination: NodeAddress, handle: ResponseResult) {
        self.map
            .lock()
            .insert(message_id, PendingResponse { destination, handle });
    }

    pub fn remove(&self, message_id: u64) {
        self.map.lock().remove(&message_id);
    }

    /// Delivers a response to its waiter; returns whether a waiter existed.
    pub fn complete(&self, message_id: u64, response: RemoteMessage) -> bool {
        match self.map.lock().remove(&message_id) {
            Some(pending) => {
                pending.handle.complete(ResponseOutcome::Success, Some(response));
                true
            }
            None => false,
        }
    }

    /// Fails every waiter whose request targeted the given peer.
    pub fn fail_for_peer(&self, address: NodeAddress) {
        let failed: Vec<PendingResponse> = {
            let mut map = self.map.lock();
            let ids: Vec<u64> = map
                .iter()
                .filter(|(_, pending)| pending.destination == address)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| map.remove(&id)).collect()
        };

        for pending in failed {
            pending.handle.complete(ResponseOutcome::ConnectionFailure, None);
        }
    }

    /// Fails every remaining waiter; used on shutdown.
    pub fn fail_all(&self) {
        let drained: Vec<PendingResponse> =
            self.map.lock().drain().map(|(_, pending)| pending).collect();

        for pending in drained {
            pending.handle.complete(ResponseOutcome::ConnectionFailure, None);
        }
    }

    /// Drops entries whose handle already completed (e.g. timed-out waits).
    pub fn sweep(&self) {
        self.map.lock().retain(|_, pending| !pending.handle.is_completed());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    fn address(port: u16) -> NodeAddress {
        NodeAddress::new(Ipv4Addr::LOCALHOST, port)
    }

    fn response(message_id: u64) -> RemoteMessage {
        RemoteMessage {
            sender: address(5000),
            payload: "ok".to_owned(),
            message_id,
            awaiting_response: false,
            in_response_to_message: true,
        }
    }

    #[tokio::test]
    async fn completion_reaches_the_waiter_exactly_once() {
        let pending = PendingResponses::default();
        let handle = ResponseResult::new();
        pending.register(1, address(5000), handle.clone());

        assert!(pending.complete(1, response(1)));
        assert!(!pending.complete(1, response(1)));
        assert_eq!(pending.len(), 0);

        let (outcome, message) = handle.response().await;
        assert_eq!(outcome, ResponseOutcome::Success);
        assert_eq!(message.unwrap().payload, "ok");
    }

    #[tokio::test]
    async fn peer_failure_fails_only_its_waiters() {
        let pending = PendingResponses::default();
        let doomed = ResponseResult::new();
        let unrelated = ResponseResult::new();
        pending.register(1, address(5000), doomed.clone());
        pending.register(2, address(6000), unrelated.clone());

        pending.fail_for_peer(address(5000));

        let (outcome, message) = doomed.response().await;
        assert_eq!(outcome, ResponseOutcome::ConnectionFailure);
        assert!(message.is_none());
        assert!(!unrelated.is_completed());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn sweep_discards_completed_entries() {
        let pending = PendingResponses::default();
        let handle = ResponseResult::new();
        pending.register(1, address(5000), handle.clone());

        handle.complete(ResponseOutcome::Timeout, None);
        pending.sweep();

        assert_eq!(pending.len(), 0);
    }
}
