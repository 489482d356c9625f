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
    peers::{InboundConnection, PeerConnection},
    stats,
    NodeAddress,
};

use parking_lot::RwLock;
use tokio::net::TcpStream;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

/// An entry in the sending table: either a dial in progress or a live
/// connection. The placeholder is what lets concurrent callers agree on a
/// single opener.
enum OutboundEntry {
    Connecting,
    Connected(Arc<PeerConnection>),
}

/// The two per-peer connection tables of a node.
///
/// Outbound ("sending") entries are keyed by the peer's listening address;
/// inbound ("receiving") entries by the socket address they arrived from.
/// The lifecycles are independent: a peer may appear in either or both.
/// Neither lock is ever held across I/O or an await.
#[derive(Default)]
pub struct PeerBook {
    sending: RwLock<HashMap<NodeAddress, OutboundEntry>>,
    receiving: RwLock<HashMap<SocketAddr, Arc<InboundConnection>>>,
}

impl PeerBook {
    /// Returns the outbound connection to `address`, dialing it if needed.
    ///
    /// Many tasks may call this concurrently for the same address; exactly
    /// one becomes the opener and performs the dial, while the rest wait for
    /// the placeholder to resolve. This is the only place outbound
    /// connections are minted.
    pub async fn ensure_outbound(&self, address: NodeAddress) -> Option<Arc<PeerConnection>> {
        let opener = {
            let mut sending = self.sending.write();
            match sending.get(&address) {
                Some(OutboundEntry::Connected(connection)) => return Some(connection.clone()),
                Some(OutboundEntry::Connecting) => false,
                None => {
                    sending.insert(address, OutboundEntry::Connecting);
                    true
                }
            }
        };

        if opener {
            self.open_connection(address).await
        } else {
            self.await_opener(address).await
        }
    }

    async fn open_connection(&self, address: NodeAddress) -> Option<Arc<PeerConnection>> {
        match TcpStream::connect(SocketAddr::from(address)).await {
            Ok(stream) => {
                if let Err(error) = stream.set_nodelay(true) {
                    trace!("Couldn't disable Nagle on the stream to {}: {}", address, error);
                }
                let (_reader, writer) = stream.into_split();
                let connection = Arc::new(PeerConnection::new(address, writer));
                self.sending
                    .write()
                    .insert(address, OutboundEntry::Connected(connection.clone()));

                metrics::increment_counter!(stats::CONNECTIONS_ALL_INITIATED);
                debug!("Connected to {}", address);
                Some(connection)
            }
            Err(error) => {
                self.sending.write().remove(&address);
                trace!("Couldn't connect to {}: {}", address, error);
                None
            }
        }
    }

    async fn await_opener(&self, address: NodeAddress) -> Option<Arc<PeerConnection>> {
        loop {
            {
                let sending = self.sending.read();
                match sending.get(&address) {
                    Some(OutboundEntry::Connected(connection)) => return Some(connection.clone()),
                    Some(OutboundEntry::Connecting) => {}
                    None => return None,
                }
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Returns the outbound connection to `address` only if it has completed
    /// the approval handshake; never dials.
    pub fn ensure_approved(&self, address: NodeAddress) -> Option<Arc<PeerConnection>> {
        match self.sending.read().get(&address) {
            Some(OutboundEntry::Connected(connection)) if connection.is_approved() => {
                Some(connection.clone())
            }
            _ => None,
        }
    }

    /// Marks the outbound connection to `address` as approved.
    pub fn set_approved(&self, address: NodeAddress) -> bool {
        match self.sending.read().get(&address) {
            Some(OutboundEntry::Connected(connection)) => {
                connection.set_approved();
                true
            }
            _ => false,
        }
    }

    /// The listening addresses of all approved peers.
    pub fn approved_addresses(&self) -> Vec<NodeAddress> {
        self.sending
            .read()
            .values()
            .filter_map(|entry| match entry {
                OutboundEntry::Connected(connection) if connection.is_approved() => {
                    Some(connection.address())
                }
                _ => None,
            })
            .collect()
    }

    pub fn number_of_approved(&self) -> usize {
        self.approved_addresses().len()
    }

    /// Approved peers whose last ping is older than `timeout`.
    pub fn stale_peers(&self, timeout: Duration) -> Vec<NodeAddress> {
        let cutoff = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::max_value());
        let now = chrono::Utc::now();

        self.sending
            .read()
            .values()
            .filter_map(|entry| match entry {
                OutboundEntry::Connected(connection)
                    if connection.is_approved() && now - connection.last_ping_at() > cutoff =>
                {
                    Some(connection.address())
                }
                _ => None,
            })
            .collect()
    }

    /// Removes a live outbound entry; a dial in progress is left alone so the
    /// opener protocol stays intact.
    pub fn remove_outbound(&self, address: NodeAddress) -> Option<Arc<PeerConnection>> {
        let mut sending = self.sending.write();
        match sending.get(&address) {
            Some(OutboundEntry::Connected(_)) => match sending.remove(&address) {
                Some(OutboundEntry::Connected(connection)) => Some(connection),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn insert_inbound(&self, source: SocketAddr, connection: Arc<InboundConnection>) {
        self.receiving.write().insert(source, connection);
    }

    pub fn remove_inbound(&self, source: SocketAddr) -> Option<Arc<InboundConnection>> {
        self.receiving.write().remove(&source)
    }

    /// Removes every inbound entry whose peer announced the given listening
    /// address; their frame buffers die with their reader tasks.
    pub fn remove_inbound_by_listening(&self, address: NodeAddress) -> Vec<Arc<InboundConnection>> {
        let mut receiving = self.receiving.write();
        let sources: Vec<SocketAddr> = receiving
            .iter()
            .filter(|(_, connection)| connection.listening_address() == Some(address))
            .map(|(source, _)| *source)
            .collect();

        sources
            .into_iter()
            .filter_map(|source| receiving.remove(&source))
            .collect()
    }

    /// Records which listening address an inbound stream belongs to.
    pub fn note_listening_address(&self, source: SocketAddr, address: NodeAddress) {
        if let Some(connection) = self.receiving.read().get(&source) {
            connection.set_listening_address(address);
        }
    }

    /// Tears down every connection in both tables.
    pub async fn clear(&self) {
        let outbound: Vec<Arc<PeerConnection>> = self
            .sending
            .write()
            .drain()
            .filter_map(|(_, entry)| match entry {
                OutboundEntry::Connected(connection) => Some(connection),
                OutboundEntry::Connecting => None,
            })
            .collect();
        let inbound: Vec<Arc<InboundConnection>> =
            self.receiving.write().drain().map(|(_, connection)| connection).collect();

        for connection in outbound {
            connection.shutdown().await;
        }
        for connection in inbound {
            connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tokio::net::TcpListener;

    async fn local_listener() -> (TcpListener, NodeAddress) {
        let listener = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        (listener, NodeAddress::new(Ipv4Addr::LOCALHOST, port))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_callers_share_one_connection() {
        let (listener, address) = local_listener().await;
        let accepted = Arc::new(AtomicUsize::new(0));

        let accepted_clone = accepted.clone();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await.unwrap();
                accepted_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let peer_book = Arc::new(PeerBook::default());
        let mut attempts = Vec::new();
        for _ in 0..8 {
            let peer_book = peer_book.clone();
            attempts.push(tokio::spawn(async move {
                peer_book.ensure_outbound(address).await.is_some()
            }));
        }

        for attempt in attempts {
            assert!(attempt.await.unwrap());
        }

        // give the accept loop a moment to drain the backlog
        while accepted.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // every caller resolved to the single dialed connection
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_dial_resolves_to_none() {
        let (listener, address) = local_listener().await;
        drop(listener);

        let peer_book = PeerBook::default();
        assert!(peer_book.ensure_outbound(address).await.is_none());

        // the placeholder was removed again
        assert!(peer_book.ensure_approved(address).is_none());
    }

    #[tokio::test]
    async fn approval_is_tracked_per_connection() {
        let (listener, address) = local_listener().await;
        tokio::spawn(async move {
            let _ = listener.accept().await;
            std::future::pending::<()>().await;
        });

        let peer_book = PeerBook::default();
        peer_book.ensure_outbound(address).await.unwrap();

        assert!(peer_book.ensure_approved(address).is_none());
        assert!(peer_book.set_approved(address));
        assert!(peer_book.ensure_approved(address).is_some());
        assert_eq!(peer_book.approved_addresses(), vec![address]);
    }
}
