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

use crate::NodeAddress;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::{io::AsyncWriteExt, net::tcp::OwnedWriteHalf, task::JoinHandle};

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};

/// An outbound connection to a peer: the write half of the stream this node
/// dialed, plus the liveness and admission state attached to the pairing.
pub struct PeerConnection {
    /// The listening address of the peer this connection leads to.
    address: NodeAddress,
    /// Writes are serialized through this lock; the reader never touches it.
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    /// When the peer last proved liveness.
    last_ping_at: Mutex<DateTime<Utc>>,
    /// Whether the approval handshake has completed for this peer.
    approved: AtomicBool,
}

impl PeerConnection {
    pub fn new(address: NodeAddress, writer: OwnedWriteHalf) -> Self {
        Self {
            address,
            writer: tokio::sync::Mutex::new(writer),
            last_ping_at: Mutex::new(Utc::now()),
            approved: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    #[inline]
    pub fn is_approved(&self) -> bool {
        self.approved.load(Ordering::SeqCst)
    }

    pub fn set_approved(&self) {
        self.approved.store(true, Ordering::SeqCst);
    }

    pub fn last_ping_at(&self) -> DateTime<Utc> {
        *self.last_ping_at.lock()
    }

    pub fn refresh_last_ping(&self) {
        *self.last_ping_at.lock() = Utc::now();
    }

    /// Writes the given bytes in full and flushes them.
    pub async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    pub async fn shutdown(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// An inbound connection: a stream some peer opened towards this node.
///
/// The stream is read exclusively by its reader task; the entry here exists
/// so the connection can be located and torn down by address.
pub struct InboundConnection {
    /// The socket address the connection arrived from (ephemeral source port).
    source: SocketAddr,
    /// The peer's listening address, learned from the first frame it sends.
    listening_address: Mutex<Option<NodeAddress>>,
    /// The unused write half, held so the stream stays fully open until teardown.
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    /// The reader task; aborted when the entry is removed.
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl InboundConnection {
    pub fn new(source: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            source,
            listening_address: Mutex::new(None),
            writer: tokio::sync::Mutex::new(writer),
            reader: Mutex::new(None),
        }
    }

    #[inline]
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn listening_address(&self) -> Option<NodeAddress> {
        *self.listening_address.lock()
    }

    pub fn set_listening_address(&self, address: NodeAddress) {
        *self.listening_address.lock() = Some(address);
    }

    pub(crate) fn set_reader(&self, handle: JoinHandle<()>) {
        *self.reader.lock() = Some(handle);
    }

    /// Shuts the stream down and stops the reader.
    ///
    /// The reader is aborted last so this remains safe to call from the
    /// reader task itself.
    pub async fn close(&self) {
        let _ = self.writer.lock().await.shutdown().await;
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}
