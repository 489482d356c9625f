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

pub(crate) mod dispatcher;

use crate::{
    message::{codec, Frame, FrameBuffer},
    peers::InboundConnection,
    stats,
    Node,
    READ_CHUNK_SIZE,
};

use parking_lot::Mutex;
use tokio::{
    io::AsyncReadExt,
    net::{tcp::OwnedReadHalf, TcpStream},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task,
    task::JoinHandle,
};

use std::{net::SocketAddr, sync::Arc};

/// A decoded frame together with the socket address it arrived from.
pub(crate) struct InboundFrame {
    pub source: SocketAddr,
    pub frame: Frame,
}

/// The receiving half of the node: every reader task funnels its frames into
/// this single channel, and one dispatcher task drains it. Frames from the
/// same peer therefore dispatch in arrival order.
pub(crate) struct Inbound {
    sender: UnboundedSender<InboundFrame>,
    receiver: Mutex<Option<UnboundedReceiver<InboundFrame>>>,
}

impl Inbound {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn sender(&self) -> UnboundedSender<InboundFrame> {
        self.sender.clone()
    }

    /// Hands the receiving end to the dispatcher task; may only be taken once.
    pub fn take_receiver(&self) -> UnboundedReceiver<InboundFrame> {
        self.receiver
            .lock()
            .take()
            .expect("the inbound receiver was taken twice!")
    }
}

impl Default for Inbound {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Registers a freshly accepted stream and spins up its reader task.
    pub(crate) fn accept_connection(&self, stream: TcpStream, source: SocketAddr) {
        if let Err(error) = stream.set_nodelay(true) {
            trace!("Couldn't disable Nagle on the stream from {}: {}", source, error);
        }

        let (reader, writer) = stream.into_split();
        let connection = Arc::new(InboundConnection::new(source, writer));
        self.peer_book.insert_inbound(source, connection.clone());

        let handle = self.spawn_reader(reader, source);
        connection.set_reader(handle);

        metrics::increment_counter!(stats::CONNECTIONS_ALL_ACCEPTED);
        debug!("Accepted a connection from {}", source);
    }

    /// Reads chunks off one inbound stream, drives its frame buffer and
    /// forwards every whole frame to the dispatcher.
    fn spawn_reader(&self, mut reader: OwnedReadHalf, source: SocketAddr) -> JoinHandle<()> {
        let node = self.clone();
        let frames = self.inbound.sender();

        task::spawn(async move {
            let mut buffer = FrameBuffer::default();
            let mut chunk = [0u8; READ_CHUNK_SIZE];

            loop {
                if node.is_shutting_down() {
                    return;
                }

                let read = match reader.read(&mut chunk).await {
                    Ok(0) => {
                        trace!("{} closed the connection", source);
                        node.drop_inbound(source).await;
                        return;
                    }
                    Ok(read) => read,
                    Err(error) => {
                        trace!("Couldn't read from {}: {}", source, error);
                        node.drop_inbound(source).await;
                        return;
                    }
                };
                buffer.extend(&chunk[..read]);

                loop {
                    match buffer.next_frame() {
                        Ok(Some(bytes)) => match codec::deserialize(&bytes) {
                            Ok(frame) => {
                                metrics::increment_counter!(stats::INBOUND_ALL_SUCCESSES);
                                if frames.send(InboundFrame { source, frame }).is_err() {
                                    // the dispatcher is gone; we are shutting down
                                    return;
                                }
                            }
                            Err(error) => {
                                metrics::increment_counter!(stats::INBOUND_ALL_FAILURES);
                                warn!("Closing the connection from {}: {}", source, error);
                                node.drop_inbound(source).await;
                                return;
                            }
                        },
                        Ok(None) => break,
                        Err(error) => {
                            metrics::increment_counter!(stats::INBOUND_ALL_FAILURES);
                            warn!("Closing the connection from {}: {}", source, error);
                            node.drop_inbound(source).await;
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Tears down one inbound stream; if the peer behind it is known, the
    /// whole pairing (outbound connection, pending responses) goes with it.
    pub(crate) async fn drop_inbound(&self, source: SocketAddr) {
        let connection = match self.peer_book.remove_inbound(source) {
            Some(connection) => connection,
            None => return,
        };

        if let Some(listening_address) = connection.listening_address() {
            self.disconnect_from_peer(listening_address).await;
        }

        // aborts the reader last, so this is safe from the reader itself
        connection.close().await;
    }
}
