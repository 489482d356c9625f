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

pub mod handles;
pub use self::handles::*;

pub(crate) mod request;
pub(crate) use self::request::SendRequest;

pub(crate) mod responses;
pub(crate) use self::responses::PendingResponses;

use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use std::time::Duration;

/// The send-queue half of the node: a single FIFO of outbound requests,
/// drained by one task that fans each request out to a writer task.
pub(crate) struct Outbound {
    sender: UnboundedSender<SendRequest>,
    receiver: Mutex<Option<UnboundedReceiver<SendRequest>>>,
    /// Inflight writer tasks, pruned as they finish; joined on shutdown.
    writers: Mutex<Vec<JoinHandle<()>>>,
}

impl Outbound {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            writers: Mutex::new(Vec::new()),
        }
    }

    /// Queues a request; returns `false` when the queue is gone (shutdown),
    /// in which case the caller owns the failure of the handles.
    pub fn enqueue(&self, request: SendRequest) -> bool {
        self.sender.send(request).is_ok()
    }

    /// Hands the receiving end to the drainer task; may only be taken once.
    pub fn take_receiver(&self) -> UnboundedReceiver<SendRequest> {
        self.receiver
            .lock()
            .take()
            .expect("the send queue receiver was taken twice!")
    }

    pub fn track_writer(&self, handle: JoinHandle<()>) {
        let mut writers = self.writers.lock();
        writers.retain(|writer| !writer.is_finished());
        writers.push(handle);
    }

    /// Gives inflight writers a bounded window to drain.
    pub async fn join_writers(&self, timeout: Duration) {
        let writers: Vec<JoinHandle<()>> = self.writers.lock().drain(..).collect();

        let _ = tokio::time::timeout(timeout, async {
            for writer in writers {
                let _ = writer.await;
            }
        })
        .await;
    }
}

impl Default for Outbound {
    fn default() -> Self {
        Self::new()
    }
}
