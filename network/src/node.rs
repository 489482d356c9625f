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
    inbound::{dispatcher::APPROVAL_GRANTED, Inbound},
    message::{codec, Frame, MessageKind, RemoteMessage},
    outbound::{
        Outbound,
        PendingResponses,
        ResponseOutcome,
        ResponseResult,
        SendOutcome,
        SendRequest,
        SendResult,
    },
    overlay::{ChordOverlay, MeshOverlay, NetworkType, Overlay, RingEntry},
    peers::PeerBook,
    stats,
    Config,
    NetworkError,
    NodeAddress,
    REQUEST_TIMEOUT,
};

use chrono::{DateTime, Utc};
use metrics::register_counter;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tokio::{
    net::TcpListener,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task,
    time::sleep,
};

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    ops::Deref,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

/// Whether `connect` joined an existing network or started a fresh one;
/// neither is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionResult {
    ConnectionSuccessful,
    NewNetworkCreated,
}

/// The lifecycle state of a node.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[repr(u8)]
pub enum State {
    Startup = 0,
    Ready,
    ShuttingDown,
}

#[derive(Default)]
pub(crate) struct StateCode(AtomicU8);

/// The callback invoked for every incoming user message.
pub type MessageHandler = dyn Fn(RemoteMessage) + Send + Sync;

/// The two roles a node can play in a completed approval handshake.
pub(crate) enum ApprovalEvent {
    /// This node admitted the peer.
    Granted(NodeAddress),
    /// The peer admitted this node.
    RequestGranted(NodeAddress),
}

/// The internal state of a node.
pub struct InnerNode {
    /// The pre-configured parameters of this node.
    pub config: Config,
    /// The current lifecycle state of the node.
    state: StateCode,
    /// The local listening address; set once the listener is bound.
    pub local_address: OnceCell<NodeAddress>,
    /// Every IPv4 address that refers to this host.
    local_ips: OnceCell<Vec<Ipv4Addr>>,
    /// The seeds supplied to `connect`, kept for reconnection attempts.
    seeds: OnceCell<Vec<NodeAddress>>,
    /// The inbound and outbound connection tables of this node.
    pub peer_book: PeerBook,
    /// The frame funnel feeding the dispatcher.
    pub(crate) inbound: Inbound,
    /// The send queue and its inflight writers.
    pub(crate) outbound: Outbound,
    /// The in-flight request ids awaiting responses.
    pub(crate) responses: PendingResponses,
    /// The source of request ids; 0 is reserved for "no id".
    message_ids: AtomicU64,
    /// The overlay strategy this node runs.
    overlay: Arc<dyn Overlay>,
    /// The same overlay, concretely, when it is Chord.
    chord: Option<Arc<ChordOverlay>>,
    approval_sender: UnboundedSender<ApprovalEvent>,
    approval_receiver: Mutex<Option<UnboundedReceiver<ApprovalEvent>>>,
    user_sender: UnboundedSender<RemoteMessage>,
    user_receiver: Mutex<Option<UnboundedReceiver<RemoteMessage>>>,
    message_handler: RwLock<Option<Arc<MessageHandler>>>,
    /// The node's start-up timestamp.
    pub launched: DateTime<Utc>,
    /// The long-lived service tasks; aborted in reverse order on shutdown.
    tasks: Mutex<Vec<task::JoinHandle<()>>>,
    /// An indicator of whether the node is shutting down.
    shutting_down: AtomicBool,
}

impl Drop for InnerNode {
    // this won't make a difference in regular scenarios, but will be
    // practical for test purposes, so that there are no lingering tasks
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..).rev() {
            handle.abort();
        }
    }
}

/// A core data structure for operating one overlay node.
#[derive(Clone)]
pub struct Node(Arc<InnerNode>);

impl Deref for Node {
    type Target = Arc<InnerNode>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Node {
    /// Creates a new node with the given configuration; it does nothing
    /// until `connect` is called.
    pub fn new(config: Config) -> Self {
        let (chord, overlay): (Option<Arc<ChordOverlay>>, Arc<dyn Overlay>) =
            match config.network_type {
                NetworkType::Mesh => (None, Arc::new(MeshOverlay::new())),
                NetworkType::Chord => {
                    let chord = Arc::new(ChordOverlay::new(config.chord_id));
                    (Some(chord.clone()), chord)
                }
            };

        let (approval_sender, approval_receiver) = unbounded_channel();
        let (user_sender, user_receiver) = unbounded_channel();

        Self(Arc::new(InnerNode {
            config,
            state: Default::default(),
            local_address: Default::default(),
            local_ips: Default::default(),
            seeds: Default::default(),
            peer_book: Default::default(),
            inbound: Default::default(),
            outbound: Default::default(),
            responses: Default::default(),
            message_ids: AtomicU64::new(1),
            overlay,
            chord,
            approval_sender,
            approval_receiver: Mutex::new(Some(approval_receiver)),
            user_sender,
            user_receiver: Mutex::new(Some(user_receiver)),
            message_handler: RwLock::new(None),
            launched: Utc::now(),
            tasks: Default::default(),
            shutting_down: Default::default(),
        }))
    }

    /// Returns the current state of the node.
    #[inline]
    pub fn state(&self) -> State {
        match self.state.0.load(Ordering::SeqCst) {
            0 => State::Startup,
            1 => State::Ready,
            2 => State::ShuttingDown,
            _ => unreachable!(),
        }
    }

    #[inline]
    pub(crate) fn set_state(&self, new_state: State) {
        self.state.0.store(new_state as u8, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn local_address(&self) -> Option<NodeAddress> {
        self.local_address.get().copied()
    }

    pub(crate) fn seeds(&self) -> Vec<NodeAddress> {
        self.seeds.get().cloned().unwrap_or_default()
    }

    pub(crate) fn overlay(&self) -> &Arc<dyn Overlay> {
        &self.overlay
    }

    pub(crate) fn chord(&self) -> Option<&Arc<ChordOverlay>> {
        self.chord.as_ref()
    }

    /// Binds the listener, starts the service tasks and attempts to join the
    /// network through the given seeds. Only a bind failure is fatal.
    pub async fn connect(
        &self,
        listening_port: u16,
        seeds: &[NodeAddress],
    ) -> Result<ConnectionResult, NetworkError> {
        let listener = TcpListener::bind(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listening_port,
        ))
        .await?;
        let bound_port = listener.local_addr()?.port();

        let local_ip = crate::address::local_ipv4().unwrap_or(Ipv4Addr::LOCALHOST);
        let local_address = NodeAddress::new(local_ip, bound_port);
        self.local_address
            .set(local_address)
            .map_err(|_| NetworkError::AlreadyConnected)?;

        let mut local_ips = vec![Ipv4Addr::LOCALHOST];
        if !local_ips.contains(&local_ip) {
            local_ips.push(local_ip);
        }
        let _ = self.local_ips.set(local_ips);
        let _ = self.seeds.set(seeds.to_vec());

        info!(
            "Listening on {} as a {} node",
            local_address,
            self.config.network_type
        );
        self.register_metrics();
        self.start_services(listener);

        let mut joined = false;
        for seed in seeds {
            if self.is_self(*seed) {
                continue;
            }
            if self.get_approval(*seed).await {
                if let Some(chord) = self.chord() {
                    chord.join(self, *seed).await;
                }
                joined = true;
                break;
            }
        }

        self.set_state(State::Ready);
        Ok(if joined {
            info!("Joined the network through a seed");
            ConnectionResult::ConnectionSuccessful
        } else {
            info!("No seed was reachable; created a new network");
            ConnectionResult::NewNetworkCreated
        })
    }

    /// Spawns the service tasks: accept, dispatch, send-queue drain, user
    /// message delivery, approval events, ping, update and (for Chord) the
    /// lookup worker.
    fn start_services(&self, listener: TcpListener) {
        let node = self.clone();
        let accept_task = task::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, source)) => node.accept_connection(stream, source),
                    Err(error) => {
                        if node.is_shutting_down() {
                            break;
                        }
                        warn!("Couldn't accept a connection: {}", error);
                    }
                }
                if node.is_shutting_down() {
                    break;
                }
            }
        });
        self.register_task(accept_task);

        let node = self.clone();
        let mut frames = self.inbound.take_receiver();
        let dispatch_task = task::spawn(async move {
            while let Some(inbound) = frames.recv().await {
                node.process_frame(inbound.source, inbound.frame).await;
                if node.is_shutting_down() {
                    break;
                }
            }
        });
        self.register_task(dispatch_task);

        let node = self.clone();
        let mut requests = self.outbound.take_receiver();
        let sender_task = task::spawn(async move {
            while let Some(request) = requests.recv().await {
                let writer_node = node.clone();
                let writer = task::spawn(async move {
                    writer_node.process_send_request(request).await;
                });
                node.outbound.track_writer(writer);
            }
        });
        self.register_task(sender_task);

        let node = self.clone();
        let mut user_messages = self.take_user_receiver();
        let delivery_task = task::spawn(async move {
            while let Some(message) = user_messages.recv().await {
                let handler = node.message_handler.read().clone();
                match handler {
                    Some(handler) => (*handler)(message),
                    None => trace!("No message handler is registered; dropping a user message"),
                }
            }
        });
        self.register_task(delivery_task);

        let node = self.clone();
        let mut approvals = self.take_approval_receiver();
        let approval_task = task::spawn(async move {
            while let Some(event) = approvals.recv().await {
                match event {
                    ApprovalEvent::Granted(peer) => {
                        node.overlay().on_approval_granted(&node, peer).await;
                    }
                    ApprovalEvent::RequestGranted(peer) => {
                        node.overlay().on_approval_request_granted(&node, peer).await;
                    }
                }
            }
        });
        self.register_task(approval_task);

        let node = self.clone();
        let ping_interval = self.config.ping_interval;
        let ping_task = task::spawn(async move {
            loop {
                sleep(ping_interval).await;
                if node.is_shutting_down() {
                    break;
                }

                let neighbors = node.peer_book.approved_addresses();
                trace!("Pinging {} neighbor(s)", neighbors.len());
                for address in neighbors {
                    node.enqueue_send(address, MessageKind::Ping, 0, "", true);
                }
            }
        });
        self.register_task(ping_task);

        let node = self.clone();
        let update_interval = self.config.update_interval;
        let connection_timeout = self.config.connection_timeout;
        let update_task = task::spawn(async move {
            loop {
                sleep(update_interval).await;
                if node.is_shutting_down() {
                    break;
                }

                for address in node.peer_book.stale_peers(connection_timeout) {
                    info!("Dropping {}: it hasn't pinged within the timeout", address);
                    node.disconnect_from_peer(address).await;
                }

                node.responses.sweep();
                node.overlay().update_network(&node).await;
            }
        });
        self.register_task(update_task);

        if let Some(chord) = self.chord() {
            let node = self.clone();
            let chord = chord.clone();
            let mut lookups = chord.take_lookup_receiver();
            let lookup_task = task::spawn(async move {
                while let Some(request) = lookups.recv().await {
                    // lookups can recurse through other nodes; serving them
                    // concurrently keeps two rings from stalling each other
                    let chord = chord.clone();
                    let node = node.clone();
                    task::spawn(async move {
                        chord.serve_lookup(&node, request).await;
                    });
                }
            });
            self.register_task(lookup_task);
        }
    }

    /// Stops every service task and tears down all connections; pending
    /// waiters complete with `ConnectionFailure`.
    pub async fn disconnect(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(State::ShuttingDown);
        debug!("Shutting down");

        // let inflight writes drain, best-effort
        self.outbound.join_writers(Duration::from_millis(500)).await;

        for handle in self.tasks.lock().drain(..).rev() {
            handle.abort();
        }

        self.peer_book.clear().await;
        self.responses.fail_all();

        info!("Disconnected from the network");
    }

    pub(crate) fn register_task(&self, handle: task::JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    fn take_user_receiver(&self) -> UnboundedReceiver<RemoteMessage> {
        self.user_receiver
            .lock()
            .take()
            .expect("the user message receiver was taken twice!")
    }

    fn take_approval_receiver(&self) -> UnboundedReceiver<ApprovalEvent> {
        self.approval_receiver
            .lock()
            .take()
            .expect("the approval event receiver was taken twice!")
    }

    pub(crate) fn enqueue_approval_event(&self, event: ApprovalEvent) {
        if self.approval_sender.send(event).is_err() {
            trace!("The approval event queue is closed");
        }
    }

    pub(crate) fn enqueue_user_message(&self, message: RemoteMessage) -> bool {
        self.user_sender.send(message).is_ok()
    }

    /// Whether the given address refers to this node itself.
    pub(crate) fn is_self(&self, address: NodeAddress) -> bool {
        let local_port = match self.local_address.get() {
            Some(local) => local.port(),
            None => return false,
        };
        if address.port() != local_port {
            return false;
        }

        address.ip().is_loopback()
            || self
                .local_ips
                .get()
                .map_or(false, |ips| ips.contains(&address.ip()))
    }

    fn next_message_id(&self) -> u64 {
        self.message_ids.fetch_add(1, Ordering::SeqCst)
    }

    fn compose_frame(
        &self,
        kind: MessageKind,
        message_id: u64,
        awaiting_response: bool,
        payload: &str,
    ) -> Frame {
        let sender_port = self.local_address.get().map(|a| a.port()).unwrap_or(0);

        Frame::new(
            kind,
            message_id,
            awaiting_response,
            sender_port,
            payload.as_bytes().to_vec(),
        )
    }

    /// Queues a frame that expects no response.
    pub(crate) fn enqueue_send(
        &self,
        destination: NodeAddress,
        kind: MessageKind,
        message_id: u64,
        payload: &str,
        needs_approved: bool,
    ) -> SendResult {
        let frame = self.compose_frame(kind, message_id, false, payload);
        let handle = SendResult::new();

        let request = SendRequest {
            frame,
            destination,
            needs_approved,
            send_result: handle.clone(),
            response_result: None,
        };
        if !self.outbound.enqueue(request) {
            handle.complete(SendOutcome::ConnectionFailure);
        }

        handle
    }

    /// Queues a request frame and registers its pending-response slot before
    /// it can possibly be answered.
    pub(crate) fn enqueue_request(
        &self,
        destination: NodeAddress,
        kind: MessageKind,
        payload: &str,
        needs_approved: bool,
    ) -> ResponseResult {
        let message_id = self.next_message_id();
        let frame = self.compose_frame(kind, message_id, true, payload);
        let handle = ResponseResult::new();
        self.responses.register(message_id, destination, handle.clone());

        let request = SendRequest {
            frame,
            destination,
            needs_approved,
            send_result: handle.send_result().clone(),
            response_result: Some(handle.clone()),
        };
        if !self.outbound.enqueue(request) {
            self.responses.remove(message_id);
            handle.send_result().complete(SendOutcome::ConnectionFailure);
            handle.complete(ResponseOutcome::ConnectionFailure, None);
        }

        handle
    }

    /// Delivers one queued send request; this is the writer contract.
    pub(crate) async fn process_send_request(&self, request: SendRequest) {
        let SendRequest {
            frame,
            destination,
            needs_approved,
            send_result,
            response_result,
        } = request;

        // self-sends fail without touching any socket
        if self.is_self(destination) {
            trace!("Not sending a {:?} frame to ourselves", frame.kind);
            if response_result.is_some() {
                self.responses.remove(frame.message_id);
            }
            send_result.complete(SendOutcome::SelfFailure);
            if let Some(response) = response_result {
                response.complete(ResponseOutcome::ConnectionFailure, None);
            }
            return;
        }

        let connection = if needs_approved {
            self.peer_book.ensure_approved(destination)
        } else {
            self.peer_book.ensure_outbound(destination).await
        };
        let connection = match connection {
            Some(connection) => connection,
            None => {
                metrics::increment_counter!(stats::OUTBOUND_ALL_FAILURES);
                if response_result.is_some() {
                    self.responses.remove(frame.message_id);
                }
                send_result.complete(SendOutcome::ConnectionFailure);
                if let Some(response) = response_result {
                    response.complete(ResponseOutcome::ConnectionFailure, None);
                }
                return;
            }
        };

        let bytes = codec::serialize(&frame);
        if let Err(error) = connection.write_all(&bytes).await {
            warn!(
                "Couldn't send a {:?} frame to {}: {}",
                frame.kind, destination, error
            );
            metrics::increment_counter!(stats::OUTBOUND_ALL_FAILURES);

            // the stream is broken: tear the whole pairing down
            self.disconnect_from_peer(destination).await;
            if response_result.is_some() {
                self.responses.remove(frame.message_id);
            }
            send_result.complete(SendOutcome::ConnectionFailure);
            if let Some(response) = response_result {
                response.complete(ResponseOutcome::ConnectionFailure, None);
            }
            return;
        }

        metrics::increment_counter!(stats::OUTBOUND_ALL_SUCCESSES);
        send_result.complete(SendOutcome::Success);
        if let Some(response) = response_result {
            response.mark_waiting();
        }
    }

    /// Closes the pairing with `address`: its outbound connection, every
    /// inbound stream it owns, and all pending responses aimed at it.
    pub(crate) async fn disconnect_from_peer(&self, address: NodeAddress) {
        if let Some(connection) = self.peer_book.remove_outbound(address) {
            connection.shutdown().await;
            debug!("Disconnected from {}", address);
        }
        for inbound in self.peer_book.remove_inbound_by_listening(address) {
            inbound.close().await;
        }

        self.responses.fail_for_peer(address);
    }

    /// Runs the admission handshake against `address`; returns whether this
    /// node is now an approved member of the peer's network.
    pub(crate) async fn get_approval(&self, address: NodeAddress) -> bool {
        if self.peer_book.ensure_approved(address).is_some() {
            return true;
        }
        if self.peer_book.ensure_outbound(address).await.is_none() {
            return false;
        }

        let handle = self.enqueue_request(
            address,
            MessageKind::Approval,
            self.config.network_type.tag(),
            false,
        );
        let (outcome, response) = handle.response_within(REQUEST_TIMEOUT).await;
        if outcome != ResponseOutcome::Success {
            debug!("The approval request to {} failed: {:?}", address, outcome);
            return false;
        }

        match response {
            Some(message) if message.payload == APPROVAL_GRANTED => {
                self.peer_book.set_approved(address);
                metrics::increment_counter!(stats::CONNECTIONS_APPROVED);
                info!("{} approved us into its network", address);
                self.enqueue_approval_event(ApprovalEvent::RequestGranted(address));
                true
            }
            _ => {
                debug!("{} denied our approval request", address);
                false
            }
        }
    }

    fn register_metrics(&self) {
        register_counter!(stats::INBOUND_ALL_SUCCESSES);
        register_counter!(stats::INBOUND_ALL_FAILURES);
        register_counter!(stats::INBOUND_APPROVALS);
        register_counter!(stats::INBOUND_NEIGHBORS);
        register_counter!(stats::INBOUND_PINGS);
        register_counter!(stats::INBOUND_SYSTEM);
        register_counter!(stats::INBOUND_USER);
        register_counter!(stats::INBOUND_UNKNOWN);

        register_counter!(stats::OUTBOUND_ALL_SUCCESSES);
        register_counter!(stats::OUTBOUND_ALL_FAILURES);

        register_counter!(stats::CONNECTIONS_ALL_ACCEPTED);
        register_counter!(stats::CONNECTIONS_ALL_INITIATED);
        register_counter!(stats::CONNECTIONS_APPROVED);
    }
}

// The public messaging surface.
impl Node {
    /// The currently approved neighbors.
    pub fn neighbors(&self) -> Vec<NodeAddress> {
        self.peer_book.approved_addresses()
    }

    /// Requests the approved neighbor list of a remote node; the response
    /// payload is the `;`-separated list form.
    pub fn remote_neighbors(&self, address: NodeAddress) -> ResponseResult {
        self.enqueue_request(address, MessageKind::Neighbors, "", false)
    }

    /// Sends a user payload; the handle completes once the frame is on the
    /// wire or has failed.
    pub fn send_message(&self, destination: NodeAddress, payload: &str) -> SendResult {
        self.enqueue_send(destination, MessageKind::User, 0, payload, false)
    }

    /// Sends a user payload and waits for the peer's response.
    pub fn send_message_await_response(
        &self,
        destination: NodeAddress,
        payload: &str,
    ) -> ResponseResult {
        self.enqueue_request(destination, MessageKind::User, payload, false)
    }

    /// Answers a received message; the reply carries the original id.
    pub fn send_response(&self, message: &RemoteMessage, payload: &str) -> SendResult {
        self.send_response_frame(MessageKind::User, message, payload)
    }

    /// Registers the callback invoked for every incoming user message. The
    /// callback runs on a dedicated delivery task and may call back into
    /// this node freely.
    pub fn on_received_message<F>(&self, handler: F)
    where
        F: Fn(RemoteMessage) + Send + Sync + 'static,
    {
        *self.message_handler.write() = Some(Arc::new(handler));
    }

    pub(crate) fn send_response_frame(
        &self,
        kind: MessageKind,
        message: &RemoteMessage,
        payload: &str,
    ) -> SendResult {
        self.enqueue_send(message.sender, kind, message.message_id, payload, false)
    }

    pub(crate) fn send_system_request(&self, destination: NodeAddress, payload: &str) -> ResponseResult {
        self.enqueue_request(destination, MessageKind::System, payload, false)
    }

    pub(crate) fn send_system_oneway(&self, destination: NodeAddress, payload: &str) -> SendResult {
        self.enqueue_send(destination, MessageKind::System, 0, payload, false)
    }

    pub(crate) fn send_system_response(&self, message: &RemoteMessage, payload: &str) -> SendResult {
        self.send_response_frame(MessageKind::System, message, payload)
    }

    pub(crate) fn send_system_response_to(
        &self,
        destination: NodeAddress,
        message_id: u64,
        payload: &str,
    ) -> SendResult {
        self.enqueue_send(destination, MessageKind::System, message_id, payload, false)
    }
}

// The Chord-specific surface; all of it returns `WrongNetworkType` on a
// node running another overlay.
impl Node {
    fn require_chord(&self) -> Result<&Arc<ChordOverlay>, NetworkError> {
        self.chord().ok_or(NetworkError::WrongNetworkType)
    }

    /// This node's ring identifier.
    pub fn chord_id(&self) -> Result<u32, NetworkError> {
        Ok(self.require_chord()?.id())
    }

    pub fn successor(&self) -> Result<Option<RingEntry>, NetworkError> {
        Ok(self.require_chord()?.successor())
    }

    pub fn predecessor(&self) -> Result<Option<RingEntry>, NetworkError> {
        Ok(self.require_chord()?.predecessor())
    }

    /// The finger table; entry `i` is the successor of `(id + 2^i) mod 2^31`.
    pub fn fingers(&self) -> Result<Vec<Option<RingEntry>>, NetworkError> {
        Ok(self.require_chord()?.fingers())
    }

    /// Resolves the owner of `id` through the ring and forwards a user
    /// payload to it; an owner equal to this node fails as `SelfFailure`.
    pub async fn send_chord_message(
        &self,
        id: u32,
        payload: &str,
    ) -> Result<SendResult, NetworkError> {
        let destination = self.resolve_chord_owner(id).await?;

        match destination {
            Some(address) => Ok(self.send_message(address, payload)),
            None => {
                let handle = SendResult::new();
                handle.complete(SendOutcome::SelfFailure);
                Ok(handle)
            }
        }
    }

    /// Like `send_chord_message`, but waits for the owner's response.
    pub async fn send_chord_message_await_response(
        &self,
        id: u32,
        payload: &str,
    ) -> Result<ResponseResult, NetworkError> {
        let destination = self.resolve_chord_owner(id).await?;

        match destination {
            Some(address) => Ok(self.send_message_await_response(address, payload)),
            None => {
                let handle = ResponseResult::new();
                handle.send_result().complete(SendOutcome::SelfFailure);
                handle.complete(ResponseOutcome::ConnectionFailure, None);
                Ok(handle)
            }
        }
    }

    /// The address owning `id`, or `None` when that owner is this node.
    async fn resolve_chord_owner(&self, id: u32) -> Result<Option<NodeAddress>, NetworkError> {
        let chord = self.require_chord()?;

        match chord.find_successor(self, id).await? {
            Some(entry) if self.is_self(entry.address) => Ok(None),
            Some(entry) => Ok(Some(entry.address)),
            // no successor: this node is alone, so every id is its own
            None => Ok(None),
        }
    }
}
