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

//! Waitable result handles for outbound calls. Completion is signaled with a
//! `Notify` rather than polled; each handle completes exactly once and its
//! progress only ever moves forward.

use crate::message::RemoteMessage;

use parking_lot::Mutex;
use tokio::sync::Notify;

use std::{sync::Arc, time::Duration};

/// How far a send-only call has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendProgress {
    Sending,
    Completed,
}

/// How a send-only call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    ConnectionFailure,
    /// The destination was this node itself; no socket was touched.
    SelfFailure,
}

/// How far a request expecting a response has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseProgress {
    Sending,
    WaitingForResponse,
    Completed,
}

/// How a request expecting a response ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success,
    ConnectionFailure,
    Timeout,
}

struct SendShared {
    state: Mutex<(SendProgress, Option<SendOutcome>)>,
    completed: Notify,
}

/// The handle returned by send-only calls; waiting on it blocks until the
/// frame is on the wire or has failed terminally.
#[derive(Clone)]
pub struct SendResult {
    shared: Arc<SendShared>,
}

impl SendResult {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(SendShared {
                state: Mutex::new((SendProgress::Sending, None)),
                completed: Notify::new(),
            }),
        }
    }

    pub fn progress(&self) -> SendProgress {
        self.shared.state.lock().0
    }

    /// Waits for the terminal outcome.
    pub async fn outcome(&self) -> SendOutcome {
        loop {
            let completed = self.shared.completed.notified();
            if let Some(outcome) = self.shared.state.lock().1 {
                return outcome;
            }
            completed.await;
        }
    }

    pub(crate) fn complete(&self, outcome: SendOutcome) {
        {
            let mut state = self.shared.state.lock();
            if state.1.is_some() {
                return;
            }
            *state = (SendProgress::Completed, Some(outcome));
        }
        self.shared.completed.notify_waiters();
    }
}

struct ResponseShared {
    state: Mutex<ResponseState>,
    completed: Notify,
}

struct ResponseState {
    progress: ResponseProgress,
    outcome: Option<ResponseOutcome>,
    response: Option<RemoteMessage>,
}

/// The handle returned by calls that expect a response.
///
/// The embedded `SendResult` completes once the request frame is on the
/// wire; the response half completes when the matching reply arrives or the
/// request fails terminally.
#[derive(Clone)]
pub struct ResponseResult {
    send: SendResult,
    shared: Arc<ResponseShared>,
}

impl ResponseResult {
    pub(crate) fn new() -> Self {
        Self {
            send: SendResult::new(),
            shared: Arc::new(ResponseShared {
                state: Mutex::new(ResponseState {
                    progress: ResponseProgress::Sending,
                    outcome: None,
                    response: None,
                }),
                completed: Notify::new(),
            }),
        }
    }

    pub fn send_result(&self) -> &SendResult {
        &self.send
    }

    /// Waits until the request frame is on the wire.
    pub async fn send_outcome(&self) -> SendOutcome {
        self.send.outcome().await
    }

    pub fn progress(&self) -> ResponseProgress {
        self.shared.state.lock().progress
    }

    /// Waits for the response (or a terminal failure).
    pub async fn response(&self) -> (ResponseOutcome, Option<RemoteMessage>) {
        loop {
            let completed = self.shared.completed.notified();
            {
                let state = self.shared.state.lock();
                if let Some(outcome) = state.outcome {
                    return (outcome, state.response.clone());
                }
            }
            completed.await;
        }
    }

    /// Waits for the response, giving up after `timeout`; expiry completes
    /// the handle as `Timeout`.
    pub async fn response_within(
        &self,
        timeout: Duration,
    ) -> (ResponseOutcome, Option<RemoteMessage>) {
        match tokio::time::timeout(timeout, self.response()).await {
            Ok(result) => result,
            Err(_) => {
                self.complete(ResponseOutcome::Timeout, None);
                self.response().await
            }
        }
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.shared.state.lock().outcome.is_some()
    }

    pub(crate) fn mark_waiting(&self) {
        let mut state = self.shared.state.lock();
        if state.outcome.is_none() {
            state.progress = ResponseProgress::WaitingForResponse;
        }
    }

    pub(crate) fn complete(&self, outcome: ResponseOutcome, response: Option<RemoteMessage>) {
        {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.progress = ResponseProgress::Completed;
            state.outcome = Some(outcome);
            state.response = response;
        }
        self.shared.completed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::NodeAddress;
    use std::net::Ipv4Addr;

    fn response_message(payload: &str) -> RemoteMessage {
        RemoteMessage {
            sender: NodeAddress::new(Ipv4Addr::LOCALHOST, 5000),
            payload: payload.to_owned(),
            message_id: 1,
            awaiting_response: false,
            in_response_to_message: true,
        }
    }

    #[tokio::test]
    async fn send_handle_completes_once() {
        let handle = SendResult::new();
        assert_eq!(handle.progress(), SendProgress::Sending);

        handle.complete(SendOutcome::Success);
        handle.complete(SendOutcome::ConnectionFailure);

        assert_eq!(handle.progress(), SendProgress::Completed);
        assert_eq!(handle.outcome().await, SendOutcome::Success);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_completion() {
        let handle = SendResult::new();
        let waiter = handle.clone();

        let task = tokio::spawn(async move { waiter.outcome().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.complete(SendOutcome::SelfFailure);

        assert_eq!(task.await.unwrap(), SendOutcome::SelfFailure);
    }

    #[tokio::test]
    async fn response_handle_delivers_the_payload() {
        let handle = ResponseResult::new();
        let waiter = handle.clone();

        let task = tokio::spawn(async move { waiter.response().await });
        handle.mark_waiting();
        handle.complete(ResponseOutcome::Success, Some(response_message("pong!")));

        let (outcome, response) = task.await.unwrap();
        assert_eq!(outcome, ResponseOutcome::Success);
        assert_eq!(response.unwrap().payload, "pong!");
        assert_eq!(handle.progress(), ResponseProgress::Completed);
    }

    #[tokio::test]
    async fn progress_is_monotone() {
        let handle = ResponseResult::new();
        assert_eq!(handle.progress(), ResponseProgress::Sending);

        handle.mark_waiting();
        assert_eq!(handle.progress(), ResponseProgress::WaitingForResponse);

        handle.complete(ResponseOutcome::ConnectionFailure, None);
        handle.mark_waiting();
        assert_eq!(handle.progress(), ResponseProgress::Completed);
    }

    #[tokio::test]
    async fn response_within_times_out() {
        let handle = ResponseResult::new();

        let (outcome, response) = handle.response_within(Duration::from_millis(20)).await;
        assert_eq!(outcome, ResponseOutcome::Timeout);
        assert!(response.is_none());

        // a late reply no longer changes the outcome
        handle.complete(ResponseOutcome::Success, Some(response_message("late")));
        let (outcome, _) = handle.response().await;
        assert_eq!(outcome, ResponseOutcome::Timeout);
    }
}
