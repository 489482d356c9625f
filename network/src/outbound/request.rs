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
    message::Frame,
    outbound::{ResponseResult, SendResult},
    NodeAddress,
};

/// A composed frame queued for delivery, together with its result handles.
///
/// When `response_result` is set, `send_result` is its embedded send half;
/// the pending-response entry for the frame's id is registered before the
/// request is enqueued.
pub(crate) struct SendRequest {
    pub frame: Frame,
    pub destination: NodeAddress,
    /// Whether delivery requires an approved connection (and must not dial).
    pub needs_approved: bool,
    pub send_result: SendResult,
    pub response_result: Option<ResponseResult>,
}
