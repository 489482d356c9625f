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

//! Metric names emitted through the `metrics` facade; they no-op unless the
//! embedder installs a recorder.

pub const INBOUND_ALL_SUCCESSES: &str = "meshring_inbound_all_successes_total";
pub const INBOUND_ALL_FAILURES: &str = "meshring_inbound_all_failures_total";
pub const INBOUND_APPROVALS: &str = "meshring_inbound_approvals_total";
pub const INBOUND_NEIGHBORS: &str = "meshring_inbound_neighbors_total";
pub const INBOUND_PINGS: &str = "meshring_inbound_pings_total";
pub const INBOUND_SYSTEM: &str = "meshring_inbound_system_total";
pub const INBOUND_USER: &str = "meshring_inbound_user_total";
pub const INBOUND_UNKNOWN: &str = "meshring_inbound_unknown_total";

pub const OUTBOUND_ALL_SUCCESSES: &str = "meshring_outbound_all_successes_total";
pub const OUTBOUND_ALL_FAILURES: &str = "meshring_outbound_all_failures_total";

pub const CONNECTIONS_ALL_ACCEPTED: &str = "meshring_connections_all_accepted_total";
pub const CONNECTIONS_ALL_INITIATED: &str = "meshring_connections_all_initiated_total";
pub const CONNECTIONS_APPROVED: &str = "meshring_connections_approved_total";
