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

use crate::errors::MessageError;

use std::{fmt, io::ErrorKind};

#[derive(Debug)]
pub enum NetworkError {
    /// The node was already connected; `connect` may only run once.
    AlreadyConnected,
    /// A hostname could not be resolved to an IPv4 address.
    AddressResolution(String),
    /// An address string was not of the `host:port` form.
    InvalidAddress(String),
    Io(std::io::Error),
    Message(MessageError),
    /// A request RPC completed without a usable response.
    RequestFailed,
    SelfConnectAttempt,
    ShuttingDown,
    /// A Chord-only operation was invoked on a node running another overlay.
    WrongNetworkType,
}

impl NetworkError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(err) => [
                ErrorKind::BrokenPipe,
                ErrorKind::ConnectionReset,
                ErrorKind::UnexpectedEof,
            ]
            .contains(&err.kind()),
            Self::AlreadyConnected => true,
            _ => false,
        }
    }

    pub fn is_trivial(&self) -> bool {
        match self {
            NetworkError::Io(e) => {
                matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe
                        | ErrorKind::ConnectionReset
                        | ErrorKind::UnexpectedEof
                        | ErrorKind::TimedOut
                        | ErrorKind::ConnectionRefused
                )
            }
            _ => false,
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(error: std::io::Error) -> Self {
        NetworkError::Io(error)
    }
}

impl From<MessageError> for NetworkError {
    fn from(error: MessageError) -> Self {
        NetworkError::Message(error)
    }
}

impl From<NetworkError> for anyhow::Error {
    fn from(error: NetworkError) -> Self {
        error!("{}", error);
        Self::msg(error.to_string())
    }
}
