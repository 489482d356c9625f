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

use std::fmt;

#[derive(Debug)]
pub enum MessageError {
    /// The length prefix is absent, non-numeric or nonsensically small.
    InvalidLength,
    /// The message id field contains no digits.
    InvalidId,
    /// The sender port field is missing or out of range.
    InvalidPort,
    /// The `:` separator before the payload is missing.
    MissingPayloadSeparator,
    /// The declared frame length does not match the received byte count.
    LengthMismatch(usize, usize),
    /// The frame ends before all fixed fields have been read.
    Truncated,
    Io(std::io::Error),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<std::io::Error> for MessageError {
    fn from(error: std::io::Error) -> Self {
        MessageError::Io(error)
    }
}
