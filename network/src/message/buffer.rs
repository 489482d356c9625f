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

/// Accumulates raw bytes from one inbound stream and carves out whole frames.
///
/// `expected_length` stays at `-1` until the length prefix has been parsed;
/// once known, exactly that many bytes form the next frame, after which the
/// field resets. The digit-run terminator is part of the frame body and is
/// never consumed during length parsing.
pub struct FrameBuffer {
    buffer: Vec<u8>,
    expected_length: i64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            expected_length: -1,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the next complete frame, or `None` until enough bytes arrive.
    ///
    /// An error means the stream can no longer be framed and the peer must
    /// be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, MessageError> {
        if self.expected_length < 0 {
            let mut digits = 0;
            while digits < self.buffer.len() && self.buffer[digits].is_ascii_digit() {
                digits += 1;
            }

            if digits == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                // the stream starts with a non-digit: framing is lost
                return Err(MessageError::InvalidLength);
            }
            if digits == self.buffer.len() {
                // the digit run is not terminated yet; wait for more bytes
                return Ok(None);
            }

            let length = std::str::from_utf8(&self.buffer[..digits])
                .ok()
                .and_then(|run| run.parse::<i64>().ok())
                .ok_or(MessageError::InvalidLength)?;
            // a frame must at least extend past its own prefix
            if length <= digits as i64 {
                return Err(MessageError::InvalidLength);
            }

            self.expected_length = length;
        }

        let expected = self.expected_length as usize;
        if self.buffer.len() < expected {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..expected).collect();
        self.expected_length = -1;
        Ok(Some(frame))
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_frame_in_one_chunk() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"12f0u5000:hi");

        assert_eq!(buffer.next_frame().unwrap(), Some(b"12f0u5000:hi".to_vec()));
        assert_eq!(buffer.next_frame().unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn length_only_emits_nothing() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"12");

        // the digit run is unterminated; it may still grow
        assert_eq!(buffer.next_frame().unwrap(), None);

        buffer.extend(b"f0u");
        assert_eq!(buffer.next_frame().unwrap(), None);
    }

    #[test]
    fn exact_remainder_completes_the_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"12f0u50");
        assert_eq!(buffer.next_frame().unwrap(), None);

        buffer.extend(b"00:hi");
        assert_eq!(buffer.next_frame().unwrap(), Some(b"12f0u5000:hi".to_vec()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn extra_bytes_leave_a_residual() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"12f0u5000:hi9f0u5000:");

        assert_eq!(buffer.next_frame().unwrap(), Some(b"12f0u5000:hi".to_vec()));
        assert_eq!(buffer.len(), 9);
        assert_eq!(buffer.next_frame().unwrap(), Some(b"9f0u5000:".to_vec()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn two_frames_across_odd_chunks() {
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();

        for chunk in [&b"12f0"[..], &b"u5000:hi12f"[..], &b"0u5000:yo"[..]] {
            buffer.extend(chunk);
            while let Some(frame) = buffer.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec![b"12f0u5000:hi".to_vec(), b"12f0u5000:yo".to_vec()]);
    }

    #[test]
    fn leading_non_digit_is_fatal() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"garbage");

        assert!(buffer.next_frame().is_err());
    }

    #[test]
    fn absurd_length_is_fatal() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"1t");

        // a 1-byte frame cannot even hold its own prefix
        assert!(buffer.next_frame().is_err());
    }
}
