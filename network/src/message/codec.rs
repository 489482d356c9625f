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

//! The wire form of a frame is `<len><rf><id><kind><port>:<payload>`, all
//! ASCII except for the payload bytes. `<len>` is the decimal byte count of
//! the whole frame *including its own digits*, so the encoder has to iterate
//! until the digit count of the length is stable.

use crate::{
    errors::MessageError,
    message::{Frame, MessageKind},
};

/// Encodes a frame into its on-wire byte form.
pub fn serialize(frame: &Frame) -> Vec<u8> {
    let mut body = Vec::with_capacity(frame.payload.len() + 16);
    body.push(if frame.awaiting_response { b't' } else { b'f' });
    body.extend_from_slice(frame.message_id.to_string().as_bytes());
    body.push(frame.kind.as_byte());
    body.extend_from_slice(frame.sender_port.to_string().as_bytes());
    body.push(b':');
    body.extend_from_slice(&frame.payload);

    // Iterate until the length stops changing once its own digits are counted.
    let mut total = body.len();
    loop {
        let with_prefix = body.len() + decimal_digits(total);
        if with_prefix == total {
            break;
        }
        total = with_prefix;
    }

    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(total.to_string().as_bytes());
    bytes.extend_from_slice(&body);
    bytes
}

/// Decodes one complete frame; `bytes` must span exactly the frame.
pub fn deserialize(bytes: &[u8]) -> Result<Frame, MessageError> {
    let (declared_length, mut position) =
        read_decimal(bytes, 0).ok_or(MessageError::InvalidLength)?;
    if declared_length != bytes.len() {
        return Err(MessageError::LengthMismatch(declared_length, bytes.len()));
    }

    let awaiting_response = match bytes.get(position) {
        Some(b't') => true,
        Some(_) => false,
        None => return Err(MessageError::Truncated),
    };
    position += 1;

    let (message_id, after_id) = read_decimal(bytes, position).ok_or(MessageError::InvalidId)?;
    position = after_id;

    let kind = MessageKind::from_byte(*bytes.get(position).ok_or(MessageError::Truncated)?);
    position += 1;

    let (sender_port, after_port) = read_decimal(bytes, position).ok_or(MessageError::InvalidPort)?;
    if sender_port > u16::MAX as usize {
        return Err(MessageError::InvalidPort);
    }
    position = after_port;

    match bytes.get(position) {
        Some(b':') => position += 1,
        _ => return Err(MessageError::MissingPayloadSeparator),
    }

    Ok(Frame {
        kind,
        message_id: message_id as u64,
        awaiting_response,
        sender_port: sender_port as u16,
        payload: bytes[position..].to_vec(),
    })
}

/// Reads a run of ASCII digits starting at `start`; the first non-digit
/// terminates the run and is not consumed.
fn read_decimal(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return None;
    }

    let digits = std::str::from_utf8(&bytes[start..end]).ok()?;
    let value = digits.parse::<usize>().ok()?;
    Some((value, end))
}

fn decimal_digits(mut value: usize) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_frame(message_id: u64, awaiting_response: bool, payload: &str) -> Frame {
        Frame::new(
            MessageKind::User,
            message_id,
            awaiting_response,
            5000,
            payload.as_bytes().to_vec(),
        )
    }

    #[test]
    fn encode_user_reference_vector() {
        let frame = user_frame(0, false, "hi");

        assert_eq!(serialize(&frame), b"12f0u5000:hi".to_vec());
    }

    #[test]
    fn decode_user_reference_vector() {
        let frame = deserialize(b"12f0u5000:hi").unwrap();

        assert_eq!(frame.kind, MessageKind::User);
        assert_eq!(frame.message_id, 0);
        assert!(!frame.awaiting_response);
        assert_eq!(frame.sender_port, 5000);
        assert_eq!(frame.payload, b"hi".to_vec());
    }

    #[test]
    fn round_trip_all_kinds() {
        for kind in [
            MessageKind::Approval,
            MessageKind::Neighbors,
            MessageKind::Ping,
            MessageKind::System,
            MessageKind::User,
        ] {
            let frame = Frame::new(kind, 42, true, 61000, b"payload".to_vec());
            let decoded = deserialize(&serialize(&frame)).unwrap();

            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn length_prefix_matches_byte_count() {
        for payload_len in 0..300 {
            let frame = user_frame(7, true, &"x".repeat(payload_len));
            let bytes = serialize(&frame);

            let digit_run: Vec<u8> = bytes
                .iter()
                .copied()
                .take_while(|b| b.is_ascii_digit())
                .collect();
            let declared: usize = String::from_utf8(digit_run).unwrap().parse().unwrap();

            assert_eq!(declared, bytes.len(), "payload_len = {}", payload_len);
            assert_eq!(deserialize(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn single_digit_length_cusp() {
        // body of 8 bytes still fits a one-digit prefix: total 9
        let frame = user_frame(0, false, "");
        let bytes = serialize(&frame);
        assert_eq!(bytes, b"9f0u5000:".to_vec());

        // body of 9 bytes cannot be described by "10" (that would make 11
        // bytes), so the encoder settles on 11
        let frame = user_frame(0, false, "x");
        let bytes = serialize(&frame);
        assert_eq!(bytes, b"11f0u5000:x".to_vec());
        assert_eq!(deserialize(&bytes).unwrap(), frame);
    }

    #[test]
    fn two_digit_length_cusp() {
        // body of 97 bytes: 97 + 2 = 99, representable with two digits
        let frame = user_frame(0, false, &"x".repeat(89));
        assert_eq!(serialize(&frame).len(), 99);

        // body of 98 bytes: neither 99 nor 100 is self-consistent; 101 is
        let frame = user_frame(0, false, &"x".repeat(90));
        let bytes = serialize(&frame);
        assert_eq!(bytes.len(), 101);
        assert_eq!(deserialize(&bytes).unwrap(), frame);
    }

    #[test]
    fn unknown_kind_decodes_as_unknown() {
        let frame = deserialize(b"12f0z5000:hi").unwrap();

        assert_eq!(frame.kind, MessageKind::Unknown);
    }

    #[test]
    fn empty_payload_round_trip() {
        let frame = Frame::new(MessageKind::Ping, 0, false, 5001, vec![]);
        let decoded = deserialize(&serialize(&frame)).unwrap();

        assert_eq!(decoded, frame);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(matches!(
            deserialize(b"13f0u5000:hi"),
            Err(MessageError::LengthMismatch(13, 12))
        ));
    }

    #[test]
    fn missing_separator_is_rejected() {
        // "12f0u5000xhi" declares 12 bytes but never closes the port field
        assert!(matches!(
            deserialize(b"12f0u5000xhi"),
            Err(MessageError::MissingPayloadSeparator)
        ));
    }

    #[test]
    fn missing_length_is_rejected() {
        assert!(matches!(
            deserialize(b"f0u5000:hi"),
            Err(MessageError::InvalidLength)
        ));
    }
}
