// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire encoding of sync messages and of the append-log record format.
//!
//! Every message starts with a message type byte. The only type handled by
//! this crate is `SYNC`; its payload is a sync subtype byte followed by a
//! length-prefixed body, so that the body of an `UPDATE` message is
//! byte-identical to an update record in the file wire's append log.
//! Lengths use the 7-bit variable-length unsigned integer encoding shared
//! with the update payloads themselves.

use thiserror::Error;

/// Message type byte for sync messages.
pub const MESSAGE_SYNC: u8 = 0;

/// Sync subtype carrying a state vector.
pub const SYNC_STEP1: u8 = 0;
/// Sync subtype carrying the updates missing from a previously received
/// state vector.
pub const SYNC_STEP2: u8 = 1;
/// Sync subtype carrying a single incremental update.
pub const SYNC_UPDATE: u8 = 2;

/// Errors raised while decoding or applying sync messages.
///
/// These are never fatal for a running session: unrecognized or malformed
/// messages are logged and dropped for forward compatibility.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message ended before its declared length.
    #[error("message is empty or truncated")]
    UnexpectedEnd,

    /// The message type byte is not `SYNC`.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// The sync subtype byte is none of STEP1, STEP2 or UPDATE.
    #[error("unknown sync message type {0}")]
    UnknownSyncType(u8),

    /// The payload could not be decoded as a state vector or update.
    #[error("malformed sync payload: {0}")]
    Payload(String),

    /// The decoded update could not be integrated into the document.
    #[error("failed to apply update: {0}")]
    Apply(String),
}

/// A decoded sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// State vector summarizing what the sender knows.
    Step1(Vec<u8>),
    /// Updates the receiver of a step 1 found missing on the sender side.
    Step2(Vec<u8>),
    /// A single incremental update.
    Update(Vec<u8>),
}

impl SyncMessage {
    /// Encodes the message, length-prefixing the payload.
    pub fn encode(&self) -> Vec<u8> {
        let (subtype, payload) = match self {
            SyncMessage::Step1(payload) => (SYNC_STEP1, payload),
            SyncMessage::Step2(payload) => (SYNC_STEP2, payload),
            SyncMessage::Update(payload) => (SYNC_UPDATE, payload),
        };
        let mut buf = Vec::with_capacity(payload.len() + 12);
        buf.push(MESSAGE_SYNC);
        buf.push(subtype);
        write_record(&mut buf, payload);
        buf
    }

    /// Decodes a message received from a channel.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&message_type, rest) = data.split_first().ok_or(ProtocolError::UnexpectedEnd)?;
        if message_type != MESSAGE_SYNC {
            return Err(ProtocolError::UnknownMessageType(message_type));
        }
        let (&subtype, rest) = rest.split_first().ok_or(ProtocolError::UnexpectedEnd)?;
        let (len, consumed) = read_var_u64(rest).ok_or(ProtocolError::UnexpectedEnd)?;
        let end = consumed
            .checked_add(usize::try_from(len).map_err(|_| ProtocolError::UnexpectedEnd)?)
            .ok_or(ProtocolError::UnexpectedEnd)?;
        let payload = rest
            .get(consumed..end)
            .ok_or(ProtocolError::UnexpectedEnd)?
            .to_vec();
        match subtype {
            SYNC_STEP1 => Ok(SyncMessage::Step1(payload)),
            SYNC_STEP2 => Ok(SyncMessage::Step2(payload)),
            SYNC_UPDATE => Ok(SyncMessage::Update(payload)),
            other => Err(ProtocolError::UnknownSyncType(other)),
        }
    }
}

/// Appends a length-prefixed record to `buf`.
pub fn write_record(buf: &mut Vec<u8>, payload: &[u8]) {
    write_var_u64(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

/// Writes a variable-length unsigned integer (7 bits per byte, high bit set
/// on all but the last byte).
pub fn write_var_u64(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            break;
        }
    }
}

/// Reads a variable-length unsigned integer, returning the value and the
/// number of bytes consumed, or `None` on a truncated or overlong input.
pub fn read_var_u64(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Streaming reader over concatenated length-prefixed update records.
///
/// Iteration stops at the end of input, on a zero-length record, or on a
/// torn final record (a crash mid-append), which is silently discarded.
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the next complete record, or `None` once the log is
    /// exhausted.
    pub fn next_record(&mut self) -> Option<&'a [u8]> {
        let (len, consumed) = read_var_u64(self.data)?;
        if len == 0 {
            return None;
        }
        let end = consumed.checked_add(usize::try_from(len).ok()?)?;
        let record = self.data.get(consumed..end)?;
        self.data = &self.data[end..];
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_u64_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u64::MAX] {
            let mut buf = Vec::new();
            write_var_u64(&mut buf, value);
            assert_eq!(read_var_u64(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn decode_rejects_unknown_types() {
        assert!(matches!(
            SyncMessage::decode(&[7, 0, 0]),
            Err(ProtocolError::UnknownMessageType(7))
        ));
        assert!(matches!(
            SyncMessage::decode(&[MESSAGE_SYNC, 9, 0]),
            Err(ProtocolError::UnknownSyncType(9))
        ));
        assert!(matches!(
            SyncMessage::decode(&[]),
            Err(ProtocolError::UnexpectedEnd)
        ));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        // Declares three payload bytes but carries only one.
        assert!(matches!(
            SyncMessage::decode(&[MESSAGE_SYNC, SYNC_UPDATE, 3, 1]),
            Err(ProtocolError::UnexpectedEnd)
        ));
    }

    #[test]
    fn update_body_matches_record_format() {
        let message = SyncMessage::Update(vec![1, 2, 3]).encode();
        let mut reader = RecordReader::new(&message[2..]);
        assert_eq!(reader.next_record(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reader.next_record(), None);
    }

    #[test]
    fn record_reader_stops_on_torn_suffix() {
        let mut log = Vec::new();
        write_record(&mut log, b"first");
        write_record(&mut log, b"second");
        // Simulate a crash mid-append of a third record.
        log.extend_from_slice(&[200, 1, 0xaa]);

        let mut reader = RecordReader::new(&log);
        assert_eq!(reader.next_record(), Some(&b"first"[..]));
        assert_eq!(reader.next_record(), Some(&b"second"[..]));
        assert_eq!(reader.next_record(), None);
    }

    #[test]
    fn record_reader_stops_on_zero_length_record() {
        let mut log = Vec::new();
        write_record(&mut log, b"only");
        log.push(0);
        write_record(&mut log, b"unreachable");

        let mut reader = RecordReader::new(&log);
        assert_eq!(reader.next_record(), Some(&b"only"[..]));
        assert_eq!(reader.next_record(), None);
    }
}
