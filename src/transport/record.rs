use serde::{Deserialize, Serialize};

/// Bytes one record occupies on the wire. Every record is sent at this
/// size so the observer can split the stream without a length prefix.
pub const WIRE_RECORD_SIZE: usize = 256;

/// command id (1) + sequence (8) + payload length (2)
pub const HEADER_SIZE: usize = 1 + 8 + 2;

pub const PAYLOAD_CAPACITY: usize = WIRE_RECORD_SIZE - HEADER_SIZE;

/// Longest text a text record carries; longer input is truncated.
pub const MAX_TEXT_LEN: usize = PAYLOAD_CAPACITY;

const _: () = {
    assert!(PAYLOAD_CAPACITY == 245);
    assert!(PAYLOAD_CAPACITY <= u16::MAX as usize);
};

/// Kind tag of a record. Open-ended so the runtime layer can define its
/// own ids; the well-known ones are associated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub u8);

impl CommandId {
    pub const INITIAL: CommandId = CommandId(1);
    pub const TEXT: CommandId = CommandId(2);
    pub const PROPERTY: CommandId = CommandId(3);
    pub const EVENT: CommandId = CommandId(4);
}

impl From<u8> for CommandId {
    fn from(id: u8) -> Self {
        CommandId(id)
    }
}

/// One fixed-size trace record. Moves between the pool, the collector and
/// the socket by value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub kind: CommandId,
    pub sequence: u64,
    len: u16,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl Record {
    pub fn new(kind: CommandId, sequence: u64) -> Self {
        Self {
            kind,
            sequence,
            len: 0,
            payload: [0u8; PAYLOAD_CAPACITY],
        }
    }

    /// Text record. Truncates on a char boundary at `MAX_TEXT_LEN` bytes.
    pub fn text(kind: CommandId, sequence: u64, text: &str) -> Self {
        let mut record = Self::new(kind, sequence);
        let mut end = text.len().min(MAX_TEXT_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        record.set_payload(&text.as_bytes()[..end]);
        record
    }

    /// Binary record. Returns the number of payload bytes kept.
    pub fn with_payload(kind: CommandId, sequence: u64, payload: &[u8]) -> (Self, usize) {
        let mut record = Self::new(kind, sequence);
        let kept = record.set_payload(payload);
        (record, kept)
    }

    fn set_payload(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(PAYLOAD_CAPACITY);
        self.payload[..n].copy_from_slice(&bytes[..n]);
        self.payload[n..].fill(0);
        self.len = n as u16;
        n
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    /// Payload as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(self.payload()).ok()
    }

    /// Writes the fixed-size wire image into `out`.
    pub fn encode_into(&self, out: &mut [u8; WIRE_RECORD_SIZE]) {
        out[0] = self.kind.0;
        out[1..9].copy_from_slice(&self.sequence.to_le_bytes());
        out[9..11].copy_from_slice(&self.len.to_le_bytes());
        out[HEADER_SIZE..].copy_from_slice(&self.payload);
    }

    pub fn encode(&self) -> [u8; WIRE_RECORD_SIZE] {
        let mut out = [0u8; WIRE_RECORD_SIZE];
        self.encode_into(&mut out);
        out
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("kind", &self.kind)
            .field("sequence", &self.sequence)
            .field("len", &self.len)
            .finish()
    }
}

/// Parses one wire record. Returns `None` when `bytes` is shorter than a
/// record or the declared length overruns the payload area.
pub fn decode(bytes: &[u8]) -> Option<Record> {
    if bytes.len() < WIRE_RECORD_SIZE {
        return None;
    }
    let mut seq = [0u8; 8];
    seq.copy_from_slice(&bytes[1..9]);
    let len = u16::from_le_bytes([bytes[9], bytes[10]]);
    if len as usize > PAYLOAD_CAPACITY {
        return None;
    }
    let mut record = Record::new(CommandId(bytes[0]), u64::from_le_bytes(seq));
    record.set_payload(&bytes[HEADER_SIZE..HEADER_SIZE + len as usize]);
    Some(record)
}

/// Splits a byte stream into whole records, ignoring a trailing partial one.
pub fn decode_stream(bytes: &[u8]) -> Vec<Record> {
    bytes
        .chunks_exact(WIRE_RECORD_SIZE)
        .filter_map(decode)
        .collect()
}
