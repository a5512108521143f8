//! Peer broadcast wire format
//!
//! Every message starts with a one-byte tag:
//!
//! ```text
//! 1 Handshake    (no payload)
//! 2 TrackUpdate  [u64 BE id hi][u64 BE id lo][u8 playing][utf artist][utf track]
//! ```
//!
//! `utf` is a big-endian u16 byte length followed by that many UTF-8 bytes.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use uuid::Uuid;

pub const TAG_HANDSHAKE: u8 = 1;
pub const TAG_TRACK_UPDATE: u8 = 2;

/// Longest string a length prefix can describe
pub const MAX_STRING_BYTES: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("message truncated")]
    Truncated,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A peer's now-playing announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackUpdate {
    pub peer_id: Uuid,
    pub is_playing: bool,
    pub artist: String,
    pub track: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Ask everyone to announce their track right away
    Handshake,
    TrackUpdate(TrackUpdate),
}

impl PeerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        match self {
            PeerMessage::Handshake => buf.write_u8(TAG_HANDSHAKE)?,
            PeerMessage::TrackUpdate(update) => {
                buf.write_u8(TAG_TRACK_UPDATE)?;
                let (hi, lo) = update.peer_id.as_u64_pair();
                buf.write_u64::<BigEndian>(hi)?;
                buf.write_u64::<BigEndian>(lo)?;
                buf.write_u8(u8::from(update.is_playing))?;
                write_utf(&mut buf, &update.artist)?;
                write_utf(&mut buf, &update.track)?;
            }
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(bytes);
        let tag = cursor.read_u8().map_err(|_| ProtocolError::Empty)?;

        match tag {
            TAG_HANDSHAKE => Ok(PeerMessage::Handshake),
            TAG_TRACK_UPDATE => {
                let hi = cursor.read_u64::<BigEndian>().map_err(|_| ProtocolError::Truncated)?;
                let lo = cursor.read_u64::<BigEndian>().map_err(|_| ProtocolError::Truncated)?;
                let is_playing = cursor.read_u8().map_err(|_| ProtocolError::Truncated)? != 0;
                let artist = read_utf(&mut cursor)?;
                let track = read_utf(&mut cursor)?;

                Ok(PeerMessage::TrackUpdate(TrackUpdate {
                    peer_id: Uuid::from_u64_pair(hi, lo),
                    is_playing,
                    artist,
                    track,
                }))
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

fn write_utf(w: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_STRING_BYTES {
        return Err(ProtocolError::StringTooLong(bytes.len()));
    }
    w.write_u16::<BigEndian>(bytes.len() as u16)?;
    w.extend_from_slice(bytes);
    Ok(())
}

fn read_utf<R: Read>(r: &mut R) -> Result<String, ProtocolError> {
    let len = r.read_u16::<BigEndian>().map_err(|_| ProtocolError::Truncated)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|_| ProtocolError::Truncated)?;
    String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)
}
