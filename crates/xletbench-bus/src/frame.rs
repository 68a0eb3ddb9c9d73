//! Fixed-size wire frames.
//!
//! ```text
//! +---------+----------------+------------------+
//! | tag (1) | value (8, LE)  | timestamp (8, LE)|
//! +---------+----------------+------------------+
//! ```
//!
//! | tag | frame       | value               | timestamp          |
//! |-----|-------------|---------------------|--------------------|
//! | 0   | data        | sample value        | generation time    |
//! | 1   | end         | `-1`                | generation time    |
//! | 2   | ping        | unused              | inlet send time    |
//! | 3   | pong        | echoed ping, f64 bits | outlet reply time |
//! | 4   | subscribe   | unused              | unused             |

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use xletbench_core::{SENTINEL, StreamItem};

pub const FRAME_LEN: usize = 17;

const TAG_DATA: u8 = 0;
const TAG_END: u8 = 1;
const TAG_PING: u8 = 2;
const TAG_PONG: u8 = 3;
const TAG_SUBSCRIBE: u8 = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Closed,

    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
}

impl From<FrameError> for xletbench_core::Error {
    fn from(err: FrameError) -> Self {
        xletbench_core::Error::transport(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Data { value: i64, t_generated: f64 },
    End { t_generated: f64 },
    Ping { t_sent: f64 },
    Pong { t_ping: f64, t_remote: f64 },
    Subscribe,
}

impl Frame {
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let (tag, value, t) = match *self {
            Self::Data { value, t_generated } => (TAG_DATA, value, t_generated),
            Self::End { t_generated } => (TAG_END, SENTINEL, t_generated),
            Self::Ping { t_sent } => (TAG_PING, 0, t_sent),
            Self::Pong { t_ping, t_remote } => (TAG_PONG, t_ping.to_bits() as i64, t_remote),
            Self::Subscribe => (TAG_SUBSCRIBE, 0, 0.0),
        };
        let mut buf = [0u8; FRAME_LEN];
        buf[0] = tag;
        buf[1..9].copy_from_slice(&value.to_le_bytes());
        buf[9..17].copy_from_slice(&t.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let mut value = [0u8; 8];
        value.copy_from_slice(&buf[1..9]);
        let value = i64::from_le_bytes(value);
        let mut t = [0u8; 8];
        t.copy_from_slice(&buf[9..17]);
        let t = f64::from_le_bytes(t);

        match buf[0] {
            // A data frame carrying the sentinel still ends the stream.
            TAG_DATA if value == SENTINEL => Ok(Self::End { t_generated: t }),
            TAG_DATA => Ok(Self::Data {
                value,
                t_generated: t,
            }),
            TAG_END => Ok(Self::End { t_generated: t }),
            TAG_PING => Ok(Self::Ping { t_sent: t }),
            TAG_PONG => Ok(Self::Pong {
                t_ping: f64::from_bits(value as u64),
                t_remote: t,
            }),
            TAG_SUBSCRIBE => Ok(Self::Subscribe),
            other => Err(FrameError::UnknownTag(other)),
        }
    }

    /// The stream item carried by a data or end frame.
    pub fn into_item(self) -> Option<StreamItem> {
        match self {
            Self::Data { value, t_generated } => Some(StreamItem::from_wire(value, t_generated)),
            Self::End { t_generated } => Some(StreamItem::EndOfStream { t_generated }),
            _ => None,
        }
    }
}

impl From<StreamItem> for Frame {
    fn from(item: StreamItem) -> Self {
        match item {
            StreamItem::Data(s) => Self::Data {
                value: s.value,
                t_generated: s.t_generated,
            },
            StreamItem::EndOfStream { t_generated } => Self::End { t_generated },
        }
    }
}

/// Write one frame. Does not flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), FrameError> {
    writer.write_all(&frame.encode()).await?;
    Ok(())
}

/// Read one frame; [`FrameError::Closed`] on EOF, even mid-frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut buf = [0u8; FRAME_LEN];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Frame::decode(&buf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Closed),
        Err(e) => Err(FrameError::Io(e)),
    }
}
