//! Wire protocol between the harness and a driver plugin.
//!
//! Messages are JSON objects, one per line, over the plugin's stdin and
//! stdout. Before any message the plugin writes a handshake line:
//!
//! ```text
//! +------------------+---+----------------+
//! | protocol version | | | protocol name  |
//! +------------------+---+----------------+
//! ```
//!
//! Requests carry an id; every reply echoes it. A streaming request gets
//! any number of `stream_item` replies followed by `stream_end` or `error`.
//!
//! Streams are credit based. The plugin may send [`STREAM_WINDOW`] items
//! up front and one more per credit the harness grants with
//! `stream_credit` as it consumes them. `close_stream` withdraws all credit.

use crate::error::DriverError;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stampede_core::{
    BuildQueriesContext, DriverQuery, StepContext, Transaction, UnitBuildContext,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Protocol version; bumped on incompatible changes
pub const PROTOCOL_VERSION: u32 = 1;

/// Protocol name announced in the handshake
pub const PROTOCOL_NAME: &str = "json";

/// Environment variable the harness sets when launching a plugin
pub const MAGIC_COOKIE_KEY: &str = "STAMPEDE_DRIVER_PLUGIN";

/// Expected value of [`MAGIC_COOKIE_KEY`]
pub const MAGIC_COOKIE_VALUE: &str = "6f1c3a52-stampede-driver";

/// Maximum message size (64 MB) to prevent memory exhaustion
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Items a plugin may send on a stream before the harness grants more
pub const STREAM_WINDOW: u32 = 32;

pub type MessageReader<R> = FramedRead<R, LinesCodec>;
pub type MessageWriter<W> = FramedWrite<W, LinesCodec>;

/// A call to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    Initialize(StepContext),
    BuildTransactionsFromUnit(UnitBuildContext),
    BuildTransactionsFromUnitStream(UnitBuildContext),
    RunTransaction(Transaction),
    Teardown,
    BuildQueries(BuildQueriesContext),
    RunQuery(DriverQuery),
    StreamCredit { stream: u64, credit: u32 },
    CloseStream { stream: u64 },
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::Initialize(_) => "initialize",
            Call::BuildTransactionsFromUnit(_) => "build_transactions_from_unit",
            Call::BuildTransactionsFromUnitStream(_) => "build_transactions_from_unit_stream",
            Call::RunTransaction(_) => "run_transaction",
            Call::Teardown => "teardown",
            Call::BuildQueries(_) => "build_queries",
            Call::RunQuery(_) => "run_query",
            Call::StreamCredit { .. } => "stream_credit",
            Call::CloseStream { .. } => "close_stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub call: Call,
}

/// A reply from the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Ack,
    Transactions(Vec<Transaction>),
    Queries(Vec<DriverQuery>),
    StreamItem(Transaction),
    StreamEnd,
    Error(String),
}

impl Reply {
    /// Whether this reply ends its request.
    pub fn is_final(&self) -> bool {
        !matches!(self, Reply::StreamItem(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub reply: Reply,
}

/// The line a plugin writes first.
pub fn handshake_line() -> String {
    format!("{PROTOCOL_VERSION}|{PROTOCOL_NAME}")
}

/// Validate a plugin's handshake line.
pub fn check_handshake(line: &str) -> Result<(), DriverError> {
    let (version, name) = line
        .trim()
        .split_once('|')
        .ok_or_else(|| DriverError::Handshake(format!("malformed handshake line '{line}'")))?;

    let version: u32 = version
        .parse()
        .map_err(|_| DriverError::Handshake(format!("invalid protocol version '{version}'")))?;
    if version != PROTOCOL_VERSION {
        return Err(DriverError::Handshake(format!(
            "incompatible protocol version {version}, expected {PROTOCOL_VERSION}"
        )));
    }
    if name != PROTOCOL_NAME {
        return Err(DriverError::Handshake(format!(
            "unsupported protocol '{name}', expected '{PROTOCOL_NAME}'"
        )));
    }
    Ok(())
}

pub fn message_reader<R: AsyncRead>(reader: R) -> MessageReader<R> {
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE))
}

pub fn message_writer<W: AsyncWrite>(writer: W) -> MessageWriter<W> {
    FramedWrite::new(writer, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE))
}

fn codec_error(err: LinesCodecError) -> DriverError {
    match err {
        LinesCodecError::Io(e) => DriverError::Transport(e),
        LinesCodecError::MaxLineLengthExceeded => DriverError::Protocol(format!(
            "message exceeds {MAX_MESSAGE_SIZE} bytes"
        )),
    }
}

/// Read the next raw line; `None` at end of input.
pub async fn read_line<R>(reader: &mut MessageReader<R>) -> Result<Option<String>, DriverError>
where
    R: AsyncRead + Unpin,
{
    reader.next().await.transpose().map_err(codec_error)
}

/// Read and decode the next message; `None` at end of input.
pub async fn read_message<R, T>(reader: &mut MessageReader<R>) -> Result<Option<T>, DriverError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_line(reader).await? {
        Some(line) => serde_json::from_str(&line)
            .map(Some)
            .map_err(|e| DriverError::Protocol(format!("undecodable message: {e}"))),
        None => Ok(None),
    }
}

/// Encode and write one message.
pub async fn write_message<W, T>(writer: &mut MessageWriter<W>, message: &T) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = serde_json::to_string(message)
        .map_err(|e| DriverError::Protocol(format!("unencodable message: {e}")))?;
    writer.send(line).await.map_err(codec_error)
}

/// Write a raw line, used for the handshake.
pub async fn write_line<W>(writer: &mut MessageWriter<W>, line: String) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
{
    writer.send(line).await.map_err(codec_error)
}
