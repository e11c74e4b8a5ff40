//! Client-mode transport: connects to a running server over the wire
//! protocol (spec §6), sends one statement or dot-command per frame, and
//! renders whatever comes back.

use db_kernel::error::{DbError, IoError};
use db_server::{frame, QueryResult, ResponseKind};
use db_storage::Value;
use std::io::Write;
use std::net::TcpStream;

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn connect(host: &str, port: u16) -> Result<Self, DbError> {
        let stream = TcpStream::connect((host, port)).map_err(|e| DbError::Io(IoError::Std(e)))?;
        Ok(Self { stream })
    }

    /// Sends `statement` as one frame and returns the decoded response body,
    /// tagged by its `ResponseKind` discriminator.
    pub fn send(&mut self, statement: &str) -> Result<(ResponseKind, Vec<u8>), DbError> {
        frame::write_frame(&mut self.stream, statement.as_bytes()).map_err(DbError::Io)?;
        let payload = frame::read_frame(&mut self.stream).map_err(DbError::Io)?;
        let kind = decode_kind(payload.first().copied())?;
        Ok((kind, payload[1..].to_vec()))
    }

    pub fn query(&mut self, statement: &str) -> Result<QueryResult, DbError> {
        let (kind, body) = self.send(statement)?;
        match kind {
            ResponseKind::QueryResult => QueryResult::deserialize(&mut body.as_slice()).map_err(DbError::Io),
            ResponseKind::Error => Err(DbError::Io(IoError::MalformedFrame(String::from_utf8_lossy(&body[4..]).into_owned()))),
            other => Err(DbError::Io(IoError::MalformedFrame(format!("unexpected response kind {other:?}")))),
        }
    }

    pub fn stop(&mut self) -> Result<(), DbError> {
        self.send(".stop").map(|_| ())
    }
}

fn decode_kind(byte: Option<u8>) -> Result<ResponseKind, DbError> {
    let byte = byte.ok_or_else(|| DbError::Io(IoError::MalformedFrame("empty response frame".into())))?;
    Ok(match byte {
        0 => ResponseKind::Success,
        1 => ResponseKind::Error,
        3 => ResponseKind::QueryResult,
        18 => ResponseKind::ConnectionClosed,
        other => return Err(DbError::Io(IoError::MalformedFrame(format!("unknown response discriminator {other}")))),
    })
}

/// Renders a query result as a simple whitespace-aligned table, the way a
/// REPL would print one row per line.
pub fn render_result<W: Write>(w: &mut W, result: &QueryResult) -> std::io::Result<()> {
    let header: Vec<&str> = result.schema().columns().iter().map(|c| c.name.as_str()).collect();
    writeln!(w, "{}", header.join("\t"))?;

    for tile in result.tiles() {
        for row in 0..tile.size() {
            let view = tile.view(row);
            let values: Vec<String> = result
                .order()
                .iter()
                .map(|&column| format_value(view.get(column as usize)))
                .collect();
            writeln!(w, "{}", values.join("\t"))?;
        }
    }
    writeln!(w, "({} rows)", result.row_count())
}

fn format_value(value: Value) -> String {
    match value {
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Date(d) => d.0.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Char(bytes) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Value::Null(_) => "NULL".to_string(),
    }
}
