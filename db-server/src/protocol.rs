//! The request/response payload shapes carried inside wire frames (spec §6).
//! Parsing a SQL statement into a logical plan, optimising, and executing it
//! are all external collaborators (spec §1); this module only recognises the
//! envelope.

use db_kernel::error::IoError;

/// A dot-command recognised ahead of a statement, or a bare SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Stop,
    SetCores(u32),
    Config,
    Tables,
    Table(String),
    Statement(String),
}

impl Request {
    pub fn parse(payload: &[u8]) -> Result<Self, IoError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| IoError::MalformedFrame(e.to_string()))?
            .trim();

        if let Some(rest) = text.strip_prefix(".stop") {
            if rest.trim().is_empty() {
                return Ok(Request::Stop);
            }
        }
        if let Some(rest) = text.strip_prefix(".set cores ") {
            let cores: u32 = rest
                .trim()
                .parse()
                .map_err(|_| IoError::MalformedFrame(format!("bad core count: {rest}")))?;
            return Ok(Request::SetCores(cores));
        }
        if text == ".config" {
            return Ok(Request::Config);
        }
        if text == ".tables" {
            return Ok(Request::Tables);
        }
        if let Some(rest) = text.strip_prefix(".table ") {
            return Ok(Request::Table(rest.trim().to_string()));
        }
        if text.starts_with('.') {
            return Err(IoError::MalformedFrame(format!("unknown dot-command: {text}")));
        }

        Ok(Request::Statement(text.to_string()))
    }
}

/// The response payload's one-byte discriminator (spec §6). Most kinds here
/// are diagnostic/boundary concerns (`TaskTrace`, `DRAMBandwidth`, ...); the
/// core only produces `Success`, `Error`, and `QueryResult` bodies itself,
/// the rest are populated by whichever collaborator owns that subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseKind {
    Success = 0,
    Error = 1,
    GetConfiguration = 2,
    QueryResult = 3,
    LogicalPlan = 4,
    TaskGraph = 5,
    FlounderCode = 6,
    AssemblyCode = 7,
    SampleAssembly = 8,
    SampleOperators = 9,
    SampleMemory = 10,
    SampleMemoryHistory = 11,
    PerformanceCounter = 12,
    TaskLoad = 13,
    TaskTrace = 14,
    DRAMBandwidth = 15,
    DataflowGraph = 16,
    Times = 17,
    ConnectionClosed = 18,
}

impl ResponseKind {
    pub fn discriminator(self) -> u8 {
        self as u8
    }
}

/// A response whose body is just a short human-readable message: `Success`
/// (optional message) and `Error` (mandatory message, spec §7: "the client
/// receives the first error encountered with a short human-readable
/// message").
pub enum Response {
    Success(String),
    Error(String),
    ConnectionClosed,
}

impl Response {
    pub fn encode(&self) -> Vec<u8> {
        let (kind, message) = match self {
            Response::Success(m) => (ResponseKind::Success, m.as_str()),
            Response::Error(m) => (ResponseKind::Error, m.as_str()),
            Response::ConnectionClosed => (ResponseKind::ConnectionClosed, ""),
        };
        let mut out = vec![kind.discriminator()];
        out.extend_from_slice(&(message.len() as u32).to_le_bytes());
        out.extend_from_slice(message.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stop_dot_command() {
        assert_eq!(Request::parse(b".stop").unwrap(), Request::Stop);
    }

    #[test]
    fn parses_set_cores() {
        assert_eq!(Request::parse(b".set cores 8").unwrap(), Request::SetCores(8));
    }

    #[test]
    fn parses_table_name() {
        assert_eq!(
            Request::parse(b".table orders").unwrap(),
            Request::Table("orders".to_string())
        );
    }

    #[test]
    fn bare_text_is_a_statement() {
        assert_eq!(
            Request::parse(b"SELECT * FROM t").unwrap(),
            Request::Statement("SELECT * FROM t".to_string())
        );
    }

    #[test]
    fn unknown_dot_command_is_rejected() {
        assert!(Request::parse(b".bogus").is_err());
    }

    #[test]
    fn success_response_carries_discriminator_zero() {
        let encoded = Response::Success("ok".into()).encode();
        assert_eq!(encoded[0], ResponseKind::Success.discriminator());
    }
}
