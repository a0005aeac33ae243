// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The JaCoCo TCP remote-control protocol.
//!
//! A client opens a connection, sends a header block followed by a dump command, and reads blocks
//! until the agent acknowledges the command. Everything the agent sends before the
//! acknowledgement is a valid `.exec` file.

use super::CoverageAgent;
use crate::errors::CaptureError;
use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        OnceLock,
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// Block type of the header that starts every stream.
pub const BLOCK_HEADER: u8 = 0x01;

/// Block type of session info.
pub const BLOCK_SESSION_INFO: u8 = 0x10;

/// Block type of execution data for one class.
pub const BLOCK_EXECUTION_DATA: u8 = 0x11;

/// Block type acknowledging a command.
pub const BLOCK_CMD_OK: u8 = 0x20;

/// Block type of a dump command.
pub const BLOCK_CMD_DUMP: u8 = 0x40;

/// The magic number following a header block.
pub const MAGIC_NUMBER: u16 = 0xC0C0;

/// The only supported format version.
pub const FORMAT_VERSION: u16 = 0x1007;

/// A [`CoverageAgent`] speaking the JaCoCo remote-control protocol over TCP.
#[derive(Clone, Debug)]
pub struct JacocoAgent {
    address: String,
    timeout: Duration,
    resolved: OnceLock<Vec<SocketAddr>>,
}

impl JacocoAgent {
    /// Creates a new agent client for `address` (in `host:port` form).
    ///
    /// `timeout` bounds one whole exchange: resolving the address, connecting, sending the
    /// command, and reading the full response. The address is resolved by the first exchange
    /// that needs it and reused afterwards.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            resolved: OnceLock::new(),
        }
    }

    /// The address of the agent.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn resolve(&self, deadline: Instant) -> Result<Vec<SocketAddr>, CaptureError> {
        if let Some(addrs) = self.resolved.get() {
            return Ok(addrs.clone());
        }
        let addrs = match self.address.parse::<SocketAddr>() {
            Ok(addr) => vec![addr],
            Err(_) => self.lookup(deadline)?,
        };
        Ok(self.resolved.get_or_init(|| addrs).clone())
    }

    /// Looks up a host name. The system resolver cannot be given a timeout, so the lookup runs
    /// on its own thread and is abandoned once the deadline passes.
    fn lookup(&self, deadline: Instant) -> Result<Vec<SocketAddr>, CaptureError> {
        let resolve_error = |error| CaptureError::Resolve {
            address: self.address.clone(),
            error,
        };

        let remaining = self.remaining(deadline)?;
        let (sender, receiver) = mpsc::channel();
        let address = self.address.clone();
        thread::Builder::new()
            .name("testcov-resolve".to_owned())
            .spawn(move || {
                let result = address
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect::<Vec<_>>());
                // The receiver is gone if the deadline passed first.
                let _ = sender.send(result);
            })
            .map_err(resolve_error)?;

        match receiver.recv_timeout(remaining) {
            Ok(result) => result.map_err(resolve_error),
            Err(RecvTimeoutError::Timeout) => Err(self.timeout_error()),
            Err(RecvTimeoutError::Disconnected) => Err(resolve_error(io::Error::other(
                "resolver thread exited without a result",
            ))),
        }
    }

    fn connect(&self, deadline: Instant) -> Result<TcpStream, CaptureError> {
        let addrs = self.resolve(deadline)?;

        let mut last_error = None;
        for addr in addrs {
            let remaining = self.remaining(deadline)?;
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(error) if is_timeout(&error) => return Err(self.timeout_error()),
                Err(error) => {
                    debug!("failed to connect to coverage agent at {addr}: {error}");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) => Err(CaptureError::Connect {
                address: self.address.clone(),
                error,
            }),
            None => Err(CaptureError::Resolve {
                address: self.address.clone(),
                error: io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to no socket addresses",
                ),
            }),
        }
    }

    fn exchange(&self, stream: &mut TcpStream, deadline: Instant) -> Result<Vec<u8>, CaptureError> {
        stream
            .set_write_timeout(Some(self.remaining(deadline)?))
            .map_err(|error| self.io_error(error))?;
        stream
            .write_all(&dump_request(true, true))
            .and_then(|()| stream.flush())
            .map_err(|error| self.io_error(error))?;

        let mut response = Vec::new();
        let mut parser = ResponseParser::default();
        let mut chunk = [0u8; 8192];
        loop {
            stream
                .set_read_timeout(Some(self.remaining(deadline)?))
                .map_err(|error| self.io_error(error))?;
            let n = match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(CaptureError::PartialRead {
                        address: self.address.clone(),
                        bytes_read: response.len(),
                    });
                }
                Ok(n) => n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(self.io_error(error)),
            };
            response.extend_from_slice(&chunk[..n]);

            let end = parser
                .advance(&response)
                .map_err(|reason| CaptureError::MalformedResponse {
                    address: self.address.clone(),
                    reason,
                })?;
            if let Some(end) = end {
                response.truncate(end);
                return Ok(response);
            }
        }
    }

    fn remaining(&self, deadline: Instant) -> Result<Duration, CaptureError> {
        deadline
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
            .ok_or_else(|| self.timeout_error())
    }

    fn timeout_error(&self) -> CaptureError {
        CaptureError::Timeout {
            address: self.address.clone(),
            timeout: self.timeout,
        }
    }

    fn io_error(&self, error: io::Error) -> CaptureError {
        if is_timeout(&error) {
            self.timeout_error()
        } else {
            CaptureError::Io {
                address: self.address.clone(),
                error,
            }
        }
    }
}

impl CoverageAgent for JacocoAgent {
    fn name(&self) -> &'static str {
        "jacoco"
    }

    fn dump_and_reset(&self) -> Result<Vec<u8>, CaptureError> {
        let deadline = Instant::now() + self.timeout;
        let mut stream = self.connect(deadline)?;
        let response = self.exchange(&mut stream, deadline)?;
        debug!(
            "received {} bytes of execution data from {}",
            response.len(),
            self.address
        );
        Ok(response)
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// The bytes of a header followed by a dump command.
pub fn dump_request(dump: bool, reset: bool) -> [u8; 8] {
    let [magic_hi, magic_lo] = MAGIC_NUMBER.to_be_bytes();
    let [version_hi, version_lo] = FORMAT_VERSION.to_be_bytes();
    [
        BLOCK_HEADER,
        magic_hi,
        magic_lo,
        version_hi,
        version_lo,
        BLOCK_CMD_DUMP,
        u8::from(dump),
        u8::from(reset),
    ]
}

/// Incrementally validates a response stream.
///
/// Only whole blocks are consumed; a block split across reads is parsed again once more bytes
/// arrive.
#[derive(Debug, Default)]
struct ResponseParser {
    pos: usize,
    saw_header: bool,
}

impl ResponseParser {
    /// Consumes as many whole blocks of `buf` as possible.
    ///
    /// Returns the offset of the command-OK block once it has been seen.
    fn advance(&mut self, buf: &[u8]) -> Result<Option<usize>, String> {
        loop {
            let mut reader = BlockReader {
                buf,
                pos: self.pos,
            };
            match self.block(&mut reader) {
                Ok(Block::Data) => self.pos = reader.pos,
                Ok(Block::CmdOk) => return Ok(Some(self.pos)),
                Err(Short::Incomplete) => return Ok(None),
                Err(Short::Malformed(reason)) => return Err(reason),
            }
        }
    }

    fn block(&mut self, reader: &mut BlockReader<'_>) -> Result<Block, Short> {
        let block_type = reader.u8()?;
        if !self.saw_header && block_type != BLOCK_HEADER {
            return Err(Short::Malformed(format!(
                "expected header block, found block type {block_type:#04x}"
            )));
        }

        match block_type {
            BLOCK_HEADER => {
                let magic = reader.u16()?;
                if magic != MAGIC_NUMBER {
                    return Err(Short::Malformed(format!("invalid magic number {magic:#06x}")));
                }
                let version = reader.u16()?;
                if version != FORMAT_VERSION {
                    return Err(Short::Malformed(format!(
                        "unsupported format version {version:#06x} (expected {FORMAT_VERSION:#06x})"
                    )));
                }
                self.saw_header = true;
                Ok(Block::Data)
            }
            BLOCK_SESSION_INFO => {
                reader.utf()?;
                reader.take(8)?;
                reader.take(8)?;
                Ok(Block::Data)
            }
            BLOCK_EXECUTION_DATA => {
                reader.take(8)?;
                reader.utf()?;
                reader.bool_array()?;
                Ok(Block::Data)
            }
            BLOCK_CMD_OK => Ok(Block::CmdOk),
            other => Err(Short::Malformed(format!("unknown block type {other:#04x}"))),
        }
    }
}

enum Block {
    Data,
    CmdOk,
}

enum Short {
    Incomplete,
    Malformed(String),
}

struct BlockReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Short> {
        let end = self.pos.checked_add(n).ok_or(Short::Incomplete)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Short::Incomplete)?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, Short> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Short> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// A length-prefixed modified UTF-8 string. Contents are not validated.
    fn utf(&mut self) -> Result<(), Short> {
        let len = self.u16()?;
        self.take(usize::from(len))?;
        Ok(())
    }

    /// A variable-length integer: 7-bit groups, least significant first, with the high bit set
    /// on every byte but the last.
    fn var_int(&mut self) -> Result<u32, Short> {
        let mut value = 0u32;
        for shift in (0..32).step_by(7) {
            let byte = self.u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Short::Malformed("variable-length integer is too long".to_owned()))
    }

    /// A boolean array: its length as a var-int, followed by the values packed eight per byte.
    fn bool_array(&mut self) -> Result<(), Short> {
        let len = self.var_int()? as usize;
        self.take(len.div_ceil(8))?;
        Ok(())
    }
}
