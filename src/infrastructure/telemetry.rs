//! Telemetry socket endpoint.
//!
//! A GPS/nav producer connects to a filesystem-path local socket and writes
//! newline-delimited ASCII records:
//!
//! - `L<lat*10000>,<lon*10000>` becomes a global `Location` pair
//! - `A<altitude>,<speed>,<heading>` becomes `Altitude`, `Speed` and `Heading`

use crate::domain::broadcast::{Broadcast, Outbox, Value};
use crate::domain::endpoint::Endpoint;
use anyhow::{Context, Result};
use interprocess::local_socket::{traits::ListenerExt, GenericFilePath, ListenerOptions, ToFsName};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const LOCATION_SCALE: f64 = 10_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum TelemetryError {
    #[error("Empty record")]
    Empty,
    #[error("Unknown record type '{0}'")]
    UnknownRecord(char),
    #[error("Record '{kind}' expects {expected} fields, got {found}")]
    FieldCount {
        kind: char,
        expected: usize,
        found: usize,
    },
    #[error("Bad number '{0}'")]
    BadNumber(String),
}

/// Reassembles lines split across reads
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, get back every line it completed (without terminators).
    /// Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn numbers(kind: char, body: &str, expected: usize) -> Result<Vec<f64>, TelemetryError> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != expected {
        return Err(TelemetryError::FieldCount {
            kind,
            expected,
            found: fields.len(),
        });
    }
    fields
        .into_iter()
        .map(|f| {
            let f = f.trim();
            f.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| TelemetryError::BadNumber(f.to_string()))
        })
        .collect()
}

/// Turn one record into the broadcasts it stands for
pub fn parse_record(line: &str) -> Result<Vec<Broadcast>, TelemetryError> {
    let line = line.trim();
    let mut chars = line.chars();
    let kind = chars.next().ok_or(TelemetryError::Empty)?;
    let body = chars.as_str();

    match kind {
        'L' => {
            let v = numbers(kind, body, 2)?;
            Ok(vec![Broadcast::global(
                "Location",
                Value::Pair(v[0] / LOCATION_SCALE, v[1] / LOCATION_SCALE),
            )])
        }
        'A' => {
            let v = numbers(kind, body, 3)?;
            Ok(vec![
                Broadcast::global("Altitude", v[0]),
                Broadcast::global("Speed", v[1]),
                Broadcast::global("Heading", v[2]),
            ])
        }
        other => Err(TelemetryError::UnknownRecord(other)),
    }
}

/// Read a connection until EOF, publishing every well-formed record
fn pump(mut reader: impl Read, outbox: &Outbox) -> std::io::Result<()> {
    let mut framer = LineFramer::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for line in framer.push(&chunk[..n]) {
            match parse_record(&line) {
                Ok(messages) => {
                    debug!(record = %line, "Telemetry record");
                    for message in messages {
                        outbox.push(message);
                    }
                }
                Err(e) => warn!(record = %line, error = %e, "Dropping telemetry record"),
            }
        }
    }
    if framer.pending() > 0 {
        debug!(bytes = framer.pending(), "Discarding unterminated telemetry tail");
    }
    Ok(())
}

pub struct TelemetryEndpoint {
    outbox: Arc<Outbox>,
    path: PathBuf,
}

impl TelemetryEndpoint {
    /// Bind the socket and serve connections on a background thread
    pub fn spawn(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Removing stale socket {}", path.display()))?;
        }

        let name = path.as_path().to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .with_context(|| format!("Binding telemetry socket {}", path.display()))?;
        info!(path = %path.display(), "Telemetry socket listening");

        let endpoint = Arc::new(Self {
            outbox: Arc::new(Outbox::new()),
            path,
        });
        let outbox = endpoint.outbox.clone();
        std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                for conn in listener.incoming() {
                    let conn = match conn {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Telemetry accept failed");
                            continue;
                        }
                    };
                    info!("Telemetry producer connected");
                    if let Err(e) = pump(conn, &outbox) {
                        error!(error = %e, "Telemetry connection error");
                    }
                    info!("Telemetry producer disconnected");
                }
            })?;

        Ok(endpoint)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Endpoint for TelemetryEndpoint {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn outbox(&self) -> Option<&Outbox> {
        Some(self.outbox.as_ref())
    }
}
