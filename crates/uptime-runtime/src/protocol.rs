//! Network side of a probe: the status query and the legacy latency ping.
//!
//! Neither operation returns an error. Every failure (refused connection,
//! timeout, truncated or malformed response) becomes
//! [`ProbeResult::Offline`] or [`PING_UNKNOWN`].

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use uptime_core::codec::{
    decode_status_response, handshake_packet, status_request_packet, VarIntAccumulator,
    LEGACY_PING,
};
use uptime_core::error::{MonitorError, Result};
use uptime_core::models::{ProbeResult, ServerStatus, Target, PING_UNKNOWN};
use uptime_core::settings::MonitorSettings;
use uptime_core::status::parse_status_json;

/// Largest response body accepted (the protocol's 3-byte varint limit).
pub const MAX_RESPONSE_LEN: usize = 2_097_151;

/// Something that can probe a target once.
///
/// [`ProtocolClient`] is the real implementation; schedulers are generic over
/// this trait so they can be driven by scripted results.
pub trait StatusProbe: Send + Sync + 'static {
    fn probe(&self, target: &Target) -> impl Future<Output = ProbeResult> + Send;
}

// ── ProtocolClient ────────────────────────────────────────────────────────────

/// Status-protocol client with per-operation timeouts.
#[derive(Debug, Clone)]
pub struct ProtocolClient {
    status_timeout: Duration,
    ping_timeout: Duration,
    protocol_version: i32,
}

impl ProtocolClient {
    pub fn new(status_timeout: Duration, ping_timeout: Duration, protocol_version: i32) -> Self {
        Self {
            status_timeout,
            ping_timeout,
            protocol_version,
        }
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.status_timeout_secs),
            Duration::from_secs(settings.ping_timeout_secs),
            settings.protocol_version,
        )
    }

    /// Run the handshake and status request against `host:port`.
    ///
    /// The returned status carries [`PING_UNKNOWN`] as its latency; use
    /// [`ProtocolClient::measure_ping`] (or [`StatusProbe::probe`]) to fill it.
    pub async fn query_status(&self, host: &str, port: u16) -> ProbeResult {
        match timeout(self.status_timeout, self.fetch_status(host, port)).await {
            Ok(Ok(status)) => ProbeResult::Online(status),
            Ok(Err(e)) => {
                tracing::debug!(host, port, error = %e, "status query failed");
                ProbeResult::offline(e.to_string())
            }
            Err(_) => {
                tracing::debug!(host, port, "status query timed out");
                ProbeResult::offline(format!(
                    "timed out after {}s",
                    self.status_timeout.as_secs_f64()
                ))
            }
        }
    }

    /// Round-trip time in milliseconds of the legacy ping, measured from
    /// connect to the first byte received. [`PING_UNKNOWN`] on any failure.
    pub async fn measure_ping(&self, host: &str, port: u16) -> f64 {
        let started = Instant::now();
        match timeout(self.ping_timeout, legacy_ping(host, port)).await {
            Ok(Ok(())) => started.elapsed().as_secs_f64() * 1000.0,
            Ok(Err(e)) => {
                tracing::debug!(host, port, error = %e, "legacy ping failed");
                PING_UNKNOWN
            }
            Err(_) => {
                tracing::debug!(host, port, "legacy ping timed out");
                PING_UNKNOWN
            }
        }
    }

    async fn fetch_status(&self, host: &str, port: u16) -> Result<ServerStatus> {
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| MonitorError::Connect(format!("{host}:{port}: {e}")))?;

        let mut request = handshake_packet(self.protocol_version, host, port);
        request.extend(status_request_packet());
        stream.write_all(&request).await.map_err(io_to_protocol)?;
        stream.flush().await.map_err(io_to_protocol)?;

        let body = read_frame(&mut stream).await?;
        let json = decode_status_response(&body)?;
        parse_status_json(&json)
    }
}

impl StatusProbe for ProtocolClient {
    /// Status query followed, when online, by the latency ping.
    async fn probe(&self, target: &Target) -> ProbeResult {
        let mut result = self.query_status(&target.host, target.port).await;
        if let ProbeResult::Online(status) = &mut result {
            status.ping_millis = self.measure_ping(&target.host, target.port).await;
        }
        result
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Read one length-prefixed frame, consuming the length varint byte by byte.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut acc = VarIntAccumulator::new();
    let len = loop {
        let byte = reader.read_u8().await.map_err(io_to_protocol)?;
        if let Some(value) = acc.push(byte)? {
            break value;
        }
    };

    let len = usize::try_from(len)
        .map_err(|_| MonitorError::Protocol(format!("negative packet length: {len}")))?;
    if len > MAX_RESPONSE_LEN {
        return Err(MonitorError::Protocol(format!("packet too large: {len} bytes")));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(io_to_protocol)?;
    Ok(body)
}

async fn legacy_ping(host: &str, port: u16) -> Result<()> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| MonitorError::Connect(format!("{host}:{port}: {e}")))?;
    stream.write_all(&LEGACY_PING).await.map_err(io_to_protocol)?;

    let mut first = [0u8; 1];
    let n = stream.read(&mut first).await.map_err(io_to_protocol)?;
    if n == 0 {
        return Err(MonitorError::Protocol("connection closed before reply".into()));
    }
    Ok(())
}

fn io_to_protocol(e: std::io::Error) -> MonitorError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        MonitorError::Protocol("response truncated".into())
    } else {
        MonitorError::Protocol(e.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
