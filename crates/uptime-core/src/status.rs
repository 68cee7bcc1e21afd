//! Decoding of the JSON document carried by a status response.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::error::{MonitorError, Result};
use crate::models::{ServerStatus, PING_UNKNOWN};
use crate::motd::Motd;

/// Prefix the server puts in front of the base64 icon.
pub const FAVICON_PREFIX: &str = "data:image/png;base64,";

/// Parse a status JSON document into a [`ServerStatus`].
///
/// Absent fields take neutral defaults; only a document that is not a JSON
/// object is an error. `ping_millis` starts as [`PING_UNKNOWN`] and is filled
/// in by the caller once the latency probe has run.
pub fn parse_status_json(json: &str) -> Result<ServerStatus> {
    let doc: Value = serde_json::from_str(json)?;
    if !doc.is_object() {
        return Err(MonitorError::Protocol(
            "status response is not a JSON object".into(),
        ));
    }

    let version = &doc["version"];
    let players = &doc["players"];

    let player_sample = players["sample"]
        .as_array()
        .map(|sample| {
            sample
                .iter()
                .filter_map(|p| p["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let motd = doc
        .get("description")
        .map(Motd::from_description)
        .unwrap_or_default();

    Ok(ServerStatus {
        version: version["name"].as_str().unwrap_or("Unknown").to_string(),
        protocol_number: version["protocol"]
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(-1),
        motd,
        players_online: players["online"].as_i64().unwrap_or(0),
        players_max: players["max"].as_i64().unwrap_or(0),
        player_sample,
        favicon: doc["favicon"].as_str().and_then(decode_favicon),
        ping_millis: PING_UNKNOWN,
    })
}

/// Strip the data-URI prefix and decode the icon; undecodable icons are
/// dropped rather than failing the probe.
pub fn decode_favicon(raw: &str) -> Option<Vec<u8>> {
    let encoded = raw.strip_prefix(FAVICON_PREFIX).unwrap_or(raw);
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable favicon");
            None
        }
    }
}
