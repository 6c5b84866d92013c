use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use color_drain_core::{AgentRecord, LevelSnapshot, TileRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CODE_DOMAIN: &str = "drain";
const CODE_VERSION: &str = "v1";

/// Identifier prefix emitted before the encoded level payload.
pub(crate) const CODE_HEADER: &str = "drain:v1";
/// Delimiter used to separate the prefix, grid dimensions and payload.
const FIELD_DELIMITER: char = ':';

#[derive(Serialize, Deserialize)]
struct Payload {
    tiles: Vec<TileRecord>,
    agents: Vec<AgentRecord>,
}

/// Errors that can occur while converting level codes.
#[derive(Debug, Error)]
pub(crate) enum LevelTransferError {
    /// The provided string was empty or contained only whitespace.
    #[error("level code was empty")]
    EmptyPayload,
    /// The prefix segment was missing.
    #[error("level code is missing the prefix")]
    MissingPrefix,
    /// The version segment was missing.
    #[error("level code is missing the version")]
    MissingVersion,
    /// The grid dimensions were missing.
    #[error("level code is missing the grid dimensions")]
    MissingDimensions,
    /// The payload segment was missing.
    #[error("level code is missing the payload")]
    MissingPayload,
    /// The code used an unexpected prefix segment.
    #[error("level prefix '{0}' is not supported")]
    InvalidPrefix(String),
    /// The code used an unsupported version identifier.
    #[error("level code version '{0}' is not supported")]
    UnsupportedVersion(String),
    /// The grid dimensions could not be parsed.
    #[error("could not parse grid dimensions '{0}'")]
    InvalidDimensions(String),
    /// The snapshot declares dimensions a level code cannot carry.
    #[error("level dimensions {cols}x{rows} cannot be encoded")]
    UnencodableDimensions {
        /// Declared lane count.
        cols: i32,
        /// Declared row count.
        rows: i32,
    },
    /// The base64 payload could not be decoded.
    #[error("could not decode level payload: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    /// The payload could not be serialised or deserialised.
    #[error("could not convert level payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Encodes `snapshot` into a single-line level code.
pub(crate) fn encode(snapshot: &LevelSnapshot) -> Result<String, LevelTransferError> {
    if snapshot.cols <= 0 || snapshot.rows <= 0 {
        return Err(LevelTransferError::UnencodableDimensions {
            cols: snapshot.cols,
            rows: snapshot.rows,
        });
    }
    let payload = Payload {
        tiles: snapshot.tiles.clone(),
        agents: snapshot.agents.clone(),
    };
    let encoded = STANDARD_NO_PAD.encode(serde_json::to_vec(&payload)?);
    Ok(format!(
        "{CODE_HEADER}:{}x{}:{encoded}",
        snapshot.cols, snapshot.rows
    ))
}

/// Decodes a level snapshot from its level code.
pub(crate) fn decode(value: &str) -> Result<LevelSnapshot, LevelTransferError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LevelTransferError::EmptyPayload);
    }

    let mut parts = trimmed.split(FIELD_DELIMITER);
    let domain = parts.next().ok_or(LevelTransferError::MissingPrefix)?;
    let version = parts.next().ok_or(LevelTransferError::MissingVersion)?;
    let dimensions = parts.next().ok_or(LevelTransferError::MissingDimensions)?;
    let payload = parts.next().ok_or(LevelTransferError::MissingPayload)?;

    if domain != CODE_DOMAIN {
        return Err(LevelTransferError::InvalidPrefix(domain.to_owned()));
    }
    if version != CODE_VERSION {
        return Err(LevelTransferError::UnsupportedVersion(version.to_owned()));
    }

    let (cols, rows) = parse_dimensions(dimensions)?;
    let bytes = STANDARD_NO_PAD.decode(payload.as_bytes())?;
    let decoded: Payload = serde_json::from_slice(&bytes)?;

    Ok(LevelSnapshot {
        rows,
        cols,
        tiles: decoded.tiles,
        agents: decoded.agents,
    })
}

fn parse_dimensions(dimensions: &str) -> Result<(i32, i32), LevelTransferError> {
    let invalid = || LevelTransferError::InvalidDimensions(dimensions.to_owned());
    let (cols, rows) = dimensions.split_once(['x', 'X']).ok_or_else(invalid)?;

    let cols = cols.trim().parse::<i32>().map_err(|_| invalid())?;
    let rows = rows.trim().parse::<i32>().map_err(|_| invalid())?;

    if cols <= 0 || rows <= 0 {
        return Err(invalid());
    }

    Ok((cols, rows))
}
