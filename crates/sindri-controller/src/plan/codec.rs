/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Checksums and the applied-output encoding.
//!
//! Output is a gzip stream wrapping a JSON object that maps instruction
//! names to base64 encoded bytes.

use super::{PlanError, PlanOutput};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Decodes an applied or failed output blob. An empty blob is an empty map.
pub fn decode_output(bytes: &[u8]) -> Result<PlanOutput, PlanError> {
    if bytes.is_empty() {
        return Ok(PlanOutput::new());
    }

    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| PlanError::MalformedOutput(format!("gzip: {}", e)))?;

    let encoded: BTreeMap<String, String> = serde_json::from_slice(&json)
        .map_err(|e| PlanError::MalformedOutput(format!("json: {}", e)))?;

    encoded
        .into_iter()
        .map(|(name, value)| {
            STANDARD
                .decode(value.as_bytes())
                .map(|raw| (name.clone(), raw))
                .map_err(|e| PlanError::MalformedOutput(format!("base64 in {}: {}", name, e)))
        })
        .collect()
}

/// Encodes output the way the agent does.
pub fn encode_output(output: &PlanOutput) -> Result<Vec<u8>, PlanError> {
    let encoded: BTreeMap<&str, String> = output
        .iter()
        .map(|(name, raw)| (name.as_str(), STANDARD.encode(raw)))
        .collect();
    let json = serde_json::to_vec(&encoded)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map_err(|e| PlanError::MalformedOutput(format!("gzip: {}", e)))
}
