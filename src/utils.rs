//! Utility functions for identifiers, tags and hashing

use bech32::Bech32m;
use uuid7::uuid7;

use super::timestamp::TimeStamp;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human readable document id: title plus the local submission time.
pub fn document_tag(title: &str, submitted: &TimeStamp) -> String {
    format!("{}-{}", title.trim(), submitted.format_local())
}

pub fn fingerprint(bytes: &[u8]) -> String {
    sha256::digest(bytes)
}

// short random suffix for stored blob names
pub fn unique_suffix() -> String {
    hex::encode(&uuid7().as_bytes()[10..])
}
