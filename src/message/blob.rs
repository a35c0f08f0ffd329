//! BLOB vector elements: defBLOBVector, setBLOBVector, newBLOBVector
//!
//! Definitions carry no payload; only set and new do, base64-encoded.

use crate::message::common::{PropertyPerm, PropertyState};
use crate::timestamp::Timestamp;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Maximum base64 characters written per chunk when streaming a
/// setBLOBVector, so large images cooperate with the scheduler.
pub const BLOB_CHUNK_SIZE: usize = 1000;

/// One member of a BLOB vector definition, value-less
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defBLOB")]
pub struct DefBlob {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One member of a set or new BLOB vector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "oneBLOB")]
pub struct OneBlob {
    /// Member name
    #[serde(rename = "@name")]
    pub name: String,
    /// Uncompressed byte count
    #[serde(rename = "@size")]
    pub size: u64,
    /// Format hint, by convention a file suffix such as `.fits`
    #[serde(rename = "@format")]
    pub format: String,
    /// Payload, base64
    #[serde(rename = "$text", default)]
    pub data: String,
}

impl OneBlob {
    /// Encode raw bytes into a member, filling `size` from the payload
    /// length when the caller passes zero.
    pub fn from_bytes(name: &str, bytes: &[u8], size: u64, format: &str) -> Self {
        Self {
            name: name.to_string(),
            size: if size == 0 { bytes.len() as u64 } else { size },
            format: format.to_string(),
            data: BASE64.encode(bytes),
        }
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> crate::error::Result<Vec<u8>> {
        BASE64
            .decode(self.data.trim().as_bytes())
            .map_err(|e| crate::error::Error::Parse(format!("invalid base64 in oneBLOB {}: {e}", self.name)))
    }
}

/// BLOB vector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "defBLOBVector")]
pub struct DefBlobVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// GUI label, name by default
    #[serde(rename = "@label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Group membership, blank by default
    #[serde(rename = "@group", skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Current state
    #[serde(rename = "@state")]
    pub state: PropertyState,
    /// Client controlability
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    /// Worst-case seconds to effect a change
    #[serde(rename = "@timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// BLOB members
    #[serde(rename = "defBLOB", default)]
    pub blobs: Vec<DefBlob>,
}

/// BLOB vector value update, device to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "setBLOBVector")]
pub struct SetBlobVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Current state
    #[serde(rename = "@state")]
    pub state: PropertyState,
    /// Worst-case seconds to effect a change
    #[serde(rename = "@timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Moment these data were valid
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Commentary
    #[serde(rename = "@message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// BLOB members
    #[serde(rename = "oneBLOB", default)]
    pub blobs: Vec<OneBlob>,
}

impl SetBlobVector {
    /// Render the element as wire pieces with each payload split into
    /// chunks of at most [`BLOB_CHUNK_SIZE`] base64 characters, so the
    /// writer task can yield between socket writes.
    pub fn chunks(&self) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut start = String::new();
        // free-form attribute values go through the same XML escaping
        // quick-xml applies on the whole-element path
        write!(
            start,
            r#"<setBLOBVector device="{}" name="{}" state="{}""#,
            escape(&self.device),
            escape(&self.name),
            self.state
        )
        .expect("write to string");
        if let Some(timeout) = self.timeout {
            write!(start, r#" timeout="{}""#, timeout).expect("write to string");
        }
        if let Some(ts) = &self.timestamp {
            write!(start, r#" timestamp="{}""#, ts).expect("write to string");
        }
        if let Some(msg) = &self.message {
            write!(start, r#" message="{}""#, escape(msg)).expect("write to string");
        }
        start.push('>');
        pieces.push(start);
        for blob in &self.blobs {
            pieces.push(format!(
                r#"<oneBLOB name="{}" size="{}" format="{}">"#,
                escape(&blob.name),
                blob.size,
                escape(&blob.format)
            ));
            let bytes = blob.data.as_bytes();
            for chunk in bytes.chunks(BLOB_CHUNK_SIZE) {
                // base64 payloads are ASCII so the chunk boundary is safe
                pieces.push(String::from_utf8_lossy(chunk).into_owned());
            }
            pieces.push("</oneBLOB>".to_string());
        }
        pieces.push("</setBLOBVector>\n".to_string());
        pieces
    }
}

/// BLOB vector value submission, client to device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "newBLOBVector")]
pub struct NewBlobVector {
    /// Device name
    #[serde(rename = "@device")]
    pub device: String,
    /// Vector name
    #[serde(rename = "@name")]
    pub name: String,
    /// Moment of the submission
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// BLOB members
    #[serde(rename = "oneBLOB", default)]
    pub blobs: Vec<OneBlob>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::de::from_str;
    use quick_xml::se::to_string;

    #[test]
    fn test_def_carries_no_value() {
        let def = DefBlobVector {
            device: "Cam".to_string(),
            name: "image".to_string(),
            label: None,
            group: None,
            state: PropertyState::Ok,
            perm: PropertyPerm::Ro,
            timeout: None,
            timestamp: None,
            message: None,
            blobs: vec![DefBlob {
                name: "frame".to_string(),
                label: None,
            }],
        };
        let xml = to_string(&def).unwrap();
        let back: DefBlobVector = from_str(&xml).unwrap();
        assert_eq!(back.blobs.len(), 1);
        assert_eq!(back.blobs[0].name, "frame");
    }

    #[test]
    fn test_one_blob_encode_decode() {
        let payload = vec![0u8, 1, 2, 250, 251, 252];
        let blob = OneBlob::from_bytes("frame", &payload, 0, ".raw");
        assert_eq!(blob.size, payload.len() as u64);
        assert_eq!(blob.decode().unwrap(), payload);
    }

    #[test]
    fn test_chunked_output_reassembles() {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let set = SetBlobVector {
            device: "Cam".to_string(),
            name: "image".to_string(),
            state: PropertyState::Ok,
            timeout: None,
            timestamp: Some("2026-01-01T00:00:00".parse().unwrap()),
            message: None,
            blobs: vec![OneBlob::from_bytes("frame", &payload, 0, ".raw")],
        };
        let pieces = set.chunks();
        assert!(pieces.len() > 4, "payload should span several chunks");
        for piece in &pieces[2..pieces.len() - 2] {
            assert!(piece.len() <= BLOB_CHUNK_SIZE);
        }
        let whole: String = pieces.concat();
        let back: SetBlobVector = from_str(whole.trim_end()).unwrap();
        assert_eq!(back.blobs[0].decode().unwrap(), payload);
        assert_eq!(back.timestamp.unwrap().to_string(), "2026-01-01T00:00:00");
    }

    #[test]
    fn test_chunked_output_escapes_attribute_values() {
        let set = SetBlobVector {
            device: "Cam".to_string(),
            name: "image".to_string(),
            state: PropertyState::Ok,
            timeout: None,
            timestamp: None,
            message: Some(r#"exposure "done" & <saved>"#.to_string()),
            blobs: vec![OneBlob::from_bytes("frame", &[1, 2, 3], 0, "<.raw>")],
        };
        let whole: String = set.chunks().concat();
        assert!(!whole.contains(r#"message="exposure ""#));
        let back: SetBlobVector = from_str(whole.trim_end()).unwrap();
        assert_eq!(back.message.as_deref(), Some(r#"exposure "done" & <saved>"#));
        assert_eq!(back.blobs[0].format, "<.raw>");
        assert_eq!(back.blobs[0].decode().unwrap(), vec![1, 2, 3]);
    }
}
