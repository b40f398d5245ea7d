//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::catalog::{Submission, Upload};
use crate::index::Entry;

// ============================================
// ENTRY DTOs
// ============================================

/// Index listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryListResponse {
    pub total: usize,
    pub entries: Vec<Entry>,
    /// Revision the listing was read at; absent before the first entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// An uploaded file, base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDto {
    /// Original file name (its extension is kept)
    pub file_name: String,
    /// Base64-encoded file content
    pub data: String,
}

impl UploadDto {
    pub fn encode(file_name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Upload, String> {
        let bytes = general_purpose::STANDARD
            .decode(self.data.trim())
            .map_err(|e| format!("Invalid base64 data for '{}': {}", self.file_name, e))?;
        Ok(Upload::new(self.file_name.clone(), bytes))
    }
}

/// New entry submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<UploadDto>,
    #[serde(default)]
    pub audio: Option<UploadDto>,
}

impl SubmitRequest {
    /// Decode uploads into a catalog submission
    pub fn into_submission(self) -> Result<Submission, String> {
        Ok(Submission {
            id: self.id,
            name: self.name,
            image: self.image.as_ref().map(UploadDto::decode).transpose()?,
            audio: self.audio.as_ref().map(UploadDto::decode).transpose()?,
        })
    }
}

// ============================================
// MEDIA DTOs
// ============================================

/// Media lookup query
#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub path: String,
}

/// Media lookup response
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaResponse {
    pub path: String,
    /// Data URI; `null` when the file could not be fetched
    pub uri: Option<String>,
}

// ============================================
// SESSION DTOs
// ============================================

/// Selection change request
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub index: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "unhealthy"
    pub status: String,
    /// Remote store status: "ok" or the error
    pub store: String,
    /// Number of entries in the index, when readable
    #[serde(default)]
    pub entries: Option<usize>,
    /// Branch the catalog lives on
    pub branch: String,
    /// Open browse sessions
    pub sessions: usize,
    /// Cached media files
    pub media_cached: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_decodes_uploads() {
        let req: SubmitRequest = serde_json::from_str(
            r#"{"id":"0001","name":"Bulbasaur","image":{"file_name":"b.png","data":"cG5n"}}"#,
        )
        .unwrap();

        let submission = req.into_submission().unwrap();
        assert_eq!(submission.image.unwrap().bytes, b"png");
        assert!(submission.audio.is_none());
    }

    #[test]
    fn test_submit_request_rejects_bad_base64() {
        let req = SubmitRequest {
            id: "0001".into(),
            name: "Bulbasaur".into(),
            image: Some(UploadDto {
                file_name: "b.png".into(),
                data: "***".into(),
            }),
            audio: None,
        };
        let err = req.into_submission().unwrap_err();
        assert!(err.contains("b.png"));
    }

    #[test]
    fn test_upload_encode_matches_decode() {
        let dto = UploadDto::encode("cry.wav", b"RIFF");
        assert_eq!(dto.decode().unwrap().bytes, b"RIFF");
    }
}
