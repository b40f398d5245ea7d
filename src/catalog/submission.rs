//! Submission Validation
//!
//! Checks a new-entry form and derives the media paths it will write:
//!
//! ```text
//! pic/{id}_{name}.{image ext}
//! wav/{id}_{name}.{audio ext}   (only when audio was supplied)
//! ```

use crate::index::Entry;

/// Longest id the form accepts
pub const MAX_ID_LEN: usize = 4;

/// Extensions accepted by the image picker
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Extensions accepted by the audio picker
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "opus"];

/// An uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Original file name, used for its extension
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Text after the last `.`, as uploaded
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// A new-entry form as submitted
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub id: String,
    pub name: String,
    pub image: Option<Upload>,
    pub audio: Option<Upload>,
}

/// A validated submission with its derived entry
#[derive(Debug, Clone)]
pub struct SubmissionPlan {
    pub entry: Entry,
    pub image: Vec<u8>,
    pub audio: Option<Vec<u8>>,
}

impl SubmissionPlan {
    pub fn image_message(&self) -> String {
        format!("Add image for {}", self.entry.id)
    }

    pub fn audio_message(&self) -> String {
        format!("Add audio for {}", self.entry.id)
    }

    pub fn index_message(&self) -> String {
        format!("Add entry {}", self.entry.id)
    }
}

/// Validate the form fields (no duplicate check) and derive paths
///
/// Fails with a user-facing message.
pub fn validate(submission: Submission) -> Result<SubmissionPlan, String> {
    let id = submission.id.trim();
    let name = submission.name.trim();

    let image = match submission.image {
        Some(image) if !id.is_empty() && !name.is_empty() && !image.bytes.is_empty() => image,
        _ => return Err("Id, name and image are required".to_string()),
    };

    if id.chars().count() > MAX_ID_LEN {
        return Err(format!("Id must be at most {} characters", MAX_ID_LEN));
    }

    if has_separator(id) || has_separator(name) {
        return Err("Id and name must not contain path separators".to_string());
    }

    let img_ext = checked_extension(&image, IMAGE_EXTENSIONS, "Image")?;
    let img_path = format!("pic/{}_{}.{}", id, name, img_ext);

    let mut entry = Entry::new(id, name, img_path);

    let audio = match submission.audio.filter(|a| !a.bytes.is_empty()) {
        Some(audio) => {
            let audio_ext = checked_extension(&audio, AUDIO_EXTENSIONS, "Audio")?;
            entry = entry.audio(format!("wav/{}_{}.{}", id, name, audio_ext));
            Some(audio.bytes)
        }
        None => None,
    };

    Ok(SubmissionPlan {
        entry,
        image: image.bytes,
        audio,
    })
}

fn has_separator(value: &str) -> bool {
    value.contains('/') || value.contains('\\')
}

fn checked_extension<'a>(
    upload: &'a Upload,
    allowed: &[&str],
    kind: &str,
) -> Result<&'a str, String> {
    match upload.extension() {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)) => Ok(ext),
        _ => Err(format!(
            "{} file '{}' must be one of: {}",
            kind,
            upload.file_name,
            allowed.join(", ")
        )),
    }
}
