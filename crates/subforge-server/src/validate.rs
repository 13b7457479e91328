//! Upload validation and filename generation.

use uuid::Uuid;

/// Accepted file extensions (without dot).
pub const ALLOWED_EXTENSIONS: &[&str] =
    &["mp4", "avi", "mov", "mkv", "webm", "mp3", "wav", "m4a"];

/// Accepted MIME types for the upload part. An absent content type is
/// tolerated; extension checking still applies.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/webm",
    "audio/mpeg",
    "audio/wav",
    "audio/mp4",
    "audio/x-m4a",
    "application/octet-stream",
];

/// Check an upload's name and declared MIME type against the allowlists.
pub fn validate_upload(file_name: &str, content_type: Option<&str>) -> Result<(), String> {
    let extension = extension_of(file_name);
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "unsupported file format '{extension}', accepted: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    if let Some(mime) = content_type {
        if !ALLOWED_MIME_TYPES.contains(&mime) {
            return Err(format!("unsupported MIME type: {mime}"));
        }
    }
    Ok(())
}

/// Lowercased extension without the dot.
fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Collision-free on-disk name: `<timestamp>_<uuid>_<clean-stem>.<ext>`.
///
/// The stem is stripped to `[A-Za-z0-9_-]` and truncated so hostile upload
/// names cannot traverse paths or blow filename limits.
#[must_use]
pub fn unique_filename(original: &str, timestamp_ms: i64) -> String {
    let path = std::path::Path::new(original);
    let stem: String = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned())
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();
    let extension = extension_of(original);
    format!("{timestamp_ms}_{}_{stem}.{extension}", Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_video_and_audio() {
        assert!(validate_upload("movie.mp4", Some("video/mp4")).is_ok());
        assert!(validate_upload("song.MP3", Some("audio/mpeg")).is_ok());
        assert!(validate_upload("clip.mkv", None).is_ok());
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = validate_upload("document.pdf", None).unwrap_err();
        assert!(err.contains("unsupported file format"));
    }

    #[test]
    fn rejects_unknown_mime() {
        let err = validate_upload("movie.mp4", Some("text/html")).unwrap_err();
        assert!(err.contains("MIME"));
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(validate_upload("noext", None).is_err());
    }

    #[test]
    fn unique_filename_sanitizes_stem() {
        let name = unique_filename("../../etc/passwd weird$name.mp4", 1700000000000);
        assert!(name.starts_with("1700000000000_"));
        assert!(name.ends_with(".mp4"));
        assert!(!name.contains('/'));
        assert!(!name.contains('$'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn unique_filenames_differ() {
        let a = unique_filename("a.wav", 1);
        let b = unique_filename("a.wav", 1);
        assert_ne!(a, b);
    }
}
