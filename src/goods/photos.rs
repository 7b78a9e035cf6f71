use std::path::Path;

use rand::{distributions::Alphanumeric, Rng};

/// Source of candidate blob names for uploaded photos.
pub trait PhotoNames: Send + Sync {
    /// A fresh candidate ending in `.{ext}`. Uniqueness is checked by the caller.
    fn candidate(&self, ext: &str) -> String;
}

/// Fixed-length random alphanumeric stem plus the uploaded extension.
#[derive(Debug, Clone)]
pub struct RandomPhotoNames {
    len: usize,
}

impl RandomPhotoNames {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }
}

impl PhotoNames for RandomPhotoNames {
    fn candidate(&self, ext: &str) -> String {
        let stem: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect();
        format!("{stem}.{ext}")
    }
}

const MAX_EXT_LEN: usize = 10;

/// Extension for a stored photo: the uploaded file's own extension when it is
/// sane, otherwise one derived from the MIME type, otherwise `bin`.
pub fn photo_extension(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= MAX_EXT_LEN)
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    from_name
        .or_else(|| ext_from_mime(content_type).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Content type to serve a stored photo with.
pub fn mime_from_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
