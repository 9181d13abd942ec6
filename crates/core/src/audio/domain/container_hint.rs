use std::path::Path;

/// What the caller knows about an uploaded file's container format.
///
/// Decoders probe the bytes themselves; the hint only helps them pick a
/// demuxer faster and produce better error messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerHint {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
}

impl ContainerHint {
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_lowercase();
        Self {
            extension: (!ext.is_empty()).then_some(ext),
            mime_type: None,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or_default()
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    /// File suffix (with leading dot) for spooling the bytes to disk.
    pub fn file_suffix(&self) -> String {
        match &self.extension {
            Some(ext) => format!(".{ext}"),
            None => String::new(),
        }
    }

    pub fn is_video(&self) -> bool {
        const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v"];
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("video/"))
            .unwrap_or(false)
            || self
                .extension
                .as_deref()
                .map(|e| VIDEO_EXTENSIONS.contains(&e))
                .unwrap_or(false)
    }
}
