use bytes::Bytes;

/// One field of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    /// Disposition type, usually `form-data`.
    pub content_disposition: String,
    pub content_type: String,
    pub name: String,
    pub filename: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    #[inline]
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The field value as text, for parts that are not file uploads.
    pub fn text(&self) -> Option<String> {
        if self.is_file() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.data).into_owned())
    }
}
