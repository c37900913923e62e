//! File extension helpers used to classify requests and label responses.

use mime::Mime;

/// Extensions that are served as raw static resources.
const STATIC_EXTENSIONS: [&str; 9] = ["ico", "css", "gif", "jpg", "jpeg", "png", "js", "xml", "ttf"];

/// Returns the extension of the last path element, without the dot.
pub fn extension(resource: &str) -> Option<&str> {
    let name = resource.rsplit('/').next().unwrap_or(resource);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Whether `resource` names a static file (stylesheet, script, image, font).
pub fn is_static_resource(resource: &str) -> bool {
    extension(resource).is_some_and(|ext| STATIC_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// MIME type for a file path, falling back to `application/octet-stream`.
pub fn mime_for_path(path: &str) -> Mime {
    extension(path).map_or(mime::APPLICATION_OCTET_STREAM, mime_for_extension)
}

pub fn mime_for_extension(extension: &str) -> Mime {
    match extension.to_ascii_lowercase().as_str() {
        "json" => mime::APPLICATION_JSON,
        "css" => mime::TEXT_CSS,
        "gif" => mime::IMAGE_GIF,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "ico" | "png" => mime::IMAGE_PNG,
        "htm" | "html" | "xhtml" | "dhtml" => mime::TEXT_HTML,
        "js" => mime::TEXT_JAVASCRIPT,
        "xml" => mime::TEXT_XML,
        "svg" => mime::IMAGE_SVG,
        "txt" => mime::TEXT_PLAIN,
        "zip" | "rar" => "application/x-zip-compressed".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_static() {
        assert!(is_static_resource("/assets/site.css"));
        assert!(is_static_resource("logo.PNG"));
        assert!(!is_static_resource("/index.html"));
        assert!(!is_static_resource("/api/users"));
        assert!(!is_static_resource("/.css"));
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_for_path("/a/b/index.html"), mime::TEXT_HTML);
        assert_eq!(mime_for_path("app.js"), mime::TEXT_JAVASCRIPT);
        assert_eq!(mime_for_path("archive.zip").essence_str(), "application/x-zip-compressed");
        assert_eq!(mime_for_path("/no-extension"), mime::APPLICATION_OCTET_STREAM);
    }
}
