//! Content types by file extension.
//!
//! Deliberately small: packages are overwhelmingly JavaScript, JSON, CSS,
//! type definitions and the odd font or image. Anything unknown is served
//! as `text/plain` so browsers display rather than download it.

use std::path::Path;

const DEFAULT: &str = "text/plain";

/// Files that are always plain text regardless of extension: `.npmrc`,
/// `.gitignore`, `.eslintignore`, `yarn.lock`, `LICENSE`, `README`, etc.
fn is_text_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".lock") {
        return true;
    }
    if let Some(dotfile) = lower.strip_prefix('.')
        && (dotfile.ends_with("rc") || dotfile.ends_with("ignore") || dotfile.starts_with("git"))
    {
        return true;
    }
    matches!(lower.as_str(), "authors" | "changes" | "license" | "makefile" | "patents" | "readme")
}

/// Look up the content type for a path by its extension.
///
/// # Examples
///
/// ```
/// use pkgcdn_archive::content_type;
///
/// assert_eq!(content_type("lib/index.js"), "application/javascript");
/// assert_eq!(content_type("LICENSE"), "text/plain");
/// ```
pub fn content_type(path: impl AsRef<Path>) -> &'static str {
    let path = path.as_ref();
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return DEFAULT;
    };
    if is_text_file(name) {
        return DEFAULT;
    }
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT;
    };
    match extension.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "jsx" => "text/jsx",
        // TypeScript sources collide with MPEG transport streams in most
        // mime databases; nobody wants `video/mp2t` for `index.d.ts`.
        "ts" | "mts" | "cts" | "tsx" | "flow" => "text/plain",
        "css" => "text/css",
        "html" | "htm" => "text/html",
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "yaml" | "yml" => "text/yaml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        _ => DEFAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("index.js", "application/javascript")]
    #[case("esm/index.MJS", "application/javascript")]
    #[case("package.json", "application/json")]
    #[case("dist/react.min.js.map", "application/json")]
    #[case("index.d.ts", "text/plain")]
    #[case("styles/main.css", "text/css")]
    #[case("fonts/icons.woff2", "font/woff2")]
    #[case("logo.svg", "image/svg+xml")]
    #[case("README.md", "text/markdown")]
    #[case("LICENSE", "text/plain")]
    #[case("Makefile", "text/plain")]
    #[case(".npmrc", "text/plain")]
    #[case(".eslintignore", "text/plain")]
    #[case("yarn.lock", "text/plain")]
    #[case("bin/cli", "text/plain")]
    #[case("data.unknownext", "text/plain")]
    #[case("", "text/plain")]
    fn test_content_type(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(content_type(path), expected);
    }
}
