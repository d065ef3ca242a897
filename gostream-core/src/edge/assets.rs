//! Embedded web client and the title rewrite applied to its pages

use std::sync::LazyLock;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use regex::{NoExpand, Regex};
use rust_embed::RustEmbed;
use tracing::error;

#[derive(RustEmbed)]
#[folder = "web/"]
pub struct Assets;

static TITLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"<title>(.*?)</title>").unwrap()
});

/// Page served for an HTML route.
///
/// `path` is normalized first, so `/./index.html` or `/hls//` still match.
#[must_use]
pub fn html_target(path: &str) -> Option<&'static str> {
    match normalize_path(path).as_str() {
        "/" | "/index.html" => Some("index.html"),
        "/flv/" | "/flv/index.html" => Some("flv/index.html"),
        "/hls/" | "/hls/index.html" => Some("hls/index.html"),
        _ => None,
    }
}

/// Resolve `.`, `..` and repeated slashes. A trailing slash is kept, since
/// it selects a directory index.
fn normalize_path(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut clean = format!("/{}", segments.join("/"));
    let directory = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if directory && !segments.is_empty() {
        clean.push('/');
    }
    clean
}

/// Replace the first `<title>` element with one carrying `title`.
///
/// The title is escaped and inserted literally, so no character in it can
/// change the surrounding markup.
#[must_use]
pub fn rewrite_title(html: &str, title: &str) -> String {
    let replacement = format!("<title>{}</title>", escape_html(title));
    TITLE_TAG
        .replace(html, NoExpand(&replacement))
        .into_owned()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_page(page: &str, title: &str) -> Response {
    let Some(content) = Assets::get(page) else {
        error!(page, "Embedded page missing");
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };
    let html = String::from_utf8_lossy(&content.data);
    Html(rewrite_title(&html, title)).into_response()
}

/// Everything that is not an HTML route or a proxied path.
pub fn static_asset(path: &str) -> Response {
    let relative = path.trim_start_matches('/');
    let lookup = if relative.is_empty() || relative.ends_with('/') {
        format!("{relative}index.html")
    } else {
        relative.to_string()
    };

    if let Some(content) = Assets::get(&lookup) {
        let mime = mime_guess::from_path(&lookup).first_or_octet_stream();
        let content_type = HeaderValue::from_str(mime.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        return ([(header::CONTENT_TYPE, content_type)], content.data.into_owned()).into_response();
    }

    // Directory without trailing slash.
    if Assets::get(&format!("{relative}/index.html")).is_some() {
        return Redirect::permanent(&format!("{path}/")).into_response();
    }

    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_targets() {
        assert_eq!(html_target("/"), Some("index.html"));
        assert_eq!(html_target("/index.html"), Some("index.html"));
        assert_eq!(html_target("/flv/"), Some("flv/index.html"));
        assert_eq!(html_target("/hls/index.html"), Some("hls/index.html"));
        assert_eq!(html_target("/hls"), None);
        assert_eq!(html_target("/assets/player.js"), None);
    }

    #[test]
    fn test_html_targets_after_normalization() {
        assert_eq!(html_target("/./index.html"), Some("index.html"));
        assert_eq!(html_target("//flv//"), Some("flv/index.html"));
        assert_eq!(html_target("/hls/../index.html"), Some("index.html"));
        assert_eq!(html_target("/flv/./"), Some("flv/index.html"));
        assert_eq!(html_target("/../../"), Some("index.html"));
        assert_eq!(html_target("/flv/../assets/player.js"), None);
    }

    #[test]
    fn test_normalize_keeps_trailing_slash() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/a/./b/../c/"), "/a/c/");
        assert_eq!(normalize_path("/a//b"), "/a/b");
        assert_eq!(normalize_path("/a/b/.."), "/a/");
    }

    #[test]
    fn test_rewrite_escapes_markup_characters() {
        let html = "<title>GoStream</title>";
        assert_eq!(rewrite_title(html, "Movie Night"), "<title>Movie Night</title>");
        assert_eq!(
            rewrite_title(html, "Tom & Jerry"),
            "<title>Tom &amp; Jerry</title>"
        );
        assert_eq!(
            rewrite_title(html, "\"Q&A\" night's <live>"),
            "<title>&quot;Q&amp;A&quot; night&#39;s &lt;live&gt;</title>"
        );
    }

    #[test]
    fn test_rewrite_replaces_only_first_title() {
        let html = "<head><title>Old</title></head><body><title>Keep</title></body>";
        assert_eq!(
            rewrite_title(html, "New"),
            "<head><title>New</title></head><body><title>Keep</title></body>"
        );
    }

    #[test]
    fn test_rewrite_treats_title_literally() {
        let html = "<title>GoStream</title>";
        assert_eq!(rewrite_title(html, "$1 ${0}"), "<title>$1 ${0}</title>");
        assert_eq!(
            rewrite_title(html, "</title><script>"),
            "<title>&lt;/title&gt;&lt;script&gt;</title>"
        );
    }

    #[test]
    fn test_embedded_pages_have_title_tag() {
        for page in ["index.html", "flv/index.html", "hls/index.html"] {
            let content = Assets::get(page).unwrap();
            assert!(TITLE_TAG.is_match(&String::from_utf8_lossy(&content.data)));
        }
    }
}
