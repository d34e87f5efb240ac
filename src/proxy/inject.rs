//! Live-reload client injection.
//!
//! # Responsibilities
//! - Serve the browser-side reload client
//! - Decide which upstream responses are eligible for injection
//! - Insert the client `<script>` tag into HTML documents

use axum::http::{header, HeaderMap};

/// Path the reload client script is served from.
pub const CLIENT_PATH: &str = "/__devsync/client.js";

/// Path of the WebSocket control channel.
pub const WS_PATH: &str = "/__devsync/ws";

/// Browser-side client: connects to the control channel and reloads the page
/// on every `reload` message. Reconnects after the proxy restarts.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  var scheme = location.protocol === "https:" ? "wss://" : "ws://";
  var url = scheme + location.host + "/__devsync/ws";
  function connect() {
    var socket = new WebSocket(url);
    socket.onmessage = function (event) {
      try {
        var message = JSON.parse(event.data);
        if (message.type === "reload") {
          location.reload();
        }
      } catch (_) {}
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }
  connect();
})();
"#;

/// Tag inserted into HTML responses.
pub fn script_tag() -> String {
    format!(r#"<script src="{CLIENT_PATH}"></script>"#)
}

/// True when the response is uncompressed HTML.
pub fn is_injectable(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);

    let encoded = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);

    is_html && !encoded
}

/// Insert the client tag before the last `</body>`, else before the last
/// `</html>`, else at the end of the document.
pub fn inject_script(html: &[u8]) -> Vec<u8> {
    let tag = script_tag();
    let at = rfind_ignore_case(html, b"</body>")
        .or_else(|| rfind_ignore_case(html, b"</html>"))
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + tag.len());
    out.extend_from_slice(&html[..at]);
    out.extend_from_slice(tag.as_bytes());
    out.extend_from_slice(&html[at..]);
    out
}

fn rfind_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn inject_str(html: &str) -> String {
        String::from_utf8(inject_script(html.as_bytes())).unwrap()
    }

    #[test]
    fn test_injects_before_closing_body() {
        let out = inject_str("<html><body><p>hi</p></body></html>");
        assert_eq!(
            out,
            "<html><body><p>hi</p><script src=\"/__devsync/client.js\"></script></body></html>"
        );
    }

    #[test]
    fn test_uses_last_body_tag_case_insensitive() {
        let out = inject_str("<BODY><pre>&lt;/body&gt; </body></pre></BODY>");
        assert!(out.ends_with("<script src=\"/__devsync/client.js\"></script></BODY>"));
        assert!(out.contains("</body></pre>"));
    }

    #[test]
    fn test_falls_back_to_html_then_append() {
        assert_eq!(
            inject_str("<html>x</html>"),
            "<html>x<script src=\"/__devsync/client.js\"></script></html>"
        );
        assert_eq!(
            inject_str("fragment"),
            "fragment<script src=\"/__devsync/client.js\"></script>"
        );
    }

    #[test]
    fn test_only_plain_html_is_injectable() {
        let mut headers = HeaderMap::new();
        assert!(!is_injectable(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        assert!(is_injectable(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_injectable(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity"));
        assert!(is_injectable(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_injectable(&headers));
    }

    #[test]
    fn test_client_script_targets_control_channel() {
        assert!(CLIENT_SCRIPT.contains(WS_PATH));
    }
}
