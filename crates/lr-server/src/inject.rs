//! Reload client injection into HTML responses.
//!
//! The client script is inserted immediately before the last closing
//! `</body>` tag (matched case-insensitively). Documents without one get the
//! script appended at the end. Injection works on raw bytes, so documents in
//! any ASCII-compatible encoding pass through untouched apart from the block.

/// Marker attribute identifying the injected script element.
#[cfg(test)]
pub(crate) const SCRIPT_MARKER: &str = "data-live-reload";

/// Client script. `__SOCKET_URL__` is replaced with a JavaScript expression.
const SCRIPT_TEMPLATE: &str = r#"<script data-live-reload>
(function () {
  var socket = new WebSocket(__SOCKET_URL__);
  socket.onopen = function () { console.log("[live reload] connected"); };
  socket.onmessage = function () {
    console.log("[live reload] reloading");
    window.location.reload();
  };
  socket.onclose = function () { console.log("[live reload] disconnected"); };
})();
</script>"#;

/// Closing body tag prefix (attributes and whitespace may follow).
const CLOSING_BODY: &[u8] = b"</body";

/// Rendered reload client for a given WebSocket endpoint.
#[derive(Clone, Debug)]
pub(crate) struct ReloadScript {
    block: String,
}

impl ReloadScript {
    /// Render the client script for the notifier at `host:ws_port`.
    ///
    /// Wildcard hosts (`0.0.0.0`, `::`) are not reachable addresses, so the
    /// script falls back to the hostname the page itself was loaded from.
    pub(crate) fn new(host: &str, ws_port: u16) -> Self {
        let block = SCRIPT_TEMPLATE.replace("__SOCKET_URL__", &socket_url_expr(host, ws_port));
        Self { block }
    }

    /// The complete `<script>` element.
    pub(crate) fn as_str(&self) -> &str {
        &self.block
    }

    /// Return `html` with the script block injected.
    pub(crate) fn inject(&self, html: &[u8]) -> Vec<u8> {
        let block = self.block.as_bytes();
        let mut out = Vec::with_capacity(html.len() + block.len());

        if let Some(pos) = find_closing_body(html) {
            out.extend_from_slice(&html[..pos]);
            out.extend_from_slice(block);
            out.extend_from_slice(&html[pos..]);
        } else {
            out.extend_from_slice(html);
            out.extend_from_slice(block);
        }

        out
    }
}

/// JavaScript expression evaluating to the notifier URL.
fn socket_url_expr(host: &str, ws_port: u16) -> String {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if matches!(host, "0.0.0.0" | "::" | "") {
        return format!(r#""ws://" + window.location.hostname + ":{ws_port}/""#);
    }

    let url = if host.contains(':') {
        format!("ws://[{host}]:{ws_port}/")
    } else {
        format!("ws://{host}:{ws_port}/")
    };
    // JSON string literals are valid JavaScript string literals.
    serde_json::Value::String(url).to_string()
}

/// Byte offset of the last closing body tag.
fn find_closing_body(html: &[u8]) -> Option<usize> {
    let last_start = html.len().checked_sub(CLOSING_BODY.len())?;

    (0..=last_start).rev().find(|&i| {
        html[i..i + CLOSING_BODY.len()].eq_ignore_ascii_case(CLOSING_BODY)
            && matches!(
                html.get(i + CLOSING_BODY.len()),
                Some(b'>' | b' ' | b'\t' | b'\n' | b'\r')
            )
    })
}
