use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ParseError;

const HTTP_SCHEMES: &[&str] = &["http://", "https://"];
const UNSUPPORTED_SCHEMES: &[&str] = &["s3://", "ftp://"];

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve a chunk's content to text.
///
/// - `file://<path>` and single-line strings naming an existing file are read
///   from disk
/// - `http://` and `https://` URLs are fetched
/// - other remote schemes are rejected
/// - anything else is treated as inline data
pub fn load_content(content: &str) -> Result<Cow<'_, str>, ParseError> {
    if let Some(path) = content.strip_prefix("file://") {
        return read(path).map(Cow::Owned);
    }
    if HTTP_SCHEMES.iter().any(|s| content.starts_with(s)) {
        return fetch(content.trim()).map(Cow::Owned);
    }
    if UNSUPPORTED_SCHEMES.iter().any(|s| content.starts_with(s)) {
        return Err(ParseError::UnsupportedSource(content.to_string()));
    }
    let single_line = !content.contains('\n');
    if single_line && !content.is_empty() && Path::new(content.trim()).is_file() {
        return read(content.trim()).map(Cow::Owned);
    }
    Ok(Cow::Borrowed(content))
}

fn read(path: &str) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_string(),
        source,
    })
}

fn fetch(url: &str) -> Result<String, ParseError> {
    let err = |reason: String| ParseError::Fetch {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| err(format!("failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| err(e.to_string()))?;
    let text = response.text().map_err(|e| err(e.to_string()))?;
    debug!(url, bytes = text.len(), "fetched chunk content");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve one HTTP response on a local port and return its base URL.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn inline_content_is_borrowed() {
        let loaded = load_content("a,b\n1,2").unwrap();
        assert!(matches!(loaded, Cow::Borrowed(_)));
    }

    #[test]
    fn reads_plain_and_file_url_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x,y\n1,2").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert_eq!(load_content(&path).unwrap(), "x,y\n1,2");
        assert_eq!(load_content(&format!("file://{path}")).unwrap(), "x,y\n1,2");
    }

    #[test]
    fn missing_file_url_is_a_read_error() {
        let err = load_content("file:///definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
    }

    #[test]
    fn http_content_is_fetched() {
        let base = serve_once("200 OK", "x,y\n1,2\n");
        assert_eq!(load_content(&format!("{base}/points.csv")).unwrap(), "x,y\n1,2\n");
    }

    #[test]
    fn http_error_status_is_a_fetch_error() {
        let base = serve_once("404 Not Found", "");
        let err = load_content(&format!("{base}/missing.csv")).unwrap_err();
        assert!(matches!(err, ParseError::Fetch { .. }), "{err}");
    }

    #[test]
    fn unreachable_url_is_a_fetch_error() {
        // Bind then drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let err = load_content(&format!("http://127.0.0.1:{port}/data.csv")).unwrap_err();
        assert!(matches!(err, ParseError::Fetch { .. }), "{err}");
    }

    #[test]
    fn other_remote_schemes_rejected() {
        assert!(matches!(
            load_content("s3://bucket/data.csv"),
            Err(ParseError::UnsupportedSource(_))
        ));
    }
}
