use base64::prelude::{Engine as _, BASE64_STANDARD};
use futures::prelude::*;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use rand::{thread_rng, Rng};
use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};
use std::io;

const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Sends the upgrade request and reads the response. The stream is left
/// positioned exactly at the first frame byte: header lines are read one
/// byte at a time and any `Content-Length` body is consumed.
pub async fn handshake<T: AsyncRead + AsyncWrite + Unpin>(
    transport: &mut T,
    host: &str,
    port: u16,
    path: &str,
) -> Result<Response<Vec<u8>>, HandshakeError> {
    let mut nonce = [0u8; 16];
    thread_rng().fill(&mut nonce);
    let key = BASE64_STANDARD.encode(nonce);
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    transport.write_all(request.as_bytes()).await?;
    transport.flush().await?;

    let response = read_response(transport).await?;
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::UnexpectedStatus(response));
    }
    let expected = accept_challenge(key.as_bytes());
    match response.headers().get("sec-websocket-accept") {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(response),
        _ => Err(HandshakeError::AcceptMismatch),
    }
}

/// The value the server must place in `Sec-WebSocket-Accept`:
/// base64(SHA-1(key ++ GUID)).
pub fn accept_challenge(key: &[u8]) -> String {
    let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(key);
    ctx.update(WS_GUID);
    BASE64_STANDARD.encode(ctx.finish())
}

async fn read_response<T: AsyncRead + Unpin>(
    transport: &mut T,
) -> Result<Response<Vec<u8>>, HandshakeError> {
    let status_line = read_line(transport).await?;
    let (status, reason) = parse_status_line(&status_line)?;
    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(transport).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HandshakeError::BadHeaderLine(line.clone()))?;
        let name = HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())
            .map_err(|_| HandshakeError::BadHeaderLine(line.clone()))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| HandshakeError::BadHeaderLine(line.clone()))?;
        headers.append(name, value);
    }
    // A 101 response has no body, but an error response may; consuming it
    // keeps the transport usable and gives the caller the full reply.
    let body_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        transport.read_exact(&mut body).await?;
    }
    log::debug!("handshake response: {} {}", status.as_u16(), reason);
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

// Reads one byte at a time until a newline. The upgrade response is
// followed immediately by frame data on the same stream, so nothing may be
// read past the header terminator.
pub(crate) async fn read_line<T: AsyncRead + Unpin>(transport: &mut T) -> io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match transport.read(&mut byte).await? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            _ => match byte[0] {
                b'\n' => break,
                b => line.push(b),
            },
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| io::ErrorKind::InvalidData.into())
}

fn parse_status_line(line: &str) -> Result<(StatusCode, String), HandshakeError> {
    let bad = || HandshakeError::BadStatusLine(line.to_string());
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or_else(bad)?;
    if !version.starts_with("HTTP") {
        return Err(bad());
    }
    let code = parts.next().ok_or_else(bad)?;
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(bad)?;
    let reason = parts.next().unwrap_or("").to_string();
    Ok((status, reason))
}

#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed status line: {0:?}")]
    BadStatusLine(String),
    #[error("malformed header line: {0:?}")]
    BadHeaderLine(String),
    #[error("unexpected status {}", .0.status())]
    UnexpectedStatus(Response<Vec<u8>>),
    #[error("missing or mismatched Sec-WebSocket-Accept header")]
    AcceptMismatch,
}

#[cfg(test)]
mod tests {
    use super::{accept_challenge, parse_status_line, read_line, read_response, HandshakeError};
    use futures::executor::block_on;
    use futures::io::Cursor;
    use futures::prelude::*;
    use http::StatusCode;

    #[test]
    fn challenge_response() {
        assert_eq!(
            accept_challenge(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn status_line_parsing() {
        let (status, reason) = parse_status_line("HTTP/1.1 101 Switching Protocols").unwrap();
        assert_eq!(status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(reason, "Switching Protocols");
        let (status, reason) = parse_status_line("HTTP/1.0 200 OK").unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reason, "OK");
        assert!(parse_status_line("ICY 200 OK").is_err());
        assert!(parse_status_line("HTTP/1.1 banana nope").is_err());
    }

    #[test]
    fn line_reader_stops_at_newline() {
        block_on(async {
            let mut transport = Cursor::new(b"Upgrade: websocket\r\n\x81\x00".to_vec());
            let line = read_line(&mut transport).await.unwrap();
            assert_eq!(line, "Upgrade: websocket");
            // frame bytes after the terminator are still unread
            let mut rest = Vec::new();
            transport.read_to_end(&mut rest).await.unwrap();
            assert_eq!(rest, [0x81, 0x00]);
        })
    }

    #[test]
    fn line_reader_eof_is_fatal() {
        block_on(async {
            let mut transport = Cursor::new(b"no newline here".to_vec());
            assert!(read_line(&mut transport).await.is_err());
        })
    }

    #[test]
    fn response_parsing_lowercases_and_reads_body() {
        block_on(async {
            let raw = b"HTTP/1.1 400 Bad Request\r\n\
                Content-Length: 5\r\n\
                X-Custom-Header:  spaced  \r\n\
                \r\n\
                oops!\x81\x00";
            let mut transport = Cursor::new(raw.to_vec());
            let response = read_response(&mut transport).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(response.headers()["x-custom-header"], "spaced");
            assert_eq!(response.body(), b"oops!");
            let mut rest = Vec::new();
            transport.read_to_end(&mut rest).await.unwrap();
            assert_eq!(rest, [0x81, 0x00]);
        })
    }

    #[test]
    fn header_line_without_colon_is_rejected() {
        block_on(async {
            let raw = b"HTTP/1.1 101 Switching Protocols\r\nnot a header\r\n\r\n";
            let mut transport = Cursor::new(raw.to_vec());
            match read_response(&mut transport).await {
                Err(HandshakeError::BadHeaderLine(line)) => assert_eq!(line, "not a header"),
                other => panic!("expected bad header line, got {:?}", other.map(|_| ())),
            }
        })
    }
}
