//! `Content-Length` framing used by LSP over stdio:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! <JSON body>
//! ```

use log::debug;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames announcing a larger body are dropped without reading it.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Read the next frame body.
///
/// Returns `Ok(None)` at end of stream. Header blocks without a usable
/// `Content-Length`, or announcing more than [`MAX_BODY_LEN`] bytes, are
/// skipped. Other headers (`Content-Type`) are ignored, and header bytes
/// that are not UTF-8 are read lossily.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let mut content_length: Option<usize> = None;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&line);
            let header = text.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok();
                }
            }
        }

        let Some(len) = content_length else {
            debug!("[read_message] header block without Content-Length, skipping");
            continue;
        };
        if len > MAX_BODY_LEN {
            debug!("[read_message] Content-Length {len} over limit, skipping");
            continue;
        }

        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        return Ok(Some(body));
    }
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}
