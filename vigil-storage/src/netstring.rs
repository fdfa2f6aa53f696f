//! Netstring framing for snapshot records.
//!
//! Each record is written as `<decimal length>:<bytes>,`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum record size (16 MB).
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Longest accepted length prefix.
const MAX_LENGTH_DIGITS: usize = 10;

/// Writes one framed record.
pub async fn write_netstring<W: AsyncWrite + Unpin>(io: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record too large: {} bytes", data.len()),
        ));
    }

    io.write_all(data.len().to_string().as_bytes()).await?;
    io.write_all(b":").await?;
    io.write_all(data).await?;
    io.write_all(b",").await
}

/// Reads one framed record. Returns `None` at a clean end of stream.
pub async fn read_netstring<R: AsyncRead + Unpin>(io: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut digits = Vec::with_capacity(MAX_LENGTH_DIGITS);
    loop {
        let mut byte = [0u8; 1];
        if io.read(&mut byte).await? == 0 {
            if digits.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside length prefix",
            ));
        }

        match byte[0] {
            b':' if !digits.is_empty() => break,
            b'0'..=b'9' if digits.len() < MAX_LENGTH_DIGITS => digits.push(byte[0]),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid netstring length byte: 0x{other:02x}"),
                ));
            }
        }
    }

    // digits are ASCII 0-9 only
    let len: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid netstring length"))?;
    if len > MAX_RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record too large: {len} bytes"),
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;

    let mut trailer = [0u8; 1];
    io.read_exact(&mut trailer).await?;
    if trailer[0] != b',' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "netstring missing trailing ','",
        ));
    }

    Ok(Some(buf))
}
