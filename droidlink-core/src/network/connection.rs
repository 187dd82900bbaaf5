use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::DroidlinkError;

/// A duplex byte stream to the device.
///
/// Always closed as a pair: the write side signals end-of-stream first,
/// then both halves are dropped.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed: {e}");
        }
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }

    /// Half-close the write side, then drop the socket.
    pub async fn close(mut self) -> Result<(), DroidlinkError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Read until `buf` is full or the stream ends.
///
/// Returns the number of bytes read; anything short of `buf.len()` means
/// the peer closed the stream.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_full_across_chunks() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"ab")
            .read(b"cd")
            .build();
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[tokio::test]
    async fn read_full_reports_short_read() {
        let mut reader = tokio_test::io::Builder::new().read(b"ab").build();
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn close_signals_end_of_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { Connection::connect(addr).await.unwrap() });
        let (mut peer, _) = listener.accept().await.unwrap();
        let conn = client.await.unwrap();

        conn.close().await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }
}
