//! The underlying byte pipe between two parties.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A connected transport to one other party. Plain TCP in deployments;
/// Unix sockets and in-memory pipes serve local setups and tests.
pub enum Bearer {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Pipe(DuplexStream),
}

impl Bearer {
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> tokio::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::Tcp(stream))
    }

    pub async fn accept_tcp(listener: &TcpListener) -> tokio::io::Result<(Self, SocketAddr)> {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((Self::Tcp(stream), addr))
    }

    #[cfg(unix)]
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> tokio::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::Unix(stream))
    }

    #[cfg(unix)]
    pub async fn accept_unix(listener: &UnixListener) -> tokio::io::Result<Self> {
        let (stream, _) = listener.accept().await?;
        Ok(Self::Unix(stream))
    }

    /// A pair of connected in-memory bearers.
    pub fn pipe() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(1 << 20);
        (Self::Pipe(a), Self::Pipe(b))
    }
}

impl AsyncRead for Bearer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<tokio::io::Result<()>> {
        match self.get_mut() {
            Bearer::Tcp(x) => Pin::new(x).poll_read(cx, buf),
            #[cfg(unix)]
            Bearer::Unix(x) => Pin::new(x).poll_read(cx, buf),
            Bearer::Pipe(x) => Pin::new(x).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Bearer {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<tokio::io::Result<usize>> {
        match self.get_mut() {
            Bearer::Tcp(x) => Pin::new(x).poll_write(cx, buf),
            #[cfg(unix)]
            Bearer::Unix(x) => Pin::new(x).poll_write(cx, buf),
            Bearer::Pipe(x) => Pin::new(x).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<tokio::io::Result<()>> {
        match self.get_mut() {
            Bearer::Tcp(x) => Pin::new(x).poll_flush(cx),
            #[cfg(unix)]
            Bearer::Unix(x) => Pin::new(x).poll_flush(cx),
            Bearer::Pipe(x) => Pin::new(x).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<tokio::io::Result<()>> {
        match self.get_mut() {
            Bearer::Tcp(x) => Pin::new(x).poll_shutdown(cx),
            #[cfg(unix)]
            Bearer::Unix(x) => Pin::new(x).poll_shutdown(cx),
            Bearer::Pipe(x) => Pin::new(x).poll_shutdown(cx),
        }
    }
}
