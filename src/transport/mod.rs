//! Transport seam.
//!
//! A session runs over any established byte stream: a `TcpStream` after the
//! handshake, or `tokio::io::duplex` in tests. The stream is split so the
//! reader and writer tasks can each own one half.

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected, full-duplex byte stream.
pub trait ByteTransport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteTransport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Split a transport into boxed halves.
pub fn split<T: ByteTransport>(transport: T) -> (BoxedReader, BoxedWriter) {
    let (reader, writer) = tokio::io::split(transport);
    (Box::new(reader), Box::new(writer))
}
