//! Byte transport to the gateway.
//!
//! The gateway is a USB serial stick, usually reached through a serial-to-TCP
//! bridge. Anything that implements `AsyncRead + AsyncWrite` can carry the
//! session; the stream is split so the worker loop owns the read half and the
//! dispatcher owns the write half.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::TransportError;

/// A bidirectional byte stream the engine can run on.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

/// Result of one bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// Nothing arrived within the read timeout.
    TimedOut,
    /// The peer closed the stream.
    Eof,
}

/// Read half, owned by the worker loop.
pub struct TransportReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    timeout: Duration,
}

impl TransportReader {
    /// Read whatever is available, waiting at most the read timeout.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        match tokio::time::timeout(self.timeout, self.inner.read(buf)).await {
            Err(_) => Ok(ReadOutcome::TimedOut),
            Ok(Ok(0)) => Ok(ReadOutcome::Eof),
            Ok(Ok(n)) => {
                trace!("read {} bytes", n);
                Ok(ReadOutcome::Data(n))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }
}

/// Write half, owned by the dispatcher behind its write lock.
pub struct TransportWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

impl TransportWriter {
    /// Write one complete frame and flush it.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        trace!("wrote {} bytes", frame.len());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await.map_err(TransportError::from)
    }
}

/// Split a stream into the engine's read and write halves.
pub fn split<T: Transport>(io: T, read_timeout: Duration) -> (TransportReader, TransportWriter) {
    let (reader, writer) = tokio::io::split(io);
    (
        TransportReader {
            inner: Box::new(reader),
            timeout: read_timeout,
        },
        TransportWriter {
            inner: Box::new(writer),
        },
    )
}

/// Open a TCP connection to a serial bridge.
pub async fn connect_tcp(addr: &str) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect(addr).await.map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    // Frames are small; send them immediately.
    stream.set_nodelay(true)?;
    debug!("connected to serial bridge at {}", addr);
    Ok(stream)
}

/// Open the gateway's USB serial port directly, 8N1 without flow control.
#[cfg(feature = "serial")]
pub fn connect_serial(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream, TransportError> {
    use tokio_serial::SerialPortBuilderExt;

    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|source| TransportError::Serial {
            path: path.to_string(),
            source,
        })?;
    debug!("opened serial port {} at {} baud", path, baud_rate);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (local, mut remote) = tokio::io::duplex(256);
        let (mut reader, mut writer) = split(local, Duration::from_millis(50));

        writer.write_frame(b"<methodCall/>").await.unwrap();
        let mut buf = [0u8; 32];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<methodCall/>");

        remote.write_all(b"abc").await.unwrap();
        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Data(3));
    }

    #[tokio::test]
    async fn test_read_timeout_and_eof() {
        let (local, remote) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(local, Duration::from_millis(10));
        let mut buf = [0u8; 8];

        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::TimedOut);
        drop(remote);
        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Eof);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let err = connect_tcp("127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[cfg(feature = "serial")]
    #[tokio::test]
    async fn test_missing_serial_port() {
        let err = connect_serial("/dev/selve-does-not-exist", selve_protocol::BAUD_RATE).unwrap_err();
        assert!(matches!(err, TransportError::Serial { ref path, .. } if path == "/dev/selve-does-not-exist"));
    }
}
