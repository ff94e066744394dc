//! Stream handles produced by stream bindings.
//!
//! A converter opens an [`OpenedStream`]; the stream binder hands the user
//! function a [`ReadStream`] or [`WriteStream`] that shares the underlying
//! handle with the binding's completion, so the binding can flush and close it
//! after the function returns.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::marker::{
    EnumValue, IntoPropertyValue, MarkerEnum, PropertyField, PropertyKind, PropertyShape,
    PropertyValue,
};
use crate::types::TypeKey;

// =============================================================================
// FileAccess
// =============================================================================

/// Direction a stream is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileAccess {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Either direction; the parameter type decides.
    ReadWrite,
}

impl FileAccess {
    /// Returns the variant name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::ReadWrite => "ReadWrite",
        }
    }

    /// Returns `true` if reading is permitted.
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns `true` if writing is permitted.
    pub fn can_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Returns `true` if every direction in `required` is permitted.
    pub fn permits(&self, required: FileAccess) -> bool {
        (!required.can_read() || self.can_read()) && (!required.can_write() || self.can_write())
    }
}

impl fmt::Display for FileAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MarkerEnum for FileAccess {
    fn variant_name(&self) -> &'static str {
        self.as_str()
    }
}

impl PropertyField for FileAccess {
    fn shape() -> PropertyShape {
        PropertyShape::required(PropertyKind::Enum(TypeKey::of::<Self>()))
    }

    fn to_property(&self) -> Option<PropertyValue> {
        Some(PropertyValue::Enum(EnumValue::of(*self)))
    }
}

impl IntoPropertyValue for FileAccess {
    fn into_property_value(self) -> PropertyValue {
        PropertyValue::Enum(EnumValue::of(self))
    }
}

impl FileAccess {
    /// Parses a variant name read back from a property value.
    pub fn from_variant(variant: &str) -> Option<Self> {
        match variant {
            "Read" => Some(Self::Read),
            "Write" => Some(Self::Write),
            "ReadWrite" => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

// =============================================================================
// OpenedStream
// =============================================================================

/// A boxed async reader.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// A boxed async writer.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A stream as returned by a stream converter.
pub enum OpenedStream {
    /// Opened for reading.
    Read(BoxedReader),
    /// Opened for writing.
    Write(BoxedWriter),
}

impl OpenedStream {
    /// Wraps a reader.
    pub fn reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self::Read(Box::pin(reader))
    }

    /// Wraps a writer.
    pub fn writer(writer: impl AsyncWrite + Send + 'static) -> Self {
        Self::Write(Box::pin(writer))
    }

    /// Returns the direction the stream was opened in.
    pub fn access(&self) -> FileAccess {
        match self {
            Self::Read(_) => FileAccess::Read,
            Self::Write(_) => FileAccess::Write,
        }
    }
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpenedStream({})", self.access())
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed")
}

// =============================================================================
// ReadStream
// =============================================================================

/// A readable stream bound to a parameter. Closed by the binding afterwards.
#[derive(Clone)]
pub struct ReadStream {
    inner: Arc<Mutex<Option<BoxedReader>>>,
}

impl ReadStream {
    /// Wraps an opened reader.
    pub fn new(reader: BoxedReader) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(reader))),
        }
    }

    /// Reads into `buf`, returning the number of bytes read.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().await;
        let reader = guard.as_mut().ok_or_else(closed_error)?;
        reader.read(buf).await
    }

    /// Reads all remaining bytes.
    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut guard = self.inner.lock().await;
        let reader = guard.as_mut().ok_or_else(closed_error)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Reads all remaining bytes as UTF-8 text.
    pub async fn read_to_string(&self) -> io::Result<String> {
        let bytes = self.read_to_end().await?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Drops the underlying reader. Idempotent.
    pub async fn close(&self) {
        self.inner.lock().await.take();
    }

    /// Returns `true` once the stream has been closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadStream")
    }
}

// =============================================================================
// WriteStream
// =============================================================================

/// A writable stream bound to a parameter. Flushed and closed by the binding
/// after the function returns.
#[derive(Clone)]
pub struct WriteStream {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
}

impl WriteStream {
    /// Wraps an opened writer.
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Writes the whole buffer.
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;
        writer.write_all(buf).await
    }

    /// Writes UTF-8 text.
    pub async fn write_str(&self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes()).await
    }

    /// Flushes buffered bytes.
    pub async fn flush(&self) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;
        writer.flush().await
    }

    /// Flushes, shuts down, and drops the writer. Idempotent.
    pub async fn close(&self) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        if let Some(mut writer) = guard.take() {
            writer.flush().await?;
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Returns `true` once the stream has been closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WriteStream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_permits() {
        assert!(FileAccess::ReadWrite.permits(FileAccess::Read));
        assert!(FileAccess::ReadWrite.permits(FileAccess::Write));
        assert!(!FileAccess::Read.permits(FileAccess::Write));
        assert!(!FileAccess::Write.permits(FileAccess::ReadWrite));
        assert_eq!(FileAccess::from_variant("Write"), Some(FileAccess::Write));
    }

    #[tokio::test]
    async fn test_read_stream() {
        let stream = ReadStream::new(Box::pin(&b"hello"[..]));
        assert_eq!(stream.read_to_string().await.unwrap(), "hello");
        stream.close().await;
        assert!(stream.is_closed().await);
        assert!(stream.read_to_end().await.is_err());
    }

    #[tokio::test]
    async fn test_write_stream_close_is_idempotent() {
        let (client, mut server) = tokio::io::duplex(64);
        let stream = WriteStream::new(Box::pin(client));

        stream.write_str("abc").await.unwrap();
        stream.close().await.unwrap();
        stream.close().await.unwrap();
        assert!(stream.write_str("late").await.is_err());

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "abc");
    }
}
