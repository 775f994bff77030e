use std::io::{self, Cursor, Read};

use bytes::Bytes;
use folio_crypto::ContentHasher;
use folio_types::ObjectId;

/// A stored object: raw content plus cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// contents -- it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The object content.
    pub data: Bytes,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from its content.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self { data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        ContentHasher::OBJECT.hash(&self.data)
    }
}

/// Content returned by a whole-object read.
///
/// Small objects come back as bytes; objects above the store's inline read
/// limit come back as a stream handle so callers can consume them
/// incrementally.
#[derive(Debug)]
pub enum ObjectValue {
    Bytes(Bytes),
    Stream(ObjectReader),
}

impl ObjectValue {
    /// Total content length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::Stream(reader) => reader.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the content was handed out as a stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Collect the remaining content into memory.
    pub fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut reader) => {
                let mut buf = Vec::with_capacity(reader.remaining() as usize);
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Streaming handle over an object's content.
#[derive(Debug)]
pub struct ObjectReader {
    size: u64,
    cursor: Cursor<Bytes>,
}

impl ObjectReader {
    pub fn new(data: Bytes) -> Self {
        Self {
            size: data.len() as u64,
            cursor: Cursor::new(data),
        }
    }

    /// Total object size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.cursor.position())
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}
