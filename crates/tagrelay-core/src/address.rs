//! Opaque worker address.
//!
//! Produced once by a transport worker, copied freely, shipped out-of-band
//! (a queue, a rendezvous frame) and handed to another worker to dial it.

use std::fmt;
use std::sync::Arc;

use crate::tag::hash64bits;

/// Byte-wise comparable address of a worker.
///
/// Cloning is a reference-count bump; the bytes are never mutated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WorkerAddress {
    bytes: Arc<[u8]>,
}

impl WorkerAddress {
    /// Wrap bytes received from a peer (e.g. the payload of a rendezvous frame).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { bytes: Arc::from(bytes) }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Owned copy of the bytes, suitable as a send buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Short stable digest for log lines.
    pub fn digest(&self) -> u64 {
        hash64bits(&self.bytes)
    }
}

impl From<Vec<u8>> for WorkerAddress {
    fn from(v: Vec<u8>) -> Self {
        Self { bytes: Arc::from(v) }
    }
}

impl AsRef<[u8]> for WorkerAddress {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerAddress(len={}, {:016x})", self.len(), self.digest())
    }
}

impl fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_equality() {
        let a = WorkerAddress::from_bytes(b"worker-1");
        let b = WorkerAddress::from(b"worker-1".to_vec());
        let c = WorkerAddress::from_bytes(b"worker-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        assert_eq!(a.to_vec(), b"worker-1".to_vec());
    }

    #[test]
    fn test_clone_shares_bytes() {
        let a = WorkerAddress::from_bytes(&[1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.as_bytes().as_ptr(), b.as_bytes().as_ptr());
    }
}
