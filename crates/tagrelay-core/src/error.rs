//! tagrelay error types.

use thiserror::Error;

use crate::frame::FrameError;
use crate::tag::Tag;
use crate::transport::TransportStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport context or worker could not be created.
    #[error("resource error: {0}")]
    Resource(String),
    /// Endpoint or listener creation failed.
    #[error("connection error: {0}")]
    Connection(String),
    /// A data operation completed with a non-success status.
    #[error("transport: {0}")]
    Transport(TransportStatus),
    /// Operation on an endpoint that was closed locally.
    #[error("endpoint closed")]
    EndpointClosed,
    /// The remote worker went away.
    #[error("peer unreachable")]
    PeerUnreachable,
    /// A fatal peer failure on an endpoint without error handling poisoned
    /// the whole worker.
    #[error("worker poisoned: {0}")]
    WorkerPoisoned(String),
    /// The worker was torn down with the operation still outstanding.
    #[error("worker closed")]
    WorkerClosed,
    /// Two clients in one rendezvous batch announced the same tag.
    #[error("tag collision on {0}")]
    TagCollision(Tag),
    /// `wait_timeout` ran out.
    #[error("timed out")]
    Timeout,
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    /// OS error with errno.
    #[error("OS error: errno {0}")]
    Os(i32),
}

/// Coarse classification of `Error`, for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Connection,
    Closed,
    Poisoned,
    Timeout,
    Protocol,
    Os,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resource(_) => ErrorKind::Setup,
            Self::Connection(_) | Self::PeerUnreachable => ErrorKind::Connection,
            Self::Transport(TransportStatus::PeerUnreachable) => ErrorKind::Connection,
            Self::Transport(_) => ErrorKind::Protocol,
            Self::EndpointClosed | Self::WorkerClosed => ErrorKind::Closed,
            Self::WorkerPoisoned(_) => ErrorKind::Poisoned,
            Self::Timeout => ErrorKind::Timeout,
            Self::TagCollision(_) | Self::Frame(_) => ErrorKind::Protocol,
            Self::Os(_) => ErrorKind::Os,
        }
    }

    /// Errno of the last failed libc call.
    pub fn last_os_error() -> Self {
        Self::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

impl From<TransportStatus> for Error {
    fn from(s: TransportStatus) -> Self {
        match s {
            TransportStatus::PeerUnreachable => Error::PeerUnreachable,
            other => Error::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::EndpointClosed.kind(), ErrorKind::Closed);
        assert_eq!(Error::WorkerClosed.kind(), ErrorKind::Closed);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(Error::WorkerPoisoned("x".into()).kind(), ErrorKind::Poisoned);
        assert_eq!(Error::TagCollision(Tag(1)).kind(), ErrorKind::Protocol);
        assert_eq!(Error::Os(11).kind(), ErrorKind::Os);
    }

    #[test]
    fn test_from_transport_status() {
        assert_eq!(Error::from(TransportStatus::PeerUnreachable), Error::PeerUnreachable);
        let t = TransportStatus::Truncated { capacity: 4, received: 8 };
        assert_eq!(Error::from(t), Error::Transport(t));
    }

    #[test]
    fn test_frame_error_converts() {
        let e: Error = FrameError::BadFrameSize { len: 3 }.into();
        assert!(matches!(e, Error::Frame(_)));
        assert!(e.to_string().contains("3 bytes"));
    }
}
