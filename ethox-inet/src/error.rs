//! The error taxonomy of the socket layer.
//!
//! Every socket call returns a [`Result`] with one of these kinds. They correspond one-to-one to
//! the errno values a system call layer hands back to the user, see [`Error::errno`].
//!
//! [`Result`]: type.Result.html
//! [`Error::errno`]: enum.Error.html#method.errno

/// The error type of all socket layer operations.
///
/// Errors latched on a sock by a transport (see [`Sock::err`]) are of the same type and are
/// consumed by the next socket call that reports them.
///
/// [`Sock::err`]: ../sock/struct.Sock.html#structfield.err
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// No ephemeral port could be found or a buffer limit was reached.
    #[error("resources exhausted")]
    Exhausted,

    /// The requested local port and address are already taken.
    #[error("address already in use")]
    AddrInUse,

    /// The requested local address does not belong to this host.
    #[error("address not available")]
    AddrNotAvailable,

    /// The protocol number does not fit the socket type, or no transport is installed for it.
    #[error("protocol not supported")]
    ProtocolNotSupported,

    /// The socket type is not one of stream, datagram, sequenced packet, raw or packet.
    #[error("socket type not supported")]
    SocketTypeNotSupported,

    /// The transport does not implement the requested operation.
    #[error("operation not supported")]
    NotSupported,

    /// The socket option is not known at the requested level.
    #[error("protocol option not available")]
    UnknownOption,

    /// The operation requires a connected socket.
    #[error("socket is not connected")]
    NotConnected,

    /// The caller lacks the privilege for the operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The operation would have to block on a non-blocking socket.
    #[error("operation would block")]
    WouldBlock,

    /// A non-blocking connect was started and continues in the background.
    #[error("operation now in progress")]
    InProgress,

    /// A connect is already in progress on this non-blocking socket.
    #[error("operation already in progress")]
    Already,

    /// A blocking wait was interrupted by a signal; the call may be restarted.
    #[error("interrupted, restart the call")]
    Interrupted,

    /// A bounded wait elapsed.
    #[error("timed out")]
    TimedOut,

    /// The socket is in a state in which the operation can not be performed.
    #[error("input/output error")]
    Io,

    /// An argument was malformed or the operation is invalid for the socket's current state.
    #[error("invalid argument")]
    InvalidArgument,

    /// Sending was shut down on this socket.
    #[error("broken pipe")]
    BrokenPipe,

    /// The queried value does not exist.
    #[error("no such entry")]
    NotFound,

    /// The peer refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// The peer reset the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// No route to the requested destination.
    #[error("host unreachable")]
    Unreachable,

    /// The key no longer refers to a live sock.
    #[error("bad socket key")]
    BadKey,
}

/// The result type of the socket layer.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// The errno value a system call layer reports for this error.
    ///
    /// `Interrupted` maps to `EINTR`, as restart semantics are the business of the caller.
    pub fn errno(self) -> i32 {
        match self {
            Error::Exhausted => libc::ENOBUFS,
            Error::AddrInUse => libc::EADDRINUSE,
            Error::AddrNotAvailable => libc::EADDRNOTAVAIL,
            Error::ProtocolNotSupported => libc::EPROTONOSUPPORT,
            Error::SocketTypeNotSupported => libc::ESOCKTNOSUPPORT,
            Error::NotSupported => libc::EOPNOTSUPP,
            Error::UnknownOption => libc::ENOPROTOOPT,
            Error::NotConnected => libc::ENOTCONN,
            Error::PermissionDenied => libc::EPERM,
            Error::WouldBlock => libc::EAGAIN,
            Error::InProgress => libc::EINPROGRESS,
            Error::Already => libc::EALREADY,
            Error::Interrupted => libc::EINTR,
            Error::TimedOut => libc::ETIMEDOUT,
            Error::Io => libc::EIO,
            Error::InvalidArgument => libc::EINVAL,
            Error::BrokenPipe => libc::EPIPE,
            Error::NotFound => libc::ENOENT,
            Error::ConnectionRefused => libc::ECONNREFUSED,
            Error::ConnectionReset => libc::ECONNRESET,
            Error::Unreachable => libc::EHOSTUNREACH,
            Error::BadKey => libc::EBADF,
        }
    }
}
