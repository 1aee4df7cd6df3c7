//! The socket table and connection lifecycle beneath an `AF_INET` socket layer.
//!
//! This crate sits between a BSD style system call layer and the transport protocols. It keeps
//! the table of live transport endpoints (the *socks*), binds and auto-binds ports, finds the
//! endpoint an inbound packet belongs to, and drives each user socket through the
//! `bind`/`listen`/`connect`/`accept`/`shutdown`/`release` state machine.
//!
//! The transports themselves are not part of this crate. They plug in through the
//! [`Protocol`] trait and are handed the [`Stack`] whenever the socket layer calls one of their
//! hooks. Everything they touch is guarded by the one mutex in [`Inet`], the socket layer context.
//!
//! ## Structure
//!
//! * [`registry`] holds the per-transport hash table of socks keyed by local port, the ephemeral
//!   port allocator and the best-match demultiplexer.
//! * [`sock`] defines the transport endpoint itself and the buffers queued on it.
//! * [`lifecycle`] implements creation, teardown and deferred destruction of socks.
//! * [`inet`] is the user facing socket call state machine.
//! * [`wire`] provides the `sockaddr_in` representation exchanged with callers.
//!
//! [`Protocol`]: proto/trait.Protocol.html
//! [`Stack`]: stack/struct.Stack.html
//! [`Inet`]: inet/struct.Inet.html
//! [`registry`]: registry/index.html
//! [`sock`]: sock/index.html
//! [`lifecycle`]: lifecycle/index.html
//! [`inet`]: inet/index.html
//! [`wire`]: wire/index.html
#[macro_use] mod macros;

pub mod config;
pub mod error;
pub mod iface;
pub mod inet;
pub mod lifecycle;
pub mod managed;
pub mod proto;
pub mod registry;
pub mod sock;
pub mod stack;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod time;
pub mod wire;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::inet::{Inet, Socket, SocketState};
pub use crate::proto::{Protocol, Transport};
pub use crate::sock::{Sock, SockType, SocketKey, TcpState};
pub use crate::stack::Stack;
pub use crate::task::Task;
