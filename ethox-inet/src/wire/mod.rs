//! Addresses exchanged with the callers of the socket layer.
//!
//! The socket layer never parses packets, that is the business of the transports. What crosses
//! its boundary are `struct sockaddr_in` values and the integer arguments of `ioctl` and
//! `setsockopt`, both of which are encoded here.
mod ipv4;
mod sockaddr;

pub use self::ipv4::{
    Address as Ipv4Address,
    Cidr as Ipv4Cidr,
};

pub use self::sockaddr::{
    SockAddr,
    AF_INET,
    SOCKADDR_IN_LEN,
};

/// IP protocol numbers the socket layer selects transports by.
pub mod ip_protocol {
    pub const ICMP: u16 = 1;
    pub const TCP: u16 = 6;
    pub const UDP: u16 = 17;
}
