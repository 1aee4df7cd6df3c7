use core::fmt;

use byteorder::{ByteOrder, NativeEndian, NetworkEndian};

use super::ipv4::Address;
use crate::error::{Error, Result};

/// The address family tag of `AF_INET`.
pub const AF_INET: u16 = 2;

/// The length of an encoded `struct sockaddr_in`.
pub const SOCKADDR_IN_LEN: usize = 16;

mod field {
    use core::ops::Range;

    pub const FAMILY: Range<usize> = 0..2;
    pub const PORT: Range<usize> = 2..4;
    pub const ADDR: Range<usize> = 4..8;
    pub const ZERO: Range<usize> = 8..16;
}

/// An internet socket address, the decoded form of `struct sockaddr_in`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SockAddr {
    pub addr: Address,
    pub port: u16,
}

impl SockAddr {
    /// The wildcard address on port 0.
    pub const ANY: SockAddr = SockAddr { addr: Address::UNSPECIFIED, port: 0 };

    pub const fn new(addr: Address, port: u16) -> Self {
        SockAddr { addr, port }
    }

    /// Parse an encoded `sockaddr_in`.
    ///
    /// The family is host order while port and address are in network order. Buffers shorter than
    /// the structure, or carrying another family, are rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SOCKADDR_IN_LEN {
            return Err(Error::InvalidArgument);
        }

        if NativeEndian::read_u16(&bytes[field::FAMILY]) != AF_INET {
            return Err(Error::InvalidArgument);
        }

        Ok(SockAddr {
            addr: Address::from_bytes(&bytes[field::ADDR]),
            port: NetworkEndian::read_u16(&bytes[field::PORT]),
        })
    }

    /// Encode into a `sockaddr_in`, returning the number of bytes written.
    pub fn emit(&self, bytes: &mut [u8]) -> Result<usize> {
        let bytes = bytes.get_mut(..SOCKADDR_IN_LEN).ok_or(Error::InvalidArgument)?;
        NativeEndian::write_u16(&mut bytes[field::FAMILY], AF_INET);
        NetworkEndian::write_u16(&mut bytes[field::PORT], self.port);
        bytes[field::ADDR].copy_from_slice(self.addr.as_bytes());
        bytes[field::ZERO].iter_mut().for_each(|b| *b = 0);
        Ok(SOCKADDR_IN_LEN)
    }
}

impl From<::std::net::SocketAddrV4> for SockAddr {
    fn from(addr: ::std::net::SocketAddrV4) -> Self {
        SockAddr::new((*addr.ip()).into(), addr.port())
    }
}

impl From<SockAddr> for ::std::net::SocketAddrV4 {
    fn from(addr: SockAddr) -> Self {
        ::std::net::SocketAddrV4::new(addr.addr.into(), addr.port)
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
