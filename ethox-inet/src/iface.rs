//! Collaborators outside of the socket table.
//!
//! `bind` and `getname` need to know which addresses belong to this host, and `ioctl` forwards
//! routing, neighbor and device requests to the subsystems owning them. Both are plugged into the
//! [`Inet`] context through the traits here.
//!
//! [`Inet`]: ../inet/struct.Inet.html
use crate::error::{Error, Result};
use crate::wire::{Ipv4Address, Ipv4Cidr};

/// How an address relates to this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrClass {
    /// Assigned to one of the interfaces.
    Local,
    /// A multicast group address.
    Multicast,
    /// The limited or a directed broadcast address.
    Broadcast,
    /// Belongs to some other host.
    Foreign,
}

/// Address validation for `bind` and `getname`.
pub trait Addresses: Send + Sync {
    fn classify(&self, addr: Ipv4Address) -> AddrClass;

    /// The address reported for a sock bound to the wildcard.
    fn primary(&self) -> Ipv4Address;
}

/// The subsystem a control request is forwarded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlTarget {
    Route,
    Arp,
    Rarp,
    Device,
}

/// Handles the control requests the socket layer does not answer itself.
pub trait NetControl: Send + Sync {
    fn control(&self, _target: ControlTarget, _cmd: u32, _arg: &mut [u8]) -> Result<usize> {
        Err(Error::InvalidArgument)
    }
}

/// A fixed set of interface addresses.
#[derive(Clone, Debug, Default)]
pub struct Interfaces {
    cidrs: Vec<Ipv4Cidr>,
}

/// Rejects every forwarded control request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoControl;

impl Interfaces {
    pub fn new(cidrs: Vec<Ipv4Cidr>) -> Self {
        Interfaces { cidrs }
    }

    /// Only the loopback interface.
    pub fn loopback() -> Self {
        Interfaces::new(vec![Ipv4Cidr::new(Ipv4Address::LOOPBACK, 8)])
    }

    pub fn cidrs(&self) -> &[Ipv4Cidr] {
        &self.cidrs
    }
}

impl Addresses for Interfaces {
    fn classify(&self, addr: Ipv4Address) -> AddrClass {
        if self.cidrs.iter().any(|cidr| cidr.address() == addr) {
            return AddrClass::Local;
        }

        if addr.is_multicast() {
            return AddrClass::Multicast;
        }

        if addr.is_broadcast() || self.cidrs.iter().any(|cidr| cidr.broadcast() == Some(addr)) {
            return AddrClass::Broadcast;
        }

        AddrClass::Foreign
    }

    fn primary(&self) -> Ipv4Address {
        self.cidrs.iter()
            .map(Ipv4Cidr::address)
            .find(|addr| !addr.is_loopback())
            .or_else(|| self.cidrs.first().map(Ipv4Cidr::address))
            .unwrap_or(Ipv4Address::LOOPBACK)
    }
}

impl NetControl for NoControl { }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        let ifaces = Interfaces::new(vec![
            Ipv4Cidr::new(Ipv4Address::LOOPBACK, 8),
            Ipv4Cidr::new(Ipv4Address::new(10, 0, 0, 1), 24),
        ]);

        assert_eq!(ifaces.classify(Ipv4Address::new(10, 0, 0, 1)), AddrClass::Local);
        assert_eq!(ifaces.classify(Ipv4Address::LOOPBACK), AddrClass::Local);
        assert_eq!(ifaces.classify(Ipv4Address::new(224, 0, 0, 5)), AddrClass::Multicast);
        assert_eq!(ifaces.classify(Ipv4Address::new(10, 0, 0, 255)), AddrClass::Broadcast);
        assert_eq!(ifaces.classify(Ipv4Address::BROADCAST), AddrClass::Broadcast);
        assert_eq!(ifaces.classify(Ipv4Address::new(10, 0, 0, 2)), AddrClass::Foreign);
        assert_eq!(ifaces.primary(), Ipv4Address::new(10, 0, 0, 1));
    }

    #[test]
    fn loopback_primary() {
        assert_eq!(Interfaces::loopback().primary(), Ipv4Address::LOOPBACK);
        assert_eq!(Interfaces::default().primary(), Ipv4Address::LOOPBACK);
    }
}
