//! Control calls: `ioctl`, `fcntl` and socket options.
//!
//! The socket layer answers owner and timestamp queries itself and the `SOL_SOCKET` options.
//! Routing, neighbor and device requests are forwarded to the [`NetControl`] collaborator, all
//! other requests to the transport.
//!
//! [`NetControl`]: ../iface/trait.NetControl.html
use std::time::Duration;

use byteorder::{ByteOrder, NativeEndian};

use crate::error::{Error, Result};
use crate::iface::ControlTarget;
use crate::sock::SocketKey;
use crate::stack::Stack;
use crate::task::Task;
use super::{Inet, Socket};

/// The option level handled by the socket layer itself.
pub const SOL_SOCKET: i32 = 1;

enum_with_unknown! {
    /// Options of level `SOL_SOCKET`.
    pub enum SockOpt(i32) {
        Debug = 1,
        ReuseAddr = 2,
        Type = 3,
        Error = 4,
        DontRoute = 5,
        Broadcast = 6,
        SndBuf = 7,
        RcvBuf = 8,
        KeepAlive = 9,
        OobInline = 10,
        NoCheck = 11,
        Priority = 12,
        Linger = 13,
    }
}

enum_with_unknown! {
    /// The `ioctl` requests the socket layer dispatches by name.
    pub enum IoctlCommand(u32) {
        FioSetOwn = 0x8901,
        SiocSPgrp = 0x8902,
        FioGetOwn = 0x8903,
        SiocGPgrp = 0x8904,
        SiocGStamp = 0x8906,
        SiocAddRt = 0x890b,
        SiocDelRt = 0x890c,
        SiocDArp = 0x8953,
        SiocGArp = 0x8954,
        SiocSArp = 0x8955,
        SiocDRarp = 0x8960,
        SiocGRarp = 0x8961,
        SiocSRarp = 0x8962,
    }
}

enum_with_unknown! {
    /// The `fcntl` commands of a socket.
    pub enum FcntlCommand(i32) {
        SetOwner = 8,
        GetOwner = 9,
    }
}

/// Interface configuration and multicast list requests.
const INTERFACE_COMMANDS: &[u32] = &[
    0x8910, 0x8911, 0x8912, 0x8913, 0x8914, 0x8915, 0x8916, 0x8917, 0x8918,
    0x8919, 0x891a, 0x891b, 0x891c, 0x891d, 0x891e, 0x891f, 0x8920, 0x8921,
    0x8922, 0x8924, 0x8927, 0x8931, 0x8932, 0x8970, 0x8971,
];

/// The first of the device private requests.
const SIOCDEVPRIVATE: u32 = 0x89f0;
const DEVPRIVATE_RANGE: u32 = 16;

const BUFFER_MIN: usize = 256;
const BUFFER_MAX: usize = 32767;

/// Number of transmit priority bands.
const PRIORITIES: i32 = 3;

const LINGER_LEN: usize = 8;

impl IoctlCommand {
    /// The collaborator a request is forwarded to, if it is not answered by the socket layer.
    pub fn target(self) -> Option<ControlTarget> {
        match self {
            IoctlCommand::SiocAddRt | IoctlCommand::SiocDelRt => Some(ControlTarget::Route),
            IoctlCommand::SiocDArp | IoctlCommand::SiocGArp | IoctlCommand::SiocSArp
                => Some(ControlTarget::Arp),
            IoctlCommand::SiocDRarp | IoctlCommand::SiocGRarp | IoctlCommand::SiocSRarp
                => Some(ControlTarget::Rarp),
            IoctlCommand::Unknown(cmd) if INTERFACE_COMMANDS.contains(&cmd) => Some(ControlTarget::Device),
            IoctlCommand::Unknown(cmd) if (SIOCDEVPRIVATE..SIOCDEVPRIVATE + DEVPRIVATE_RANGE).contains(&cmd)
                => Some(ControlTarget::Device),
            _ => None,
        }
    }
}

impl Inet {
    /// Perform a control request on a socket.
    ///
    /// Returns the number of bytes of `arg` written for queries, 0 for updates.
    pub fn ioctl(&self, sock: &Socket, task: &Task, cmd: u32, arg: &mut [u8]) -> Result<usize> {
        let key = sock.sock()?;
        let command = IoctlCommand::from(cmd);
        let mut stack = self.stack.lock();

        match command {
            IoctlCommand::FioSetOwn | IoctlCommand::SiocSPgrp => {
                let pid = read_i32(arg)?;
                set_owner(&mut stack, key, task, pid)?;
                Ok(0)
            },
            IoctlCommand::FioGetOwn | IoctlCommand::SiocGPgrp => {
                let owner = stack.get(key).ok_or(Error::BadKey)?.proc_owner;
                write_i32(arg, owner)
            },
            IoctlCommand::SiocGStamp => {
                let stamp = stack.get(key).ok_or(Error::BadKey)?.stamp.ok_or(Error::NotFound)?;
                if arg.len() < 16 {
                    return Err(Error::InvalidArgument);
                }
                let (secs, usecs) = stamp.timeval();
                NativeEndian::write_i64(&mut arg[0..8], secs);
                NativeEndian::write_i64(&mut arg[8..16], usecs);
                Ok(16)
            },
            other => match other.target() {
                Some(target) => {
                    drop(stack);
                    net_trace!("inet: forwarding ioctl {:#x} to {:?}", cmd, target);
                    self.control.control(target, cmd, arg)
                },
                None => {
                    let ops = stack.ops(key)?;
                    ops.ioctl(&mut stack, key, cmd, arg)
                },
            },
        }
    }

    /// Set or query the owner receiving asynchronous notifications.
    pub fn fcntl(&self, sock: &Socket, task: &Task, cmd: i32, arg: i32) -> Result<i32> {
        let key = sock.sock()?;
        let mut stack = self.stack.lock();

        match FcntlCommand::from(cmd) {
            FcntlCommand::SetOwner => {
                set_owner(&mut stack, key, task, arg)?;
                Ok(0)
            },
            FcntlCommand::GetOwner => Ok(stack.get(key).ok_or(Error::BadKey)?.proc_owner),
            FcntlCommand::Unknown(_) => Err(Error::InvalidArgument),
        }
    }

    /// Set a socket option.
    ///
    /// Values are native endian `i32`, except `SO_LINGER` which is a pair of them, enable and
    /// seconds.
    pub fn setsockopt(&self, sock: &Socket, task: &Task, level: i32, name: i32, value: &[u8])
        -> Result<()>
    {
        let key = sock.sock()?;
        let mut stack = self.stack.lock();

        if level != SOL_SOCKET {
            let ops = stack.ops(key)?;
            return ops.setsockopt(&mut stack, key, level, name, value);
        }

        let val = read_i32(value)?;
        let on = val != 0;
        let sk = stack.get_mut(key).ok_or(Error::BadKey)?;

        match SockOpt::from(name) {
            SockOpt::Debug => {
                if on && !task.is_privileged() {
                    return Err(Error::PermissionDenied);
                }
                sk.debug = on;
            },
            SockOpt::ReuseAddr => sk.reuse = on,
            SockOpt::DontRoute => sk.localroute = on,
            SockOpt::Broadcast => sk.broadcast = on,
            SockOpt::KeepAlive => sk.keepopen = on,
            SockOpt::OobInline => sk.urginline = on,
            SockOpt::NoCheck => sk.no_check = on,
            SockOpt::SndBuf => sk.sndbuf = clamp_buffer(val),
            SockOpt::RcvBuf => sk.rcvbuf = clamp_buffer(val),
            SockOpt::Priority => {
                if !(0..PRIORITIES).contains(&val) {
                    return Err(Error::InvalidArgument);
                }
                sk.priority = val as u8;
            },
            SockOpt::Linger => {
                if value.len() < LINGER_LEN {
                    return Err(Error::InvalidArgument);
                }
                let secs = NativeEndian::read_i32(&value[4..8]);
                sk.linger = match on {
                    true => Some(Duration::from_secs(u64::from(secs.max(0) as u32))),
                    false => None,
                };
            },
            SockOpt::Type | SockOpt::Error | SockOpt::Unknown(_) => return Err(Error::UnknownOption),
        }

        Ok(())
    }

    /// Query a socket option into `value`, returning the length written.
    ///
    /// Reading `SO_ERROR` consumes the latched error.
    pub fn getsockopt(&self, sock: &Socket, level: i32, name: i32, value: &mut [u8]) -> Result<usize> {
        let key = sock.sock()?;
        let mut stack = self.stack.lock();

        if level != SOL_SOCKET {
            let ops = stack.ops(key)?;
            return ops.getsockopt(&mut stack, key, level, name, value);
        }

        let option = SockOpt::from(name);
        if option == SockOpt::Error {
            let errno = stack.take_error(key).map_or(0, Error::errno);
            return write_i32(value, errno);
        }

        let sk = stack.get(key).ok_or(Error::BadKey)?;
        let val = match option {
            SockOpt::Debug => i32::from(sk.debug),
            SockOpt::ReuseAddr => i32::from(sk.reuse),
            SockOpt::Type => i32::from(u16::from(sk.kind())),
            SockOpt::DontRoute => i32::from(sk.localroute),
            SockOpt::Broadcast => i32::from(sk.broadcast),
            SockOpt::SndBuf => sk.sndbuf as i32,
            SockOpt::RcvBuf => sk.rcvbuf as i32,
            SockOpt::KeepAlive => i32::from(sk.keepopen),
            SockOpt::OobInline => i32::from(sk.urginline),
            SockOpt::NoCheck => i32::from(sk.no_check),
            SockOpt::Priority => i32::from(sk.priority),
            SockOpt::Linger => {
                if value.len() < LINGER_LEN {
                    return Err(Error::InvalidArgument);
                }
                let secs = sk.linger.map_or(0, |linger| linger.as_secs().min(i32::MAX as u64) as i32);
                NativeEndian::write_i32(&mut value[0..4], i32::from(sk.linger.is_some()));
                NativeEndian::write_i32(&mut value[4..8], secs);
                return Ok(LINGER_LEN);
            },
            SockOpt::Error | SockOpt::Unknown(_) => return Err(Error::UnknownOption),
        };

        write_i32(value, val)
    }
}

/// Change the owner of a sock.
///
/// Unprivileged callers may only name themselves or their own process group.
fn set_owner(stack: &mut Stack, key: SocketKey, task: &Task, pid: i32) -> Result<()> {
    if task.pid() != pid && task.pgrp() != pid.wrapping_neg() && !task.is_privileged() {
        return Err(Error::PermissionDenied);
    }

    stack.get_mut(key).ok_or(Error::BadKey)?.proc_owner = pid;
    Ok(())
}

fn clamp_buffer(val: i32) -> usize {
    (val.max(0) as usize).clamp(BUFFER_MIN, BUFFER_MAX)
}

fn read_i32(bytes: &[u8]) -> Result<i32> {
    match bytes.get(..4) {
        Some(bytes) => Ok(NativeEndian::read_i32(bytes)),
        None => Err(Error::InvalidArgument),
    }
}

fn write_i32(bytes: &mut [u8], val: i32) -> Result<usize> {
    match bytes.get_mut(..4) {
        Some(bytes) => {
            NativeEndian::write_i32(bytes, val);
            Ok(4)
        },
        None => Err(Error::InvalidArgument),
    }
}
