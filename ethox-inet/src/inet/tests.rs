use std::sync::Arc;

use byteorder::{ByteOrder, NativeEndian};
use parking_lot::Mutex;

use super::*;
use crate::iface::{ControlTarget, NetControl};
use crate::proto::Select;
use crate::sock::{Shutdown, TcpState};
use crate::testing::{Event, Scripted};
use crate::wire::{Ipv4Address, SockAddr};

const REMOTE: Ipv4Address = Ipv4Address::new(10, 0, 0, 99);

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<(ControlTarget, u32)>>>,
}

impl NetControl for Recorder {
    fn control(&self, target: ControlTarget, cmd: u32, _: &mut [u8]) -> Result<usize> {
        self.requests.lock().push((target, cmd));
        Ok(0)
    }
}

fn inet() -> (Inet, Arc<Scripted>) {
    let scripted = Arc::new(Scripted::new());
    let mut builder = Inet::builder();
    for transport in Transport::ALL {
        builder = builder.protocol(transport, scripted.clone());
    }
    (builder.build().unwrap(), scripted)
}

fn user() -> Task {
    Task::new(1000, 1000, false)
}

fn root() -> Task {
    Task::new(1, 1, true)
}

fn any(port: u16) -> SockAddr {
    SockAddr::new(Ipv4Address::UNSPECIFIED, port)
}

fn remote() -> SockAddr {
    SockAddr::new(REMOTE, 80)
}

fn set_int(inet: &Inet, socket: &Socket, name: SockOpt, val: i32) -> Result<()> {
    let mut bytes = [0; 4];
    NativeEndian::write_i32(&mut bytes, val);
    inet.setsockopt(socket, &user(), SOL_SOCKET, name.into(), &bytes)
}

fn get_int(inet: &Inet, socket: &Socket, name: SockOpt) -> Result<i32> {
    let mut bytes = [0; 4];
    assert_eq!(inet.getsockopt(socket, SOL_SOCKET, name.into(), &mut bytes)?, 4);
    Ok(NativeEndian::read_i32(&bytes))
}

#[test]
fn bind_to_ephemeral_port() {
    let (inet, _) = inet();
    let task = user();
    let socket = inet.create(&task, SockType::Stream, 0).unwrap();

    inet.bind(&socket, &task, any(0)).unwrap();
    let name = inet.getname(&socket, false).unwrap();
    assert!(name.port > 1024);
    assert_eq!(name.addr, Ipv4Address::LOOPBACK);

    assert_eq!(inet.bind(&socket, &task, any(0)), Err(Error::InvalidArgument));
}

#[test]
fn bind_checks_privilege_and_address() {
    let (inet, _) = inet();
    let socket = inet.create(&user(), SockType::Stream, 0).unwrap();

    assert_eq!(inet.bind(&socket, &user(), any(80)), Err(Error::PermissionDenied));
    let foreign = SockAddr::new(REMOTE, 5000);
    assert_eq!(inet.bind(&socket, &user(), foreign), Err(Error::AddrNotAvailable));
    let multicast = SockAddr::new(Ipv4Address::new(224, 0, 0, 1), 5000);
    inet.bind(&socket, &user(), multicast).unwrap();

    let privileged = inet.create(&root(), SockType::Stream, 0).unwrap();
    inet.bind(&privileged, &root(), SockAddr::new(Ipv4Address::LOOPBACK, 80)).unwrap();
    assert_eq!(inet.getname(&privileged, false).unwrap(), SockAddr::new(Ipv4Address::LOOPBACK, 80));
}

#[test]
fn bind_after_connect_is_refused() {
    let (inet, _) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();

    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK), Err(Error::InProgress));
    assert_eq!(inet.bind(&socket, &task, any(5000)), Err(Error::Io));
}

#[test]
fn bind_port_sharing() {
    let (inet, _) = inet();
    let task = user();
    let first = inet.create(&task, SockType::Stream, 0).unwrap();
    let second = inet.create(&task, SockType::Stream, 0).unwrap();
    let third = inet.create(&task, SockType::Stream, 0).unwrap();

    inet.bind(&first, &task, any(5000)).unwrap();
    assert_eq!(inet.bind(&second, &task, any(5000)), Err(Error::AddrInUse));

    // Both sides have to agree to share.
    set_int(&inet, &second, SockOpt::ReuseAddr, 1).unwrap();
    assert_eq!(inet.bind(&second, &task, any(5000)), Err(Error::AddrInUse));
    set_int(&inet, &first, SockOpt::ReuseAddr, 1).unwrap();
    inet.bind(&second, &task, any(5000)).unwrap();

    // Not with a listener though.
    inet.listen(&first, 5).unwrap();
    set_int(&inet, &third, SockOpt::ReuseAddr, 1).unwrap();
    assert_eq!(inet.bind(&third, &task, any(5000)), Err(Error::AddrInUse));

    // A distinct local address does not collide.
    inet.bind(&third, &task, SockAddr::new(Ipv4Address::LOOPBACK, 5000)).unwrap();
    assert_eq!(inet.lock().registry(Transport::Tcp).unwrap().inuse(), 3);
}

#[test]
fn raw_bind_records_address_only() {
    let (inet, _) = inet();
    let task = root();
    let socket = inet.create(&task, SockType::Raw, 1).unwrap();

    inet.bind(&socket, &task, SockAddr::new(Ipv4Address::LOOPBACK, 9999)).unwrap();
    let key = socket.key().unwrap();
    let stack = inet.lock();
    let sk = stack.get(key).unwrap();
    assert_eq!(sk.saddr, Ipv4Address::LOOPBACK);
    assert_eq!(sk.port(), 1);
}

#[test]
fn raw_bind_moves_specific_sock_first() {
    let (inet, _) = inet();
    let task = root();
    let first = inet.create(&task, SockType::Raw, 1).unwrap();
    let second = inet.create(&task, SockType::Raw, 1).unwrap();
    let (wildcard, specific) = (first.key().unwrap(), second.key().unwrap());
    assert_eq!(inet.lock().registry(Transport::Raw).unwrap().bucket(1), &[wildcard, specific]);

    inet.bind(&second, &task, SockAddr::new(Ipv4Address::LOOPBACK, 0)).unwrap();
    assert_eq!(inet.lock().registry(Transport::Raw).unwrap().bucket(1), &[specific, wildcard]);
    assert_eq!(inet.lock().get(specific).unwrap().port(), 1);
}

#[test]
fn listen_clamps_backlog() {
    let (inet, _) = inet();
    let socket = inet.create(&user(), SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    inet.listen(&socket, 5).unwrap();
    assert_eq!(inet.lock().get(key).unwrap().max_ack_backlog, 5);
    assert_eq!(inet.lock().get(key).unwrap().state, TcpState::Listen);
    assert!(inet.lock().get(key).unwrap().port() > 1024);

    inet.listen(&socket, -1).unwrap();
    assert_eq!(inet.lock().get(key).unwrap().max_ack_backlog, 128);
    inet.listen(&socket, 100_000).unwrap();
    assert_eq!(inet.lock().get(key).unwrap().max_ack_backlog, 128);
}

#[test]
fn accept_without_pending_connection() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();

    let err = inet.accept(&listener, &task, MsgFlags::NONBLOCK).unwrap_err();
    assert_eq!(err, Error::WouldBlock);

    let unlistened = inet.create(&task, SockType::Stream, 0).unwrap();
    let err = inet.accept(&unlistened, &task, MsgFlags::NONBLOCK).unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
}

#[test]
fn accept_established_connection() {
    let (inet, scripted) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();

    let child = inet.with(|stack| {
        let child = Scripted::incoming(stack, lkey, remote()).unwrap();
        Scripted::establish(stack, child);
        child
    });

    let accepted = inet.accept(&listener, &task, MsgFlags::empty()).unwrap();
    assert_eq!(accepted.key(), Some(child));
    assert_eq!(accepted.state(), SocketState::Connected);
    assert_eq!(inet.getname(&accepted, true).unwrap(), remote());
    assert!(scripted.events().contains(&Event::Accept(child)));

    let stack = inet.lock();
    assert!(stack.get(child).unwrap().has_waiter());
    assert_eq!(stack.get(child).unwrap().rmem_alloc(), 0);
    assert_eq!(stack.get(lkey).unwrap().ack_backlog, 0);
}

#[test]
fn accept_interrupted_then_retried() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();

    let child = inet.with(|stack| Scripted::incoming(stack, lkey, remote()).unwrap());

    // The handshake of the child is still running when the signal arrives.
    inet.interrupt(&task);
    let err = inet.accept(&listener, &task, MsgFlags::empty()).unwrap_err();
    assert_eq!(err, Error::Interrupted);
    {
        let stack = inet.lock();
        assert_eq!(stack.get(lkey).unwrap().pair, Some(child));
        assert!(!stack.get(child).unwrap().has_waiter());
        assert!(stack.get(lkey).unwrap().receive_queue.is_empty());
    }

    task.clear_signal();
    inet.with(|stack| Scripted::establish(stack, child));

    let accepted = inet.accept(&listener, &task, MsgFlags::empty()).unwrap();
    assert_eq!(accepted.key(), Some(child));
    assert_eq!(accepted.state(), SocketState::Connected);
    assert_eq!(inet.lock().get(lkey).unwrap().pair, None);
}

#[test]
fn accept_nonblocking_leaves_handshake_running() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();
    let child = inet.with(|stack| Scripted::incoming(stack, lkey, remote()).unwrap());

    let accepted = inet.accept(&listener, &task, MsgFlags::NONBLOCK).unwrap();
    assert_eq!(accepted.key(), Some(child));
    assert_eq!(accepted.state(), SocketState::Unconnected);
    assert_eq!(inet.lock().get(child).unwrap().state, TcpState::SynRecv);
}

#[test]
fn accept_into_discards_placeholder() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();
    inet.with(|stack| {
        let child = Scripted::incoming(stack, lkey, remote()).unwrap();
        Scripted::establish(stack, child);
    });

    let mut newsock = inet.create(&task, SockType::Stream, 0).unwrap();
    let placeholder = newsock.key().unwrap();
    inet.accept_into(&listener, &mut newsock, &task, MsgFlags::empty()).unwrap();

    assert_ne!(newsock.key(), Some(placeholder));
    assert!(inet.lock().get(placeholder).is_none());
}

#[test]
fn accept_of_vanished_child_leaves_socket_unattached() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();

    let mut gone = inet.create(&task, SockType::Stream, 0).unwrap();
    let stale = gone.key().unwrap();
    inet.release(&mut gone, &task).unwrap();
    inet.with(|stack| stack.get_mut(lkey).unwrap().pair = Some(stale));

    let mut newsock = Socket::unattached(SockType::Stream);
    let err = inet.accept_into(&listener, &mut newsock, &task, MsgFlags::empty()).unwrap_err();
    assert_eq!(err, Error::BadKey);
    assert_eq!(newsock.key(), None);
    assert_eq!(newsock.state(), SocketState::Unconnected);
    assert_eq!(inet.lock().get(lkey).unwrap().pair, None);
}

#[test]
fn accept_reports_failed_handshake() {
    let (inet, _) = inet();
    let task = user();
    let listener = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.listen(&listener, 5).unwrap();
    let lkey = listener.key().unwrap();
    let child = inet.with(|stack| {
        let child = Scripted::incoming(stack, lkey, remote()).unwrap();
        stack.report_error(child, Error::ConnectionReset);
        stack.set_state(child, TcpState::Closed);
        child
    });

    let err = inet.accept(&listener, &task, MsgFlags::empty()).unwrap_err();
    assert_eq!(err, Error::ConnectionReset);
    assert!(inet.lock().get(child).is_none());
}

#[test]
fn connect_nonblocking() {
    let (inet, scripted) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK), Err(Error::InProgress));
    assert_eq!(socket.state(), SocketState::Connecting);
    assert!(inet.lock().get(key).unwrap().port() > 1024);

    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK), Err(Error::Already));

    inet.with(|stack| Scripted::establish(stack, key));
    inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK).unwrap();
    assert_eq!(socket.state(), SocketState::Connected);
    assert_eq!(inet.getname(&socket, true).unwrap(), remote());

    let connects = scripted.events().iter()
        .filter(|event| matches!(event, Event::Connect(..)))
        .count();
    assert_eq!(connects, 1);
}

#[test]
fn connect_reports_latched_error() {
    let (inet, _) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK), Err(Error::InProgress));
    inet.with(|stack| stack.report_error(key, Error::ConnectionRefused));
    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::NONBLOCK), Err(Error::ConnectionRefused));
    assert!(inet.lock().get(key).unwrap().err.is_none());
}

#[test]
fn connect_instant() {
    let (inet, scripted) = inet();
    scripted.instant_connect(true);
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();

    inet.connect(&mut socket, &task, remote(), MsgFlags::empty()).unwrap();
    assert_eq!(socket.state(), SocketState::Connected);
}

#[test]
fn connect_interrupted_then_resumed() {
    let (inet, _) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    inet.interrupt(&task);
    assert_eq!(inet.connect(&mut socket, &task, remote(), MsgFlags::empty()), Err(Error::Interrupted));
    assert_eq!(socket.state(), SocketState::Connecting);
    assert_eq!(inet.lock().get(key).unwrap().state, TcpState::SynSent);

    task.clear_signal();
    inet.with(|stack| Scripted::establish(stack, key));
    inet.connect(&mut socket, &task, remote(), MsgFlags::empty()).unwrap();
    assert_eq!(socket.state(), SocketState::Connected);
}

#[test]
fn shutdown_validation() {
    let (inet, scripted) = inet();
    scripted.instant_connect(true);
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    assert_eq!(inet.shutdown(&mut socket, 3), Err(Error::InvalidArgument));
    assert_eq!(inet.shutdown(&mut socket, 1), Err(Error::NotConnected));

    inet.connect(&mut socket, &task, remote(), MsgFlags::empty()).unwrap();
    inet.shutdown(&mut socket, 1).unwrap();
    assert!(scripted.events().contains(&Event::Shutdown(key, Shutdown::SEND)));
    assert_eq!(inet.lock().get(key).unwrap().shutdown, Shutdown::SEND);

    assert_eq!(inet.send(&socket, &task, b"late", MsgFlags::empty()), Err(Error::BrokenPipe));
}

#[test]
fn getname_of_unconnected_socket() {
    let (inet, _) = inet();
    let socket = inet.create(&user(), SockType::Dgram, 0).unwrap();

    assert_eq!(inet.getname(&socket, true), Err(Error::NotConnected));
    assert_eq!(inet.getname(&socket, false), Ok(SockAddr::new(Ipv4Address::LOOPBACK, 0)));
}

#[test]
fn datagram_round_trip() {
    let (inet, scripted) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Dgram, 0).unwrap();
    socket.set_nonblocking(true);
    let key = socket.key().unwrap();

    assert_eq!(inet.write(&socket, &task, b"hello").unwrap(), 5);
    assert!(scripted.events().contains(&Event::Send(key, 5)));
    let port = inet.getname(&socket, false).unwrap().port;
    assert!(port > 1024);

    let mut buf = [0; 16];
    assert_eq!(inet.read(&socket, &task, &mut buf), Err(Error::WouldBlock));
    assert!(!inet.select(&socket, Select::Read).unwrap());
    assert!(inet.select(&socket, Select::Write).unwrap());

    inet.poll(Instant::from_millis(1_500));
    let tuple = FourTuple {
        local: Ipv4Address::LOOPBACK,
        remote: REMOTE,
        local_port: port,
        remote_port: 40000,
    };
    assert_eq!(inet.deliver(Transport::Udp, tuple, b"world".to_vec()), Delivery::Delivered(key));
    assert!(inet.select(&socket, Select::Read).unwrap());

    let (len, from) = inet.recvfrom(&socket, &task, &mut buf, MsgFlags::PEEK).unwrap();
    assert_eq!(&buf[..len], b"world");
    assert_eq!(from, Some(SockAddr::new(REMOTE, 40000)));
    assert_eq!(inet.recv(&socket, &task, &mut buf, MsgFlags::empty()).unwrap(), 5);
    assert_eq!(inet.lock().get(key).unwrap().rmem_alloc(), 0);

    let mut stamp = [0; 16];
    let cmd = IoctlCommand::SiocGStamp.into();
    assert_eq!(inet.ioctl(&socket, &task, cmd, &mut stamp).unwrap(), 16);
    assert_eq!(NativeEndian::read_i64(&stamp[..8]), 1);
    assert_eq!(NativeEndian::read_i64(&stamp[8..]), 500_000);
}

#[test]
fn data_calls_consume_latched_error() {
    let (inet, _) = inet();
    let task = user();
    let socket = inet.create(&task, SockType::Dgram, 0).unwrap();
    let key = socket.key().unwrap();

    inet.with(|stack| stack.report_error(key, Error::Unreachable));
    assert_eq!(inet.send(&socket, &task, b"x", MsgFlags::empty()), Err(Error::Unreachable));
    assert_eq!(inet.send(&socket, &task, b"x", MsgFlags::empty()), Ok(1));
}

#[test]
fn blocking_send_is_interruptible() {
    let (inet, _) = inet();
    let task = user();
    let socket = inet.create(&task, SockType::Dgram, 0).unwrap();

    let large = vec![0; 40_000];
    inet.interrupt(&task);
    assert_eq!(inet.send(&socket, &task, &large, MsgFlags::empty()), Err(Error::Interrupted));
    assert_eq!(inet.send(&socket, &task, &large, MsgFlags::NONBLOCK), Err(Error::WouldBlock));
}

#[test]
fn socket_owner() {
    let (inet, _) = inet();
    let task = user();
    let socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let set = IoctlCommand::FioSetOwn.into();
    let get = IoctlCommand::SiocGPgrp.into();

    let mut arg = [0; 4];
    NativeEndian::write_i32(&mut arg, 1000);
    assert_eq!(inet.ioctl(&socket, &task, set, &mut arg), Ok(0));
    NativeEndian::write_i32(&mut arg, -1000);
    assert_eq!(inet.ioctl(&socket, &task, set, &mut arg), Ok(0));
    NativeEndian::write_i32(&mut arg, 42);
    assert_eq!(inet.ioctl(&socket, &task, set, &mut arg), Err(Error::PermissionDenied));
    assert_eq!(inet.ioctl(&socket, &root(), set, &mut arg), Ok(0));

    let mut out = [0; 4];
    assert_eq!(inet.ioctl(&socket, &task, get, &mut out), Ok(4));
    assert_eq!(NativeEndian::read_i32(&out), 42);
    assert_eq!(inet.ioctl(&socket, &task, set, &mut [0; 2]), Err(Error::InvalidArgument));

    let setown = FcntlCommand::SetOwner.into();
    let getown = FcntlCommand::GetOwner.into();
    assert_eq!(inet.fcntl(&socket, &task, setown, 7), Err(Error::PermissionDenied));
    assert_eq!(inet.fcntl(&socket, &task, setown, 1000), Ok(0));
    assert_eq!(inet.fcntl(&socket, &task, getown, 0), Ok(1000));
    assert_eq!(inet.fcntl(&socket, &task, 1, 0), Err(Error::InvalidArgument));
}

#[test]
fn ioctl_dispatch() {
    let recorder = Recorder::default();
    let scripted = Arc::new(Scripted::new());
    let inet = Inet::builder()
        .protocol(Transport::Tcp, scripted.clone())
        .control(recorder.clone())
        .build()
        .unwrap();
    let task = user();
    let socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();
    let mut arg = [0; 16];

    assert_eq!(inet.ioctl(&socket, &task, IoctlCommand::SiocGStamp.into(), &mut arg), Err(Error::NotFound));

    for cmd in [0x890b, 0x8954, 0x8961, 0x8913, 0x8931, 0x89f3] {
        assert_eq!(inet.ioctl(&socket, &task, cmd, &mut arg), Ok(0));
    }
    assert_eq!(*recorder.requests.lock(), [
        (ControlTarget::Route, 0x890b),
        (ControlTarget::Arp, 0x8954),
        (ControlTarget::Rarp, 0x8961),
        (ControlTarget::Device, 0x8913),
        (ControlTarget::Device, 0x8931),
        (ControlTarget::Device, 0x89f3),
    ]);

    assert_eq!(inet.ioctl(&socket, &task, Scripted::IOCTL_ECHO, &mut arg), Ok(16));
    assert_eq!(inet.ioctl(&socket, &task, 0x1234, &mut arg), Err(Error::InvalidArgument));
    assert!(scripted.events().contains(&Event::Ioctl(key, 0x1234)));
}

#[test]
fn socket_options() {
    let (inet, _) = inet();
    let socket = inet.create(&user(), SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();

    assert_eq!(get_int(&inet, &socket, SockOpt::ReuseAddr), Ok(0));
    set_int(&inet, &socket, SockOpt::ReuseAddr, 1).unwrap();
    assert_eq!(get_int(&inet, &socket, SockOpt::ReuseAddr), Ok(1));
    set_int(&inet, &socket, SockOpt::KeepAlive, 1).unwrap();
    assert!(inet.lock().get(key).unwrap().keepopen);

    set_int(&inet, &socket, SockOpt::SndBuf, 10).unwrap();
    assert_eq!(get_int(&inet, &socket, SockOpt::SndBuf), Ok(256));
    set_int(&inet, &socket, SockOpt::RcvBuf, 1 << 20).unwrap();
    assert_eq!(get_int(&inet, &socket, SockOpt::RcvBuf), Ok(32767));

    set_int(&inet, &socket, SockOpt::Priority, 2).unwrap();
    assert_eq!(set_int(&inet, &socket, SockOpt::Priority, 3), Err(Error::InvalidArgument));
    assert_eq!(get_int(&inet, &socket, SockOpt::Priority), Ok(2));

    assert_eq!(set_int(&inet, &socket, SockOpt::Debug, 1), Err(Error::PermissionDenied));
    assert_eq!(get_int(&inet, &socket, SockOpt::Type), Ok(1));
    assert_eq!(set_int(&inet, &socket, SockOpt::Type, 2), Err(Error::UnknownOption));
    assert_eq!(set_int(&inet, &socket, SockOpt::Unknown(99), 1), Err(Error::UnknownOption));

    inet.with(|stack| stack.report_error(key, Error::ConnectionReset));
    assert_eq!(get_int(&inet, &socket, SockOpt::Error), Ok(libc::ECONNRESET));
    assert_eq!(get_int(&inet, &socket, SockOpt::Error), Ok(0));

    let mut linger = [0; 8];
    NativeEndian::write_i32(&mut linger[..4], 1);
    NativeEndian::write_i32(&mut linger[4..], 7);
    inet.setsockopt(&socket, &user(), SOL_SOCKET, SockOpt::Linger.into(), &linger).unwrap();
    let mut out = [0; 8];
    assert_eq!(inet.getsockopt(&socket, SOL_SOCKET, SockOpt::Linger.into(), &mut out), Ok(8));
    assert_eq!(out, linger);

    assert_eq!(inet.setsockopt(&socket, &user(), 6, 1, &[0; 4]), Err(Error::NotSupported));
    assert_eq!(inet.getsockopt(&socket, 6, 1, &mut [0; 4]), Err(Error::NotSupported));
}

#[test]
fn release_frees_closed_sock() {
    let (inet, scripted) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.bind(&socket, &task, any(5000)).unwrap();
    let key = socket.key().unwrap();

    inet.release(&mut socket, &task).unwrap();
    assert_eq!(socket.key(), None);
    assert!(scripted.events().contains(&Event::Close { sk: key, dead: false }));

    let stack = inet.lock();
    assert!(stack.get(key).is_none());
    assert_eq!(stack.stats().freed, 1);
    assert_eq!(stack.registry(Transport::Tcp).unwrap().inuse(), 0);
    drop(stack);

    inet.release(&mut socket, &task).unwrap();
}

#[test]
fn release_linger_times_out() {
    let (inet, scripted) = inet();
    scripted.instant_connect(true);
    scripted.graceful_close(true);
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    let key = socket.key().unwrap();
    inet.connect(&mut socket, &task, remote(), MsgFlags::empty()).unwrap();

    let mut linger = [0; 8];
    NativeEndian::write_i32(&mut linger[..4], 1);
    inet.setsockopt(&socket, &task, SOL_SOCKET, SockOpt::Linger.into(), &linger).unwrap();

    assert_eq!(inet.release(&mut socket, &task), Err(Error::TimedOut));
    {
        let stack = inet.lock();
        let sk = stack.get(key).unwrap();
        assert!(sk.dead);
        assert!(!sk.has_waiter());
        assert_eq!(sk.state, TcpState::FinWait1);
    }

    inet.with(|stack| {
        stack.set_state(key, TcpState::Closed);
        stack.release_sock(key);
    });
    assert!(inet.lock().get(key).is_none());
}

#[test]
fn release_of_exiting_task_does_not_linger() {
    let (inet, scripted) = inet();
    scripted.instant_connect(true);
    scripted.graceful_close(true);
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.connect(&mut socket, &task, remote(), MsgFlags::empty()).unwrap();

    let mut linger = [0; 8];
    NativeEndian::write_i32(&mut linger[..4], 1);
    NativeEndian::write_i32(&mut linger[4..], 3600);
    inet.setsockopt(&socket, &task, SOL_SOCKET, SockOpt::Linger.into(), &linger).unwrap();

    task.set_exiting();
    assert_eq!(inet.release(&mut socket, &task), Ok(()));
}

#[test]
fn dup_and_socketpair() {
    let (inet, _) = inet();
    let task = user();
    let socket = inet.create(&task, SockType::Dgram, 17).unwrap();
    let copy = inet.dup(&task, &socket).unwrap();

    assert_ne!(copy.key(), socket.key());
    assert_eq!(copy.kind(), SockType::Dgram);
    assert_eq!(inet.lock().get(copy.key().unwrap()).unwrap().protocol(), 17);
    assert!(inet.socketpair(&task, SockType::Stream).is_err());
}

#[test]
fn calls_on_released_socket() {
    let (inet, _) = inet();
    let task = user();
    let mut socket = inet.create(&task, SockType::Stream, 0).unwrap();
    inet.release(&mut socket, &task).unwrap();

    assert_eq!(inet.bind(&socket, &task, any(0)), Err(Error::BadKey));
    assert_eq!(inet.listen(&socket, 1), Err(Error::BadKey));
    assert_eq!(inet.getname(&socket, false), Err(Error::BadKey));
}
