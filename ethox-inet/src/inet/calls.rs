use crate::error::{Error, Result};
use crate::iface::AddrClass;
use crate::proto::{Select, Transport};
use crate::sock::{MsgFlags, Shutdown, SockType, TcpState, WaitQueue};
use crate::task::Task;
use crate::wire::{Ipv4Address, SockAddr};
use super::{autobind, sleep, sleep_until, Inet, Socket, SocketState};

impl Inet {
    /// Create a socket of a type, optionally naming its protocol.
    pub fn create(&self, task: &Task, kind: SockType, protocol: u16) -> Result<Socket> {
        let wait = WaitQueue::new();
        let key = self.stack.lock()
            .create_sock(task, kind, protocol, Some(wait.clone()))?;
        Ok(Socket::attached(kind, key, wait))
    }

    /// Create a fresh socket of the same type and protocol.
    pub fn dup(&self, task: &Task, sock: &Socket) -> Result<Socket> {
        let key = sock.sock()?;
        let protocol = self.stack.lock()
            .get(key)
            .ok_or(Error::BadKey)?
            .protocol();
        self.create(task, sock.kind, protocol)
    }

    /// Connected socket pairs are not offered by this family.
    pub fn socketpair(&self, _: &Task, _: SockType) -> Result<(Socket, Socket)> {
        Err(Error::NotSupported)
    }

    /// Detach the socket from its sock and close it.
    ///
    /// With a linger time set (and the task not exiting), waits while the transport is still
    /// closing, for at most the linger time. The sock is marked dead in any case and is destroyed
    /// once closed and drained. An interrupted or timed out linger is reported after the release
    /// completed.
    pub fn release(&self, sock: &mut Socket, task: &Task) -> Result<()> {
        let key = match sock.data.take() {
            Some(key) => key,
            None => return Ok(()),
        };
        sock.state = SocketState::Unconnected;

        let mut stack = self.stack.lock();
        let ops = stack.ops(key)?;
        stack.state_change(key);
        let linger = stack.get(key).and_then(|sk| sk.linger);
        ops.close(&mut stack, key);

        let mut result = Ok(());
        if let Some(linger) = linger.filter(|_| !task.is_exiting()) {
            let deadline = std::time::Instant::now() + linger;
            while stack.get(key).map_or(false, |sk| sk.state.is_closing()) {
                match sleep_until(&mut stack, &sock.wait, task, deadline) {
                    Ok(false) => continue,
                    Ok(true) => {
                        result = Err(Error::TimedOut);
                        break;
                    },
                    Err(err) => {
                        result = Err(err);
                        break;
                    },
                }
            }
        }

        if let Some(sk) = stack.get_mut(key) {
            sk.dead = true;
            sk.inuse = true;
            sk.wait = None;
        }
        stack.release_sock(key);
        net_debug!("inet: released {:?}", key);
        result
    }

    /// Assign a local address and port.
    ///
    /// Port 0 picks an ephemeral port. Raw sockets only record the local address.
    pub fn bind(&self, sock: &Socket, task: &Task, addr: SockAddr) -> Result<()> {
        let key = sock.sock()?;
        let class = self.addresses.classify(addr.addr);
        let mut stack = self.stack.lock();

        let sk = stack.get(key).ok_or(Error::BadKey)?;
        if sk.state != TcpState::Closed {
            return Err(Error::Io);
        }

        let transport = sk.transport();
        let raw = matches!(transport, Transport::Raw | Transport::Packet);
        let reuse = sk.reuse;
        if !raw && sk.port() != 0 {
            return Err(Error::InvalidArgument);
        }

        let mut port = addr.port;
        if !raw {
            if port == 0 {
                port = stack.allocate_port(transport, 0)?;
            }

            if port < stack.config().reserved_ports && !task.is_privileged() {
                return Err(Error::PermissionDenied);
            }
        }

        if !addr.addr.is_unspecified() && !matches!(class, AddrClass::Local | AddrClass::Multicast) {
            return Err(Error::AddrNotAvailable);
        }

        if raw {
            // Raw socks stay under their protocol number, relinked so the bucket keeps
            // specific addresses first.
            let linked = stack.unregister(key);
            let sk = stack.get_mut(key).ok_or(Error::BadKey)?;
            sk.saddr = addr.addr;
            let protocol = sk.num;
            if linked {
                stack.register(key, protocol)?;
            }
            return Ok(());
        }

        let registry = stack.registry(transport).ok_or(Error::ProtocolNotSupported)?;
        for &other in registry.bucket(port) {
            let sk2 = match stack.get(other) {
                Some(sk2) if other != key && sk2.port() == port => sk2,
                _ => continue,
            };

            if !reuse {
                return Err(Error::AddrInUse);
            }

            if sk2.saddr != addr.addr {
                continue;
            }

            if !sk2.reuse || sk2.state == TcpState::Listen {
                return Err(Error::AddrInUse);
            }
        }

        stack.unregister(key);
        if let Some(sk) = stack.get_mut(key) {
            sk.saddr = addr.addr;
            sk.daddr = Ipv4Address::UNSPECIFIED;
            sk.dport = 0;
        }
        stack.register(key, port)?;
        net_debug!("inet: bound {:?} to {}:{}", key, addr.addr, port);
        Ok(())
    }

    /// Accept connections, with at most `backlog` pending.
    pub fn listen(&self, sock: &Socket, backlog: i32) -> Result<()> {
        let key = sock.sock()?;
        let mut stack = self.stack.lock();
        autobind(&mut stack, key).map_err(|_| Error::WouldBlock)?;

        let max = stack.config().max_backlog;
        let backlog = u32::try_from(backlog)
            .ok()
            .filter(|&backlog| backlog <= max)
            .unwrap_or(max);

        let sk = stack.get_mut(key).ok_or(Error::BadKey)?;
        sk.max_ack_backlog = backlog;
        if sk.state != TcpState::Listen {
            sk.ack_backlog = 0;
            stack.set_state(key, TcpState::Listen);
        }
        Ok(())
    }

    /// Connect to a remote endpoint.
    ///
    /// A blocking connect waits for the handshake to finish. A non-blocking one returns
    /// `InProgress`, and later calls report `Already` until the connection completed or failed.
    pub fn connect(&self, sock: &mut Socket, task: &Task, addr: SockAddr, flags: MsgFlags) -> Result<()> {
        let key = sock.sock()?;
        let nonblock = sock.nonblock(flags);
        let mut stack = self.stack.lock();

        let sk = stack.get(key).ok_or(Error::BadKey)?;
        let transport = sk.transport();
        if sock.state == SocketState::Connecting && sk.state.is_connected() {
            sock.state = SocketState::Connected;
            return Ok(());
        }

        if sock.state == SocketState::Connecting && transport == Transport::Tcp && nonblock {
            return Err(stack.take_error(key).unwrap_or(Error::Already));
        }

        if sock.state != SocketState::Connecting {
            autobind(&mut stack, key).map_err(|_| Error::WouldBlock)?;
            let ops = stack.ops(key)?;
            ops.connect(&mut stack, key, addr)?;
            sock.state = SocketState::Connecting;
        }

        let state = stack.get(key).ok_or(Error::BadKey)?.state;
        if state.past_fin_wait2() {
            sock.state = SocketState::Unconnected;
            return Err(stack.take_error(key).unwrap_or(Error::NotConnected));
        }

        if state != TcpState::Established && nonblock {
            return Err(Error::InProgress);
        }

        while stack.get(key).map_or(false, |sk| sk.state.is_handshake()) {
            sleep(&mut stack, &sock.wait, task)?;
            if transport == Transport::Tcp {
                if let Some(err) = stack.take_error(key) {
                    sock.state = SocketState::Unconnected;
                    return Err(err);
                }
            }
        }

        sock.state = SocketState::Connected;
        if stack.get(key).map_or(true, |sk| sk.state != TcpState::Established) {
            if let Some(err) = stack.take_error(key) {
                sock.state = SocketState::Unconnected;
                return Err(err);
            }
        }

        Ok(())
    }

    /// Take the next connection of a listening socket into a new socket.
    pub fn accept(&self, sock: &Socket, task: &Task, flags: MsgFlags) -> Result<Socket> {
        let mut newsock = Socket::unattached(sock.kind);
        newsock.nonblocking = sock.nonblocking;
        self.accept_into(sock, &mut newsock, task, flags)?;
        Ok(newsock)
    }

    /// Take the next connection of a listening socket into `newsock`.
    ///
    /// A sock already attached to `newsock` is discarded. A connection taken from the transport
    /// whose handshake is interrupted is kept on the listener and handed out by the next call.
    pub fn accept_into(&self, sock: &Socket, newsock: &mut Socket, task: &Task, flags: MsgFlags)
        -> Result<()>
    {
        if let Some(placeholder) = newsock.data.take() {
            let mut stack = self.stack.lock();
            if let Some(sk) = stack.get_mut(placeholder) {
                sk.dead = true;
                sk.wait = None;
                stack.destroy(placeholder);
            }
        }
        newsock.state = SocketState::Unconnected;

        let key = sock.sock()?;
        let nonblock = sock.nonblock(flags);
        let mut stack = self.stack.lock();
        let ops = stack.ops(key)?;

        let pending = stack.get_mut(key).ok_or(Error::BadKey)?.pair.take();
        let child = match pending {
            Some(child) => child,
            None => loop {
                if let Some(child) = ops.accept(&mut stack, key, flags)? {
                    break child;
                }

                if let Some(err) = stack.take_error(key) {
                    return Err(err);
                }

                if nonblock {
                    return Err(Error::WouldBlock);
                }

                sleep(&mut stack, &sock.wait, task)?;
            },
        };

        match stack.get_mut(child) {
            Some(sk) => sk.wait = Some(newsock.wait.clone()),
            None => return Err(Error::BadKey),
        }
        newsock.data = Some(child);

        if nonblock {
            return Ok(());
        }

        while stack.get(child).map_or(false, |sk| sk.state == TcpState::SynRecv) {
            if let Err(err) = sleep(&mut stack, &newsock.wait, task) {
                if let Some(sk) = stack.get_mut(child) {
                    sk.wait = None;
                }
                if let Some(sk) = stack.get_mut(key) {
                    sk.pair = Some(child);
                }
                newsock.data = None;
                return Err(err);
            }
        }

        let state = match stack.get(child) {
            Some(sk) => sk.state,
            None => {
                newsock.data = None;
                return Err(Error::BadKey);
            }
        };
        if state != TcpState::Established {
            if let Some(err) = stack.take_error(child) {
                if let Some(sk) = stack.get_mut(child) {
                    sk.dead = true;
                    sk.wait = None;
                }
                stack.destroy(child);
                newsock.data = None;
                return Err(err);
            }
        }

        newsock.state = SocketState::Connected;
        net_debug!("inet: accepted {:?} on {:?}", child, key);
        Ok(())
    }

    /// The local (`peer == false`) or remote address of the socket.
    ///
    /// The remote address requires a connected transport. An unbound local address is reported as
    /// the host's primary address.
    pub fn getname(&self, sock: &Socket, peer: bool) -> Result<SockAddr> {
        let key = sock.sock()?;
        let stack = self.stack.lock();
        let sk = stack.get(key).ok_or(Error::BadKey)?;

        if peer {
            if !sk.state.is_connected() {
                return Err(Error::NotConnected);
            }
            return Ok(SockAddr::new(sk.daddr, sk.dport));
        }

        let addr = if sk.saddr.is_unspecified() {
            self.addresses.primary()
        } else {
            sk.saddr
        };
        let port = match sk.transport() {
            Transport::Raw | Transport::Packet => 0,
            _ => sk.port(),
        };
        Ok(SockAddr::new(addr, port))
    }

    /// Shut down receiving (0), sending (1) or both (2).
    pub fn shutdown(&self, sock: &mut Socket, how: i32) -> Result<()> {
        let how = Shutdown::from_how(how)?;
        let key = sock.sock()?;
        let mut stack = self.stack.lock();

        let state = stack.get(key).ok_or(Error::BadKey)?.state;
        if sock.state == SocketState::Connecting && state == TcpState::Established {
            sock.state = SocketState::Connected;
        }

        if !state.is_connected() {
            return Err(Error::NotConnected);
        }

        let ops = stack.ops(key)?;
        if let Some(sk) = stack.get_mut(key) {
            sk.shutdown |= how;
        }
        ops.shutdown(&mut stack, key, how);
        Ok(())
    }

    /// Send data, to `to` or the connected peer.
    ///
    /// Blocks while the transport reports no send buffer space.
    pub fn sendto(&self, sock: &Socket, task: &Task, data: &[u8], flags: MsgFlags, to: Option<SockAddr>)
        -> Result<usize>
    {
        let key = sock.sock()?;
        let nonblock = sock.nonblock(flags);
        let mut stack = self.stack.lock();

        if stack.get(key).ok_or(Error::BadKey)?.shutdown.contains(Shutdown::SEND) {
            return Err(Error::BrokenPipe);
        }

        if let Some(err) = stack.take_error(key) {
            return Err(err);
        }

        autobind(&mut stack, key).map_err(|_| Error::WouldBlock)?;
        let ops = stack.ops(key)?;
        loop {
            match ops.sendto(&mut stack, key, data, flags, to) {
                Err(Error::WouldBlock) if !nonblock => sleep(&mut stack, &sock.wait, task)?,
                result => return result,
            }
        }
    }

    pub fn send(&self, sock: &Socket, task: &Task, data: &[u8], flags: MsgFlags) -> Result<usize> {
        self.sendto(sock, task, data, flags, None)
    }

    pub fn write(&self, sock: &Socket, task: &Task, data: &[u8]) -> Result<usize> {
        self.sendto(sock, task, data, MsgFlags::empty(), None)
    }

    /// Receive data and the address it came from.
    ///
    /// Blocks until the transport has data or reports the end of the stream.
    pub fn recvfrom(&self, sock: &Socket, task: &Task, buf: &mut [u8], flags: MsgFlags)
        -> Result<(usize, Option<SockAddr>)>
    {
        let key = sock.sock()?;
        let nonblock = sock.nonblock(flags);
        let mut stack = self.stack.lock();

        if let Some(err) = stack.take_error(key) {
            return Err(err);
        }

        autobind(&mut stack, key).map_err(|_| Error::WouldBlock)?;
        let ops = stack.ops(key)?;
        loop {
            match ops.recvfrom(&mut stack, key, buf, flags) {
                Err(Error::WouldBlock) if !nonblock => sleep(&mut stack, &sock.wait, task)?,
                result => return result,
            }
        }
    }

    pub fn recv(&self, sock: &Socket, task: &Task, buf: &mut [u8], flags: MsgFlags) -> Result<usize> {
        self.recvfrom(sock, task, buf, flags).map(|(len, _)| len)
    }

    pub fn read(&self, sock: &Socket, task: &Task, buf: &mut [u8]) -> Result<usize> {
        self.recv(sock, task, buf, MsgFlags::empty())
    }

    /// Poll readiness, as reported by the transport.
    pub fn select(&self, sock: &Socket, kind: Select) -> Result<bool> {
        let key = sock.sock()?;
        let stack = self.stack.lock();
        let ops = stack.ops(key)?;
        Ok(ops.select(&stack, key, kind))
    }
}
