use std::io;
use std::net::{Shutdown, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

/// Options applied to a sampler socket before it is bound.
#[derive(Clone, Debug, Default)]
pub struct SocketOptions {
    /// Sets `SO_REUSEPORT`, so that several sockets can bind the same address.
    ///
    /// Only honored where [`reuse_port_supported`] returns `true`.
    pub reuse_port: bool,
    /// Size of the kernel receive buffer (`SO_RCVBUF`). The system default if `None`.
    pub recv_buffer_size: Option<usize>,
    /// Maximum time a receive call blocks before returning a timeout (`SO_RCVTIMEO`).
    ///
    /// Bounds how long a worker can miss a shutdown request.
    pub wake_interval: Option<Duration>,
}

/// Returns `true` if the platform supports `SO_REUSEPORT`.
pub fn reuse_port_supported() -> bool {
    cfg!(all(
        unix,
        not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
    ))
}

/// Creates a UDP socket with the given options and binds it to `addr`.
pub fn bind_socket(addr: SocketAddr, options: &SocketOptions) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    #[cfg(all(
        unix,
        not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
    ))]
    if options.reuse_port {
        socket.set_reuse_port(true)?;
    }

    if let Some(size) = options.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }

    socket.set_read_timeout(options.wake_interval)?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

/// Unblocks all threads parked in a receive call on this socket.
///
/// Shuts down the read half. Receives return immediately afterwards, so this must only be called
/// once the socket is no longer needed.
pub fn wake(socket: &UdpSocket) {
    // Unconnected sockets report `ENOTCONN` but still wake up readers.
    SockRef::from(socket).shutdown(Shutdown::Read).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_bind_ephemeral() {
        let options = SocketOptions {
            recv_buffer_size: Some(1 << 16),
            wake_interval: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let socket = bind_socket(localhost(), &options).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
        assert_eq!(
            socket.read_timeout().unwrap(),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_reuse_port() {
        let options = SocketOptions {
            reuse_port: true,
            ..Default::default()
        };

        let first = bind_socket(localhost(), &options).unwrap();
        let addr = first.local_addr().unwrap();
        let second = bind_socket(addr, &options).unwrap();

        assert_eq!(second.local_addr().unwrap(), addr);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_wake_blocked_receiver() {
        let socket = bind_socket(localhost(), &SocketOptions::default()).unwrap();
        let reader = socket.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0; 16];
            reader.recv(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(50));
        wake(&socket);

        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }
}
