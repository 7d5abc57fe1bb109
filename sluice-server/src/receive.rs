//! Strategies for reading datagrams from a socket.
//!
//! A worker owns exactly one strategy, chosen once by [`select_strategy`]. The strategy owns all
//! receive buffers, so the datagrams it hands out borrow from it and must be split before the
//! next call to [`ReceiveStrategy::receive`].

use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::split::RawDatagram;

/// Reads datagrams from a socket into reusable buffers.
pub trait ReceiveStrategy: Send {
    /// Name of the system call used, for diagnostics.
    fn syscall(&self) -> &'static str;

    /// Blocks until at least one datagram has been received.
    ///
    /// Returns the number of buffers that were filled. Errors are returned unchanged, the caller
    /// decides which ones are transient.
    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize>;

    /// Returns the datagram in buffer `index` from the last successful receive.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not smaller than the count returned by the last receive.
    fn datagram(&mut self, index: usize) -> RawDatagram<'_>;
}

/// Returns `true` if datagrams can be received in batches on this platform.
pub fn batched_receive_supported() -> bool {
    cfg!(target_os = "linux")
}

/// Picks the receive strategy for a worker.
///
/// Batched receiving is used when `batch_size` is larger than one and the platform supports it.
pub fn select_strategy(batch_size: usize, max_packet_size: usize) -> Box<dyn ReceiveStrategy> {
    #[cfg(target_os = "linux")]
    if batch_size > 1 {
        return Box::new(BatchedReceiver::new(batch_size, max_packet_size));
    }

    #[cfg(not(target_os = "linux"))]
    let _ = batch_size;

    Box::new(SingleReceiver::new(max_packet_size))
}

/// Receives one datagram per `recv_from` call.
#[derive(Debug)]
pub struct SingleReceiver {
    buffer: Box<[u8]>,
    max_packet_size: usize,
    len: usize,
    from: Option<SocketAddr>,
}

impl SingleReceiver {
    /// Creates a receiver for datagrams of up to `max_packet_size` bytes.
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            // One spare byte to detect datagrams that exceed the limit.
            buffer: vec![0; max_packet_size + 1].into_boxed_slice(),
            max_packet_size,
            len: 0,
            from: None,
        }
    }
}

impl ReceiveStrategy for SingleReceiver {
    fn syscall(&self) -> &'static str {
        "recvfrom"
    }

    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize> {
        let (len, from) = socket.recv_from(&mut self.buffer)?;
        self.len = len;
        self.from = Some(from);
        Ok(1)
    }

    fn datagram(&mut self, index: usize) -> RawDatagram<'_> {
        assert_eq!(index, 0, "single receiver holds one datagram");

        RawDatagram {
            payload: &mut self.buffer[..self.len.min(self.max_packet_size)],
            from: self.from,
            truncated: self.len > self.max_packet_size,
        }
    }
}

/// Receives up to a batch of datagrams per `recvmmsg` call.
///
/// All buffers, address slots and message headers are allocated once up front. A call returns as
/// soon as one datagram is available (`MSG_WAITFORONE`), so partial batches are common.
#[cfg(target_os = "linux")]
pub struct BatchedReceiver {
    buffers: Vec<u8>,
    slot_size: usize,
    iovecs: Vec<libc::iovec>,
    addrs: Vec<libc::sockaddr_storage>,
    headers: Vec<libc::mmsghdr>,
    received: usize,
}

// SAFETY: The raw pointers in `iovecs` and `headers` only ever point into `buffers`, `iovecs` and
// `addrs`, which are heap allocations owned by the same value and never resized.
#[cfg(target_os = "linux")]
unsafe impl Send for BatchedReceiver {}

#[cfg(target_os = "linux")]
impl BatchedReceiver {
    /// Creates a receiver for `batch_size` datagrams of up to `max_packet_size` bytes each.
    pub fn new(batch_size: usize, max_packet_size: usize) -> Self {
        let batch_size = batch_size.max(1);

        Self {
            buffers: vec![0; batch_size * max_packet_size],
            slot_size: max_packet_size,
            iovecs: vec![
                libc::iovec {
                    iov_base: std::ptr::null_mut(),
                    iov_len: 0,
                };
                batch_size
            ],
            // SAFETY: sockaddr_storage is a C struct where all-zeros is a valid initial state.
            addrs: vec![unsafe { std::mem::zeroed() }; batch_size],
            // SAFETY: mmsghdr is a C struct where all-zeros is a valid initial state.
            headers: vec![unsafe { std::mem::zeroed() }; batch_size],
            received: 0,
        }
    }

    /// Points every header at its buffer and address slot.
    fn prepare(&mut self) {
        let slots = self.buffers.chunks_exact_mut(self.slot_size);
        let entries = self
            .iovecs
            .iter_mut()
            .zip(self.addrs.iter_mut())
            .zip(self.headers.iter_mut());

        for (slot, ((iovec, addr), header)) in slots.zip(entries) {
            iovec.iov_base = slot.as_mut_ptr().cast();
            iovec.iov_len = slot.len();

            let hdr = &mut header.msg_hdr;
            hdr.msg_name = (addr as *mut libc::sockaddr_storage).cast();
            hdr.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            hdr.msg_iov = iovec;
            hdr.msg_iovlen = 1;
            hdr.msg_control = std::ptr::null_mut();
            hdr.msg_controllen = 0;
            hdr.msg_flags = 0;
            header.msg_len = 0;
        }
    }
}

#[cfg(target_os = "linux")]
impl ReceiveStrategy for BatchedReceiver {
    fn syscall(&self) -> &'static str {
        "recvmmsg"
    }

    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize> {
        use std::os::fd::AsRawFd;

        self.received = 0;
        self.prepare();

        // SAFETY: The socket is valid for the duration of the call, and `prepare` pointed every
        // header at live buffers whose lengths match the iovecs.
        let count = unsafe {
            libc::recvmmsg(
                socket.as_raw_fd(),
                self.headers.as_mut_ptr(),
                self.headers.len() as libc::c_uint,
                libc::MSG_WAITFORONE as _,
                std::ptr::null_mut(),
            )
        };

        if count < 0 {
            return Err(io::Error::last_os_error());
        }

        self.received = count as usize;
        Ok(self.received)
    }

    fn datagram(&mut self, index: usize) -> RawDatagram<'_> {
        assert!(index < self.received, "datagram {index} was not received");

        let header = &self.headers[index];
        let len = (header.msg_len as usize).min(self.slot_size);
        let truncated = header.msg_hdr.msg_flags & libc::MSG_TRUNC != 0;
        let from = sockaddr_to_socket_addr(&self.addrs[index]);

        let start = index * self.slot_size;
        RawDatagram {
            payload: &mut self.buffers[start..start + len],
            from,
            truncated,
        }
    }
}

/// Converts a raw address filled in by the kernel.
///
/// Returns `None` for address families other than IPv4 and IPv6.
#[cfg(target_os = "linux")]
fn sockaddr_to_socket_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            // SAFETY: ss_family == AF_INET guarantees the storage contains a valid sockaddr_in,
            // which is layout-compatible with sockaddr_storage.
            let sin =
                unsafe { &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>() };
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(
                ip,
                u16::from_be(sin.sin_port),
            )))
        }
        libc::AF_INET6 => {
            // SAFETY: ss_family == AF_INET6 guarantees the storage contains a valid sockaddr_in6,
            // which is layout-compatible with sockaddr_storage.
            let sin6 =
                unsafe { &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in6>() };
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}
