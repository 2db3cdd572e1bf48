//! UDP transport for DNS queries.
//!
//! Every datagram is handled in its own task so a slow upstream never holds
//! up other clients. Replies go back from the listening socket.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::resolver::Resolver;

use super::{MAX_DNS_PACKET_SIZE, Protocol};

/// UDP listener for the DNS server.
pub struct UdpTransport {
    socket: Rc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Rc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop on the current `LocalSet`.
    pub fn start(self, resolver: Rc<Resolver>) {
        tokio::task::spawn_local(run(self.socket, resolver));
    }
}

async fn run(socket: Rc<UdpSocket>, resolver: Rc<Resolver>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "UDP recv error");
                continue;
            }
        };

        let packet = buf[..len].to_vec();
        tokio::task::spawn_local(handle_datagram(
            socket.clone(),
            resolver.clone(),
            packet,
            src,
        ));
    }
}

async fn handle_datagram(socket: Rc<UdpSocket>, resolver: Rc<Resolver>, packet: Vec<u8>, src: SocketAddr) {
    let Some(response) = resolver.handle(&packet, src, Protocol::Udp).await else {
        return;
    };

    if let Err(e) = socket.send_to(&response, src).await {
        warn!(client = %src, error = %e, "UDP response error");
    }
}
