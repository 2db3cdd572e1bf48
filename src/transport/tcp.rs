//! TCP transport for DNS queries.
//!
//! Each client connection is handled independently and may carry any number
//! of queries. Messages in both directions carry a 2-byte length prefix.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::resolver::Resolver;

use super::{Protocol, read_frame, write_frame};

/// TCP listener for the DNS server.
///
/// Each connection is handled in a separate task.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop on the current `LocalSet`.
    pub fn start(self, resolver: Rc<Resolver>) {
        tokio::task::spawn_local(run_accept_loop(self.listener, resolver));
    }
}

/// Accept loop - spawns a handler task for each incoming connection.
async fn run_accept_loop(listener: TcpListener, resolver: Rc<Resolver>) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::task::spawn_local(handle_connection(client, peer, resolver.clone()));
            }
            Err(e) => {
                warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Serve framed queries on one connection until the client hangs up.
async fn handle_connection(mut client: TcpStream, peer: SocketAddr, resolver: Rc<Resolver>) {
    loop {
        let query = match read_frame(&mut client).await {
            Ok(Some(query)) => query,
            Ok(None) => return,
            Err(e) => {
                debug!(client = %peer, error = %e, "TCP read error");
                return;
            }
        };

        let Some(response) = resolver.handle(&query, peer, Protocol::Tcp).await else {
            continue;
        };

        if let Err(e) = write_frame(&mut client, &response).await {
            debug!(client = %peer, error = %e, "TCP write error");
            return;
        }
    }
}
