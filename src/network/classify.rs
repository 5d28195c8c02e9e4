use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// A live host that accepted a connection on one of the candidate ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub ip: Ipv4Addr,

    /// First candidate port that accepted
    pub port: u16,
}

impl Candidate {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

/// Try each port in order and report the first one that accepts a connection.
///
/// Any open port is taken as evidence of a managed device; nothing confirms it
/// afterwards.
pub async fn classify_host(ip: Ipv4Addr, ports: &[u16], per_port: Duration) -> Option<Candidate> {
    for &port in ports {
        match timeout(per_port, TcpStream::connect((ip, port))).await {
            Ok(Ok(_stream)) => {
                trace!("{ip}:{port} accepted");
                return Some(Candidate { ip, port });
            }
            Ok(Err(e)) => trace!("{ip}:{port} refused: {e}"),
            Err(_) => trace!("{ip}:{port} timed out"),
        }
    }
    None
}
