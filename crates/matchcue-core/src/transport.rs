use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::TransportError;

/// Capability to deliver a formatted command to a show device.
///
/// Implementations must complete in bounded time (a non-blocking datagram or
/// a send with a timeout) so dispatch never stalls the poll loop. Sends are
/// fire-and-log: the scheduler never retries a failed send.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        target: SocketAddr,
        message: &str,
        args: &[String],
    ) -> Result<(), TransportError>;
}
