//! `matchcue-osc` — OSC-over-UDP implementation of the device transport.
//!
//! Show devices (lighting desks, sound rigs) listen for OSC messages on UDP.
//! One socket is bound at startup and shared for every device; a send is a
//! single datagram, so the transport is naturally bounded-time and never
//! stalls the scheduler's poll loop.

use std::net::SocketAddr;

use async_trait::async_trait;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tracing::trace;

use matchcue_core::{Transport, TransportError};

// ─── OscTransport ─────────────────────────────────────────────────────────

pub struct OscTransport {
    socket: UdpSocket,
}

impl OscTransport {
    /// Bind the shared sending socket on an ephemeral port.
    pub async fn bind() -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for OscTransport {
    async fn send(
        &self,
        target: SocketAddr,
        message: &str,
        args: &[String],
    ) -> Result<(), TransportError> {
        let packet = OscPacket::Message(OscMessage {
            addr: message.to_string(),
            args: args.iter().map(|a| OscType::String(a.clone())).collect(),
        });
        let bytes = encoder::encode(&packet).map_err(|e| TransportError::Encode {
            message: message.to_string(),
            reason: e.to_string(),
        })?;

        self.socket
            .send_to(&bytes, target)
            .await
            .map_err(|source| TransportError::Send {
                addr: target,
                source,
            })?;
        trace!(%target, message, "sent OSC message");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
