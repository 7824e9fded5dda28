//! # Simulator Commands
//!
//! Forwards panel tokens to DCS-BIOS as plain-text UDP datagrams.
//!
//! DCS-BIOS accepts one command per datagram in the form `<CONTROL> <ARG>\n`,
//! which is exactly what the panels send, so tokens pass through unchanged.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::display::InboundHandler;
use crate::error::{BridgeError, Result};

/// UDP sender for simulator-bound commands
#[derive(Debug)]
pub struct SimCommandSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl SimCommandSender {
    /// Bind an ephemeral local socket for sending to `target`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Network`] if no socket can be bound
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| BridgeError::Network(format!("Failed to bind command socket: {}", e)))?;
        info!("Sending simulator commands to {}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one command, newline terminated
    pub async fn send(&self, command: &str) -> Result<()> {
        let datagram = format!("{}\n", command);
        self.socket
            .send_to(datagram.as_bytes(), self.target)
            .await
            .map_err(|e| BridgeError::Network(format!("Failed to send '{}': {}", command, e)))?;
        debug!("-> {}: {}", self.target, command);
        Ok(())
    }
}

#[async_trait]
impl InboundHandler for SimCommandSender {
    async fn handle(&mut self, line: &str) -> Result<()> {
        self.send(line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_appends_newline() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();
        let sender = SimCommandSender::bind(target).await.unwrap();

        sender.send("UFC_COM1 1").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"UFC_COM1 1\n");
    }

    #[tokio::test]
    async fn test_handle_forwards_line() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sender = SimCommandSender::bind(receiver.local_addr().unwrap()).await.unwrap();

        tokio_test::assert_ok!(sender.handle("ICP_BTN_6 1").await);

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"ICP_BTN_6 1\n");
    }

    #[tokio::test]
    async fn test_target_is_kept() {
        let target: SocketAddr = "127.0.0.1:7778".parse().unwrap();
        let sender = SimCommandSender::bind(target).await.unwrap();
        assert_eq!(sender.target(), target);
    }
}
