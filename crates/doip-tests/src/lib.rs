//! End-to-end tests for the DoIP channel engine
//!
//! Starts a [`DoIpServer`] on an ephemeral loopback port and talks to it
//! with a minimal tester client over real TCP sockets.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p doip-tests
//! ```
//!
//! # Test Structure
//!
//! - `tcp_e2e.rs` - routing activation, diagnostic round trips, header
//!   rejection and inactivity timeouts against a live server

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doip_transport::uds::mock::MockTransportMgr;
use doip_transport::wire::HEADER_LENGTH;
use doip_transport::{DoIpConfig, DoIpMessage, DoIpServer, PayloadType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default time to wait for a server response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Config bound to an ephemeral loopback port
pub fn loopback_config() -> DoIpConfig {
    let mut config = DoIpConfig::default();
    config.tcp.ip_address = "127.0.0.1".parse().expect("loopback address");
    config.tcp.port = 0;
    config
}

/// Running server together with its recording transport manager
pub struct TestServer {
    pub server: DoIpServer,
    pub mgr: Arc<MockTransportMgr>,
}

impl TestServer {
    pub async fn start(config: DoIpConfig) -> Self {
        let mgr = Arc::new(MockTransportMgr::new());
        let server = DoIpServer::start(config, 1, mgr.clone())
            .await
            .expect("server starts");
        Self { server, mgr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub async fn connect(&self) -> TesterClient {
        TesterClient::connect(self.addr())
            .await
            .expect("tester connects")
    }
}

/// Minimal DoIP tester speaking raw frames
pub struct TesterClient {
    stream: TcpStream,
}

impl TesterClient {
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    pub async fn send(&mut self, message: &DoIpMessage) -> io::Result<()> {
        let bytes = message.to_bytes();
        self.stream.write_all(&bytes).await
    }

    /// Read one complete frame
    pub async fn read_message(&mut self, timeout: Duration) -> io::Result<DoIpMessage> {
        tokio::time::timeout(timeout, async {
            let mut header = [0u8; HEADER_LENGTH];
            self.stream.read_exact(&mut header).await?;
            let mut message = DoIpMessage::default();
            message.fill_header(&header);
            message.payload = vec![0u8; message.payload_length as usize];
            self.stream.read_exact(&mut message.payload).await?;
            Ok(message)
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no response from server"))?
    }

    /// Wait until the server closes the connection
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        let mut buf = [0u8; 64];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Request routing activation and return the response frame
    pub async fn activate(&mut self, source_address: u16) -> io::Result<DoIpMessage> {
        self.send(&routing_activation_request(source_address)).await?;
        self.read_message(RESPONSE_TIMEOUT).await
    }

    pub async fn send_diagnostic(
        &mut self,
        source_address: u16,
        target_address: u16,
        uds: &[u8],
    ) -> io::Result<()> {
        self.send(&diagnostic_message(source_address, target_address, uds))
            .await
    }
}

pub fn routing_activation_request(source_address: u16) -> DoIpMessage {
    let mut payload = source_address.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0x00, 0, 0, 0, 0]);
    DoIpMessage::new(PayloadType::RoutingActivationRequest, payload)
}

pub fn diagnostic_message(source_address: u16, target_address: u16, uds: &[u8]) -> DoIpMessage {
    let mut payload = source_address.to_be_bytes().to_vec();
    payload.extend_from_slice(&target_address.to_be_bytes());
    payload.extend_from_slice(uds);
    DoIpMessage::new(PayloadType::DiagnosticMessage, payload)
}
