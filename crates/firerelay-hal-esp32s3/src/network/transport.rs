use alloc::{boxed::Box, ffi::CString, vec, vec::Vec};

use embassy_net::{Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_time::Duration;
use embedded_io_async::{Read, Write};
use firerelay_core::rtdb::RestTransport;
use log::{debug, warn};
use mbedtls_rs::{Certificates, Mode, TlsReference, TlsVersion, asynch::Session};

use super::{HTTPS_PORT, RESPONSE_MAX_BYTES, SOCKET_RX_BYTES, SOCKET_TX_BYTES, SOCKET_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportError {
    Dns,
    Connect,
    /// Verification was requested but no trust anchors are provisioned.
    NoTrustAnchors,
    Handshake,
    Write,
    Read,
    ResponseTooLarge,
}

/// One HTTPS request per connection, closed by the peer after the response.
pub struct TlsTransport<'d> {
    stack: Stack<'d>,
    tls: TlsReference<'d>,
    verify_peer: bool,
    timeout: Duration,
    rx_buffer: Box<[u8]>,
    tx_buffer: Box<[u8]>,
}

impl<'d> TlsTransport<'d> {
    pub fn new(stack: Stack<'d>, tls: TlsReference<'d>) -> Self {
        Self {
            stack,
            tls,
            verify_peer: true,
            timeout: Duration::from_millis(SOCKET_TIMEOUT_MS),
            rx_buffer: vec![0u8; SOCKET_RX_BYTES].into_boxed_slice(),
            tx_buffer: vec![0u8; SOCKET_TX_BYTES].into_boxed_slice(),
        }
    }

    /// Accept any server certificate.
    pub fn set_insecure(&mut self) {
        self.verify_peer = false;
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout = Duration::from_millis(timeout_ms);
    }
}

impl RestTransport for TlsTransport<'_> {
    type Error = TransportError;

    async fn round_trip(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut Vec<u8>,
    ) -> Result<(), Self::Error> {
        if self.verify_peer {
            return Err(TransportError::NoTrustAnchors);
        }

        let address = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|err| {
                warn!("dns lookup for {} failed: {:?}", host, err);
                TransportError::Dns
            })?
            .first()
            .copied()
            .ok_or(TransportError::Dns)?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);
        socket.set_timeout(Some(self.timeout));
        socket
            .connect((address, HTTPS_PORT))
            .await
            .map_err(|err| {
                warn!("connect to {} failed: {:?}", host, err);
                TransportError::Connect
            })?;

        let servername = CString::new(host).map_err(|_| TransportError::Handshake)?;
        let mut session = Session::new(
            &mut socket,
            Mode::Client {
                servername: servername.as_c_str(),
            },
            TlsVersion::Tls1_2,
            Certificates::default(),
            self.tls,
        )
        .map_err(|_| TransportError::Handshake)?;
        session.connect().await.map_err(|err| {
            warn!("tls handshake with {} failed: {:?}", host, err);
            TransportError::Handshake
        })?;

        session
            .write_all(request)
            .await
            .map_err(|_| TransportError::Write)?;
        session.flush().await.map_err(|_| TransportError::Write)?;

        let mut chunk = [0u8; 512];
        loop {
            match session.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => {
                    if response.len() + read > RESPONSE_MAX_BYTES {
                        return Err(TransportError::ResponseTooLarge);
                    }
                    response.extend_from_slice(&chunk[..read]);
                }
                // Servers often drop the connection without close_notify.
                Err(_) if !response.is_empty() => break,
                Err(_) => return Err(TransportError::Read),
            }
        }

        debug!("{} answered with {} bytes", host, response.len());
        Ok(())
    }
}
