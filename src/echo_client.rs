//! Echo client: sends one Ping and waits for the Pong.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use openssl::ssl::SslConnector;
use tracing::{debug, info};

use crate::echo_server::IO_TIMEOUT;
use crate::error::{Error, Result};
use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::storage::ArtifactStore;
use crate::tls_endpoint::{client_connector, TransportSecurity};

pub struct EchoClient {
    connector: Option<SslConnector>,
    server_name: String,
}

impl EchoClient {
    /// Load the client artifacts (unless insecure) and remember the name the
    /// server certificate must carry.
    pub fn new(
        security: TransportSecurity,
        store: &ArtifactStore,
        server_name: impl Into<String>,
    ) -> Result<Self> {
        let connector = match security {
            TransportSecurity::MutualTls => Some(client_connector(store)?),
            TransportSecurity::Insecure => None,
        };
        Ok(Self::from_connector(connector, server_name))
    }

    /// Use a pre-built connector; `None` means plain TCP.
    pub fn from_connector(connector: Option<SslConnector>, server_name: impl Into<String>) -> Self {
        Self {
            connector,
            server_name: server_name.into(),
        }
    }

    pub fn ping(&self, addr: impl ToSocketAddrs) -> Result<Response> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let response = match &self.connector {
            Some(connector) => {
                let mut tls = connector
                    .connect(&self.server_name, stream)
                    .map_err(|e| Error::Handshake(e.to_string()))?;
                debug!(server_name = %self.server_name, "TLS handshake complete");
                let response = exchange(&mut tls)?;
                let _ = tls.shutdown();
                response
            }
            None => {
                let mut stream = stream;
                exchange(&mut stream)?
            }
        };
        info!("sent a ping, received {response:?}");
        Ok(response)
    }
}

fn exchange<S: Read + Write>(stream: &mut S) -> Result<Response> {
    write_frame(stream, &Request::Ping)?;
    read_frame(stream)
}
