//! Echo server: answers every Ping with a Pong over the configured transport.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use openssl::ssl::SslAcceptor;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::issue_certificate::common_name;
use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::storage::ArtifactStore;
use crate::tls_endpoint::{server_acceptor, TransportSecurity};

pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EchoServer {
    listener: TcpListener,
    acceptor: Option<SslAcceptor>,
}

impl EchoServer {
    /// Bind the listener. With [`TransportSecurity::MutualTls`] the server
    /// artifacts are loaded now, so a broken chain fails at startup rather than
    /// on the first connection.
    pub fn bind(
        addr: impl ToSocketAddrs,
        security: TransportSecurity,
        store: &ArtifactStore,
    ) -> Result<Self> {
        let acceptor = match security {
            TransportSecurity::MutualTls => Some(server_acceptor(store)?),
            TransportSecurity::Insecure => {
                warn!("starting the server in insecure mode, TLS is disabled");
                None
            }
        };
        let listener = TcpListener::bind(addr)?;
        info!(address = %listener.local_addr()?, "listening");
        Ok(Self { listener, acceptor })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails. A failing connection is
    /// logged and does not stop the loop.
    pub fn serve(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("rejected connection: {e}");
                    }
                }
                Err(e) => warn!("error accepting connection: {e}"),
            }
        }
        Ok(())
    }

    /// Accept and answer a single connection, returning its outcome.
    pub fn handle_next(&self) -> Result<()> {
        let (stream, _) = self.listener.accept()?;
        self.handle_connection(stream)
    }

    fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let peer = stream.peer_addr()?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        match &self.acceptor {
            Some(acceptor) => {
                let mut tls = acceptor
                    .accept(stream)
                    .map_err(|e| Error::Handshake(format!("{peer}: {e}")))?;
                let client_name = tls
                    .ssl()
                    .peer_certificate()
                    .and_then(|cert| common_name(cert.subject_name()));
                debug!(%peer, client = ?client_name, "mutual TLS handshake complete");
                answer(&mut tls)?;
                let _ = tls.shutdown();
            }
            None => {
                let mut stream = stream;
                answer(&mut stream)?;
            }
        }
        Ok(())
    }
}

fn answer<S: Read + Write>(stream: &mut S) -> Result<()> {
    let request: Request = read_frame(stream)?;
    match request {
        Request::Ping => {
            info!("received a PING");
            write_frame(stream, &Response::Pong)
        }
    }
}
