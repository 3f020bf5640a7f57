use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use native_tls::{TlsConnector, TlsStream};
use tracing::trace;

use crate::{
    error::{NetError, NetResult},
    types::{NetOptions, Scheme},
};

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Blocking transport over plain TCP or TLS, selected by scheme.
pub struct Socket {
    transport: Transport,
}

impl Socket {
    pub fn connect(host: &str, port: u16, scheme: Scheme, options: &NetOptions) -> NetResult<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetError::InvalidUrl(format!("{host}:{port} does not resolve")))?;

        let stream = TcpStream::connect_timeout(&addr, options.connect_timeout)?;
        stream.set_read_timeout(options.io_timeout)?;
        stream.set_write_timeout(options.io_timeout)?;
        let _ = stream.set_nodelay(true);

        let transport = if scheme.is_secure() {
            let connector = TlsConnector::new().map_err(NetError::tls)?;
            let tls = connector.connect(host, stream).map_err(NetError::tls)?;
            Transport::Tls(Box::new(tls))
        } else {
            Transport::Plain(stream)
        };

        trace!(host, port, secure = scheme.is_secure(), "socket connected");
        Ok(Self { transport })
    }

    pub fn send(&mut self, data: &[u8]) -> NetResult<()> {
        self.write_all(data)?;
        self.flush()?;
        Ok(())
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.transport {
            Transport::Plain(stream) => stream.read(buf),
            Transport::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.transport {
            Transport::Plain(stream) => stream.write(buf),
            Transport::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.transport {
            Transport::Plain(stream) => stream.flush(),
            Transport::Tls(stream) => stream.flush(),
        }
    }
}
