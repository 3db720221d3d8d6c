use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};

use super::codec::{self, is_disconnect};
use super::protocol::Command;
use crate::error::{ClientError, Result};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_QUEUE: usize = 1024;

/// A live session with the server.
///
/// A reader thread decodes frames onto [`Connection::commands`]. When it
/// stops, for any reason, [`Connection::closed`] becomes ready for every
/// receiver.
pub struct Connection {
    host: String,
    writer: Mutex<TcpStream>,
    commands: Receiver<Command>,
    closed: Receiver<()>,
    is_closed: Arc<AtomicBool>,
}

impl Connection {
    pub fn connect(host: &str) -> Result<Self> {
        let addrs: Vec<SocketAddr> = host
            .to_socket_addrs()
            .map_err(|e| ClientError::Connection(format!("{host}: {e}")))?
            .collect();
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(host, stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(ClientError::Connection(match last_err {
            Some(e) => format!("{host}: {e}"),
            None => format!("{host}: no address"),
        }))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(host: &str, stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;
        let (cmd_tx, commands) = bounded(COMMAND_QUEUE);
        let (closed_tx, closed) = bounded::<()>(0);
        let is_closed = Arc::new(AtomicBool::new(false));

        let flag = is_closed.clone();
        let name = host.to_string();
        thread::Builder::new()
            .name("net-reader".into())
            .spawn(move || read_loop(read_half, cmd_tx, closed_tx, flag, name))?;

        log::info!("connected to {host}");
        Ok(Self {
            host: host.to_string(),
            writer: Mutex::new(stream),
            commands,
            closed,
            is_closed,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Incoming commands, in arrival order.
    pub fn commands(&self) -> Receiver<Command> {
        self.commands.clone()
    }

    /// Disconnects once the reader has stopped; never carries a value.
    pub fn closed(&self) -> Receiver<()> {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    /// Serialize and send one command. Safe to call from any thread.
    pub fn send(&self, cmd: &Command) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Connection("connection closed".into()));
        }
        log::debug!("send {}", cmd.name());
        let mut stream = self
            .writer
            .lock()
            .map_err(|_| ClientError::Connection("writer lock poisoned".into()))?;
        codec::write_frame(&mut *stream, cmd)
    }

    /// Shut the socket down. The reader notices and signals `closed`.
    pub fn close(&self) {
        self.is_closed.store(true, Ordering::Release);
        if let Ok(stream) = self.writer.lock()
            && let Err(e) = stream.shutdown(Shutdown::Both)
            && e.kind() != std::io::ErrorKind::NotConnected
        {
            log::debug!("shutdown {}: {e}", self.host);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    stream: TcpStream,
    commands: Sender<Command>,
    closed: Sender<()>,
    is_closed: Arc<AtomicBool>,
    host: String,
) {
    let mut reader = BufReader::new(stream);
    loop {
        match codec::read_frame(&mut reader) {
            Ok(cmd) => {
                log::debug!("recv {}", cmd.name());
                if commands.send(cmd).is_err() {
                    break;
                }
            }
            Err(e) if is_disconnect(&e) => {
                log::info!("{host} closed the connection");
                break;
            }
            Err(e) => {
                log::warn!("dropping connection to {host}: {e}");
                break;
            }
        }
    }
    is_closed.store(true, Ordering::Release);
    drop(closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::BasicKind;
    use std::net::TcpListener;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let conn = Connection::connect(&addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (conn, server)
    }

    #[test]
    fn round_trip_over_loopback() {
        let (conn, mut server) = pair();
        conn.send(&Command::client_handshake()).expect("send");
        let got = codec::read_frame(&mut server).expect("server read");
        assert_eq!(got, Command::client_handshake());

        codec::write_frame(&mut server, &Command::basic(BasicKind::Ok, "hi")).expect("write");
        let cmd = conn
            .commands()
            .recv_timeout(Duration::from_secs(2))
            .expect("client recv");
        assert_eq!(cmd, Command::basic(BasicKind::Ok, "hi"));
    }

    #[test]
    fn closed_fires_when_server_drops() {
        let (conn, server) = pair();
        let closed = conn.closed();
        drop(server);
        assert!(closed.recv_timeout(Duration::from_secs(2)).is_err());
        assert!(conn.is_closed());
        assert!(matches!(
            conn.send(&Command::ClearCmd),
            Err(ClientError::Connection(_))
        ));
    }

    #[test]
    fn refused_connect_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);
        assert!(matches!(
            Connection::connect(&addr),
            Err(ClientError::Connection(_))
        ));
    }
}
