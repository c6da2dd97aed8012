//! [`Socket`] backed by tokio TCP streams.
//!
//! Submissions use `try_write` / `try_read` and therefore never wait. Connections are
//! opened lazily: [`Socket::connect`] only records the destination, and the next
//! [`TokioSocket::wait_ready`] starts the connect on a spawned task, racing it with the
//! readiness of every other blocked connection. A released keep-alive connection is parked
//! per destination and handed out again by the next `connect` to the same host and port,
//! unless the peer closed it in the meantime.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;

use futures::FutureExt;
use futures::future::select_all;
use tokio::io::Interest;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::TcpSettings;
use crate::socket::{ConnectionId, RecvOutcome, SendOutcome, Socket};

#[derive(Debug)]
enum Link {
    /// not connected yet, opened by the next `wait_ready`
    Pending,
    Connecting(JoinHandle<io::Result<TcpStream>>),
    Open(TcpStream),
    /// the last attempt to open failed; reported once, then retried
    Failed(io::Error),
}

#[derive(Debug)]
struct Connection {
    host: String,
    port: u16,
    settings: TcpSettings,
    link: Link,
}

/// What woke a `wait_ready`.
enum Wake {
    Ready(ConnectionId),
    Opened(ConnectionId, io::Result<TcpStream>),
}

impl Connection {
    /// Whether a parked stream can carry another exchange: the peer has neither closed it
    /// nor sent bytes nobody asked for.
    fn is_reusable(&self) -> bool {
        let Link::Open(stream) = &self.link else {
            return false;
        };
        matches!(stream.try_read(&mut [0_u8; 1]), Err(e) if e.kind() == io::ErrorKind::WouldBlock)
    }

    /// Reports why no stream is available, turning a failed open back into a pending one.
    fn unavailable(&mut self) -> Option<io::Error> {
        match std::mem::replace(&mut self.link, Link::Pending) {
            Link::Failed(e) => Some(e),
            link => {
                self.link = link;
                None
            }
        }
    }
}

/// Connection table over tokio `TcpStream`s.
#[derive(Debug, Default)]
pub struct TokioSocket {
    next_id: u64,
    connections: HashMap<ConnectionId, Connection>,
    idle: HashMap<(String, u16), Vec<ConnectionId>>,
    blocked: Vec<(ConnectionId, Interest)>,
}

impl TokioSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently in the table, idle ones included.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Waits until at least one of the `blocked` submissions may succeed and returns the
    /// connections that became ready.
    ///
    /// Pending connections among them start connecting in the background; a finished
    /// connect, successful or not, counts as ready, and a failure is reported on the next
    /// submission. Returns an empty list after a yield when there is nothing to wait for.
    pub async fn wait_ready(&mut self, blocked: &[(ConnectionId, Interest)]) -> Vec<ConnectionId> {
        // nothing to wait for on these, their next submission reports the error
        let gone: Vec<ConnectionId> = blocked
            .iter()
            .map(|(conn, _)| *conn)
            .filter(|conn| self.connections.get(conn).is_none_or(|connection| matches!(connection.link, Link::Failed(_))))
            .collect();
        if !gone.is_empty() {
            return gone;
        }

        for (conn, _) in blocked {
            if let Some(connection) = self.connections.get_mut(conn)
                && matches!(connection.link, Link::Pending)
            {
                trace!(%conn, host = %connection.host, port = connection.port, "connecting");
                let (host, port, settings) = (connection.host.clone(), connection.port, connection.settings.clone());
                connection.link = Link::Connecting(tokio::spawn(async move { open(&host, port, &settings).await }));
            }
        }

        let mut waits: Vec<Pin<Box<dyn Future<Output = Wake> + '_>>> = vec![];
        for (conn, connection) in &mut self.connections {
            let Some(&(conn, interest)) = blocked.iter().find(|(blocked, _)| blocked == conn) else {
                continue;
            };
            match &mut connection.link {
                Link::Open(stream) => waits.push(Box::pin(async move {
                    if let Err(e) = stream.ready(interest).await {
                        debug!(%conn, cause = %e, "readiness poll failed");
                    }
                    Wake::Ready(conn)
                })),
                Link::Connecting(handle) => waits.push(Box::pin(async move {
                    let opened = handle.await.unwrap_or_else(|e| Err(io::Error::other(e)));
                    Wake::Opened(conn, opened)
                })),
                Link::Pending | Link::Failed(_) => {}
            }
        }

        if waits.is_empty() {
            tokio::task::yield_now().await;
            return vec![];
        }

        let (first, _, rest) = select_all(waits).await;
        let mut wakes = vec![first];
        wakes.extend(rest.into_iter().filter_map(FutureExt::now_or_never));

        let mut ready = Vec::with_capacity(wakes.len());
        for wake in wakes {
            match wake {
                Wake::Ready(conn) => ready.push(conn),
                Wake::Opened(conn, opened) => {
                    if let Some(connection) = self.connections.get_mut(&conn) {
                        connection.link = match opened {
                            Ok(stream) => {
                                debug!(%conn, host = %connection.host, port = connection.port, "connection established");
                                Link::Open(stream)
                            }
                            Err(e) => {
                                warn!(%conn, host = %connection.host, port = connection.port, cause = %e, "failed to connect");
                                Link::Failed(e)
                            }
                        };
                    }
                    ready.push(conn);
                }
            }
        }
        trace!(?ready, "socket ready");
        ready
    }

    fn insert(&mut self, connection: Connection) -> ConnectionId {
        self.next_id += 1;
        let conn = ConnectionId::new(self.next_id);
        self.connections.insert(conn, connection);
        conn
    }
}

async fn open(host: &str, port: u16, settings: &TcpSettings) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_keepalive(settings.keep_alive)?;
        socket.set_nodelay(settings.nodelay)?;
        if let Some(size) = settings.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        if let Some(size) = settings.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if settings.linger.is_some() {
            socket.set_linger(settings.linger)?;
        }

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                trace!(%addr, cause = %e, "address refused connection");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}:{port}"))))
}

impl Drop for TokioSocket {
    fn drop(&mut self) {
        for connection in self.connections.values() {
            if let Link::Connecting(handle) = &connection.link {
                handle.abort();
            }
        }
    }
}

impl Socket for TokioSocket {
    fn connect(&mut self, host: &str, port: u16, settings: &TcpSettings) -> io::Result<ConnectionId> {
        if host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host name"));
        }

        while let Some(conn) = self.idle.get_mut(&(host.to_owned(), port)).and_then(Vec::pop) {
            if self.connections.get(&conn).is_some_and(Connection::is_reusable) {
                trace!(%conn, host, port, "reusing idle connection");
                return Ok(conn);
            }
            debug!(%conn, host, port, "parked connection went stale, dropping it");
            self.connections.remove(&conn);
        }

        let conn = self.insert(Connection { host: host.to_owned(), port, settings: settings.clone(), link: Link::Pending });
        trace!(%conn, host, port, "connection scheduled");
        Ok(conn)
    }

    fn submit_send(&mut self, conn: ConnectionId, bytes: &[u8], offset: usize) -> SendOutcome {
        let Some(connection) = self.connections.get_mut(&conn) else {
            return SendOutcome::Error(io::Error::new(io::ErrorKind::NotConnected, format!("unknown connection {conn}")));
        };

        let Link::Open(stream) = &connection.link else {
            return match connection.unavailable() {
                Some(e) => SendOutcome::Error(e),
                None => {
                    self.blocked.push((conn, Interest::WRITABLE));
                    SendOutcome::WouldBlock
                }
            };
        };

        match stream.try_write(&bytes[offset..]) {
            Ok(n) => SendOutcome::Written(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.blocked.push((conn, Interest::WRITABLE));
                SendOutcome::WouldBlock
            }
            Err(e) => SendOutcome::Error(e),
        }
    }

    fn submit_recv(&mut self, conn: ConnectionId, buf: &mut [u8]) -> RecvOutcome {
        let Some(connection) = self.connections.get_mut(&conn) else {
            return RecvOutcome::Error(io::Error::new(io::ErrorKind::NotConnected, format!("unknown connection {conn}")));
        };

        let Link::Open(stream) = &connection.link else {
            return match connection.unavailable() {
                Some(e) => RecvOutcome::Error(e),
                None => {
                    self.blocked.push((conn, Interest::READABLE));
                    RecvOutcome::WouldBlock
                }
            };
        };

        match stream.try_read(buf) {
            Ok(0) if !buf.is_empty() => RecvOutcome::Closed,
            Ok(n) => RecvOutcome::Read(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.blocked.push((conn, Interest::READABLE));
                RecvOutcome::WouldBlock
            }
            Err(e) => RecvOutcome::Error(e),
        }
    }

    fn release(&mut self, conn: ConnectionId, aborted: bool) {
        self.blocked.retain(|(blocked, _)| *blocked != conn);

        let keep = !aborted && self.connections.get(&conn).is_some_and(|connection| matches!(connection.link, Link::Open(_)));
        if keep {
            if let Some(connection) = self.connections.get(&conn) {
                trace!(%conn, host = %connection.host, port = connection.port, "connection parked for reuse");
                self.idle.entry((connection.host.clone(), connection.port)).or_default().push(conn);
            }
            return;
        }

        if let Some(connection) = self.connections.remove(&conn) {
            if let Link::Connecting(handle) = &connection.link {
                handle.abort();
            }
            trace!(%conn, aborted, "connection closed");
        }
        for parked in self.idle.values_mut() {
            parked.retain(|idle| *idle != conn);
        }
    }

    fn blocked(&mut self) -> Vec<(ConnectionId, Interest)> {
        std::mem::take(&mut self.blocked)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_lazily_and_exchanges_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"pong").await.unwrap();
            stream
        });

        let mut socket = TokioSocket::new();
        let conn = socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap();

        let mut buf = [0_u8; 16];
        assert!(matches!(socket.submit_recv(conn, &mut buf), RecvOutcome::WouldBlock));

        let mut read = 0;
        while read == 0 {
            let blocked = socket.blocked();
            socket.wait_ready(&blocked).await;
            read = socket.submit_recv(conn, &mut buf).read_len();
        }
        assert_eq!(&buf[..read], b"pong");

        let _server_stream = server.await.unwrap();
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut socket = TokioSocket::new();
        let conn = socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap();
        assert!(matches!(socket.submit_send(conn, b"x", 0), SendOutcome::WouldBlock));
        let blocked = socket.blocked();
        socket.wait_ready(&blocked).await;
        let _peer = accept.await.unwrap();

        socket.release(conn, false);
        assert_eq!(socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap(), conn);

        socket.release(conn, true);
        assert_eq!(socket.connection_count(), 0);
        assert_ne!(socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap(), conn);
    }

    async fn open_connection(socket: &mut TokioSocket, port: u16) -> ConnectionId {
        let conn = socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap();
        assert!(matches!(socket.submit_send(conn, b"x", 0), SendOutcome::WouldBlock));
        let blocked = socket.blocked();
        assert_eq!(socket.wait_ready(&blocked).await, vec![conn]);
        conn
    }

    #[tokio::test]
    async fn parked_connection_closed_by_peer_is_not_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut socket = TokioSocket::new();
        let conn = open_connection(&mut socket, port).await;
        let (peer, _) = accept.await.unwrap();

        socket.release(conn, false);
        drop(peer);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap();
        assert_ne!(fresh, conn);
        assert_eq!(socket.connection_count(), 1);
    }

    #[tokio::test]
    async fn slow_connect_does_not_hold_back_ready_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut socket = TokioSocket::new();
        let ready_conn = open_connection(&mut socket, port).await;
        let (mut peer, _) = accept.await.unwrap();

        let mut buf = [0_u8; 8];
        assert!(matches!(socket.submit_recv(ready_conn, &mut buf), RecvOutcome::WouldBlock));
        // a non-routable address, its connect hangs until the OS gives up
        let hanging = socket.connect("10.255.255.1", 9, &TcpSettings::default()).unwrap();
        assert!(matches!(socket.submit_send(hanging, b"x", 0), SendOutcome::WouldBlock));
        peer.write_all(b"ready").await.unwrap();

        let mut blocked = socket.blocked();
        let woke = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let ready = socket.wait_ready(&blocked).await;
                if ready.contains(&ready_conn) {
                    break;
                }
                blocked.retain(|(conn, _)| !ready.contains(conn));
            }
        })
        .await;

        assert!(woke.is_ok());
        assert_eq!(socket.submit_recv(ready_conn, &mut buf).read_len(), 5);
        socket.release(hanging, true);
    }

    #[tokio::test]
    async fn failed_connect_is_reported_once() {
        // bind and drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut socket = TokioSocket::new();
        let conn = socket.connect("127.0.0.1", port, &TcpSettings::default()).unwrap();
        assert!(matches!(socket.submit_send(conn, b"x", 0), SendOutcome::WouldBlock));

        let blocked = socket.blocked();
        socket.wait_ready(&blocked).await;

        assert!(matches!(socket.submit_send(conn, b"x", 0), SendOutcome::Error(_)));
        assert!(matches!(socket.submit_send(conn, b"x", 0), SendOutcome::WouldBlock));
    }

    #[test]
    fn unknown_connection() {
        let mut socket = TokioSocket::new();
        let mut buf = [0_u8; 4];
        assert!(matches!(socket.submit_recv(ConnectionId::new(99), &mut buf), RecvOutcome::Error(_)));
        assert!(socket.connect("", 80, &TcpSettings::default()).is_err());
    }
}
