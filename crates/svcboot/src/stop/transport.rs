//! Socket transport for the stop client.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use svcboot_config::SocketEndpoint;

use super::StopError;

/// Upper bound on establishing the control connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn connect(endpoint: &SocketEndpoint) -> Result<UnixStream, StopError> {
    connect_unix(endpoint).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => StopError::NotRunning {
            path: endpoint.path().to_path_buf(),
        },
        _ => StopError::Connect {
            path: endpoint.path().to_path_buf(),
            source,
        },
    })
}

fn connect_unix(endpoint: &SocketEndpoint) -> io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(endpoint.path())?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    Ok(UnixStream::from(OwnedFd::from(socket)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;

    #[test]
    fn missing_socket_means_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let endpoint = SocketEndpoint::unix(dir.path().join("absent.sock"));
        let error = connect(&endpoint).expect_err("connect should fail");
        assert!(matches!(error, StopError::NotRunning { .. }));
    }

    #[test]
    fn stale_socket_means_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stale.sock");
        drop(UnixListener::bind(&path).expect("bind stale listener"));
        let error = connect(&SocketEndpoint::unix(&path)).expect_err("connect should fail");
        assert!(matches!(error, StopError::NotRunning { .. }));
    }

    #[test]
    fn connected_stream_carries_bytes_both_ways() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("live.sock");
        let listener = UnixListener::bind(&path).expect("bind listener");

        let mut client = connect(&SocketEndpoint::unix(&path)).expect("connect");
        let (mut server, _) = listener.accept().expect("accept client");

        client.write_all(b"ping\n").expect("client write");
        let mut received = [0_u8; 5];
        server.read_exact(&mut received).expect("server read");
        assert_eq!(&received, b"ping\n");

        server.write_all(b"pong\n").expect("server write");
        let mut reply = [0_u8; 5];
        client.read_exact(&mut reply).expect("client read");
        assert_eq!(&reply, b"pong\n");
    }
}
