use std::{
    collections::VecDeque,
    fs::File,
    io::{self, ErrorKind, Read, Write},
    net::{IpAddr, Ipv4Addr},
    os::fd::{FromRawFd, RawFd},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use libc::{
    self, c_int, sockaddr, sockaddr_in, socklen_t, timeval, AF_INET, SOCK_STREAM, SOL_SOCKET,
    SO_RCVTIMEO, SO_REUSEADDR,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;

use super::{
    errors::ServerError,
    handler::Dispatcher,
    request::{HttpMethod, HttpRequest},
    response::{Response, Status, SERVICE_UNAVAILABLE, TOO_MANY_REQUESTS},
};

pub struct HttpServer {
    pub cfg: ServerConfig,
    pub dispatcher: Arc<Dispatcher>,
    active: Arc<AtomicUsize>,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

impl HttpServer {
    pub fn with_dispatcher(cfg: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            cfg,
            dispatcher: Arc::new(dispatcher),
            active: Arc::new(AtomicUsize::new(0)),
            window: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn run(&self) -> io::Result<()> {
        let (ip, port) = parse_ipv4_addr(&self.cfg.bind_addr)?;
        let listen_fd = create_listen_socket(ip, port)?;
        info!("Listening on {}", self.cfg.bind_addr);

        loop {
            let (client_fd, peer) = match Self::accept_client(listen_fd) {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept error: {e}");
                    continue;
                }
            };

            if self.active.load(Ordering::SeqCst) >= self.cfg.max_connections {
                Self::reject_client(client_fd, SERVICE_UNAVAILABLE, "Too many connections");
                continue;
            }

            if self.is_rate_limited() {
                Self::reject_client(client_fd, TOO_MANY_REQUESTS, "Too many requests");
                continue;
            }

            if let Err(e) = set_read_timeout(client_fd, self.cfg.read_timeout) {
                warn!("Could not set read timeout: {e}");
            }

            self.active.fetch_add(1, Ordering::SeqCst);
            let dispatcher = Arc::clone(&self.dispatcher);
            let active = Arc::clone(&self.active);
            let max_body = self.cfg.max_body_bytes;

            let spawned = thread::Builder::new()
                .name("conn".into())
                .spawn(move || {
                    // SAFETY: `client_fd` was just returned by accept() and is owned here.
                    let mut stream = unsafe { File::from_raw_fd(client_fd) };
                    let outcome =
                        handle_connection(&mut stream, &dispatcher, max_body, Some(peer));
                    if let Err(e) = outcome {
                        warn!("Error handling connection from {peer}: {e}");
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });

            if let Err(e) = spawned {
                error!("Could not spawn connection thread: {e}");
                self.active.fetch_sub(1, Ordering::SeqCst);
                // SAFETY: the closure never ran, so the descriptor is still ours to close.
                unsafe { libc::close(client_fd) };
            }
        }
    }

    fn accept_client(listen_fd: RawFd) -> io::Result<(RawFd, IpAddr)> {
        // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
        let mut addr: sockaddr_in = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of::<sockaddr_in>() as socklen_t;

        // SAFETY: addr/addr_len point to valid, correctly sized storage.
        let fd = unsafe {
            libc::accept(
                listen_fd,
                (&mut addr as *mut sockaddr_in).cast::<sockaddr>(),
                &mut addr_len,
            )
        };

        if fd < 0 {
            Err(io::Error::last_os_error())
        } else {
            let peer = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            Ok((fd, IpAddr::V4(peer)))
        }
    }

    fn reject_client(fd: RawFd, status: Status, message: &str) {
        // SAFETY: fd comes from accept() and is not used anywhere else.
        let mut stream = unsafe { File::from_raw_fd(fd) };
        let response = Response::error(status, message);
        let _ = stream.write_all(&response.to_bytes(false));
        let _ = stream.flush();
    }

    fn is_rate_limited(&self) -> bool {
        let now = Instant::now();
        let Ok(mut window) = self.window.lock() else {
            return false;
        };

        while let Some(&front) = window.front() {
            if now.duration_since(front) > Duration::from_secs(1) {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.cfg.rate_limit_per_sec {
            true
        } else {
            window.push_back(now);
            false
        }
    }
}

/// Reads one request from `rw`, dispatches it and writes exactly one response.
pub fn handle_connection<RW: Read + Write>(
    rw: &mut RW,
    dispatcher: &Dispatcher,
    max_body_bytes: usize,
    peer: Option<IpAddr>,
) -> Result<(), ServerError> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let (resp, is_head, label) = match HttpRequest::parse(rw, max_body_bytes) {
        Ok(mut req) => {
            req.peer_ip = peer;
            let is_head = matches!(req.method, HttpMethod::HEAD);
            let label = format!("{:?} {}", req.method, req.path);
            let resp = dispatcher
                .dispatch(&req)
                .unwrap_or_else(|err| error_response(&err, &request_id))
                .with_version(&req.version);
            (resp, is_head, label)
        }
        Err(err) => (error_response(&err, &request_id), false, "<unparsed>".to_string()),
    };

    info!(
        request_id = %request_id,
        status = resp.status.code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "{label}"
    );

    rw.write_all(&resp.to_bytes(is_head))?;
    rw.flush()?;
    Ok(())
}

fn error_response(err: &ServerError, request_id: &Uuid) -> Response {
    let status = err.status();
    if status.code >= 500 {
        error!(request_id = %request_id, "{err}");
    }
    Response::error(status, &err.client_message())
}

fn set_read_timeout(fd: RawFd, timeout: Duration) -> io::Result<()> {
    let tv = timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    // SAFETY: tv lives for the duration of the call and its size is passed alongside.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            SOL_SOCKET,
            SO_RCVTIMEO,
            (&tv as *const timeval).cast(),
            std::mem::size_of::<timeval>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn create_listen_socket(ip_host: u32, port_host: u16) -> io::Result<RawFd> {
    // SAFETY: plain socket(2) call; the result is checked below.
    let fd = unsafe { libc::socket(AF_INET, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // Allow immediate reuse of port
    let opt: c_int = 1;
    // SAFETY: opt outlives the call and its size is passed alongside.
    unsafe {
        libc::setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEADDR,
            (&opt as *const c_int).cast(),
            std::mem::size_of_val(&opt) as socklen_t,
        );
    }

    // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
    let mut addr: sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = AF_INET as libc::sa_family_t;
    addr.sin_port = port_host.to_be();
    addr.sin_addr.s_addr = ip_host.to_be();

    // SAFETY: addr is a fully initialised sockaddr_in of the advertised size.
    let rc = unsafe {
        libc::bind(
            fd,
            (&addr as *const sockaddr_in).cast::<sockaddr>(),
            std::mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    if rc < 0 {
        let e = io::Error::last_os_error();
        // SAFETY: fd is ours and not shared.
        unsafe { libc::close(fd) };
        return Err(e);
    }

    // SAFETY: fd is a bound socket.
    let rc = unsafe { libc::listen(fd, 128) };
    if rc < 0 {
        let e = io::Error::last_os_error();
        // SAFETY: fd is ours and not shared.
        unsafe { libc::close(fd) };
        return Err(e);
    }

    Ok(fd)
}

fn create_parse_error(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, msg)
}

/// Parses `HOST:PORT` into a host-order IPv4 address and port.
pub fn parse_ipv4_addr(addr: &str) -> io::Result<(u32, u16)> {
    let (host_str, port_str) = addr
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| create_parse_error("Address format must be 'HOST:PORT'"))?;

    let port: u16 = port_str
        .trim()
        .parse()
        .map_err(|_| create_parse_error(&format!("Invalid port value: '{}'", port_str)))?;

    let host: Ipv4Addr = match host_str.trim() {
        "*" | "0.0.0.0" => Ipv4Addr::UNSPECIFIED,
        host if host.eq_ignore_ascii_case("localhost") => Ipv4Addr::LOCALHOST,
        host => host
            .parse()
            .map_err(|_| create_parse_error(&format!("Invalid IPv4 address: '{}'", host)))?,
    };

    Ok((u32::from(host), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::RequestHandlerStrategy;
    use crate::http::response::OK;
    use std::io::Cursor;

    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Boom;
    impl RequestHandlerStrategy for Boom {
        fn handle(&self, _req: &HttpRequest) -> Result<Response, ServerError> {
            Err(ServerError::Internal("secret detail".into()))
        }
    }

    struct Echo;
    impl RequestHandlerStrategy for Echo {
        fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
            let ip = req.peer_ip.map(|ip| ip.to_string()).unwrap_or_default();
            Ok(Response::new(OK).with_body(ip))
        }
    }

    fn roundtrip(raw: &str) -> String {
        let dispatcher = Dispatcher::builder()
            .get("/boom", Arc::new(Boom))
            .get("/echo", Arc::new(Echo))
            .build();
        let mut stream = Duplex { input: Cursor::new(raw.as_bytes().to_vec()), output: Vec::new() };
        let peer = Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)));
        handle_connection(&mut stream, &dispatcher, 1024, peer).unwrap();
        String::from_utf8(stream.output).unwrap()
    }

    #[test]
    fn unknown_route_is_json_404() {
        let out = roundtrip("GET /nope HTTP/1.1\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 404 Not Found"));
        assert!(out.ends_with("{\"error\":\"Endpoint not found\"}"));
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let out = roundtrip("GET /boom HTTP/1.0\r\n\r\n");
        assert!(out.starts_with("HTTP/1.0 500"));
        assert!(!out.contains("secret detail"));
    }

    #[test]
    fn malformed_request_gets_400() {
        let out = roundtrip("garbage\r\n\r\n");
        assert!(out.starts_with("HTTP/1.0 400 Bad Request"));
        assert!(out.contains("\"error\""));
    }

    #[test]
    fn peer_address_reaches_handlers() {
        let out = roundtrip("GET /echo HTTP/1.1\r\n\r\n");
        assert!(out.ends_with("198.51.100.4"));
    }

    #[test]
    fn head_request_has_no_body() {
        let out = roundtrip("HEAD /echo HTTP/1.1\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 200 OK"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    struct Stalled {
        output: Vec<u8>,
    }

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "read timed out"))
        }
    }

    impl Write for Stalled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn slow_client_gets_408() {
        let dispatcher = Dispatcher::builder().get("/echo", Arc::new(Echo)).build();
        let mut stream = Stalled { output: Vec::new() };
        handle_connection(&mut stream, &dispatcher, 1024, None).unwrap();

        let out = String::from_utf8(stream.output).unwrap();
        assert!(out.starts_with("HTTP/1.0 408 Request Timeout"));
        assert!(out.ends_with("{\"error\":\"Request timed out\"}"));
    }

    #[test]
    fn parses_bind_addresses() {
        assert_eq!(parse_ipv4_addr("127.0.0.1:8080").unwrap(), (0x7f00_0001, 8080));
        assert_eq!(parse_ipv4_addr("localhost:80").unwrap(), (0x7f00_0001, 80));
        assert_eq!(parse_ipv4_addr("0.0.0.0:5000").unwrap(), (0, 5000));
        assert!(parse_ipv4_addr("127.0.0.1").is_err());
        assert!(parse_ipv4_addr("300.1.1.1:80").is_err());
        assert!(parse_ipv4_addr("1.2.3.4:99999").is_err());
    }
}
