use std::cell::RefCell;
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::rc::Rc;
use std::time::{Duration, Instant};

use isn_layer::{Counters, DriverStats, Layer, LayerError, LayerRef, Node};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{deliver, DuplexChannel};
use crate::error::{DriverError, Result};

/// UDP driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Size of the client table.
    pub max_clients: usize,
    /// Learned clients are forgotten after this much silence.
    pub client_timeout_ms: u64,
    /// Largest datagram sent or accepted.
    pub max_packet: usize,
    /// Allow sending to broadcast addresses.
    pub broadcast: bool,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_clients: 32,
            client_timeout_ms: 5000,
            max_packet: 1024,
            broadcast: false,
        }
    }
}

#[derive(Debug)]
struct Client {
    addr: SocketAddr,
    last_seen: Instant,
    /// Registered with `add_client`; never expires.
    pinned: bool,
}

/// UDP socket driver.
///
/// Every datagram is one packet. Peers sending to this socket are learned
/// into a client table; `write` sends to all active clients.
pub struct UdpChannel {
    node: Node,
    socket: UdpSocket,
    config: UdpConfig,
    clients: RefCell<Vec<Client>>,
    counters: Counters,
}

impl UdpChannel {
    /// Bind the socket described by `config`.
    pub fn bind(config: UdpConfig) -> Result<Rc<Self>> {
        if config.max_packet == 0 || config.max_clients == 0 {
            return Err(DriverError::InvalidConfig {
                reason: "max_packet and max_clients must be positive".into(),
            });
        }
        let socket = UdpSocket::bind(config.bind).map_err(|e| DriverError::Bind {
            addr: config.bind.to_string(),
            source: e,
        })?;
        if config.broadcast {
            socket.set_broadcast(true)?;
        }
        info!(addr = ?socket.local_addr().ok(), "listening on udp socket");

        Ok(Rc::new(Self {
            node: Node::new("udp"),
            socket,
            config,
            clients: RefCell::new(Vec::new()),
            counters: Counters::new(),
        }))
    }

    /// Link the driver to the layer receiving its input.
    pub fn init(&self, parent: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(None, parent)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Register a peer that receives every write regardless of activity.
    pub fn add_client(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| DriverError::Resolve {
                host: host.to_string(),
                port,
                source: e,
            })?
            .next()
            .ok_or_else(|| DriverError::NoAddress {
                host: host.to_string(),
                port,
            })?;

        let mut clients = self.clients.borrow_mut();
        if let Some(client) = clients.iter_mut().find(|c| c.addr == addr) {
            client.pinned = true;
            return Ok(addr);
        }
        if clients.len() >= self.config.max_clients {
            return Err(DriverError::TooManyClients {
                max: self.config.max_clients,
            });
        }
        info!(%addr, "added client");
        clients.push(Client {
            addr,
            last_seen: Instant::now(),
            pinned: true,
        });
        Ok(addr)
    }

    /// Clients currently receiving writes.
    pub fn active_clients(&self) -> usize {
        self.expire_clients();
        self.clients.borrow().len()
    }

    fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.config.client_timeout_ms)
    }

    fn expire_clients(&self) {
        let timeout = self.client_timeout();
        self.clients.borrow_mut().retain(|c| {
            let alive = c.pinned || c.last_seen.elapsed() < timeout;
            if !alive {
                info!(addr = %c.addr, "client timed out");
            }
            alive
        });
    }

    fn touch_client(&self, addr: SocketAddr) {
        let mut clients = self.clients.borrow_mut();
        if let Some(client) = clients.iter_mut().find(|c| c.addr == addr) {
            client.last_seen = Instant::now();
        } else if clients.len() < self.config.max_clients {
            info!(%addr, "client connected");
            clients.push(Client {
                addr,
                last_seen: Instant::now(),
                pinned: false,
            });
        } else {
            warn!(%addr, max = self.config.max_clients, "client table full");
        }
    }

    fn set_wait(&self, timeout: Duration) -> std::io::Result<()> {
        if timeout.is_zero() {
            self.socket.set_nonblocking(true)
        } else {
            self.socket.set_nonblocking(false)?;
            self.socket.set_read_timeout(Some(timeout))
        }
    }
}

impl DuplexChannel for UdpChannel {
    fn write(&self, bytes: &[u8]) -> isn_layer::Result<usize> {
        if bytes.len() > self.config.max_packet {
            self.counters.tx_dropped();
            return Err(LayerError::PacketTooLarge {
                size: bytes.len(),
                max: self.config.max_packet,
            });
        }
        self.expire_clients();
        let targets: Vec<SocketAddr> = self.clients.borrow().iter().map(|c| c.addr).collect();
        if targets.is_empty() {
            debug!("no udp clients, dropping write");
            self.counters.tx_dropped();
            return Ok(0);
        }

        let mut sent = false;
        for addr in targets {
            match self.socket.send_to(bytes, addr) {
                Ok(_) => sent = true,
                Err(err) => {
                    warn!(%addr, %err, "udp send failed");
                    self.counters.tx_dropped();
                }
            }
        }
        if sent {
            self.counters.tx_packet(bytes.len());
            Ok(bytes.len())
        } else {
            Ok(0)
        }
    }

    fn poll(&self, timeout: Duration) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        // One spare byte detects datagrams larger than max_packet.
        let mut buf = vec![0u8; self.config.max_packet + 1];
        let mut processed = 0;
        self.set_wait(timeout)?;

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    self.touch_client(addr);
                    if len > self.config.max_packet {
                        debug!(%addr, "oversized datagram");
                        self.counters.rx_error();
                    } else {
                        processed += len;
                        deliver(&self.node, &self.counters, &buf[..len]);
                    }
                    // Drain whatever else is queued without waiting.
                    self.socket.set_nonblocking(true)?;
                }
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.expire_clients();
        Ok(processed)
    }
}

impl Layer for UdpChannel {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn recv(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
        Err(LayerError::Unsupported {
            layer: "udp",
            operation: "recv",
        })
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.write(buf)
    }

    fn capacity(&self) -> usize {
        self.config.max_packet
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}
