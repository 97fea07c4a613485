use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use rail_shared::framing::{Frame, FrameReader};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::{mpsc, Notify},
};

use super::{
    ConnectionId, PacketReceiver, PacketSender, RecvError, SendError, Socket as TransportSocket,
    TransportEvent,
};

type EventQueue = Arc<Mutex<VecDeque<TransportEvent>>>;
type ConnectionMap = Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>>>;

const ACCEPTOR_WORKER_THREADS: usize = 2;

/// Newline-delimited JSON frames over plain TCP
pub struct Socket {
    listen_addr: SocketAddr,
}

impl Socket {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }
}

impl Into<Box<dyn TransportSocket>> for Socket {
    fn into(self) -> Box<dyn TransportSocket> {
        Box::new(self)
    }
}

impl TransportSocket for Socket {
    fn listen(self: Box<Self>) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>) {
        let connections: ConnectionMap = Arc::new(Mutex::new(HashMap::new()));
        let events: EventQueue = Arc::new(Mutex::new(VecDeque::new()));

        spawn_connection_acceptor(self.listen_addr, connections.clone(), events.clone());

        (
            Box::new(TcpPacketSender { connections }),
            Box::new(TcpPacketReceiver { events }),
        )
    }
}

// A poisoned queue only means another thread panicked mid-push; the data is
// still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_connection_acceptor(listen_addr: SocketAddr, connections: ConnectionMap, events: EventQueue) {
    log::info!("Spawning TCP acceptor thread for {}", listen_addr);
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(ACCEPTOR_WORKER_THREADS)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            let listener = match TcpListener::bind(listen_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::error!("Failed to bind TCP listener on {}: {}", listen_addr, e);
                    return;
                }
            };
            log::info!("TCP acceptor listening on {}", listen_addr);

            let next_id = AtomicU64::new(1);
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        let id = ConnectionId(next_id.fetch_add(1, Ordering::Relaxed));
                        log::info!("Incoming TCP connection {} from {}", id, remote_addr);
                        let connections = connections.clone();
                        let events = events.clone();
                        tokio::spawn(async move {
                            handle_connection(id, stream, connections, events).await;
                        });
                    }
                    Err(e) => {
                        log::warn!("TCP accept error: {}", e);
                    }
                }
            }
        });
    });
}

async fn handle_connection(
    id: ConnectionId,
    stream: TcpStream,
    connections: ConnectionMap,
    events: EventQueue,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let closed = Arc::new(Notify::new());

    lock(&connections).insert(id, outbound);
    lock(&events).push_back(TransportEvent::Connected(id));

    // Writer: ends once the outbound sender is dropped
    let writer_closed = closed.clone();
    tokio::spawn(async move {
        while let Some(mut frame) = outbound_rx.recv().await {
            frame.push(b'\n');
            if let Err(e) = write_half.write_all(&frame).await {
                log::warn!("TCP write error on {}: {}", id, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
        writer_closed.notify_one();
    });

    let mut frames = FrameReader::new(BufReader::new(read_half));
    loop {
        tokio::select! {
            frame = frames.next_frame() => match frame {
                Ok(Frame::Line(line)) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    log::trace!("Received {} bytes from {}", line.len(), id);
                    lock(&events).push_back(TransportEvent::Data(id, line));
                }
                Ok(Frame::Oversized) => {
                    log::warn!("Oversized frame from {}, closing", id);
                    break;
                }
                Ok(Frame::Closed) => {
                    log::info!("Connection {} closed by peer", id);
                    break;
                }
                Err(e) => {
                    log::warn!("TCP read error on {}: {}", id, e);
                    break;
                }
            },
            _ = closed.notified() => {
                log::debug!("Connection {} closed by server", id);
                break;
            }
        }
    }

    lock(&connections).remove(&id);
    lock(&events).push_back(TransportEvent::Disconnected(id));
}

struct TcpPacketSender {
    connections: ConnectionMap,
}

impl PacketSender for TcpPacketSender {
    fn send(&self, connection: ConnectionId, payload: &[u8]) -> Result<(), SendError> {
        let connections = lock(&self.connections);
        let outbound = connections.get(&connection).ok_or(SendError)?;
        outbound.send(payload.to_vec()).map_err(|_| SendError)
    }

    fn disconnect(&self, connection: ConnectionId) {
        // Dropping the outbound sender lets the writer flush and shut down
        if lock(&self.connections).remove(&connection).is_some() {
            log::debug!("Disconnecting {}", connection);
        }
    }
}

struct TcpPacketReceiver {
    events: EventQueue,
}

impl PacketReceiver for TcpPacketReceiver {
    fn receive(&mut self) -> Result<Option<TransportEvent>, RecvError> {
        Ok(lock(&self.events).pop_front())
    }
}
