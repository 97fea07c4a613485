use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use rail_shared::framing::{Frame, FrameReader};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc,
};

use super::{
    PacketReceiver, PacketSender, RecvError, SendError, Socket as TransportSocket,
};

type FrameQueue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// Newline-delimited JSON frames over plain TCP
pub struct Socket {
    server_addr: SocketAddr,
}

impl Socket {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }
}

impl Into<Box<dyn TransportSocket>> for Socket {
    fn into(self) -> Box<dyn TransportSocket> {
        Box::new(self)
    }
}

impl TransportSocket for Socket {
    fn connect(self: Box<Self>) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let inbound: FrameQueue = Arc::new(Mutex::new(VecDeque::new()));
        let connected = Arc::new(AtomicBool::new(true));

        spawn_connection(
            self.server_addr,
            outbound_rx,
            inbound.clone(),
            connected.clone(),
        );

        (
            Box::new(TcpPacketSender {
                outbound,
                connected: connected.clone(),
            }),
            Box::new(TcpPacketReceiver { inbound, connected }),
        )
    }
}

fn lock(queue: &FrameQueue) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_connection(
    server_addr: SocketAddr,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: FrameQueue,
    connected: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Failed to create tokio runtime: {}", e);
                connected.store(false, Ordering::SeqCst);
                return;
            }
        };

        runtime.block_on(async move {
            let stream = match TcpStream::connect(server_addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("Failed to connect to {}: {}", server_addr, e);
                    connected.store(false, Ordering::SeqCst);
                    return;
                }
            };
            log::info!("Connected to rail at {}", server_addr);

            let (read_half, mut write_half) = stream.into_split();
            let mut frames = FrameReader::new(BufReader::new(read_half));
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(mut frame) => {
                            frame.push(b'\n');
                            if let Err(e) = write_half.write_all(&frame).await {
                                log::warn!("TCP write error: {}", e);
                                break;
                            }
                        }
                        // Client dropped its sender
                        None => break,
                    },
                    frame = frames.next_frame() => match frame {
                        Ok(Frame::Line(line)) => {
                            if !line.iter().all(u8::is_ascii_whitespace) {
                                lock(&inbound).push_back(line);
                            }
                        }
                        Ok(Frame::Oversized) => {
                            log::warn!("Oversized frame from the rail, closing");
                            break;
                        }
                        Ok(Frame::Closed) => {
                            log::info!("Rail closed the connection");
                            break;
                        }
                        Err(e) => {
                            log::warn!("TCP read error: {}", e);
                            break;
                        }
                    },
                }
            }
            let _ = write_half.shutdown().await;
            connected.store(false, Ordering::SeqCst);
        });
    });
}

struct TcpPacketSender {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

impl PacketSender for TcpPacketSender {
    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if !self.connected() {
            return Err(SendError);
        }
        self.outbound.send(payload.to_vec()).map_err(|_| SendError)
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct TcpPacketReceiver {
    inbound: FrameQueue,
    connected: Arc<AtomicBool>,
}

impl PacketReceiver for TcpPacketReceiver {
    fn receive(&mut self) -> Result<Option<Vec<u8>>, RecvError> {
        if let Some(frame) = lock(&self.inbound).pop_front() {
            return Ok(Some(frame));
        }
        if self.connected.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Err(RecvError)
        }
    }
}
