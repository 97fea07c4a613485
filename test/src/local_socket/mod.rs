/// In-memory socket implementation for E2E testing
/// Routes frames between the server and any number of clients without
/// network I/O
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use rail_client::transport::{
    PacketReceiver as ClientPacketReceiver, PacketSender as ClientPacketSender,
    RecvError as ClientRecvError, SendError as ClientSendError, Socket as ClientSocket,
};
use rail_server::transport::{
    ConnectionId, PacketReceiver as ServerPacketReceiver, PacketSender as ServerPacketSender,
    RecvError as ServerRecvError, SendError as ServerSendError, Socket as ServerSocket,
    TransportEvent,
};

#[derive(Default)]
struct ClientEnd {
    inbound: VecDeque<Vec<u8>>,
    open: bool,
}

#[derive(Default)]
struct HubState {
    server_events: VecDeque<TransportEvent>,
    clients: HashMap<ConnectionId, ClientEnd>,
    next_id: u64,
}

/// Shared switchboard between one server socket and many client sockets
#[derive(Clone, Default)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

fn lock(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_socket(&self) -> LocalServerSocket {
        LocalServerSocket { hub: self.clone() }
    }

    /// A client socket with its connection id already reserved
    pub fn client_socket(&self) -> LocalClientSocket {
        let mut state = lock(&self.state);
        state.next_id += 1;
        LocalClientSocket {
            hub: self.clone(),
            connection: ConnectionId(state.next_id),
        }
    }

    /// Simulates the peer going away
    pub fn drop_connection(&self, connection: ConnectionId) {
        let mut state = lock(&self.state);
        if let Some(end) = state.clients.get_mut(&connection) {
            if end.open {
                end.open = false;
                state
                    .server_events
                    .push_back(TransportEvent::Disconnected(connection));
            }
        }
    }

    pub fn is_open(&self, connection: ConnectionId) -> bool {
        lock(&self.state)
            .clients
            .get(&connection)
            .map_or(false, |end| end.open)
    }

    /// Pushes a raw frame as if the client had sent it
    pub fn inject(&self, connection: ConnectionId, frame: &[u8]) {
        lock(&self.state)
            .server_events
            .push_back(TransportEvent::Data(connection, frame.to_vec()));
    }
}

// Server Socket Components

pub struct LocalServerSocket {
    hub: LocalHub,
}

impl Into<Box<dyn ServerSocket>> for LocalServerSocket {
    fn into(self) -> Box<dyn ServerSocket> {
        Box::new(self)
    }
}

impl ServerSocket for LocalServerSocket {
    fn listen(
        self: Box<Self>,
    ) -> (Box<dyn ServerPacketSender>, Box<dyn ServerPacketReceiver>) {
        (
            Box::new(LocalServerSender {
                hub: self.hub.clone(),
            }),
            Box::new(LocalServerReceiver { hub: self.hub }),
        )
    }
}

struct LocalServerSender {
    hub: LocalHub,
}

impl ServerPacketSender for LocalServerSender {
    fn send(&self, connection: ConnectionId, payload: &[u8]) -> Result<(), ServerSendError> {
        let mut state = lock(&self.hub.state);
        match state.clients.get_mut(&connection) {
            Some(end) if end.open => {
                end.inbound.push_back(payload.to_vec());
                Ok(())
            }
            _ => Err(ServerSendError),
        }
    }

    fn disconnect(&self, connection: ConnectionId) {
        self.hub.drop_connection(connection);
    }
}

struct LocalServerReceiver {
    hub: LocalHub,
}

impl ServerPacketReceiver for LocalServerReceiver {
    fn receive(&mut self) -> Result<Option<TransportEvent>, ServerRecvError> {
        Ok(lock(&self.hub.state).server_events.pop_front())
    }
}

// Client Socket Components

pub struct LocalClientSocket {
    hub: LocalHub,
    connection: ConnectionId,
}

impl LocalClientSocket {
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl Into<Box<dyn ClientSocket>> for LocalClientSocket {
    fn into(self) -> Box<dyn ClientSocket> {
        Box::new(self)
    }
}

impl ClientSocket for LocalClientSocket {
    fn connect(
        self: Box<Self>,
    ) -> (Box<dyn ClientPacketSender>, Box<dyn ClientPacketReceiver>) {
        {
            let mut state = lock(&self.hub.state);
            state.clients.insert(
                self.connection,
                ClientEnd {
                    inbound: VecDeque::new(),
                    open: true,
                },
            );
            state
                .server_events
                .push_back(TransportEvent::Connected(self.connection));
        }
        (
            Box::new(LocalClientSender {
                hub: self.hub.clone(),
                connection: self.connection,
            }),
            Box::new(LocalClientReceiver {
                hub: self.hub,
                connection: self.connection,
            }),
        )
    }
}

struct LocalClientSender {
    hub: LocalHub,
    connection: ConnectionId,
}

impl ClientPacketSender for LocalClientSender {
    fn send(&self, payload: &[u8]) -> Result<(), ClientSendError> {
        if !self.connected() {
            return Err(ClientSendError);
        }
        self.hub.inject(self.connection, payload);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.hub.is_open(self.connection)
    }
}

struct LocalClientReceiver {
    hub: LocalHub,
    connection: ConnectionId,
}

impl ClientPacketReceiver for LocalClientReceiver {
    fn receive(&mut self) -> Result<Option<Vec<u8>>, ClientRecvError> {
        let mut state = lock(&self.hub.state);
        let Some(end) = state.clients.get_mut(&self.connection) else {
            return Err(ClientRecvError);
        };
        match end.inbound.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if end.open => Ok(None),
            None => Err(ClientRecvError),
        }
    }
}
