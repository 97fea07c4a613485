use std::{net::SocketAddr, time::Duration};

use log::{info, warn};

use rail_server::{shared::AgentId, transport::tcp, RailServer, ServerConfig};

mod app;
use app::App;

const LISTEN_ADDR: &str = "127.0.0.1:14191";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Coherence Rail Server Demo started");

    let mut server = match RailServer::new(ServerConfig::default()) {
        Ok(server) => server,
        Err(e) => {
            warn!("could not start the rail: {}", e);
            return;
        }
    };

    // Agent names come from the command line
    let mut names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        names = vec!["alpha".to_string(), "beta".to_string()];
    }
    for name in names {
        match server.register_agent(&AgentId::new(name.as_str())) {
            Ok(secret) => {
                info!("registered {}", name);
                // Handed to the operator once, never logged
                println!("{} {}", name, secret);
            }
            Err(e) => warn!("could not register {}: {}", name, e),
        }
    }

    let listen_addr: SocketAddr = match LISTEN_ADDR.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("bad listen address {}: {}", LISTEN_ADDR, e);
            return;
        }
    };
    server.listen(tcp::Socket::new(listen_addr));
    info!("listening on {}", listen_addr);

    let mut app = App::default();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {}", e);
        }
    };
    rail_server::run(
        server,
        POLL_INTERVAL,
        move |server, events| app.handle(server, events),
        shutdown,
    )
    .await;
}
