//! The chess server binary.
//!
//! Reads an optional JSON config file named by the `CHESSD_CONFIG`
//! environment variable or the first argument, then serves until the
//! process is killed.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use chessd::config::Config;
use chessd::handler::Dispatcher;
use chessd::manager::GameManager;
use chessd::server::{NetworkServer, Outbound, PacketHandler};
use chessd::store::UserStore;

fn main() {
    env_logger::init();

    let config = match env::var("CHESSD_CONFIG").ok().or_else(|| env::args().nth(1)) {
        Some(path) => Config::load(&path).expect("Error loading config file"),
        None => Config::default(),
    };

    info!("starting with {:?}", config);

    let store = Arc::new(
        UserStore::open(&config.users_path, config.default_elo).expect("Error opening user store"),
    );
    let server = Arc::new(
        NetworkServer::bind(
            SocketAddr::from(([0, 0, 0, 0], config.port)),
            config.backlog,
        )
        .expect("Error binding listen socket"),
    );
    let manager = Arc::new(GameManager::new(
        Arc::clone(&server) as Arc<dyn Outbound>,
        Arc::clone(&store),
        config.elo_threshold,
    ));

    let matcher = Arc::clone(&manager).start_matcher();
    let dispatcher: Arc<dyn PacketHandler> = Arc::new(Dispatcher::new(
        store,
        Arc::clone(&server) as Arc<dyn Outbound>,
        Arc::clone(&manager),
    ));

    server.run(dispatcher);

    manager.stop_matcher();
    let _ = matcher.join();
}
