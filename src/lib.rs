/*!
Server core for rated online chess over TCP.

Clients speak a small framed binary protocol: register or log in,
queue for automatic matchmaking, accept or decline proposed pairings
and play out the game move by move while the server validates every
move and fans authoritative state out to both participants.

# Examples
```no_run
use std::net::SocketAddr;
use std::sync::Arc;

use chessd::config::Config;
use chessd::handler::Dispatcher;
use chessd::manager::GameManager;
use chessd::server::{NetworkServer, Outbound, PacketHandler};
use chessd::store::UserStore;

let config = Config::default();

let store = Arc::new(UserStore::open(&config.users_path, config.default_elo).unwrap());
let server = Arc::new(
    NetworkServer::bind(
        SocketAddr::from(([0, 0, 0, 0], config.port)),
        config.backlog,
    )
    .unwrap(),
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
matcher.join().unwrap();
```
*/

#[macro_use]
mod macros;

pub mod config;
pub mod errors;
pub mod game;
pub mod handler;
pub mod manager;
pub mod protocol;
pub mod server;
pub mod store;

pub use errors::ChessdResult;

#[cfg(test)]
mod tests;
