/*!
Packet routing.

The dispatcher decodes each framed packet by tag and calls the matching
handler. Handlers run on the receive thread of the originating
connection; every failed application operation answers with exactly one
failure message and never tears the connection down. Only transport
level problems (malformed payloads) propagate as errors.
*/

use crate::errors::*;
use crate::manager::GameManager;
use crate::protocol::{
    AutoMatchAccepted, AutoMatchDeclined, AutoMatchRequest, Login, LoginFailure, LoginSuccess,
    Message, MessageType, Move, Packet, PlayerList, Register, RegisterFailure, RegisterSuccess,
};
use crate::server::{self, ConnectionId, Outbound, PacketHandler};
use crate::store::{RegisterError, UserStore};

use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Routes decoded packets to the user store, session bindings and the
/// game manager.
pub struct Dispatcher {
    store: Arc<UserStore>,
    out: Arc<dyn Outbound>,
    manager: Arc<GameManager>,
}

impl Dispatcher {
    pub fn new(store: Arc<UserStore>, out: Arc<dyn Outbound>, manager: Arc<GameManager>) -> Self {
        Self {
            store,
            out,
            manager,
        }
    }

    fn on_register(&self, conn: ConnectionId, message: Register) -> ChessdResult<()> {
        info!("[REGISTER] username: {:?}", message.username);

        match self.store.register(&message.username) {
            Ok(elo) => {
                server::send_message(
                    self.out.as_ref(),
                    conn,
                    &RegisterSuccess {
                        username: message.username.clone(),
                        elo,
                    },
                )?;
                // A fresh username cannot be logged in elsewhere.
                self.out.bind_username(conn, &message.username);
                Ok(())
            }
            Err(RegisterError::UsernameTaken) => {
                self.reply_register_failure(conn, "Username already exists.")
            }
            Err(RegisterError::InvalidUsername) => {
                self.reply_register_failure(conn, "Invalid username.")
            }
        }
    }

    fn on_login(&self, conn: ConnectionId, message: Login) -> ChessdResult<()> {
        info!("[LOGIN] username: {:?}, connection: {}", message.username, conn);

        if !self.store.validate(&message.username) {
            return self.reply_login_failure(conn, "Invalid username.");
        }
        if self.out.is_logged_in(&message.username) {
            return self.reply_login_failure(conn, "User already logged in.");
        }

        let elo = match self.store.elo(&message.username) {
            Some(elo) => elo,
            None => {
                error!("validated username {:?} has no profile", message.username);
                return self.reply_login_failure(conn, "Invalid username.");
            }
        };

        server::send_message(
            self.out.as_ref(),
            conn,
            &LoginSuccess {
                username: message.username.clone(),
                elo,
            },
        )?;
        self.out.bind_username(conn, &message.username);
        Ok(())
    }

    fn on_request_player_list(&self, conn: ConnectionId) -> ChessdResult<()> {
        debug!("[REQUEST_PLAYER_LIST] connection: {}", conn);

        let players = self.store.snapshot();
        server::send_message(self.out.as_ref(), conn, &PlayerList { players })
    }

    fn on_auto_match_request(&self, conn: ConnectionId, message: AutoMatchRequest) {
        info!("[AUTO_MATCH_REQUEST] username: {:?}", message.username);

        let bound = match self.out.username_for(conn) {
            Some(bound) => bound,
            None => {
                warn!(
                    "ignoring matchmaking request from unauthenticated connection {}",
                    conn
                );
                return;
            }
        };
        if bound != message.username {
            warn!(
                "connection {} asked to queue as {:?} but is logged in as {:?}",
                conn, message.username, bound
            );
        }

        self.manager.add_player(conn);
    }

    fn on_move(&self, conn: ConnectionId, message: Move) {
        info!(
            "[MOVE] game_id: {}, uci_move: {:?}",
            message.game_id, message.uci_move
        );

        self.manager
            .handle_move(conn, &message.game_id, &message.uci_move);
    }

    fn on_auto_match_accepted(&self, conn: ConnectionId, message: AutoMatchAccepted) {
        info!("[AUTO_MATCH_ACCEPTED] game_id: {}", message.game_id);

        self.manager.handle_accept(conn, &message.game_id);
    }

    fn on_auto_match_declined(&self, conn: ConnectionId, message: AutoMatchDeclined) {
        info!("[AUTO_MATCH_DECLINED] game_id: {}", message.game_id);

        self.manager.handle_decline(conn, &message.game_id);
    }

    fn reply_register_failure(&self, conn: ConnectionId, reason: &str) -> ChessdResult<()> {
        server::send_message(
            self.out.as_ref(),
            conn,
            &RegisterFailure {
                reason: reason.to_owned(),
            },
        )
    }

    fn reply_login_failure(&self, conn: ConnectionId, reason: &str) -> ChessdResult<()> {
        server::send_message(
            self.out.as_ref(),
            conn,
            &LoginFailure {
                reason: reason.to_owned(),
            },
        )
    }
}

impl PacketHandler for Dispatcher {
    fn handle_packet(&self, conn: ConnectionId, packet: &Packet) -> ChessdResult<()> {
        let kind = match packet.message_type() {
            Ok(kind) => kind,
            Err(Error::UnknownTag(tag)) => {
                warn!("unknown message tag {:#04x} from connection {}", tag, conn);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match kind {
            MessageType::Register => self.on_register(conn, Register::decode(&packet.payload)?),
            MessageType::Login => self.on_login(conn, Login::decode(&packet.payload)?),
            MessageType::RequestPlayerList => self.on_request_player_list(conn),
            MessageType::Move => {
                self.on_move(conn, Move::decode(&packet.payload)?);
                Ok(())
            }
            MessageType::AutoMatchRequest => {
                self.on_auto_match_request(conn, AutoMatchRequest::decode(&packet.payload)?);
                Ok(())
            }
            MessageType::AutoMatchAccepted => {
                self.on_auto_match_accepted(conn, AutoMatchAccepted::decode(&packet.payload)?);
                Ok(())
            }
            MessageType::AutoMatchDeclined => {
                self.on_auto_match_declined(conn, AutoMatchDeclined::decode(&packet.payload)?);
                Ok(())
            }
            other => {
                debug!(
                    "ignoring unexpected {:?} from connection {}",
                    other, conn
                );
                Ok(())
            }
        }
    }

    fn handle_disconnect(&self, conn: ConnectionId) {
        self.manager.handle_disconnect(conn);
    }
}
