//! Game engine
//!
//! The per-connection state machine. Each inbound message is interpreted
//! against the sender's session state; the engine mutates the registry and
//! returns the ordered actions the transport must perform. Progression is
//! `Unauthenticated -> Authenticated(idle) -> Paired(Master|Guesser)`, and
//! every protocol violation is terminal for the violating connection only.
//!
//! The engine never blocks and never touches a socket. It also reports
//! every frame it sees, in both directions, to the observer feed.

use tokio::sync::broadcast;

use crate::observer::Notification;
use crate::protocol::{decode_pair_request, Message, MessageType};

use super::{ClientId, ConnId, SessionRegistry};

/// One transport operation requested by the engine.
///
/// Actions must be executed in order: sends to a connection always precede
/// its close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send { conn: ConnId, message: Message },
    Close { conn: ConnId },
}

/// The game state machine.
pub struct Engine {
    registry: SessionRegistry,
    password: String,
    notify_tx: broadcast::Sender<Notification>,
}

impl Engine {
    pub fn new(password: String, notify_tx: broadcast::Sender<Notification>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            password,
            notify_tx,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// A connection was accepted: register it and request authentication.
    pub fn on_connect(&mut self, conn: ConnId) -> Vec<Action> {
        let client_id = self.registry.create(conn);
        tracing::info!(%conn, %client_id, "client connected");
        self.notify(client_id, "Connected", None, true);

        let mut actions = Vec::new();
        self.push_send(&mut actions, conn, Message::new(MessageType::AuthRequired));
        actions
    }

    /// The peer closed the connection. Idempotent: a connection the engine
    /// already terminated is simply unknown by now.
    pub fn on_disconnect(&mut self, conn: ConnId) {
        if let Some(session) = self.registry.remove(conn) {
            tracing::info!(%conn, client_id = %session.client_id, "client disconnected");
            self.notify(session.client_id, "Disconnected", None, true);
        }
    }

    /// Process one inbound frame to completion.
    pub fn on_frame(&mut self, conn: ConnId, message: Message) -> Vec<Action> {
        let Some(session) = self.registry.get(conn) else {
            // The frame raced a termination; the session is already gone.
            tracing::debug!(%conn, "frame for terminated connection ignored");
            return Vec::new();
        };

        self.notify(
            session.client_id,
            message.message_type.label(),
            message.payload.clone(),
            true,
        );

        let mut actions = Vec::new();

        // Only the password submission is legal before login. Unrecognized
        // frames fall through to the catch-all below instead.
        if !session.logged_in
            && message.message_type.is_inbound()
            && message.message_type != MessageType::SubmitPassword
        {
            tracing::warn!(%conn, ty = ?message.message_type, "message before login");
            self.wrong_state(&mut actions, conn);
            return actions;
        }

        match message.message_type {
            MessageType::SubmitPassword => {
                self.handle_password(&mut actions, conn, message.payload.as_deref())
            }
            MessageType::RequestOpponents => self.handle_request_opponents(&mut actions, conn),
            MessageType::Challenge => {
                self.handle_challenge(&mut actions, conn, message.payload.as_deref())
            }
            MessageType::Move => self.handle_move(&mut actions, conn, message.payload.as_deref()),
            MessageType::Hint => self.handle_hint(&mut actions, conn, message.payload.as_deref()),
            MessageType::Continue => self.handle_continue(&mut actions, conn),
            MessageType::GiveUp => self.handle_give_up(&mut actions, conn),
            _ => {
                tracing::warn!(%conn, ty = ?message.message_type, "unrecognized message type");
                self.push_send(&mut actions, conn, Message::new(MessageType::Unknown));
                self.push_close(&mut actions, conn);
            }
        }

        actions
    }

    fn handle_password(&mut self, actions: &mut Vec<Action>, conn: ConnId, password: Option<&str>) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if session.logged_in {
            self.wrong_state(actions, conn);
            return;
        }

        let client_id = session.client_id;
        if password == Some(self.password.as_str()) {
            if let Some(session) = self.registry.get_mut(conn) {
                session.logged_in = true;
            }
            tracing::info!(%conn, %client_id, "client authenticated");
            self.push_send(
                actions,
                conn,
                Message::with_payload(MessageType::PasswordCorrect, client_id.to_string()),
            );
        } else {
            tracing::warn!(%conn, %client_id, "wrong password");
            self.push_send(actions, conn, Message::new(MessageType::PasswordIncorrect));
            self.push_close(actions, conn);
        }
    }

    fn handle_request_opponents(&mut self, actions: &mut Vec<Action>, conn: ConnId) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if session.in_game {
            self.wrong_state(actions, conn);
            return;
        }

        let opponents = self.registry.list_available_opponents(conn);
        if opponents.is_empty() {
            self.push_send(actions, conn, Message::new(MessageType::NoOpponents));
            self.push_close(actions, conn);
        } else {
            let list = opponents
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            self.push_send(
                actions,
                conn,
                Message::with_payload(MessageType::Opponents, list),
            );
        }
    }

    fn handle_challenge(&mut self, actions: &mut Vec<Action>, conn: ConnId, payload: Option<&str>) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if session.in_game {
            self.wrong_state(actions, conn);
            return;
        }
        let caller_id = session.client_id;

        // No payload means no secret word to play for.
        let Some(payload) = payload else {
            self.wrong_state(actions, conn);
            return;
        };
        let (secret, opponent_raw) = decode_pair_request(payload);

        let opponents = self.registry.list_available_opponents(conn);
        let target = match opponent_raw {
            // An explicit target must be an available opponent.
            Some(raw) => match raw.parse::<u64>().map(ClientId) {
                Ok(id) if opponents.contains(&id) => id,
                _ => {
                    tracing::warn!(%conn, target = raw, "challenge target not available");
                    self.wrong_state(actions, conn);
                    return;
                }
            },
            // Otherwise the earliest-connected available opponent is chosen.
            None => match opponents.first() {
                Some(id) => *id,
                None => {
                    self.wrong_state(actions, conn);
                    return;
                }
            },
        };

        let Some(target_conn) = self.registry.find_by_client_id(target) else {
            self.wrong_state(actions, conn);
            return;
        };

        if let Some(caller) = self.registry.get_mut(conn) {
            caller.in_game = true;
            caller.secret_word = Some(secret.to_string());
            caller.opponent_id = Some(target);
        }
        if let Some(guesser) = self.registry.get_mut(target_conn) {
            guesser.in_game = true;
            guesser.is_guessing = true;
            guesser.opponent_id = Some(caller_id);
        }

        tracing::info!(master = %caller_id, guesser = %target, "game started");
        self.push_send(
            actions,
            conn,
            Message::with_payload(MessageType::ChallengeAccepted, target.to_string()),
        );
        self.push_send(
            actions,
            target_conn,
            Message::with_payload(MessageType::GuessStart, caller_id.to_string()),
        );
    }

    fn handle_move(&mut self, actions: &mut Vec<Action>, conn: ConnId, guess: Option<&str>) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if !session.in_game || !session.is_guessing {
            self.wrong_state(actions, conn);
            return;
        }

        let Some(opponent_conn) = self.opponent_conn(conn) else {
            self.wrong_state(actions, conn);
            return;
        };

        // Exact byte equality; a missing guess never matches.
        let secret = self
            .registry
            .get(opponent_conn)
            .and_then(|s| s.secret_word.as_deref());
        let correct = matches!((guess, secret), (Some(g), Some(s)) if g == s);

        if correct {
            tracing::info!(%conn, "secret word guessed, game over");
            self.push_send(actions, conn, Message::new(MessageType::Win));
            self.push_send(actions, opponent_conn, Message::new(MessageType::CorrectAttempt));
            self.push_close(actions, conn);
            self.push_close(actions, opponent_conn);
        } else {
            self.push_send(actions, conn, Message::new(MessageType::WrongAttempt));
            self.push_send(actions, opponent_conn, Message::new(MessageType::Attempt));
        }
    }

    fn handle_hint(&mut self, actions: &mut Vec<Action>, conn: ConnId, hint: Option<&str>) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        // Hints flow from the master to the guesser only.
        if !session.in_game || session.is_guessing {
            self.wrong_state(actions, conn);
            return;
        }

        let Some(opponent_conn) = self.opponent_conn(conn) else {
            self.wrong_state(actions, conn);
            return;
        };

        match hint {
            Some(text) if !text.is_empty() => {
                self.push_send(
                    actions,
                    opponent_conn,
                    Message::with_payload(MessageType::HintRelay, text),
                );
            }
            // An empty hint just waves the guesser on.
            _ => {
                self.push_send(actions, opponent_conn, Message::new(MessageType::ContinueRelay));
            }
        }
    }

    fn handle_continue(&mut self, actions: &mut Vec<Action>, conn: ConnId) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if !session.in_game {
            self.wrong_state(actions, conn);
            return;
        }

        let Some(opponent_conn) = self.opponent_conn(conn) else {
            self.wrong_state(actions, conn);
            return;
        };

        let opponent_guessing = self
            .registry
            .get(opponent_conn)
            .is_some_and(|s| s.is_guessing);
        if opponent_guessing {
            self.push_send(actions, opponent_conn, Message::new(MessageType::ContinueRelay));
        } else {
            self.wrong_state(actions, conn);
        }
    }

    fn handle_give_up(&mut self, actions: &mut Vec<Action>, conn: ConnId) {
        let Some(session) = self.registry.get(conn) else {
            return;
        };
        if !session.in_game {
            self.wrong_state(actions, conn);
            return;
        }

        tracing::info!(%conn, client_id = %session.client_id, "player gave up");
        if let Some(opponent_conn) = self.opponent_conn(conn) {
            self.push_send(actions, opponent_conn, Message::new(MessageType::GameOver));
            self.push_close(actions, opponent_conn);
        }
        self.push_close(actions, conn);
    }

    /// The paired opponent's connection, if it is still around.
    fn opponent_conn(&self, conn: ConnId) -> Option<ConnId> {
        self.registry
            .get(conn)
            .and_then(|s| s.opponent_id)
            .and_then(|id| self.registry.find_by_client_id(id))
    }

    fn wrong_state(&mut self, actions: &mut Vec<Action>, conn: ConnId) {
        self.push_send(actions, conn, Message::new(MessageType::WrongState));
        self.push_close(actions, conn);
    }

    /// Queue an outbound frame, reporting it to the observer feed.
    fn push_send(&self, actions: &mut Vec<Action>, conn: ConnId, message: Message) {
        if let Some(session) = self.registry.get(conn) {
            self.notify(
                session.client_id,
                message.message_type.label(),
                message.payload.clone(),
                false,
            );
        }
        actions.push(Action::Send { conn, message });
    }

    /// Queue a close. The registry entry is removed first; the transport
    /// closes the socket when it executes the action.
    fn push_close(&mut self, actions: &mut Vec<Action>, conn: ConnId) {
        self.registry.remove(conn);
        actions.push(Action::Close { conn });
    }

    fn notify(&self, client_id: ClientId, kind: &'static str, content: Option<String>, input: bool) {
        // Send fails only when no observer is subscribed, which is fine.
        let _ = self.notify_tx.send(Notification {
            client_id: client_id.0,
            kind,
            content,
            input,
        });
    }
}
