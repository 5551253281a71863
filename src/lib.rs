//! GuessNet - Word Guessing Duels over TCP
//!
//! A two-player game served over a raw TCP connection: the master picks a
//! secret word and challenges the guesser, who submits guesses until
//! correct or abandoned. Frames are `type | length | payload` with no
//! stream boundaries, a registry tracks every connection's game state, and
//! a single engine task interprets messages, enforces legal transitions,
//! and relays gameplay between the two sockets of a paired session. A
//! WebSocket observer feed mirrors every processed frame for dashboards.

pub mod client;
pub mod config;
pub mod game;
pub mod network;
pub mod observer;
pub mod protocol;
