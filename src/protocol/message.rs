//! Protocol message definitions
//!
//! Defines every message type that travels between clients and the server,
//! plus the composite challenge payload nested inside the generic frame
//! payload.

/// All wire message types.
///
/// The numeric values are the wire bytes; client and server must agree on
/// them. Types the server never recognizes decode as [`MessageType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // Client -> server
    SubmitPassword = 1,
    RequestOpponents = 2,
    Challenge = 3,
    Move = 4,
    Hint = 5,
    GiveUp = 6,
    Continue = 7,

    // Server -> client
    AuthRequired = 10,
    PasswordCorrect = 11,
    ChallengeAccepted = 12,
    ChallengeRejected = 13,
    Opponents = 14,
    GuessStart = 15,
    Attempt = 16,
    WrongAttempt = 17,
    /// A master's hint forwarded to the guesser.
    HintRelay = 18,
    /// A master's go-ahead forwarded to the guesser.
    ContinueRelay = 19,

    // Server -> client, final (the connection closes after these)
    PasswordIncorrect = 31,
    NoOpponents = 32,
    GameOver = 33,
    WrongState = 34,
    Win = 35,
    CorrectAttempt = 36,

    /// Sentinel for unrecognized or malformed frames.
    Unknown = 255,
}

impl MessageType {
    /// Map a wire byte to a message type.
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            1 => MessageType::SubmitPassword,
            2 => MessageType::RequestOpponents,
            3 => MessageType::Challenge,
            4 => MessageType::Move,
            5 => MessageType::Hint,
            6 => MessageType::GiveUp,
            7 => MessageType::Continue,
            10 => MessageType::AuthRequired,
            11 => MessageType::PasswordCorrect,
            12 => MessageType::ChallengeAccepted,
            13 => MessageType::ChallengeRejected,
            14 => MessageType::Opponents,
            15 => MessageType::GuessStart,
            16 => MessageType::Attempt,
            17 => MessageType::WrongAttempt,
            18 => MessageType::HintRelay,
            19 => MessageType::ContinueRelay,
            31 => MessageType::PasswordIncorrect,
            32 => MessageType::NoOpponents,
            33 => MessageType::GameOver,
            34 => MessageType::WrongState,
            35 => MessageType::Win,
            36 => MessageType::CorrectAttempt,
            _ => MessageType::Unknown,
        }
    }

    /// Human-readable label used in observer notifications.
    pub fn label(&self) -> &'static str {
        match self {
            MessageType::SubmitPassword => "Password sent",
            MessageType::RequestOpponents => "Get opponents",
            MessageType::Challenge => "Challenge",
            MessageType::Move => "Move",
            MessageType::Hint => "Hint",
            MessageType::GiveUp => "Give up",
            MessageType::Continue => "Continue",
            MessageType::AuthRequired => "Auth required",
            MessageType::PasswordCorrect => "Password correct",
            MessageType::ChallengeAccepted => "Challenge accepted",
            MessageType::ChallengeRejected => "Challenge rejected",
            MessageType::Opponents => "Opponents",
            MessageType::GuessStart => "Guess start",
            MessageType::Attempt => "Attempt",
            MessageType::WrongAttempt => "Wrong attempt",
            MessageType::HintRelay => "Hint",
            MessageType::ContinueRelay => "Continue",
            MessageType::PasswordIncorrect => "Password incorrect",
            MessageType::NoOpponents => "No opponents",
            MessageType::GameOver => "Game over",
            MessageType::WrongState => "Wrong state",
            MessageType::Win => "Win",
            MessageType::CorrectAttempt => "Correct attempt",
            MessageType::Unknown => "Unknown message",
        }
    }

    /// Whether this type is one a client may legally send.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MessageType::SubmitPassword
                | MessageType::RequestOpponents
                | MessageType::Challenge
                | MessageType::Move
                | MessageType::Hint
                | MessageType::GiveUp
                | MessageType::Continue
        )
    }
}

/// One decoded protocol message.
///
/// A zero-length payload on the wire decodes as `None`; the two are not
/// distinguishable once framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub payload: Option<String>,
}

impl Message {
    /// A message with no payload.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            payload: None,
        }
    }

    /// A message carrying a text payload.
    pub fn with_payload(message_type: MessageType, payload: impl Into<String>) -> Self {
        Self {
            message_type,
            payload: Some(payload.into()),
        }
    }
}

/// Encode the composite challenge payload: `secret|opponent_id`, or the
/// bare secret when no explicit opponent is targeted.
pub fn encode_pair_request(secret: &str, opponent_id: Option<u64>) -> String {
    match opponent_id {
        Some(id) => format!("{}|{}", secret, id),
        None => secret.to_string(),
    }
}

/// Decode the composite challenge payload into the secret and the raw
/// opponent id segment. A missing or empty id segment means "no explicit
/// opponent"; the segment is returned unparsed so the caller can decide
/// what a non-numeric id means.
pub fn decode_pair_request(payload: &str) -> (&str, Option<&str>) {
    match payload.split_once('|') {
        Some((secret, "")) => (secret, None),
        Some((secret, id)) => (secret, Some(id)),
        None => (payload, None),
    }
}
