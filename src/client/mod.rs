//! Interactive terminal client
//!
//! A thin harness around the wire protocol: it prints what the server
//! says and prompts for what to send next. One session plays one game,
//! as either the challenger (pick an opponent and a secret word) or the
//! guesser (answer guess prompts until the word is found or someone
//! gives up).

use std::io::Write as _;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;

use crate::network::resolve_host;
use crate::protocol::{encode, encode_pair_request, FrameDecoder, Message, MessageType};

/// Read buffer chunk size
const READ_CHUNK_SIZE: usize = 1024;

/// Connect and play until the server closes the connection.
///
/// With `challenge` set the client asks for opponents right after logging
/// in; otherwise it waits to be challenged.
pub async fn run(server: &str, port: u16, challenge: bool) -> anyhow::Result<()> {
    let addr = resolve_host(server, port).await?;
    let mut stream = TcpStream::connect(addr).await?;
    println!("Connected to server!");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);

    loop {
        let message = loop {
            if let Some(message) = decoder.decode(&mut buf) {
                break Some(message);
            }
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match stream.read(&mut chunk).await? {
                0 => break None,
                n => buf.extend_from_slice(&chunk[..n]),
            }
        };
        let Some(message) = message else {
            println!("Connection to server closed");
            return Ok(());
        };

        match message.message_type {
            MessageType::AuthRequired => {
                let password = prompt(&mut lines, "Enter password: ").await?;
                send(
                    &mut stream,
                    Message::with_payload(MessageType::SubmitPassword, password),
                )
                .await?;
            }
            MessageType::PasswordCorrect => {
                println!(
                    "Password correct! Client id: {}",
                    message.payload.as_deref().unwrap_or("?")
                );
                if challenge {
                    send(&mut stream, Message::new(MessageType::RequestOpponents)).await?;
                }
            }
            MessageType::Opponents => {
                println!("Opponents: {}", message.payload.as_deref().unwrap_or(""));
                let opponent = prompt(&mut lines, "Enter opponent id: ").await?;
                let secret = prompt(&mut lines, "Enter secret to guess: ").await?;
                let payload = encode_pair_request(&secret, opponent.trim().parse().ok());
                send(
                    &mut stream,
                    Message::with_payload(MessageType::Challenge, payload),
                )
                .await?;
            }
            MessageType::ChallengeAccepted => {
                println!("Challenge accepted! Waiting for attempts...");
            }
            MessageType::ChallengeRejected => {
                println!("Challenge rejected!");
            }
            MessageType::HintRelay => {
                println!(
                    "Hint received: {}",
                    message.payload.as_deref().unwrap_or("")
                );
                let guess = prompt(&mut lines, "Enter guess: ").await?;
                send(&mut stream, Message::with_payload(MessageType::Move, guess)).await?;
            }
            MessageType::GuessStart | MessageType::ContinueRelay => {
                let guess = prompt(&mut lines, "Enter guess: ").await?;
                send(&mut stream, Message::with_payload(MessageType::Move, guess)).await?;
            }
            MessageType::Attempt => {
                println!("Attempt made!");
                let hint = prompt(&mut lines, "Enter a hint, if you want: ").await?;
                if hint.is_empty() {
                    send(&mut stream, Message::new(MessageType::Continue)).await?;
                } else {
                    send(&mut stream, Message::with_payload(MessageType::Hint, hint)).await?;
                }
            }
            MessageType::WrongAttempt => {
                println!("Wrong attempt! Wait for master's next instruction.");
            }
            MessageType::GameOver => println!("Game over!"),
            MessageType::Win => println!("You win!"),
            MessageType::CorrectAttempt => println!("Correct attempt!"),
            MessageType::PasswordIncorrect => println!("Password incorrect!"),
            MessageType::NoOpponents => println!("No opponents available!"),
            MessageType::WrongState => println!("Wrong state!"),
            _ => {
                println!("Received unknown message.");
                return Ok(());
            }
        }
    }
}

async fn send(stream: &mut TcpStream, message: Message) -> anyhow::Result<()> {
    stream.write_all(&encode(&message)).await?;
    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> anyhow::Result<String> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.unwrap_or_default())
}
