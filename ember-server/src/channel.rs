//! The framed, cipher-switching TCP message channel used by the Login and
//! Auth services (and by test clients, which run it with the mirror-image
//! ciphers).
//!
//! Only the record payload is encrypted; the packet and message headers
//! travel in clear inside the frame. The channel starts life on RSA and
//! is switched to CWC mid-connection by the Auth handshake, including a
//! brief `None` window for the one hardcoded plaintext response.

use std::fmt;

use ember_crypto::{Cipher, CipherError};
use ember_proto::cursor::DecodeError;
use ember_proto::tcp::{MAX_PACKET_LEN, TcpMessage, TcpPacket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Errors on the TCP message channel; all of them close the connection.
#[derive(Debug)]
pub enum ChannelError {
    Io(std::io::Error),
    Cipher(CipherError),
    Decode(DecodeError),
    /// Zero or oversized frame length.
    BadFrameLength(usize),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)     => write!(f, "io: {e}"),
            Self::Cipher(e) => write!(f, "cipher: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::BadFrameLength(n) => write!(f, "bad frame length {n}"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<std::io::Error> for ChannelError {
    fn from(e: std::io::Error) -> Self { Self::Io(e) }
}

impl From<CipherError> for ChannelError {
    fn from(e: CipherError) -> Self { Self::Cipher(e) }
}

impl From<DecodeError> for ChannelError {
    fn from(e: DecodeError) -> Self { Self::Decode(e) }
}

/// One framed TCP connection with a swappable payload cipher.
pub struct MessageChannel {
    stream: TcpStream,
    cipher: Option<Box<dyn Cipher>>,
    send_counter: u16,
}

impl MessageChannel {
    pub fn new(stream: TcpStream, cipher: Box<dyn Cipher>) -> Self {
        Self { stream, cipher: Some(cipher), send_counter: 0 }
    }

    /// Swap the payload cipher; `None` sends and receives plaintext.
    pub fn set_cipher(&mut self, cipher: Option<Box<dyn Cipher>>) {
        self.cipher = cipher;
    }

    /// Receive and decrypt the next message.
    pub async fn recv_message(&mut self) -> Result<TcpMessage, ChannelError> {
        let frame_len = self.stream.read_u16().await? as usize;
        if frame_len == 0 || frame_len > MAX_PACKET_LEN {
            return Err(ChannelError::BadFrameLength(frame_len));
        }

        let mut body = vec![0u8; frame_len];
        self.stream.read_exact(&mut body).await?;

        let packet = TcpPacket::parse(&body)?;
        let mut message = TcpMessage::parse(&packet.payload)?;
        if let Some(cipher) = &mut self.cipher {
            message.payload = cipher.decrypt(&message.payload)?;
        }
        Ok(message)
    }

    /// Encrypt and send one message.
    pub async fn send_message(&mut self, mut message: TcpMessage) -> Result<(), ChannelError> {
        if let Some(cipher) = &mut self.cipher {
            message.payload = cipher.encrypt(&message.payload)?;
        }

        self.send_counter = self.send_counter.wrapping_add(1);
        let packet = TcpPacket {
            send_counter: self.send_counter,
            payload: message.to_bytes(),
        };
        self.stream.write_all(&packet.to_frame_bytes()).await?;
        Ok(())
    }

    /// Server side: answer a request, echoing its index.
    pub async fn send_response(
        &mut self,
        request_index: u32,
        payload: Vec<u8>,
    ) -> Result<(), ChannelError> {
        self.send_message(TcpMessage::response(request_index, payload)).await
    }

    /// Client side: issue a request.
    pub async fn send_request(
        &mut self,
        request_index: u32,
        payload: Vec<u8>,
    ) -> Result<(), ChannelError> {
        self.send_message(TcpMessage::request(request_index, payload)).await
    }
}
