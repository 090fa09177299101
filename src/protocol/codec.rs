//! Message framing over a byte stream
//!
//! Plain mode: one compact JSON document per line.
//!
//! Secure mode: `[u32 BE length][12-byte nonce][ChaCha20-Poly1305 ciphertext]`
//! where the length covers nonce and ciphertext. Each frame is written with a
//! single `write_all` so frames never interleave.

use crate::protocol::error::ProtocolError;
use crate::protocol::secret::SharedSecret;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const NONCE_SIZE: usize = 12;

/// Hard cap on a single frame
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Reading half of a framed connection
pub struct FrameReader<R> {
	inner: BufReader<R>,
	cipher: Option<Arc<ChaCha20Poly1305>>,
	max_frame: usize,
}

/// Writing half of a framed connection
pub struct FrameWriter<W> {
	inner: W,
	cipher: Option<Arc<ChaCha20Poly1305>>,
	max_frame: usize,
}

/// Wrap both halves of a connection. `secret` selects secure mode.
pub fn framed<R, W>(
	reader: R,
	writer: W,
	secret: Option<&SharedSecret>,
	max_frame: usize,
) -> (FrameReader<R>, FrameWriter<W>)
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let cipher = secret.map(|s| Arc::new(s.cipher()));
	let max_frame = max_frame.min(MAX_FRAME_BYTES);
	(
		FrameReader { inner: BufReader::new(reader), cipher: cipher.clone(), max_frame },
		FrameWriter { inner: writer, cipher, max_frame },
	)
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
	/// Read and decode the next message
	pub async fn decode<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
		let payload = match self.cipher.clone() {
			Some(cipher) => self.read_sealed(&cipher).await?,
			None => self.read_line().await?,
		};
		Ok(serde_json::from_slice(&payload)?)
	}

	async fn read_line(&mut self) -> Result<Vec<u8>, ProtocolError> {
		loop {
			let mut buf = Vec::new();
			let limit = self.max_frame as u64 + 1;
			let n = (&mut self.inner).take(limit).read_until(b'\n', &mut buf).await?;
			if n == 0 {
				return Err(ProtocolError::Closed);
			}
			if buf.last() == Some(&b'\n') {
				buf.pop();
			} else if buf.len() > self.max_frame {
				return Err(ProtocolError::FrameTooLarge { size: buf.len(), max: self.max_frame });
			}
			if buf.iter().all(|b| b.is_ascii_whitespace()) {
				continue;
			}
			return Ok(buf);
		}
	}

	async fn read_sealed(&mut self, cipher: &ChaCha20Poly1305) -> Result<Vec<u8>, ProtocolError> {
		let size = self.inner.read_u32().await? as usize;
		if size == 0 {
			return Err(ProtocolError::InvalidFrame("zero length".to_string()));
		}
		if size > self.max_frame {
			return Err(ProtocolError::FrameTooLarge { size, max: self.max_frame });
		}
		if size <= NONCE_SIZE {
			return Err(ProtocolError::InvalidFrame(format!("{} bytes is too short", size)));
		}

		let mut frame = vec![0u8; size];
		self.inner.read_exact(&mut frame).await?;
		let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);
		cipher
			.decrypt(Nonce::from_slice(nonce), ciphertext)
			.map_err(|_| ProtocolError::Crypto("frame authentication failed".to_string()))
	}
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
	/// Encode and write one message
	pub async fn encode<T: Serialize>(&mut self, msg: &T) -> Result<(), ProtocolError> {
		let payload = serde_json::to_vec(msg)?;
		let frame = match &self.cipher {
			Some(cipher) => seal(cipher, &payload, self.max_frame)?,
			None => {
				if payload.len() > self.max_frame {
					return Err(ProtocolError::FrameTooLarge {
						size: payload.len(),
						max: self.max_frame,
					});
				}
				let mut line = payload;
				line.push(b'\n');
				line
			}
		};
		self.inner.write_all(&frame).await?;
		self.inner.flush().await?;
		Ok(())
	}

	/// Flush and shut down the write direction
	pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
		self.inner.shutdown().await?;
		Ok(())
	}
}

fn seal(cipher: &ChaCha20Poly1305, payload: &[u8], max_frame: usize) -> Result<Vec<u8>, ProtocolError> {
	let mut nonce = [0u8; NONCE_SIZE];
	rand::thread_rng().fill_bytes(&mut nonce);
	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce), payload)
		.map_err(|_| ProtocolError::Crypto("encryption failed".to_string()))?;

	let size = NONCE_SIZE + ciphertext.len();
	if size > max_frame {
		return Err(ProtocolError::FrameTooLarge { size, max: max_frame });
	}

	let mut frame = Vec::with_capacity(4 + size);
	frame.extend_from_slice(&(size as u32).to_be_bytes());
	frame.extend_from_slice(&nonce);
	frame.extend_from_slice(&ciphertext);
	Ok(frame)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::messages::{WantPayload, WireMessage};
	use tokio::io::duplex;

	fn want(n: usize) -> WireMessage {
		WireMessage::Want(WantPayload { team_id: "t1".into(), paths: vec!["p".repeat(n)] })
	}

	#[tokio::test]
	async fn test_plain_mode_is_json_lines() {
		let (a, mut b) = duplex(1 << 16);
		let (_r, mut w) = framed(tokio::io::empty(), a, None, MAX_FRAME_BYTES);
		w.encode(&WireMessage::WantDone).await.unwrap();
		drop(w);

		let mut raw = String::new();
		b.read_to_string(&mut raw).await.unwrap();
		assert_eq!(raw, "{\"type\":\"want_done\"}\n");
	}

	#[tokio::test]
	async fn test_secure_round_trip() {
		let secret = SharedSecret::from_passphrase("pw");
		let (a, b) = duplex(1 << 16);
		let (_ra, mut wa) = framed(tokio::io::empty(), a, Some(&secret), MAX_FRAME_BYTES);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), Some(&secret), MAX_FRAME_BYTES);

		wa.encode(&want(10)).await.unwrap();
		wa.encode(&WireMessage::FileDone).await.unwrap();
		assert_eq!(rb.decode::<WireMessage>().await.unwrap(), want(10));
		assert_eq!(rb.decode::<WireMessage>().await.unwrap(), WireMessage::FileDone);
	}

	#[tokio::test]
	async fn test_wrong_key_fails_decode() {
		let (a, b) = duplex(1 << 16);
		let (_ra, mut wa) = framed(tokio::io::empty(), a, Some(&SharedSecret::from_passphrase("one")), MAX_FRAME_BYTES);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), Some(&SharedSecret::from_passphrase("two")), MAX_FRAME_BYTES);

		wa.encode(&WireMessage::WantDone).await.unwrap();
		assert!(matches!(rb.decode::<WireMessage>().await, Err(ProtocolError::Crypto(_))));
	}

	#[tokio::test]
	async fn test_rejects_bad_lengths() {
		let secret = SharedSecret::from_passphrase("pw");

		let (mut a, b) = duplex(1 << 16);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), Some(&secret), 1024);
		a.write_all(&0u32.to_be_bytes()).await.unwrap();
		assert!(matches!(rb.decode::<WireMessage>().await, Err(ProtocolError::InvalidFrame(_))));

		let (mut a, b) = duplex(1 << 16);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), Some(&secret), 1024);
		a.write_all(&4096u32.to_be_bytes()).await.unwrap();
		assert!(matches!(
			rb.decode::<WireMessage>().await,
			Err(ProtocolError::FrameTooLarge { size: 4096, max: 1024 })
		));
	}

	#[tokio::test]
	async fn test_writer_enforces_cap() {
		let (a, _b) = duplex(1 << 16);
		let (_r, mut w) = framed(tokio::io::empty(), a, None, 64);
		assert!(matches!(w.encode(&want(100)).await, Err(ProtocolError::FrameTooLarge { .. })));
	}

	#[tokio::test]
	async fn test_oversized_plain_line() {
		let (mut a, b) = duplex(1 << 16);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), None, 16);
		a.write_all(&[b'x'; 64]).await.unwrap();
		assert!(matches!(rb.decode::<WireMessage>().await, Err(ProtocolError::FrameTooLarge { .. })));
	}

	#[tokio::test]
	async fn test_closed_stream() {
		let (a, b) = duplex(64);
		drop(a);
		let (mut rb, _wb) = framed(b, tokio::io::sink(), None, MAX_FRAME_BYTES);
		assert!(matches!(rb.decode::<WireMessage>().await, Err(ProtocolError::Closed)));
	}
}

// vim: ts=4
