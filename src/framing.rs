//! Payload framing (C4): authenticated encryption, optional compression,
//! and plaintext-digest integrity (§4.4, §6).
//!
//! Wire layout: `magic(4) ∥ version(1) ∥ flags(1) ∥ nonce(12) ∥
//! plaintext-length(8, big-endian) ∥ ciphertext ∥ mac(16)`. The placeholder
//! digest is always the plaintext hash, computed before framing, so two
//! clients with independent compression settings still compare equal (I5).

use argon2::password_hash::SaltString;
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use std::convert::TryInto;

use crate::error::{FramingError, SyncError};
use crate::util::hash_hex;

const MAGIC: &[u8; 4] = b"ESC1";
const VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_ENCRYPTED: u8 = 0b0000_0010;

/// A 32-byte symmetric key derived from a repository passphrase.
#[derive(Clone)]
pub struct PayloadKey([u8; 32]);

impl PayloadKey {
	/// Derive a key from `passphrase` and the repository's stored salt via
	/// Argon2id (§4.4).
	pub fn derive(passphrase: &str, salt: &str) -> Result<Self, SyncError> {
		let salt = SaltString::from_b64(salt)
			.map_err(|e| SyncError::Config { message: format!("invalid salt: {}", e) })?;
		let mut key = [0u8; 32];
		Argon2::default()
			.hash_password_into(passphrase.as_bytes(), salt.as_str().as_bytes(), &mut key)
			.map_err(|e| SyncError::Config { message: format!("key derivation failed: {}", e) })?;
		Ok(PayloadKey(key))
	}

	pub fn generate_salt() -> String {
		SaltString::generate(&mut rand::rngs::OsRng).to_string()
	}
}

/// Frame plaintext into the on-relay payload format. `key` is `None` when
/// the repository has no passphrase configured, in which case the payload
/// is stored compressed-only (still integrity-checked via the placeholder
/// digest, but not authenticated).
pub fn frame(plaintext: &[u8], key: Option<&PayloadKey>, compress: bool) -> Result<Vec<u8>, SyncError> {
	let body = if compress {
		zstd::encode_all(plaintext, 0)
			.map_err(|e| SyncError::Framing(FramingError::CompressionFailed { message: e.to_string() }))?
	} else {
		plaintext.to_vec()
	};

	let mut flags = 0u8;
	if compress {
		flags |= FLAG_COMPRESSED;
	}

	let mut out = Vec::with_capacity(4 + 1 + 1 + NONCE_LEN + 8 + body.len() + 16);
	out.extend_from_slice(MAGIC);
	out.push(VERSION);

	if let Some(key) = key {
		flags |= FLAG_ENCRYPTED;
		let cipher = ChaCha20Poly1305::new(key.0.as_slice().into());
		let mut nonce_bytes = [0u8; NONCE_LEN];
		rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);
		let ciphertext = cipher
			.encrypt(nonce, body.as_slice())
			.map_err(|_| SyncError::Framing(FramingError::DecryptionFailed))?;

		out.push(flags);
		out.extend_from_slice(&nonce_bytes);
		out.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
		out.extend_from_slice(&ciphertext);
	} else {
		out.push(flags);
		out.extend_from_slice(&[0u8; NONCE_LEN]);
		out.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
		out.extend_from_slice(&body);
	}

	Ok(out)
}

/// Reverse [`frame`], verifying the MAC (if encrypted) and returning the
/// original plaintext.
pub fn unframe(framed: &[u8], key: Option<&PayloadKey>) -> Result<Vec<u8>, SyncError> {
	if framed.len() < 4 + 1 + 1 + NONCE_LEN + 8 {
		return Err(SyncError::Framing(FramingError::InvalidHeader {
			message: "frame shorter than header".to_string(),
		}));
	}

	if &framed[0..4] != MAGIC {
		return Err(SyncError::Framing(FramingError::UnknownMagic));
	}

	let version = framed[4];
	if version != VERSION {
		return Err(SyncError::Framing(FramingError::UnsupportedVersion { version }));
	}

	let flags = framed[5];
	let nonce_bytes = &framed[6..6 + NONCE_LEN];
	let len_offset = 6 + NONCE_LEN;
	let plaintext_len =
		u64::from_be_bytes(framed[len_offset..len_offset + 8].try_into().unwrap()) as usize;
	let body = &framed[len_offset + 8..];

	let decompressed_or_ciphertext = if flags & FLAG_ENCRYPTED != 0 {
		let key = key.ok_or(SyncError::Framing(FramingError::DecryptionFailed))?;
		let cipher = ChaCha20Poly1305::new(key.0.as_slice().into());
		let nonce = Nonce::from_slice(nonce_bytes);
		cipher.decrypt(nonce, body).map_err(|_| SyncError::Framing(FramingError::DecryptionFailed))?
	} else {
		body.to_vec()
	};

	let plaintext = if flags & FLAG_COMPRESSED != 0 {
		zstd::decode_all(decompressed_or_ciphertext.as_slice())
			.map_err(|e| SyncError::Framing(FramingError::CompressionFailed { message: e.to_string() }))?
	} else {
		decompressed_or_ciphertext
	};

	if plaintext.len() != plaintext_len {
		return Err(SyncError::Framing(FramingError::InvalidHeader {
			message: "plaintext length mismatch".to_string(),
		}));
	}

	Ok(plaintext)
}

/// Compute the placeholder digest for `plaintext` (always hashed before
/// framing, per I5).
pub fn plaintext_digest(plaintext: &[u8]) -> String {
	hash_hex(plaintext)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_roundtrip_plain() {
		let data = b"hello, escale";
		let framed = frame(data, None, false).unwrap();
		let restored = unframe(&framed, None).unwrap();
		assert_eq!(restored, data);
	}

	#[test]
	fn test_roundtrip_compressed() {
		let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
		let framed = frame(data, None, true).unwrap();
		let restored = unframe(&framed, None).unwrap();
		assert_eq!(restored, data);
	}

	#[test]
	fn test_roundtrip_encrypted() {
		let key = PayloadKey::derive("correct horse", &PayloadKey::generate_salt()).unwrap();
		let data = b"top secret contents";
		let framed = frame(data, Some(&key), true).unwrap();
		let restored = unframe(&framed, Some(&key)).unwrap();
		assert_eq!(restored, data);
	}

	#[test]
	fn test_digest_matches_plaintext_not_framed_bytes() {
		let data = b"same content, different compression settings";
		let compressed = frame(data, None, true).unwrap();
		let uncompressed = frame(data, None, false).unwrap();
		assert_ne!(compressed, uncompressed);
		assert_eq!(plaintext_digest(data), plaintext_digest(data));
	}

	#[test]
	fn test_tampered_ciphertext_fails_mac() {
		let key = PayloadKey::derive("pw", &PayloadKey::generate_salt()).unwrap();
		let mut framed = frame(b"data", Some(&key), false).unwrap();
		let last = framed.len() - 1;
		framed[last] ^= 0xFF;
		assert!(unframe(&framed, Some(&key)).is_err());
	}

	#[test]
	fn test_wrong_key_fails() {
		let key_a = PayloadKey::derive("a", &PayloadKey::generate_salt()).unwrap();
		let key_b = PayloadKey::derive("b", &PayloadKey::generate_salt()).unwrap();
		let framed = frame(b"data", Some(&key_a), false).unwrap();
		assert!(unframe(&framed, Some(&key_b)).is_err());
	}

	#[test]
	fn test_empty_payload() {
		let framed = frame(&[], None, false).unwrap();
		assert_eq!(unframe(&framed, None).unwrap(), Vec::<u8>::new());
	}

	#[test]
	fn test_unknown_magic_rejected() {
		let mut framed = frame(b"x", None, false).unwrap();
		framed[0] = b'X';
		assert!(matches!(unframe(&framed, None), Err(SyncError::Framing(FramingError::UnknownMagic))));
	}
}

// vim: ts=4
