//! Small standalone helpers shared across modules.

/// Hash a buffer using BLAKE3 and return its lowercase hex digest, as used
/// for placeholder digests (§6: "digest: hex of plaintext hash").
pub fn hash_hex(buf: &[u8]) -> String {
	hex::encode(blake3::hash(buf).as_bytes())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_hash_simple() {
		let src: [u8; 2] = [b'1', b'2'];
		let res = hash_hex(&src);
		assert_eq!(res.len(), 64);
		assert_eq!(res, hash_hex(&src));
	}

	#[test]
	fn test_hash_empty() {
		let res = hash_hex(&[]);
		assert_eq!(res.len(), 64);
	}

	#[test]
	fn test_hash_different_inputs() {
		assert_ne!(hash_hex(b"test1"), hash_hex(b"test2"));
	}
}

// vim: ts=4
