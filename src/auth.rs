//! Auth-phase primitives the transport helpers need: the XOR + RSA-OAEP
//! pipeline used when the password travels over an unencrypted stream.
//! Scramble computation belongs to the authentication plugins above this
//! layer.

use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::error::Result;

/// XOR the null-terminated password byte-wise with the repeating seed.
///
/// The trailing NUL is part of the XOR'd buffer; the server relies on it to
/// find the end of the password after decryption.
pub fn xor_password(password: &str, seed: &[u8]) -> Vec<u8> {
    let mut plain = Vec::with_capacity(password.len() + 1);
    plain.extend_from_slice(password.as_bytes());
    plain.push(0);

    if seed.is_empty() {
        return plain;
    }
    for (i, byte) in plain.iter_mut().enumerate() {
        *byte ^= seed[i % seed.len()];
    }
    plain
}

/// Encrypt the password for transmission over an insecure stream.
///
/// The password is XOR'd with the handshake seed, then RSA-OAEP encrypted
/// with SHA-1 as both the hash and the MGF function, as the server expects
/// for sha256_password/caching_sha2_password full authentication.
pub fn encrypt_password(password: &str, seed: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>> {
    let plain = xor_password(password, seed);
    let mut rng = rand::thread_rng();
    Ok(key.encrypt(&mut rng, Oaep::new::<Sha1>(), &plain)?)
}
