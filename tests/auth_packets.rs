//! Auth-phase writers: wire shapes and the caching_sha2 public-key
//! exchange against an in-test RSA keypair.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use pretty_assertions::assert_eq;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use strand_mysql::{Conn, Stream, auth};

fn conn_with_raw_peer() -> (Conn, UnixStream) {
    let (a, b) = UnixStream::pair().unwrap();
    (Conn::new(Stream::unix(a)), b)
}

fn read_packet_raw(peer: &mut UnixStream) -> (u8, Vec<u8>) {
    let mut header = [0_u8; 4];
    peer.read_exact(&mut header).unwrap();
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut body = vec![0_u8; len];
    peer.read_exact(&mut body).unwrap();
    (header[3], body)
}

fn write_packet_raw(peer: &mut UnixStream, seq: u8, payload: &[u8]) {
    let len = payload.len();
    let header = [len as u8, (len >> 8) as u8, (len >> 16) as u8, seq];
    peer.write_all(&header).unwrap();
    peer.write_all(payload).unwrap();
}

#[test]
fn clear_auth_packet_is_null_terminated() {
    let (mut conn, mut peer) = conn_with_raw_peer();
    conn.write_clear_auth_packet("s3cret").unwrap();

    let (seq, body) = read_packet_raw(&mut peer);
    assert_eq!(seq, 0);
    assert_eq!(body, b"s3cret\0");
}

#[test]
fn empty_clear_password_is_a_lone_nul() {
    let (mut conn, mut peer) = conn_with_raw_peer();
    conn.write_clear_auth_packet("").unwrap();

    let (_, body) = read_packet_raw(&mut peer);
    assert_eq!(body, b"\0");
}

#[test]
fn auth_switch_packet_honors_nul_flag() {
    let (mut conn, mut peer) = conn_with_raw_peer();

    conn.write_auth_switch_packet(b"\x01\x02\x03", false).unwrap();
    let (seq, body) = read_packet_raw(&mut peer);
    assert_eq!(seq, 0);
    assert_eq!(body, [0x01, 0x02, 0x03]);

    conn.write_auth_switch_packet(b"\x01\x02\x03", true).unwrap();
    let (seq, body) = read_packet_raw(&mut peer);
    assert_eq!(seq, 1);
    assert_eq!(body, [0x01, 0x02, 0x03, 0x00]);
}

#[test]
fn public_key_exchange_encrypts_xored_password() {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = RsaPublicKey::from(&private);
    let pem = public
        .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
        .unwrap();

    let (conn, mut peer) = conn_with_raw_peer();

    let seed = [0x17_u8; 20];
    let handle = thread::spawn(move || {
        let mut conn = conn;
        conn.write_public_key_auth_packet("hunter2", &seed).unwrap();
        conn
    });

    // The single-byte 0x02 packet requests the public key
    let (seq, body) = read_packet_raw(&mut peer);
    assert_eq!(seq, 0);
    assert_eq!(body, [0x02]);

    // Respond with AuthMoreData (0x01) followed by the PEM
    let mut payload = vec![0x01_u8];
    payload.extend_from_slice(pem.as_bytes());
    write_packet_raw(&mut peer, 1, &payload);

    // The ciphertext comes back as one packet
    let (seq, ciphertext) = read_packet_raw(&mut peer);
    assert_eq!(seq, 2);
    assert_eq!(ciphertext.len(), 256);

    let plain = private.decrypt(Oaep::new::<Sha1>(), &ciphertext).unwrap();
    assert_eq!(plain, auth::xor_password("hunter2", &seed));

    let conn = handle.join().unwrap();
    assert_eq!(conn.sequence(), 3);
}

#[test]
fn encrypted_password_rides_an_auth_switch_packet() {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = RsaPublicKey::from(&private);

    let (mut conn, mut peer) = conn_with_raw_peer();

    let seed = b"abcdefghijklmnopqrst";
    conn.write_encrypted_password("hunter2", seed, &public).unwrap();

    let (_, ciphertext) = read_packet_raw(&mut peer);
    let plain = private.decrypt(Oaep::new::<Sha1>(), &ciphertext).unwrap();
    assert_eq!(plain, auth::xor_password("hunter2", seed));
}

#[test]
fn garbage_public_key_payload_is_rejected() {
    let (conn, mut peer) = conn_with_raw_peer();

    let handle = thread::spawn(move || {
        let mut conn = conn;
        conn.write_public_key_auth_packet("pw", &[0x01; 20])
            .unwrap_err()
    });

    let (_, body) = read_packet_raw(&mut peer);
    assert_eq!(body, [0x02]);
    write_packet_raw(&mut peer, 1, b"\x01not a pem key");

    let err = handle.join().unwrap();
    assert!(!err.is_conn_broken(), "auth parse errors keep the conn usable");
}
