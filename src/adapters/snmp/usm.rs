//! SNMPv3 User-based Security Model: key localization, HMAC authentication,
//! DES-CBC / AES-128-CFB privacy (authPriv only).

use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use des::Des;
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use sha1::Sha1;

use crate::credentials::{SnmpAuthProtocol, SnmpPrivProtocol};

const PASSWORD_BUFFER_LEN: usize = 1_048_576;

fn password_to_key_md5(password: &[u8]) -> Vec<u8> {
    let mut hasher = <md5::Md5 as md5::Digest>::new();
    let mut remaining = PASSWORD_BUFFER_LEN;
    let mut cycle = Vec::with_capacity(64);
    while remaining > 0 {
        let take = remaining.min(64);
        cycle.clear();
        for i in 0..take {
            cycle.push(password[(cycle.len() + i) % password.len()]);
        }
        md5::Digest::update(&mut hasher, &cycle);
        remaining -= take;
    }
    md5::Digest::finalize(hasher).to_vec()
}

fn password_to_key_sha1(password: &[u8]) -> Vec<u8> {
    use sha1::Digest;
    let mut hasher = Sha1::new();
    let mut remaining = PASSWORD_BUFFER_LEN;
    let mut cycle = Vec::with_capacity(64);
    while remaining > 0 {
        let take = remaining.min(64);
        cycle.clear();
        for i in 0..take {
            cycle.push(password[(cycle.len() + i) % password.len()]);
        }
        hasher.update(&cycle);
        remaining -= take;
    }
    hasher.finalize_reset().to_vec()
}

/// Localizes a password into a per-engine authentication/privacy key
/// (RFC 3414 §2.6): `Hash(Ku || engineID || Ku)`.
pub fn localize_key(protocol: SnmpAuthProtocol, password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    match protocol {
        SnmpAuthProtocol::Md5 => {
            let ku = password_to_key_md5(password);
            let mut buf = Vec::with_capacity(ku.len() * 2 + engine_id.len());
            buf.extend_from_slice(&ku);
            buf.extend_from_slice(engine_id);
            buf.extend_from_slice(&ku);
            let mut hasher = <md5::Md5 as md5::Digest>::new();
            md5::Digest::update(&mut hasher, &buf);
            md5::Digest::finalize(hasher).to_vec()
        }
        SnmpAuthProtocol::Sha => {
            use sha1::Digest;
            let ku = password_to_key_sha1(password);
            let mut buf = Vec::with_capacity(ku.len() * 2 + engine_id.len());
            buf.extend_from_slice(&ku);
            buf.extend_from_slice(engine_id);
            buf.extend_from_slice(&ku);
            Sha1::digest(&buf).to_vec()
        }
    }
}

/// Computes the 12-byte (HMAC-96) authentication parameter over the whole
/// serialized message (with the auth-parameters field already zeroed out).
pub fn authenticate(protocol: SnmpAuthProtocol, key: &[u8], message: &[u8]) -> [u8; 12] {
    let digest = match protocol {
        SnmpAuthProtocol::Md5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        SnmpAuthProtocol::Sha => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };
    let mut out = [0u8; 12];
    out.copy_from_slice(&digest[..12]);
    out
}

type DesCfb8Enc = cfb_mode::Encryptor<Des>;
type DesCfb8Dec = cfb_mode::Decryptor<Des>;
type Aes128Cfb128Enc = cfb_mode::Encryptor<Aes128>;
type Aes128Cfb128Dec = cfb_mode::Decryptor<Aes128>;

/// Encrypts a scopedPDU, returning the ciphertext and the 8-byte privacy
/// parameter (the salt) to embed in the USM security parameters.
pub fn encrypt(
    protocol: SnmpPrivProtocol,
    priv_key: &[u8],
    boots: u32,
    engine_time: u32,
    plaintext: &[u8],
) -> (Vec<u8>, [u8; 8]) {
    let mut rng = rand::thread_rng();
    match protocol {
        SnmpPrivProtocol::Des => {
            let mut salt = [0u8; 8];
            rng.fill_bytes(&mut salt);
            let mut iv = [0u8; 8];
            iv[..4].copy_from_slice(&priv_key[8..12]);
            for i in 0..8 {
                iv[i] ^= salt[i % 4 + 4 * (i / 4).min(1)];
            }
            let key: [u8; 8] = priv_key[..8].try_into().expect("DES key is 8 bytes");
            let mut buf = plaintext.to_vec();
            DesCfb8Enc::new(&key.into(), &iv.into()).encrypt(&mut buf);
            (buf, salt)
        }
        SnmpPrivProtocol::Aes => {
            let mut salt = [0u8; 8];
            rng.fill_bytes(&mut salt);
            let mut iv = [0u8; 16];
            iv[..4].copy_from_slice(&boots.to_be_bytes());
            iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
            iv[8..].copy_from_slice(&salt);
            let key: [u8; 16] = priv_key[..16].try_into().expect("AES-128 key is 16 bytes");
            let mut buf = plaintext.to_vec();
            Aes128Cfb128Enc::new(&key.into(), &iv.into()).encrypt(&mut buf);
            (buf, salt)
        }
    }
}

pub fn decrypt(
    protocol: SnmpPrivProtocol,
    priv_key: &[u8],
    boots: u32,
    engine_time: u32,
    salt: [u8; 8],
    ciphertext: &[u8],
) -> Vec<u8> {
    match protocol {
        SnmpPrivProtocol::Des => {
            let mut iv = [0u8; 8];
            iv[..4].copy_from_slice(&priv_key[8..12]);
            for i in 0..8 {
                iv[i] ^= salt[i % 4 + 4 * (i / 4).min(1)];
            }
            let key: [u8; 8] = priv_key[..8].try_into().expect("DES key is 8 bytes");
            let mut buf = ciphertext.to_vec();
            DesCfb8Dec::new(&key.into(), &iv.into()).decrypt(&mut buf);
            buf
        }
        SnmpPrivProtocol::Aes => {
            let mut iv = [0u8; 16];
            iv[..4].copy_from_slice(&boots.to_be_bytes());
            iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
            iv[8..].copy_from_slice(&salt);
            let key: [u8; 16] = priv_key[..16].try_into().expect("AES-128 key is 16 bytes");
            let mut buf = ciphertext.to_vec();
            Aes128Cfb128Dec::new(&key.into(), &iv.into()).decrypt(&mut buf);
            buf
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localize_key_md5_is_16_bytes() {
        let key = localize_key(SnmpAuthProtocol::Md5, b"authpassword", b"engine-id-bytes");
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn localize_key_sha_is_20_bytes() {
        let key = localize_key(SnmpAuthProtocol::Sha, b"authpassword", b"engine-id-bytes");
        assert_eq!(key.len(), 20);
    }

    #[test]
    fn authenticate_is_deterministic() {
        let key = localize_key(SnmpAuthProtocol::Md5, b"authpassword", b"engine");
        let a = authenticate(SnmpAuthProtocol::Md5, &key, b"some message bytes");
        let b = authenticate(SnmpAuthProtocol::Md5, &key, b"some message bytes");
        assert_eq!(a, b);
    }
}
