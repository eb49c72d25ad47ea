//! RDP standard security primitives: the non-FIPS session key derivation of
//! MS-RDPBCGR 5.3.5, MAC signatures, RC4, key refresh, and the proprietary
//! server certificate with its raw RSA operations.

mod rc4;

pub use self::rc4::Rc4;

use md5::{Digest as _, Md5};
use num_bigint::BigUint;
use sha1::Sha1;
use thiserror::Error;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::gcc::EncryptionMethod;
use crate::{PduDecode, PduEncode, PduError, PduResult};

pub const CLIENT_RANDOM_LEN: usize = 32;

/// Number of encryptions after which a session key is refreshed.
pub const KEY_UPDATE_INTERVAL: u64 = 4096;

const MAC_SIGNATURE_LEN: usize = 8;
const PREMASTER_HALF_LEN: usize = 24;

const SHA_PAD_INNER: [u8; 40] = [0x36; 40];
const MD5_PAD_OUTER: [u8; 48] = [0x5c; 48];

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported encryption method: {0:?}")]
    UnsupportedEncryptionMethod(EncryptionMethod),
    #[error("message too long for the RSA modulus")]
    MessageTooLong,
    #[error("unsupported server certificate (version {0})")]
    UnsupportedCertificateVersion(u32),
    #[error("MAC signature mismatch")]
    MacMismatch,
    #[error("PDU error: {0}")]
    Pdu(PduError),
}

impl From<PduError> for CryptoError {
    fn from(e: PduError) -> Self {
        Self::Pdu(e)
    }
}

/// One rung of the 5.3.5.1 ladder:
/// `MD5(secret ‖ SHA1(salt ‖ secret ‖ first ‖ second))`.
fn ladder_digest(secret: &[u8], first: &[u8], second: &[u8], salt: &[u8]) -> [u8; 16] {
    let mut sha = Sha1::new();
    sha.update(salt);
    sha.update(secret);
    sha.update(first);
    sha.update(second);
    let inner = sha.finalize();

    let mut md5 = Md5::new();
    md5.update(secret);
    md5.update(inner);
    md5.finalize().into()
}

/// Three ladder rungs concatenated into a 384-bit block. The master secret
/// uses the salts "A"/"BB"/"CCC", the session key blob "X"/"YY"/"ZZZ".
fn expand_secret(secret: &[u8], first: &[u8], second: &[u8], salts: [&[u8]; 3]) -> [u8; 48] {
    let mut out = [0u8; 48];

    for (rung, salt) in salts.into_iter().enumerate() {
        out[rung * 16..][..16].copy_from_slice(&ladder_digest(secret, first, second, salt));
    }

    out
}

/// `MD5(part ‖ client random ‖ server random)`, producing one 128-bit key.
fn final_hash(part: &[u8], client_random: &[u8], server_random: &[u8]) -> Vec<u8> {
    let mut md5 = Md5::new();
    md5.update(part);
    md5.update(client_random);
    md5.update(server_random);
    md5.finalize().to_vec()
}

/// 40- and 56-bit sessions keep only 64 key bits and overwrite the leading
/// bytes with fixed salts.
fn reduce_entropy(key: Vec<u8>, method: EncryptionMethod) -> Vec<u8> {
    let salt: &[u8] = if method == EncryptionMethod::BIT_40 {
        &[0xd1, 0x26, 0x9e]
    } else if method == EncryptionMethod::BIT_56 {
        &[0xd1]
    } else {
        return key;
    };

    let mut reduced = key;
    reduced.truncate(8);
    reduced[..salt.len()].copy_from_slice(salt);
    reduced
}

/// The session keys derived for one connection.
///
/// Directions use the protocol's vocabulary: the client encrypt key protects
/// client-to-server traffic, the server encrypt key the opposite direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub mac_key: Vec<u8>,
    pub client_encrypt_key: Vec<u8>,
    pub server_encrypt_key: Vec<u8>,
}

/// Derives the non-FIPS session keys as described in MS-RDPBCGR 5.3.5.1.
pub fn derive_session_keys(
    client_random: &[u8],
    server_random: &[u8],
    method: EncryptionMethod,
) -> Result<SessionKeys, CryptoError> {
    let is_rc4_method = method == EncryptionMethod::BIT_40
        || method == EncryptionMethod::BIT_56
        || method == EncryptionMethod::BIT_128;
    if !is_rc4_method {
        return Err(CryptoError::UnsupportedEncryptionMethod(method));
    }

    let mut premaster = [0u8; PREMASTER_HALF_LEN * 2];
    premaster[..PREMASTER_HALF_LEN].copy_from_slice(&client_random[..PREMASTER_HALF_LEN]);
    premaster[PREMASTER_HALF_LEN..].copy_from_slice(&server_random[..PREMASTER_HALF_LEN]);

    let master_secret = expand_secret(&premaster, client_random, server_random, [b"A", b"BB", b"CCC"]);
    let key_blob = expand_secret(&master_secret, client_random, server_random, [b"X", b"YY", b"ZZZ"]);

    let mac_key_len = if method == EncryptionMethod::BIT_128 { 16 } else { 8 };

    Ok(SessionKeys {
        mac_key: key_blob[..mac_key_len].to_vec(),
        server_encrypt_key: reduce_entropy(final_hash(&key_blob[16..32], client_random, server_random), method),
        client_encrypt_key: reduce_entropy(final_hash(&key_blob[32..48], client_random, server_random), method),
    })
}

/// Computes the 8-byte MAC signature prepended to encrypted payloads
/// (MS-RDPBCGR 5.3.6.1).
pub fn compute_mac_signature(mac_key: &[u8], data: &[u8]) -> [u8; MAC_SIGNATURE_LEN] {
    let mut sha = Sha1::new();
    sha.update(mac_key);
    sha.update(SHA_PAD_INNER);
    sha.update((data.len() as u32).to_le_bytes());
    sha.update(data);
    let inner = sha.finalize();

    let mut md5 = Md5::new();
    md5.update(mac_key);
    md5.update(MD5_PAD_OUTER);
    md5.update(inner);
    let digest = md5.finalize();

    let mut signature = [0u8; MAC_SIGNATURE_LEN];
    signature.copy_from_slice(&digest[..MAC_SIGNATURE_LEN]);
    signature
}

/// Refreshes a session key after [`KEY_UPDATE_INTERVAL`] uses
/// (MS-RDPBCGR 5.3.7).
pub fn update_session_key(initial_key: &[u8], current_key: &[u8], method: EncryptionMethod) -> Vec<u8> {
    let mut sha = Sha1::new();
    sha.update(initial_key);
    sha.update(SHA_PAD_INNER);
    sha.update(current_key);
    let inner = sha.finalize();

    let mut md5 = Md5::new();
    md5.update(initial_key);
    md5.update(MD5_PAD_OUTER);
    md5.update(inner);

    let temp_key = reduce_entropy(md5.finalize().to_vec(), method);
    let refreshed = Rc4::new(&temp_key).apply(&temp_key);

    reduce_entropy(refreshed, method)
}

const CERT_CHAIN_VERSION_MASK: u32 = 0x7FFF_FFFF;
const CERT_CHAIN_VERSION_1: u32 = 1;

const SIGNATURE_ALGORITHM_RSA: u32 = 1;
const KEY_EXCHANGE_ALGORITHM_RSA: u32 = 1;

const BLOB_TYPE_RSA_KEY: u16 = 6;
const BLOB_TYPE_RSA_SIGNATURE: u16 = 8;

const RSA_MAGIC: u32 = 0x3141_5352; // "RSA1"
const RSA_KEY_PADDING_LEN: usize = 8;

/// 2.2.1.4.3.1.1 Server Proprietary Certificate (PROPRIETARYSERVERCERTIFICATE)
///
/// The outer structure carried in the GCC Server Security Data when the
/// server uses RDP standard security.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProprietaryCertificate {
    pub public_key: RsaPublicKey,
    pub signature: Vec<u8>,
}

impl ProprietaryCertificate {
    const NAME: &'static str = "ProprietaryCertificate";

    const FIXED_PART_SIZE: usize = 4 /* version */ + 4 /* sigAlgId */ + 4 /* keyAlgId */;
}

impl PduEncode for ProprietaryCertificate {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(CERT_CHAIN_VERSION_1);
        dst.write_u32(SIGNATURE_ALGORITHM_RSA);
        dst.write_u32(KEY_EXCHANGE_ALGORITHM_RSA);

        dst.write_u16(BLOB_TYPE_RSA_KEY);
        dst.write_u16(cast_length!("keyBlobLen", self.public_key.size())?);
        self.public_key.encode(dst)?;

        dst.write_u16(BLOB_TYPE_RSA_SIGNATURE);
        dst.write_u16(cast_length!("sigBlobLen", self.signature.len())?);
        dst.write_slice(&self.signature);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + 4 /* key blob header */ + self.public_key.size()
            + 4 /* signature blob header */ + self.signature.len()
    }
}

impl<'de> PduDecode<'de> for ProprietaryCertificate {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u32();
        if version & CERT_CHAIN_VERSION_MASK != CERT_CHAIN_VERSION_1 {
            return Err(unsupported_value_err!("version", version.to_string()));
        }

        if src.read_u32() != SIGNATURE_ALGORITHM_RSA {
            return Err(invalid_message_err!("sigAlgId", "not RSA"));
        }
        if src.read_u32() != KEY_EXCHANGE_ALGORITHM_RSA {
            return Err(invalid_message_err!("keyAlgId", "not RSA"));
        }

        let key_blob_type = src.try_read_u16(Self::NAME)?;
        let _key_blob_len = src.try_read_u16(Self::NAME)?;
        if key_blob_type != BLOB_TYPE_RSA_KEY {
            return Err(invalid_message_err!("blobType", "expected a public key blob"));
        }

        let public_key = RsaPublicKey::decode(src)?;

        let sig_blob_type = src.try_read_u16(Self::NAME)?;
        let sig_blob_len = src.try_read_u16(Self::NAME)?;
        if sig_blob_type != BLOB_TYPE_RSA_SIGNATURE {
            return Err(invalid_message_err!("blobType", "expected a signature blob"));
        }

        let signature = src.try_read_slice(Self::NAME, usize::from(sig_blob_len))?.to_vec();

        Ok(Self { public_key, signature })
    }
}

/// RSA_PUBLIC_KEY, little-endian modulus with 8 bytes of zero padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub public_exponent: u32,
    /// Little-endian modulus, including the 8 trailing padding bytes.
    pub modulus: Vec<u8>,
}

impl RsaPublicKey {
    const NAME: &'static str = "RsaPublicKey";

    const FIXED_PART_SIZE: usize = 4 /* magic */ + 4 /* keylen */ + 4 /* bitlen */ + 4 /* datalen */ + 4 /* pubExp */;

    /// Number of significant modulus bytes.
    pub fn modulus_size(&self) -> usize {
        self.modulus.len().saturating_sub(RSA_KEY_PADDING_LEN)
    }
}

impl PduEncode for RsaPublicKey {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        let bit_len = self.modulus_size() * 8;

        dst.write_u32(RSA_MAGIC);
        dst.write_u32(cast_length!("keylen", self.modulus.len())?);
        dst.write_u32(cast_length!("bitlen", bit_len)?);
        dst.write_u32(cast_length!("datalen", bit_len / 8 - 1)?);
        dst.write_u32(self.public_exponent);
        dst.write_slice(&self.modulus);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.modulus.len()
    }
}

impl<'de> PduDecode<'de> for RsaPublicKey {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        if src.read_u32() != RSA_MAGIC {
            return Err(invalid_message_err!("magic", "not an RSA1 public key blob"));
        }

        let key_len: usize = cast_length!("keylen", src.read_u32())?;
        let bit_len: usize = cast_length!("bitlen", src.read_u32())?;
        let _data_len = src.read_u32();
        let public_exponent = src.read_u32();

        if key_len != bit_len / 8 + RSA_KEY_PADDING_LEN {
            return Err(invalid_message_err!("keylen", "inconsistent with bitlen"));
        }

        Ok(Self {
            public_exponent,
            modulus: src.try_read_slice(Self::NAME, key_len)?.to_vec(),
        })
    }
}

/// Extracts the RSA public key from the server certificate blob of the GCC
/// Server Security Data.
pub fn parse_server_certificate(blob: &[u8]) -> Result<ProprietaryCertificate, CryptoError> {
    Ok(crate::decode(blob)?)
}

/// Raw RSA public operation, little-endian, as used by the security exchange
/// (MS-RDPBCGR 5.3.4.1). The result is padded to the full modulus length,
/// trailing zero padding included.
pub fn encrypt_with_public_key(message: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    let modulus = BigUint::from_bytes_le(&key.modulus);
    let exponent = BigUint::from(key.public_exponent);
    let data = BigUint::from_bytes_le(message);

    if data >= modulus {
        return Err(CryptoError::MessageTooLong);
    }

    let mut out = data.modpow(&exponent, &modulus).to_bytes_le();
    out.resize(key.modulus.len(), 0);

    Ok(out)
}

/// Raw RSA private operation, little-endian. Both the modulus and the private
/// exponent are big-endian byte strings as exported by key generators; the
/// ciphertext and plaintext use the little-endian wire layout.
pub fn decrypt_with_private_key(
    ciphertext: &[u8],
    modulus_be: &[u8],
    private_exponent_be: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let modulus = BigUint::from_bytes_be(modulus_be);
    let exponent = BigUint::from_bytes_be(private_exponent_be);
    let data = BigUint::from_bytes_le(ciphertext);

    if data >= modulus {
        return Err(CryptoError::MessageTooLong);
    }

    Ok(data.modpow(&exponent, &modulus).to_bytes_le())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn session_keys_are_deterministic() {
        let client_random = [0x11u8; 32];
        let server_random = [0x22u8; 32];

        let first = derive_session_keys(&client_random, &server_random, EncryptionMethod::BIT_128).unwrap();
        let second = derive_session_keys(&client_random, &server_random, EncryptionMethod::BIT_128).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.mac_key.len(), 16);
        assert_eq!(first.client_encrypt_key.len(), 16);
        assert_ne!(first.client_encrypt_key, first.server_encrypt_key);
    }

    #[test]
    fn forty_bit_keys_carry_the_fixed_salt() {
        let client_random = [0x33u8; 32];
        let server_random = [0x44u8; 32];

        let keys = derive_session_keys(&client_random, &server_random, EncryptionMethod::BIT_40).unwrap();

        assert_eq!(keys.client_encrypt_key.len(), 8);
        assert_eq!(&keys.client_encrypt_key[..3], &[0xd1, 0x26, 0x9e]);
        assert_eq!(&keys.server_encrypt_key[..3], &[0xd1, 0x26, 0x9e]);
        assert_eq!(keys.mac_key.len(), 8);
    }

    #[test]
    fn fips_is_rejected() {
        let randoms = [0u8; 32];
        assert!(derive_session_keys(&randoms, &randoms, EncryptionMethod::FIPS).is_err());
    }

    #[test]
    fn mac_signature_is_eight_bytes_and_length_sensitive() {
        let mac_key = [0x55u8; 16];

        let sig1 = compute_mac_signature(&mac_key, b"hello");
        let sig2 = compute_mac_signature(&mac_key, b"hello!");

        assert_ne!(sig1, sig2);
    }

    #[test]
    fn encryption_round_trips_with_both_directions() {
        let client_random = [0x66u8; 32];
        let server_random = [0x77u8; 32];

        let keys = derive_session_keys(&client_random, &server_random, EncryptionMethod::BIT_128).unwrap();

        let plaintext = b"confirm active pdu";
        let ciphertext = Rc4::new(&keys.client_encrypt_key).apply(plaintext);
        let decrypted = Rc4::new(&keys.client_encrypt_key).apply(&ciphertext);

        assert_ne!(&ciphertext, plaintext);
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn proprietary_certificate_round_trips() {
        let mut modulus = vec![0xABu8; 64];
        modulus.extend_from_slice(&[0u8; RSA_KEY_PADDING_LEN]);

        let cert = ProprietaryCertificate {
            public_key: RsaPublicKey {
                public_exponent: 0x10001,
                modulus,
            },
            signature: vec![0xCD; 72],
        };

        let encoded = encode_vec(&cert).unwrap();
        assert_eq!(encoded.len(), cert.size());

        let decoded: ProprietaryCertificate = decode(&encoded).unwrap();
        assert_eq!(decoded, cert);
    }

    #[test]
    fn rsa_public_operation_pads_to_modulus_length() {
        // modulus = 187 (0xBB), exponent = 7: tiny textbook RSA
        let key = RsaPublicKey {
            public_exponent: 7,
            modulus: vec![0xBB, 0, 0, 0, 0, 0, 0, 0, 0],
        };

        let encrypted = encrypt_with_public_key(&[0x02], &key).unwrap();
        assert_eq!(encrypted.len(), key.modulus.len());
        // 2^7 mod 187 = 128
        assert_eq!(encrypted[0], 128);
    }

    #[test]
    fn update_session_key_changes_the_key() {
        let initial = [0x01u8; 16];
        let current = [0x02u8; 16];

        let updated = update_session_key(&initial, &current, EncryptionMethod::BIT_128);

        assert_eq!(updated.len(), 16);
        assert_ne!(updated.as_slice(), current.as_slice());
    }
}
