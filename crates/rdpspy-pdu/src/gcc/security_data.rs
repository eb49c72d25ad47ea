use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

pub const SERVER_RANDOM_LEN: usize = 32;

const SERVER_CERT_MAX_LEN: usize = 1024;

/// 2.2.1.3.3 Client Security Data (TS_UD_CS_SEC): the encryption methods the
/// client is willing to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecurityData {
    pub encryption_methods: EncryptionMethod,
    pub ext_encryption_methods: u32,
}

impl ClientSecurityData {
    const NAME: &'static str = "ClientSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethods */ + 4 /* extEncryptionMethods */;

    pub fn no_security() -> Self {
        Self {
            encryption_methods: EncryptionMethod::empty(),
            ext_encryption_methods: 0,
        }
    }
}

impl PduEncode for ClientSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.encryption_methods.bits());
        dst.write_u32(self.ext_encryption_methods);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for ClientSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            encryption_methods: EncryptionMethod::from_bits_truncate(src.read_u32()),
            ext_encryption_methods: src.read_u32(),
        })
    }
}

/// 2.2.1.4.3 Server Security Data (TS_UD_SC_SEC1).
///
/// When the server picked RDP standard security this block carries the
/// 32-byte server random and the certificate the client is supposed to
/// encrypt its own random against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSecurityData {
    pub encryption_method: EncryptionMethod,
    pub encryption_level: EncryptionLevel,
    pub server_random: Option<[u8; SERVER_RANDOM_LEN]>,
    pub server_cert: Vec<u8>,
}

impl ServerSecurityData {
    const NAME: &'static str = "ServerSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethod */ + 4 /* encryptionLevel */;

    pub fn no_security() -> Self {
        Self {
            encryption_method: EncryptionMethod::empty(),
            encryption_level: EncryptionLevel::None,
            server_random: None,
            server_cert: Vec::new(),
        }
    }

    fn security_in_use(&self) -> bool {
        !self.encryption_method.is_empty() || self.encryption_level != EncryptionLevel::None
    }
}

impl PduEncode for ServerSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.encryption_method.bits());
        dst.write_u32(self.encryption_level.to_u32().unwrap());

        if !self.security_in_use() {
            // The length fields themselves are omitted entirely.
            if self.server_random.is_some() || !self.server_cert.is_empty() {
                return Err(invalid_message_err!(
                    "serverRandom",
                    "random or certificate present although security is off"
                ));
            }
            return Ok(());
        }

        let random_len = self.server_random.as_ref().map_or(0, |random| random.len());
        dst.write_u32(cast_length!("serverRandomLen", random_len)?);
        dst.write_u32(cast_length!("serverCertLen", self.server_cert.len())?);

        if let Some(random) = &self.server_random {
            dst.write_slice(random);
        }
        dst.write_slice(&self.server_cert);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut total = Self::FIXED_PART_SIZE;

        if self.security_in_use() {
            total += 4 /* serverRandomLen */ + 4 /* serverCertLen */;
            total += self.server_random.as_ref().map_or(0, |random| random.len());
            total += self.server_cert.len();
        }

        total
    }
}

impl<'de> PduDecode<'de> for ServerSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_method = EncryptionMethod::from_bits_truncate(src.read_u32());
        let encryption_level = EncryptionLevel::from_u32(src.read_u32())
            .ok_or_else(|| invalid_message_err!("encryptionLevel", "unknown level"))?;

        let mut data = Self {
            encryption_method,
            encryption_level,
            server_random: None,
            server_cert: Vec::new(),
        };

        if !data.security_in_use() {
            return Ok(data);
        }

        let random_len: usize = cast_length!("serverRandomLen", src.try_read_u32(Self::NAME)?)?;
        let cert_len: usize = cast_length!("serverCertLen", src.try_read_u32(Self::NAME)?)?;

        if random_len != SERVER_RANDOM_LEN {
            return Err(invalid_message_err!("serverRandomLen", "not 32 bytes"));
        }
        if cert_len > SERVER_CERT_MAX_LEN {
            return Err(invalid_message_err!("serverCertLen", "implausibly large"));
        }

        ensure_size!(in: src, size: random_len + cert_len);
        data.server_random = Some(src.read_array());
        data.server_cert = src.read_slice(cert_len).to_vec();

        Ok(data)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionMethod: u32 {
        const BIT_40 = 0x0000_0001;
        const BIT_128 = 0x0000_0002;
        const BIT_56 = 0x0000_0008;
        const FIPS = 0x0000_0010;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum EncryptionLevel {
    None = 0,
    Low = 1,
    ClientCompatible = 2,
    High = 3,
    Fips = 4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn server_security_data_with_no_security_is_eight_bytes() {
        let data = ServerSecurityData::no_security();

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded, [0x00; 8]);

        let decoded: ServerSecurityData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn server_security_data_with_random_round_trips() {
        let data = ServerSecurityData {
            encryption_method: EncryptionMethod::BIT_128,
            encryption_level: EncryptionLevel::ClientCompatible,
            server_random: Some([0x11; SERVER_RANDOM_LEN]),
            server_cert: vec![0x01, 0x02, 0x03],
        };

        let encoded = encode_vec(&data).unwrap();
        let decoded: ServerSecurityData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
