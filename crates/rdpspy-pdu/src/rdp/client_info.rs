use core::fmt;

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::utils::{self, CharacterSet};
use crate::{PduDecode, PduEncode, PduResult};

/// compressionType lives in bits 9..13 of the flags dword.
const COMPRESSION_BITS: u32 = 0x0000_1E00;
const COMPRESSION_SHIFT: u32 = 9;

/// [2.2.1.11.1.1] Info Packet (TS_INFO_PACKET)
///
/// The extended info block (client address, directory, timezone, …) is kept
/// as raw bytes: the proxy only rewrites credentials and flags, everything
/// after the work dir is forwarded verbatim.
///
/// [2.2.1.11.1.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/732394f5-e2b5-4ac5-8a0a-35345386b0d1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub compression_type: CompressionType,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: Vec<u8>,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    const FIXED_PART_SIZE: usize = 4 /* codePage */ + 4 /* flags */ + 2 * 5 /* cbDomain..cbWorkingDir */;

    fn character_set(&self) -> CharacterSet {
        if self.flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        }
    }

    /// The five variable strings in wire order.
    fn strings(&self) -> [&str; 5] {
        [
            self.credentials.domain.as_deref().unwrap_or(""),
            &self.credentials.username,
            &self.credentials.password,
            &self.alternate_shell,
            &self.work_dir,
        ]
    }
}

impl PduEncode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        let charset = self.character_set();

        dst.write_u32(self.code_page);
        dst.write_u32(self.flags.bits() | self.compression_type.to_u32().unwrap() << COMPRESSION_SHIFT);

        // Five length prefixes (terminators excluded), then the strings.
        for value in self.strings() {
            dst.write_u16(utils::encoded_str_len(value, charset));
        }
        for value in self.strings() {
            utils::write_string_with_null_terminator(dst, value, charset)?;
        }

        dst.write_slice(&self.extra_info);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let charset = self.character_set();

        let strings: usize = self
            .strings()
            .into_iter()
            .map(|value| usize::from(utils::encoded_str_len(value, charset)) + charset.unit_size())
            .sum();

        Self::FIXED_PART_SIZE + strings + self.extra_info.len()
    }
}

impl<'de> PduDecode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let code_page = src.read_u32();
        let packed_flags = src.read_u32();

        let flags = ClientInfoFlags::from_bits(packed_flags & !COMPRESSION_BITS)
            .ok_or_else(|| invalid_message_err!("flags", "unknown info flag"))?;
        let compression_type = CompressionType::from_u32((packed_flags & COMPRESSION_BITS) >> COMPRESSION_SHIFT)
            .ok_or_else(|| invalid_message_err!("flags", "unknown compression type"))?;

        let charset = if flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        };

        // cbDomain .. cbWorkingDir, terminators excluded.
        let mut sizes = [0usize; 5];
        for size in &mut sizes {
            *size = usize::from(src.read_u16());
        }

        let [domain_len, username_len, password_len, shell_len, work_dir_len] = sizes;

        let domain = utils::read_sized_string(src, domain_len, charset)?;
        let credentials = Credentials {
            username: utils::read_sized_string(src, username_len, charset)?,
            password: utils::read_sized_string(src, password_len, charset)?,
            domain: (!domain.is_empty()).then_some(domain),
        };

        Ok(Self {
            credentials,
            code_page,
            flags,
            compression_type,
            alternate_shell: utils::read_sized_string(src, shell_len, charset)?,
            work_dir: utils::read_sized_string(src, work_dir_len, charset)?,
            extra_info: src.read_remaining().to_vec(),
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // NOTE: do not show secret (user password)
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CompressionType {
    K8 = 0,
    K64 = 1,
    Rdp6 = 2,
    Rdp61 = 3,
}

bitflags! {
    /// INFO_* flags of the Info Packet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
        const RESERVED1 = 0x0080_0000;
        const RESERVED2 = 0x0100_0000;
        const HIDEF_RAIL_SUPPORTED = 0x0200_0000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    fn sample_info() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: "jsmith".to_owned(),
                password: "hunter2".to_owned(),
                domain: Some("CONTOSO".to_owned()),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE | ClientInfoFlags::UNICODE | ClientInfoFlags::COMPRESSION,
            compression_type: CompressionType::K64,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: vec![0x02, 0x00, 0x1C, 0x00],
        }
    }

    #[test]
    fn client_info_round_trips() {
        let info = sample_info();

        let encoded = encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded: ClientInfo = decode(&encoded).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn compression_type_lives_in_the_flags_field() {
        let info = sample_info();

        let encoded = encode_vec(&info).unwrap();
        let flags = u32::from_le_bytes(encoded[4..8].try_into().unwrap());

        assert_eq!((flags & COMPRESSION_BITS) >> COMPRESSION_SHIFT, 1);
        assert!(flags & ClientInfoFlags::COMPRESSION.bits() != 0);
    }

    #[test]
    fn rewritten_credentials_round_trip() {
        let mut info = sample_info();
        info.credentials.username = "administrator".to_owned();
        info.credentials.password = "replaced".to_owned();
        info.flags |= ClientInfoFlags::AUTOLOGON;
        info.flags -= ClientInfoFlags::COMPRESSION;
        info.compression_type = CompressionType::K8;

        let encoded = encode_vec(&info).unwrap();
        let decoded: ClientInfo = decode(&encoded).unwrap();

        assert_eq!(decoded.credentials.username, "administrator");
        assert_eq!(decoded.credentials.password, "replaced");
        assert!(decoded.flags.contains(ClientInfoFlags::AUTOLOGON));
        assert!(!decoded.flags.contains(ClientInfoFlags::COMPRESSION));
        assert_eq!(decoded.extra_info, info.extra_info);
    }
}
