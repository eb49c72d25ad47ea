use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use super::RdpVersion;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::nego::SecurityProtocol;
use crate::{utils, PduDecode, PduEncode, PduError, PduErrorExt as _, PduResult};

const CLIENT_NAME_FIELD_LEN: usize = 32;
const IME_FILE_NAME_FIELD_LEN: usize = 64;
const DIG_PRODUCT_ID_FIELD_LEN: usize = 64;

/// Writes a UTF-16 string into a fixed-width, null-terminated field.
fn write_fixed_utf16(dst: &mut WriteCursor<'_>, value: &str, field_len: usize) {
    let mut encoded = utils::to_utf16_bytes(value);
    encoded.truncate(field_len - 2);
    encoded.resize(field_len, 0); // null terminator and padding

    dst.write_slice(&encoded);
}

/// Reads a fixed-width UTF-16 field, dropping the padding.
fn read_fixed_utf16(src: &mut ReadCursor<'_>, field_len: usize) -> String {
    let raw = utils::from_utf16_bytes(src.read_slice(field_len));
    raw.trim_end_matches('\u{0}').to_owned()
}

/// 2.2.1.3.2 Client Core Data (TS_UD_CS_CORE), mandatory part.
///
/// The trailing optional fields live in [`ClientCoreOptionalData`]; clients
/// may stop emitting them at any field boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCoreData {
    pub version: RdpVersion,
    pub desktop_width: u16,
    pub desktop_height: u16,
    /// Ignored by servers once postBeta2ColorDepth is present.
    pub color_depth: ColorDepth,
    pub sec_access_sequence: SecureAccessSequence,
    pub keyboard_layout: u32,
    pub client_build: u32,
    pub client_name: String,
    pub keyboard_type: KeyboardType,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub optional_data: ClientCoreOptionalData,
}

impl ClientCoreData {
    const NAME: &'static str = "ClientCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */
        + 2 /* desktopWidth */
        + 2 /* desktopHeight */
        + 2 /* colorDepth */
        + 2 /* SASSequence */
        + 4 /* keyboardLayout */
        + 4 /* clientBuild */
        + CLIENT_NAME_FIELD_LEN
        + 4 /* keyboardType */
        + 4 /* keyboardSubType */
        + 4 /* keyboardFunctionKey */
        + IME_FILE_NAME_FIELD_LEN;
}

impl PduEncode for ClientCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.0);
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_u16(self.color_depth.to_u16().unwrap());
        dst.write_u16(self.sec_access_sequence.to_u16().unwrap());
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.client_build);
        write_fixed_utf16(dst, &self.client_name, CLIENT_NAME_FIELD_LEN);
        dst.write_u32(self.keyboard_type.to_u32().unwrap());
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_functional_keys_count);
        write_fixed_utf16(dst, &self.ime_file_name, IME_FILE_NAME_FIELD_LEN);

        self.optional_data.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.optional_data.size()
    }
}

impl<'de> PduDecode<'de> for ClientCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let unknown_value = |field: &'static str| PduError::invalid_message(Self::NAME, field, "unknown value");

        Ok(Self {
            version: RdpVersion(src.read_u32()),
            desktop_width: src.read_u16(),
            desktop_height: src.read_u16(),
            color_depth: ColorDepth::from_u16(src.read_u16()).ok_or_else(|| unknown_value("colorDepth"))?,
            sec_access_sequence: SecureAccessSequence::from_u16(src.read_u16())
                .ok_or_else(|| unknown_value("SASSequence"))?,
            keyboard_layout: src.read_u32(),
            client_build: src.read_u32(),
            client_name: read_fixed_utf16(src, CLIENT_NAME_FIELD_LEN),
            keyboard_type: KeyboardType::from_u32(src.read_u32()).ok_or_else(|| unknown_value("keyboardType"))?,
            keyboard_subtype: src.read_u32(),
            keyboard_functional_keys_count: src.read_u32(),
            ime_file_name: read_fixed_utf16(src, IME_FILE_NAME_FIELD_LEN),
            optional_data: ClientCoreOptionalData::decode(src)?,
        })
    }
}

/// 2.2.1.3.2 Client Core Data (TS_UD_CS_CORE), optional tail.
///
/// Fields form a strict prefix on the wire: a field may only be present when
/// everything before it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCoreOptionalData {
    /// Supersedes `color_depth`; itself superseded by `high_color_depth`.
    pub post_beta2_color_depth: Option<ColorDepth>,
    pub client_product_id: Option<u16>,
    pub serial_number: Option<u32>,
    pub high_color_depth: Option<HighColorDepth>,
    pub supported_color_depths: Option<SupportedColorDepths>,
    pub early_capability_flags: Option<ClientEarlyCapabilityFlags>,
    pub dig_product_id: Option<String>,
    pub connection_type: Option<ConnectionType>,
    pub server_selected_protocol: Option<SecurityProtocol>,
}

impl ClientCoreOptionalData {
    const NAME: &'static str = "ClientCoreOptionalData";

    /// Per-field encoded sizes, in wire order.
    fn field_sizes(&self) -> [Option<usize>; 9] {
        [
            self.post_beta2_color_depth.map(|_| 2),
            self.client_product_id.map(|_| 2),
            self.serial_number.map(|_| 4),
            self.high_color_depth.map(|_| 2),
            self.supported_color_depths.map(|_| 2),
            self.early_capability_flags.map(|_| 2),
            self.dig_product_id.as_ref().map(|_| DIG_PRODUCT_ID_FIELD_LEN),
            self.connection_type.map(|_| 1 + 1 /* pad */),
            self.server_selected_protocol.map(|_| 4),
        ]
    }

    /// Present fields must form a prefix of the wire order.
    fn check_prefix(&self) -> PduResult<()> {
        let mut gap_seen = false;
        for size in self.field_sizes() {
            match size {
                Some(_) if gap_seen => {
                    return Err(invalid_message_err!(
                        "optionalData",
                        "field present after an absent one"
                    ));
                }
                Some(_) => {}
                None => gap_seen = true,
            }
        }

        Ok(())
    }
}

impl PduEncode for ClientCoreOptionalData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        self.check_prefix()?;
        ensure_size!(in: dst, size: self.size());

        if let Some(value) = self.post_beta2_color_depth {
            dst.write_u16(value.to_u16().unwrap());
        }
        if let Some(value) = self.client_product_id {
            dst.write_u16(value);
        }
        if let Some(value) = self.serial_number {
            dst.write_u32(value);
        }
        if let Some(value) = self.high_color_depth {
            dst.write_u16(value.to_u16().unwrap());
        }
        if let Some(value) = self.supported_color_depths {
            dst.write_u16(value.bits());
        }
        if let Some(value) = self.early_capability_flags {
            dst.write_u16(value.bits());
        }
        if let Some(value) = &self.dig_product_id {
            write_fixed_utf16(dst, value, DIG_PRODUCT_ID_FIELD_LEN);
        }
        if let Some(value) = self.connection_type {
            dst.write_array([value.to_u8().unwrap(), 0 /* pad1octet */]);
        }
        if let Some(value) = self.server_selected_protocol {
            dst.write_u32(value.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.field_sizes().into_iter().flatten().sum()
    }
}

impl<'de> PduDecode<'de> for ClientCoreOptionalData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let mut data = Self::default();

        // Every field below may legitimately be the first one missing, so
        // each read is gated on the remaining length.

        if src.len() < 2 {
            return Ok(data);
        }
        let raw = src.read_u16();
        data.post_beta2_color_depth =
            Some(ColorDepth::from_u16(raw).ok_or_else(|| invalid_message_err!("postBeta2ColorDepth", "unknown value"))?);

        if src.len() < 2 {
            return Ok(data);
        }
        data.client_product_id = Some(src.read_u16());

        if src.len() < 4 {
            return Ok(data);
        }
        data.serial_number = Some(src.read_u32());

        if src.len() < 2 {
            return Ok(data);
        }
        let raw = src.read_u16();
        data.high_color_depth =
            Some(HighColorDepth::from_u16(raw).ok_or_else(|| invalid_message_err!("highColorDepth", "unknown value"))?);

        if src.len() < 2 {
            return Ok(data);
        }
        data.supported_color_depths = Some(SupportedColorDepths::from_bits_truncate(src.read_u16()));

        if src.len() < 2 {
            return Ok(data);
        }
        data.early_capability_flags = Some(ClientEarlyCapabilityFlags::from_bits_truncate(src.read_u16()));

        if src.len() < DIG_PRODUCT_ID_FIELD_LEN {
            return Ok(data);
        }
        data.dig_product_id = Some(read_fixed_utf16(src, DIG_PRODUCT_ID_FIELD_LEN));

        if src.len() < 2 {
            return Ok(data);
        }
        let [raw, _pad] = src.read_array();
        data.connection_type =
            Some(ConnectionType::from_u8(raw).ok_or_else(|| invalid_message_err!("connectionType", "unknown value"))?);

        if src.len() < 4 {
            return Ok(data);
        }
        data.server_selected_protocol = Some(SecurityProtocol::from_bits_truncate(src.read_u32()));

        Ok(data)
    }
}

/// Legacy colorDepth / postBeta2ColorDepth values.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ColorDepth {
    Bpp4 = 0xCA00,
    Bpp8 = 0xCA01,
    Rgb555Bpp16 = 0xCA02,
    Rgb565Bpp16 = 0xCA03,
    Bpp24 = 0xCA04,
}

/// highColorDepth values, plain bit counts.
#[repr(u16)]
#[derive(Debug, Copy, Clone, FromPrimitive, ToPrimitive, Eq, Ord, PartialEq, PartialOrd)]
pub enum HighColorDepth {
    Bpp4 = 0x0004,
    Bpp8 = 0x0008,
    Rgb555Bpp16 = 0x000F,
    Rgb565Bpp16 = 0x0010,
    Bpp24 = 0x0018,
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum SecureAccessSequence {
    Del = 0xAA03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum KeyboardType {
    IbmPcXt = 1,
    OlivettiIco = 2,
    IbmPcAt = 3,
    IbmEnhanced = 4,
    Nokia1050 = 5,
    Nokia9140 = 6,
    Japanese = 7,
}

/// connectionType values; only meaningful when
/// [`ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE`] is set.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ConnectionType {
    NotUsed = 0,
    Modem = 1,
    BroadbandLow = 2,
    Satellite = 3,
    BroadbandHigh = 4,
    Wan = 5,
    Lan = 6,
    Autodetect = 7,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SupportedColorDepths: u16 {
        const BPP24 = 1;
        const BPP16 = 2;
        const BPP15 = 4;
        const BPP32 = 8;
        const _ = !0;
    }
}

bitflags! {
    /// earlyCapabilityFlags; the proxy clears WANT_32_BPP_SESSION before
    /// forwarding the block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientEarlyCapabilityFlags: u16 {
        const SUPPORT_ERR_INFO_PDU = 0x0001;
        const WANT_32_BPP_SESSION = 0x0002;
        const SUPPORT_STATUS_INFO_PDU = 0x0004;
        const STRONG_ASYMMETRIC_KEYS = 0x0008;
        const RELATIVE_MOUSE_INPUT = 0x0010;
        const VALID_CONNECTION_TYPE = 0x0020;
        const SUPPORT_MONITOR_LAYOUT_PDU = 0x0040;
        const SUPPORT_NET_CHAR_AUTODETECT = 0x0080;
        const SUPPORT_DYN_VC_GFX_PROTOCOL = 0x0100;
        const SUPPORT_DYNAMIC_TIME_ZONE = 0x0200;
        const SUPPORT_HEART_BEAT_PDU = 0x0400;
        const SUPPORT_SKIP_CHANNELJOIN = 0x0800;
        const _ = !0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_must_form_a_prefix() {
        let data = ClientCoreOptionalData {
            serial_number: Some(1), // first two fields absent
            ..Default::default()
        };

        let mut buf = [0u8; 16];
        assert!(data.encode(&mut WriteCursor::new(&mut buf)).is_err());
    }

    #[test]
    fn truncated_optional_tail_stops_cleanly() {
        // postBeta2ColorDepth only, then end of block.
        let bytes = 0xCA01u16.to_le_bytes();
        let mut src = ReadCursor::new(&bytes);

        let data = ClientCoreOptionalData::decode(&mut src).unwrap();
        assert_eq!(data.post_beta2_color_depth, Some(ColorDepth::Bpp8));
        assert_eq!(data.client_product_id, None);
    }
}
