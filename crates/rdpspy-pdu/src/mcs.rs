//! The T.125 MCS subset RDP uses.
//!
//! Domain PDUs (ALIGNED PER) travel as X.224 data payloads; the connect PDUs
//! (`Connect-Initial` / `Connect-Response`) are BER-encoded and carry the GCC
//! conference create payloads.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::gcc::{ConferenceCreateRequest, ConferenceCreateResponse};
use crate::{ber, per, PduDecode, PduEncode, PduResult};

pub const RESULT_ENUM_LENGTH: u8 = 16;

const USER_ID_BASE: u16 = 1001;

/// dataPriority = high, segmentation = begin | end.
const SEND_DATA_PRIORITY_AND_SEGMENTATION: u8 = 0x70;

const BER_TAG_CONNECT_INITIAL: u8 = 0x65;
const BER_TAG_CONNECT_RESPONSE: u8 = 0x66;

/// Application tag of a DomainMCSPDU CHOICE. On the wire the tag sits in the
/// six high bits of the first byte; the two low bits carry per-PDU options.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct DomainPduKind(u8);

impl DomainPduKind {
    const ERECT_DOMAIN: Self = Self(1);
    const DISCONNECT_ULTIMATUM: Self = Self(8);
    const ATTACH_USER_REQUEST: Self = Self(10);
    const ATTACH_USER_CONFIRM: Self = Self(11);
    const CHANNEL_JOIN_REQUEST: Self = Self(14);
    const CHANNEL_JOIN_CONFIRM: Self = Self(15);
    const SEND_DATA_REQUEST: Self = Self(25);
    const SEND_DATA_INDICATION: Self = Self(26);

    fn choice_byte(self, options: u8) -> u8 {
        debug_assert_eq!(options >> 2, 0);
        self.0 << 2 | options
    }

    fn read(src: &mut ReadCursor<'_>, ctx: &'static str) -> PduResult<Self> {
        Ok(Self(src.try_read_u8(ctx)? >> 2))
    }

    fn peek(src: &ReadCursor<'_>, ctx: &'static str) -> PduResult<Self> {
        Ok(Self(src.try_peek_u8(ctx)? >> 2))
    }

    fn expect(self, ctx: &'static str, wanted: DomainPduKind) -> PduResult<()> {
        if self == wanted {
            Ok(())
        } else {
            Err(unexpected_message_type_err!(ctx, self.0))
        }
    }
}

/// Returns whether the next MCS payload is a BER-encoded connect PDU rather
/// than a domain PDU.
pub fn is_connect_pdu(first_byte: u8) -> bool {
    first_byte == 0x7F
}

/// A domain MCS PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McsMessage {
    ErectDomainRequest(ErectDomainPdu),
    AttachUserRequest(AttachUserRequest),
    AttachUserConfirm(AttachUserConfirm),
    ChannelJoinRequest(ChannelJoinRequest),
    ChannelJoinConfirm(ChannelJoinConfirm),
    SendDataRequest(SendDataRequest),
    SendDataIndication(SendDataIndication),
    DisconnectProviderUltimatum(DisconnectProviderUltimatum),
}

impl McsMessage {
    const NAME: &'static str = "McsMessage";

    pub fn name(&self) -> &'static str {
        match self {
            Self::ErectDomainRequest(_) => ErectDomainPdu::NAME,
            Self::AttachUserRequest(_) => AttachUserRequest::NAME,
            Self::AttachUserConfirm(_) => AttachUserConfirm::NAME,
            Self::ChannelJoinRequest(_) => ChannelJoinRequest::NAME,
            Self::ChannelJoinConfirm(_) => ChannelJoinConfirm::NAME,
            Self::SendDataRequest(_) => SendDataRequest::NAME,
            Self::SendDataIndication(_) => SendDataIndication::NAME,
            Self::DisconnectProviderUltimatum(_) => DisconnectProviderUltimatum::NAME,
        }
    }
}

impl PduEncode for McsMessage {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        match self {
            Self::ErectDomainRequest(pdu) => pdu.encode(dst),
            Self::AttachUserRequest(pdu) => pdu.encode(dst),
            Self::AttachUserConfirm(pdu) => pdu.encode(dst),
            Self::ChannelJoinRequest(pdu) => pdu.encode(dst),
            Self::ChannelJoinConfirm(pdu) => pdu.encode(dst),
            Self::SendDataRequest(pdu) => pdu.encode(dst),
            Self::SendDataIndication(pdu) => pdu.encode(dst),
            Self::DisconnectProviderUltimatum(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            Self::ErectDomainRequest(pdu) => pdu.size(),
            Self::AttachUserRequest(pdu) => pdu.size(),
            Self::AttachUserConfirm(pdu) => pdu.size(),
            Self::ChannelJoinRequest(pdu) => pdu.size(),
            Self::ChannelJoinConfirm(pdu) => pdu.size(),
            Self::SendDataRequest(pdu) => pdu.size(),
            Self::SendDataIndication(pdu) => pdu.size(),
            Self::DisconnectProviderUltimatum(pdu) => pdu.size(),
        }
    }
}

impl<'de> PduDecode<'de> for McsMessage {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let kind = DomainPduKind::peek(src, Self::NAME)?;

        match kind {
            DomainPduKind::ERECT_DOMAIN => ErectDomainPdu::decode(src).map(Self::ErectDomainRequest),
            DomainPduKind::ATTACH_USER_REQUEST => AttachUserRequest::decode(src).map(Self::AttachUserRequest),
            DomainPduKind::ATTACH_USER_CONFIRM => AttachUserConfirm::decode(src).map(Self::AttachUserConfirm),
            DomainPduKind::CHANNEL_JOIN_REQUEST => ChannelJoinRequest::decode(src).map(Self::ChannelJoinRequest),
            DomainPduKind::CHANNEL_JOIN_CONFIRM => ChannelJoinConfirm::decode(src).map(Self::ChannelJoinConfirm),
            DomainPduKind::SEND_DATA_REQUEST => SendDataRequest::decode(src).map(Self::SendDataRequest),
            DomainPduKind::SEND_DATA_INDICATION => SendDataIndication::decode(src).map(Self::SendDataIndication),
            DomainPduKind::DISCONNECT_ULTIMATUM => {
                DisconnectProviderUltimatum::decode(src).map(Self::DisconnectProviderUltimatum)
            }
            DomainPduKind(tag) => Err(unexpected_message_type_err!(Self::NAME, tag)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErectDomainPdu {
    pub sub_height: u32,
    pub sub_interval: u32,
}

impl ErectDomainPdu {
    const NAME: &'static str = "ErectDomainPdu";
}

impl PduEncode for ErectDomainPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(DomainPduKind::ERECT_DOMAIN.choice_byte(0));
        per::write_u32(dst, self.sub_height);
        per::write_u32(dst, self.sub_interval);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::sizeof_u32(self.sub_height) + per::sizeof_u32(self.sub_interval)
    }
}

impl<'de> PduDecode<'de> for ErectDomainPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::ERECT_DOMAIN)?;

        Ok(Self {
            sub_height: per::read_u32(src)?,
            sub_interval: per::read_u32(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserRequest;

impl AttachUserRequest {
    const NAME: &'static str = "AttachUserRequest";
}

impl PduEncode for AttachUserRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(DomainPduKind::ATTACH_USER_REQUEST.choice_byte(0));
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE
    }
}

impl<'de> PduDecode<'de> for AttachUserRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::ATTACH_USER_REQUEST)?;

        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub initiator_id: u16,
}

impl AttachUserConfirm {
    const NAME: &'static str = "AttachUserConfirm";

    /// The initiator field is marked present through the options bits.
    const OPTIONS: u8 = 0b10;
}

impl PduEncode for AttachUserConfirm {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(DomainPduKind::ATTACH_USER_CONFIRM.choice_byte(Self::OPTIONS));
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USER_ID_BASE)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE
    }
}

impl<'de> PduDecode<'de> for AttachUserConfirm {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::ATTACH_USER_CONFIRM)?;

        Ok(Self {
            result: per::read_enum(src, RESULT_ENUM_LENGTH)?,
            initiator_id: per::read_u16(src, USER_ID_BASE)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

impl ChannelJoinRequest {
    const NAME: &'static str = "ChannelJoinRequest";
}

impl PduEncode for ChannelJoinRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(DomainPduKind::CHANNEL_JOIN_REQUEST.choice_byte(0));
        per::write_u16(dst, self.initiator_id, USER_ID_BASE)?;
        per::write_u16(dst, self.channel_id, 0)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2
    }
}

impl<'de> PduDecode<'de> for ChannelJoinRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::CHANNEL_JOIN_REQUEST)?;

        Ok(Self {
            initiator_id: per::read_u16(src, USER_ID_BASE)?,
            channel_id: per::read_u16(src, 0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    pub channel_id: u16,
}

impl ChannelJoinConfirm {
    const NAME: &'static str = "ChannelJoinConfirm";

    /// The channelId field is marked present through the options bits.
    const OPTIONS: u8 = 0b10;
}

impl PduEncode for ChannelJoinConfirm {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(DomainPduKind::CHANNEL_JOIN_CONFIRM.choice_byte(Self::OPTIONS));
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USER_ID_BASE)?;
        per::write_u16(dst, self.requested_channel_id, 0)?;
        per::write_u16(dst, self.channel_id, 0)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE * 3
    }
}

impl<'de> PduDecode<'de> for ChannelJoinConfirm {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::CHANNEL_JOIN_CONFIRM)?;

        Ok(Self {
            result: per::read_enum(src, RESULT_ENUM_LENGTH)?,
            initiator_id: per::read_u16(src, USER_ID_BASE)?,
            requested_channel_id: per::read_u16(src, 0)?,
            channel_id: per::read_u16(src, 0)?,
        })
    }
}

fn encode_send_data(
    dst: &mut WriteCursor<'_>,
    kind: DomainPduKind,
    ctx: &'static str,
    initiator_id: u16,
    channel_id: u16,
    user_data: &[u8],
) -> PduResult<()> {
    dst.write_u8(kind.choice_byte(0));
    per::write_u16(dst, initiator_id, USER_ID_BASE)?;
    per::write_u16(dst, channel_id, 0)?;
    dst.write_u8(SEND_DATA_PRIORITY_AND_SEGMENTATION);
    per::write_length(dst, cast_length!(ctx, "userData", user_data.len())?);
    dst.write_slice(user_data);

    Ok(())
}

fn decode_send_data(src: &mut ReadCursor<'_>, ctx: &'static str) -> PduResult<(u16, u16, Vec<u8>)> {
    let initiator_id = per::read_u16(src, USER_ID_BASE)?;
    let channel_id = per::read_u16(src, 0)?;

    src.try_read_u8(ctx)?; // dataPriority + segmentation

    let (length, _) = per::read_length(src)?;
    let user_data = src.try_read_slice(ctx, usize::from(length))?.to_vec();

    Ok((initiator_id, channel_id, user_data))
}

fn send_data_size(user_data: &[u8]) -> usize {
    per::CHOICE_SIZE
        + per::U16_SIZE * 2
        + 1 /* priority + segmentation */
        + per::sizeof_length(u16::try_from(user_data.len()).unwrap_or(u16::MAX))
        + user_data.len()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Vec<u8>,
}

impl SendDataRequest {
    const NAME: &'static str = "SendDataRequest";
}

impl PduEncode for SendDataRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        encode_send_data(
            dst,
            DomainPduKind::SEND_DATA_REQUEST,
            Self::NAME,
            self.initiator_id,
            self.channel_id,
            &self.user_data,
        )
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        send_data_size(&self.user_data)
    }
}

impl<'de> PduDecode<'de> for SendDataRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::SEND_DATA_REQUEST)?;

        let (initiator_id, channel_id, user_data) = decode_send_data(src, Self::NAME)?;

        Ok(Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Vec<u8>,
}

impl SendDataIndication {
    const NAME: &'static str = "SendDataIndication";
}

impl PduEncode for SendDataIndication {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        encode_send_data(
            dst,
            DomainPduKind::SEND_DATA_INDICATION,
            Self::NAME,
            self.initiator_id,
            self.channel_id,
            &self.user_data,
        )
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        send_data_size(&self.user_data)
    }
}

impl<'de> PduDecode<'de> for SendDataIndication {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        DomainPduKind::read(src, Self::NAME)?.expect(Self::NAME, DomainPduKind::SEND_DATA_INDICATION)?;

        let (initiator_id, channel_id, user_data) = decode_send_data(src, Self::NAME)?;

        Ok(Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }
}

/// The reason of `DisconnectProviderUltimatum`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DomainDisconnected = 0,
    ProviderInitiated = 1,
    TokenPurged = 2,
    UserRequested = 3,
    ChannelPurged = 4,
}

impl DisconnectReason {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DomainDisconnected),
            1 => Some(Self::ProviderInitiated),
            2 => Some(Self::TokenPurged),
            3 => Some(Self::UserRequested),
            4 => Some(Self::ChannelPurged),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DomainDisconnected => "domain disconnected",
            Self::ProviderInitiated => "server-initiated disconnect",
            Self::TokenPurged => "token purged",
            Self::UserRequested => "user-requested disconnect",
            Self::ChannelPurged => "channel purged",
        }
    }
}

impl core::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisconnectProviderUltimatum {
    pub reason: DisconnectReason,
}

impl DisconnectProviderUltimatum {
    pub const NAME: &'static str = "DisconnectProviderUltimatum";

    const FIXED_PART_SIZE: usize = 2;

    pub fn from_reason(reason: DisconnectReason) -> Self {
        Self { reason }
    }
}

impl PduEncode for DisconnectProviderUltimatum {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        // The 3-bit reason straddles the byte boundary: its two high bits
        // ride in the choice byte's option bits, its low bit leads the
        // second byte, the rest of which is padding.
        let reason = self.reason.as_u8();
        dst.write_array([
            DomainPduKind::DISCONNECT_ULTIMATUM.choice_byte(reason >> 1),
            reason << 7,
        ]);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for DisconnectProviderUltimatum {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let [first, second] = src.read_array();

        DomainPduKind(first >> 2).expect(Self::NAME, DomainPduKind::DISCONNECT_ULTIMATUM)?;

        let reason = (first & 0b11) << 1 | second >> 7;

        Ok(Self {
            reason: DisconnectReason::from_u8(reason)
                .ok_or_else(|| invalid_message_err!("reason", "unknown variant"))?,
        })
    }
}

/// Connect-Initial ::= [APPLICATION 101] IMPLICIT SEQUENCE
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectInitial {
    pub conference_create_request: ConferenceCreateRequest,
    pub calling_domain_selector: Vec<u8>,
    pub called_domain_selector: Vec<u8>,
    pub upward_flag: bool,
    pub target_parameters: DomainParameters,
    pub min_parameters: DomainParameters,
    pub max_parameters: DomainParameters,
}

impl ConnectInitial {
    const NAME: &'static str = "ConnectInitial";

    pub fn with_conference_create_request(conference_create_request: ConferenceCreateRequest) -> Self {
        Self {
            conference_create_request,
            calling_domain_selector: vec![0x01],
            called_domain_selector: vec![0x01],
            upward_flag: true,
            target_parameters: DomainParameters::target(),
            min_parameters: DomainParameters::min(),
            max_parameters: DomainParameters::max(),
        }
    }

    /// BER length of the sequence body (everything after the application tag).
    fn ber_body_len(&self) -> usize {
        let user_data_len = self.conference_create_request.size() as u16;

        ber::sizeof_octet_string(self.calling_domain_selector.len() as u16)
            + ber::sizeof_octet_string(self.called_domain_selector.len() as u16)
            + ber::SIZEOF_BOOL
            + self.target_parameters.size()
            + self.min_parameters.size()
            + self.max_parameters.size()
            + ber::sizeof_octet_string(user_data_len)
    }
}

impl PduEncode for ConnectInitial {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        ber::write_application_tag(dst, BER_TAG_CONNECT_INITIAL, self.ber_body_len() as u16)?;
        ber::write_octet_string(dst, &self.calling_domain_selector)?;
        ber::write_octet_string(dst, &self.called_domain_selector)?;
        ber::write_bool(dst, self.upward_flag)?;
        self.target_parameters.encode(dst)?;
        self.min_parameters.encode(dst)?;
        self.max_parameters.encode(dst)?;
        ber::write_octet_string_tag(dst, cast_length!("userData", self.conference_create_request.size())?)?;
        self.conference_create_request.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body = self.ber_body_len();
        ber::sizeof_application_tag(BER_TAG_CONNECT_INITIAL, body as u16) + body
    }
}

impl<'de> PduDecode<'de> for ConnectInitial {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_application_tag(src, BER_TAG_CONNECT_INITIAL)?;

        let calling_domain_selector = ber::read_octet_string(src)?;
        let called_domain_selector = ber::read_octet_string(src)?;
        let upward_flag = ber::read_bool(src)?;
        let target_parameters = DomainParameters::decode(src)?;
        let min_parameters = DomainParameters::decode(src)?;
        let max_parameters = DomainParameters::decode(src)?;

        let _user_data_len = ber::read_octet_string_tag(src)?;
        let conference_create_request = ConferenceCreateRequest::decode(src)?;

        Ok(Self {
            conference_create_request,
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            target_parameters,
            min_parameters,
            max_parameters,
        })
    }
}

/// Connect-Response ::= [APPLICATION 102] IMPLICIT SEQUENCE
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    pub conference_create_response: ConferenceCreateResponse,
    pub called_connect_id: u32,
    pub domain_parameters: DomainParameters,
}

impl ConnectResponse {
    const NAME: &'static str = "ConnectResponse";

    pub fn channel_ids(&self) -> Vec<u16> {
        self.conference_create_response.gcc_blocks.network.channel_ids.clone()
    }

    pub fn io_channel_id(&self) -> u16 {
        self.conference_create_response.gcc_blocks.network.io_channel
    }

    fn ber_body_len(&self) -> usize {
        ber::SIZEOF_ENUMERATED
            + ber::sizeof_integer(self.called_connect_id)
            + self.domain_parameters.size()
            + ber::sizeof_octet_string(self.conference_create_response.size() as u16)
    }
}

impl PduEncode for ConnectResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        ber::write_application_tag(dst, BER_TAG_CONNECT_RESPONSE, self.ber_body_len() as u16)?;
        ber::write_enumerated(dst, 0)?; // result: rt-successful
        ber::write_integer(dst, self.called_connect_id)?;
        self.domain_parameters.encode(dst)?;
        ber::write_octet_string_tag(dst, cast_length!("userData", self.conference_create_response.size())?)?;
        self.conference_create_response.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body = self.ber_body_len();
        ber::sizeof_application_tag(BER_TAG_CONNECT_RESPONSE, body as u16) + body
    }
}

impl<'de> PduDecode<'de> for ConnectResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_application_tag(src, BER_TAG_CONNECT_RESPONSE)?;
        ber::read_enumerated(src, RESULT_ENUM_LENGTH)?;

        let called_connect_id = ber::read_integer(src)? as u32;
        let domain_parameters = DomainParameters::decode(src)?;

        let _user_data_len = ber::read_octet_string_tag(src)?;
        let conference_create_response = ConferenceCreateResponse::decode(src)?;

        Ok(Self {
            conference_create_response,
            called_connect_id,
            domain_parameters,
        })
    }
}

/// DomainParameters ::= SEQUENCE of eight INTEGERs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainParameters {
    pub max_channel_ids: u32,
    pub max_user_ids: u32,
    pub max_token_ids: u32,
    pub num_priorities: u32,
    pub min_throughput: u32,
    pub max_height: u32,
    pub max_mcs_pdu_size: u32,
    pub protocol_version: u32,
}

impl DomainParameters {
    const NAME: &'static str = "DomainParameters";

    pub fn min() -> Self {
        Self {
            max_channel_ids: 1,
            max_user_ids: 1,
            max_token_ids: 1,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 1056,
            protocol_version: 2,
        }
    }

    pub fn target() -> Self {
        Self {
            max_channel_ids: 34,
            max_user_ids: 2,
            max_token_ids: 0,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    pub fn max() -> Self {
        Self {
            max_channel_ids: 65535,
            max_user_ids: 64535,
            max_token_ids: 65535,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    fn fields(&self) -> [u32; 8] {
        [
            self.max_channel_ids,
            self.max_user_ids,
            self.max_token_ids,
            self.num_priorities,
            self.min_throughput,
            self.max_height,
            self.max_mcs_pdu_size,
            self.protocol_version,
        ]
    }

    fn ber_body_len(&self) -> usize {
        self.fields().iter().map(|&field| ber::sizeof_integer(field)).sum()
    }
}

impl PduEncode for DomainParameters {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        ber::write_sequence_tag(dst, cast_length!("seqLen", self.ber_body_len())?)?;
        for field in self.fields() {
            ber::write_integer(dst, field)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body = self.ber_body_len();
        ber::sizeof_sequence_tag(body as u16) + body
    }
}

impl<'de> PduDecode<'de> for DomainParameters {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_sequence_tag(src)?;

        let mut fields = [0u32; 8];
        for field in &mut fields {
            *field = ber::read_integer(src)? as u32;
        }

        let [max_channel_ids, max_user_ids, max_token_ids, num_priorities, min_throughput, max_height, max_mcs_pdu_size, protocol_version] =
            fields;

        Ok(Self {
            max_channel_ids,
            max_user_ids,
            max_token_ids,
            num_priorities,
            min_throughput,
            max_height,
            max_mcs_pdu_size,
            protocol_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn erect_domain_round_trips() {
        let pdu = McsMessage::ErectDomainRequest(ErectDomainPdu {
            sub_height: 0,
            sub_interval: 0,
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x04, 0x01, 0x00, 0x01, 0x00]);

        let decoded: McsMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn attach_user_confirm_round_trips() {
        let pdu = McsMessage::AttachUserConfirm(AttachUserConfirm {
            result: 0,
            initiator_id: 1002,
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x2E, 0x00, 0x00, 0x01]);

        let decoded: McsMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn channel_join_confirm_round_trips() {
        let pdu = McsMessage::ChannelJoinConfirm(ChannelJoinConfirm {
            result: 0,
            initiator_id: 1002,
            requested_channel_id: 1004,
            channel_id: 1004,
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: McsMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn send_data_request_round_trips() {
        let pdu = McsMessage::SendDataRequest(SendDataRequest {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: vec![0xde, 0xad, 0xbe, 0xef],
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: McsMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn disconnect_ultimatum_matches_reference_bytes() {
        let pdu = DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested);

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x21, 0x80]);

        let decoded: DisconnectProviderUltimatum = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn connect_pdus_are_discriminated_by_first_byte() {
        assert!(is_connect_pdu(0x7F));
        assert!(!is_connect_pdu(0x04));
    }
}
