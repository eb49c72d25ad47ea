//! The T.124 ConferenceCreateRequest / ConferenceCreateResponse wrappers.
//!
//! GCC wraps the RDP user data blocks in a thin, fully constant conference
//! ceremony: an object identifier, a conference named "1", and one
//! h221NonStandard user-data set keyed "Duca" (client to server) or "McDn"
//! (server to client). Everything but the embedded blocks is fixed, so the
//! codec validates the ceremony and hands through the payload.

use super::{ClientGccBlocks, ServerGccBlocks};
use crate::cursor::{ReadCursor, WriteCursor};
use crate::{mcs, per, PduDecode, PduEncode, PduError, PduErrorExt as _, PduResult};

const T124_OBJECT_ID: [u8; 6] = [0, 0, 20, 124, 0, 1];

const H221_KEY_CLIENT_TO_SERVER: &[u8; 4] = b"Duca";
const H221_KEY_SERVER_TO_CLIENT: &[u8; 4] = b"McDn";

const CHOICE_OBJECT_KEY: u8 = 0;
const CHOICE_CREATE_REQUEST: u8 = 0;
const CHOICE_CREATE_RESPONSE: u8 = 0x14;
const CHOICE_H221_NON_STANDARD: u8 = 0xC0;

const SELECTION_USER_DATA: u8 = 8;
const ONE_USER_DATA_SET: u8 = 1;

const CONFERENCE_NAME: &[u8] = b"1";
const NODE_ID_BASE: u16 = 1001;
const RESPONSE_TAG: u32 = 1;
const RESULT_SUCCESS: u8 = 0;

/// Bytes between the connectPDU length determinant and the embedded GCC
/// blocks, for each direction.
const REQUEST_CEREMONY_SIZE: usize = 12;
const RESPONSE_CEREMONY_SIZE: usize = 13;

/// ConnectData prologue: the OBJECT_IDENTIFIER key and the (ignored)
/// connectPDU length.
fn read_connect_data(src: &mut ReadCursor<'_>, ctx: &'static str) -> PduResult<()> {
    if src.try_read_u8(ctx)? != CHOICE_OBJECT_KEY {
        return Err(PduError::invalid_message(ctx, "ConnectData", "unexpected key choice"));
    }

    if per::read_object_id(src)? != T124_OBJECT_ID {
        return Err(PduError::invalid_message(ctx, "ConnectData", "not the T.124 object id"));
    }

    // connectPDU length; MS-RDPBCGR says to ignore it.
    per::read_length(src)?;

    Ok(())
}

fn write_connect_data(dst: &mut WriteCursor<'_>, connect_pdu_len: u16) {
    per::write_choice(dst, CHOICE_OBJECT_KEY);
    per::write_object_id(dst, T124_OBJECT_ID);
    per::write_length(dst, connect_pdu_len);
}

/// One h221NonStandard user-data set carrying the GCC blocks.
fn read_user_data_set(src: &mut ReadCursor<'_>, ctx: &'static str, h221_key: &[u8; 4]) -> PduResult<()> {
    if src.try_read_u8(ctx)? != ONE_USER_DATA_SET {
        return Err(PduError::invalid_message(ctx, "userData", "expected exactly one set"));
    }

    if src.try_read_u8(ctx)? != CHOICE_H221_NON_STANDARD {
        return Err(PduError::invalid_message(ctx, "userData", "expected h221NonStandard"));
    }

    if per::read_octet_string(src, h221_key.len())? != h221_key.as_slice() {
        return Err(PduError::invalid_message(ctx, "userData", "wrong H.221 key"));
    }

    // Length of the embedded blocks; the blocks decode to the cursor's end.
    per::read_length(src)?;

    Ok(())
}

fn write_user_data_set(dst: &mut WriteCursor<'_>, h221_key: &[u8; 4], blocks_len: u16) -> PduResult<()> {
    per::write_number_of_sets(dst, ONE_USER_DATA_SET);
    per::write_choice(dst, CHOICE_H221_NON_STANDARD);
    per::write_octet_string(dst, h221_key, h221_key.len())?;
    per::write_length(dst, blocks_len);

    Ok(())
}

/// Size of the ConnectData prologue for a given connectPDU length.
fn connect_data_size(connect_pdu_len: u16) -> usize {
    per::CHOICE_SIZE + 6 /* object id */ + per::sizeof_length(connect_pdu_len)
}

/// The GCC Conference Create Request wrapping the client data blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateRequest {
    pub gcc_blocks: ClientGccBlocks,
}

impl ConferenceCreateRequest {
    const NAME: &'static str = "ConferenceCreateRequest";
}

impl PduEncode for ConferenceCreateRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        let blocks_len = self.gcc_blocks.size();
        let connect_pdu_len: u16 = cast_length!("connectPDU", blocks_len + REQUEST_CEREMONY_SIZE)?;

        write_connect_data(dst, connect_pdu_len);

        per::write_choice(dst, CHOICE_CREATE_REQUEST);
        per::write_selection(dst, SELECTION_USER_DATA);
        per::write_numeric_string(dst, CONFERENCE_NAME, 1)?;
        per::write_padding(dst, 1);

        write_user_data_set(dst, H221_KEY_CLIENT_TO_SERVER, cast_length!("gccBlocks", blocks_len)?)?;
        self.gcc_blocks.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let blocks_len = self.gcc_blocks.size();
        let connect_pdu_len = (blocks_len + REQUEST_CEREMONY_SIZE).min(usize::from(u16::MAX)) as u16;

        connect_data_size(connect_pdu_len)
            + REQUEST_CEREMONY_SIZE
            + per::sizeof_length(blocks_len.min(usize::from(u16::MAX)) as u16)
            + blocks_len
    }
}

impl<'de> PduDecode<'de> for ConferenceCreateRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        read_connect_data(src, Self::NAME)?;

        if src.try_read_u8(Self::NAME)? != CHOICE_CREATE_REQUEST {
            return Err(invalid_message_err!("connectPDU", "not a conference create request"));
        }

        if src.try_read_u8(Self::NAME)? != SELECTION_USER_DATA {
            return Err(invalid_message_err!("selection", "userData must be selected"));
        }

        per::read_numeric_string(src, 1)?; // conference name
        per::read_padding(src, 1);

        read_user_data_set(src, Self::NAME, H221_KEY_CLIENT_TO_SERVER)?;

        Ok(Self {
            gcc_blocks: ClientGccBlocks::decode(src)?,
        })
    }
}

/// The GCC Conference Create Response wrapping the server data blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateResponse {
    pub user_id: u16,
    pub gcc_blocks: ServerGccBlocks,
}

impl ConferenceCreateResponse {
    const NAME: &'static str = "ConferenceCreateResponse";
}

impl PduEncode for ConferenceCreateResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        let blocks_len = self.gcc_blocks.size();
        // The off-by-one matches what real servers emit; clients must ignore
        // this length anyway.
        let connect_pdu_len: u16 = cast_length!("connectPDU", blocks_len + RESPONSE_CEREMONY_SIZE + 1)?;

        write_connect_data(dst, connect_pdu_len);

        per::write_choice(dst, CHOICE_CREATE_RESPONSE);
        per::write_u16(dst, self.user_id, NODE_ID_BASE)?;
        per::write_u32(dst, RESPONSE_TAG);
        per::write_enum(dst, RESULT_SUCCESS);

        write_user_data_set(dst, H221_KEY_SERVER_TO_CLIENT, cast_length!("gccBlocks", blocks_len)?)?;
        self.gcc_blocks.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let blocks_len = self.gcc_blocks.size();
        let connect_pdu_len = (blocks_len + RESPONSE_CEREMONY_SIZE + 1).min(usize::from(u16::MAX)) as u16;

        connect_data_size(connect_pdu_len)
            + RESPONSE_CEREMONY_SIZE
            + per::sizeof_length(blocks_len.min(usize::from(u16::MAX)) as u16)
            + blocks_len
    }
}

impl<'de> PduDecode<'de> for ConferenceCreateResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        read_connect_data(src, Self::NAME)?;

        if src.try_read_u8(Self::NAME)? != CHOICE_CREATE_RESPONSE {
            return Err(invalid_message_err!("connectPDU", "not a conference create response"));
        }

        let user_id = per::read_u16(src, NODE_ID_BASE)?;

        if per::read_u32(src)? != RESPONSE_TAG {
            return Err(invalid_message_err!("tag", "unexpected response tag"));
        }
        if per::read_enum(src, mcs::RESULT_ENUM_LENGTH)? != RESULT_SUCCESS {
            return Err(invalid_message_err!("result", "conference create failed"));
        }

        read_user_data_set(src, Self::NAME, H221_KEY_SERVER_TO_CLIENT)?;

        Ok(Self {
            user_id,
            gcc_blocks: ServerGccBlocks::decode(src)?,
        })
    }
}
