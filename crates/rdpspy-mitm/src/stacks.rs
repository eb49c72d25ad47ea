//! The concrete layers of a side's main protocol stack and the typed events
//! they surface: segmentation at the bottom, TPKT / X.224 / MCS above it,
//! with the fast-path layer attached next to TPKT on the segmentation
//! discriminator.

use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::fast_path::{EncryptionFlags, FastPathHeader, FastPathInputHeader};
use rdpspy_pdu::mcs::{
    is_connect_pdu, AttachUserConfirm, ChannelJoinConfirm, ChannelJoinRequest, ConnectInitial, ConnectResponse,
    DisconnectReason, ErectDomainPdu, McsMessage,
};
use rdpspy_pdu::nego::{ConnectionConfirm, ConnectionRequest};
use rdpspy_pdu::tpdu::{TpduCode, TpduHeader};
use rdpspy_pdu::tpkt::TpktHeader;
use rdpspy_pdu::x224::X224Data;
use rdpspy_pdu::{decode, encode_vec, find_size, Action, PduEncode, PduErrorKind};

use crate::layer::{Layer, LayerContext, LayerHandle, LayerStack, StackOutput};
use crate::secure::SideShared;
use crate::{SessionError, SessionResult, Side};

/// Everything the top stack can report to the orchestrator.
#[derive(Debug)]
pub enum MitmEvent {
    X224ConnectionRequest(ConnectionRequest),
    X224ConnectionConfirm(ConnectionConfirm),
    X224DisconnectRequest,
    McsConnectInitial(Box<ConnectInitial>),
    McsConnectResponse(Box<ConnectResponse>),
    McsErectDomain(ErectDomainPdu),
    McsAttachUserRequest,
    McsAttachUserConfirm(AttachUserConfirm),
    McsChannelJoinRequest(ChannelJoinRequest),
    McsChannelJoinConfirm(ChannelJoinConfirm),
    McsDisconnect(DisconnectReason),
    /// MCS send-data payload for one channel, still wrapped in the channel's
    /// own security/virtual-channel layers.
    ChannelData {
        initiator_id: u16,
        channel_id: u16,
        data: Vec<u8>,
    },
    /// A decrypted fast-path input frame (victim to server).
    FastPathInput { num_events: u8, payload: Vec<u8> },
    /// A decrypted fast-path output frame (server to victim).
    FastPathOutput { payload: Vec<u8> },
    UnknownHeader(u8),
}

/// Segmentation discriminators used with [`LayerStack::attach`].
pub const SEGMENTATION_TPKT: u8 = 0;
pub const SEGMENTATION_FAST_PATH: u8 = 1;

/// Accumulates raw transport bytes and routes whole frames by their first
/// byte: TPKT or fast-path. Any other header byte is fatal.
pub struct SegmentationLayer {
    buffer: Vec<u8>,
}

impl SegmentationLayer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }
}

impl Default for SegmentationLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for SegmentationLayer {
    fn name(&self) -> &'static str {
        "segmentation"
    }

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
        self.buffer.extend_from_slice(bytes);

        loop {
            let info = match find_size(&self.buffer) {
                Ok(Some(info)) => info,
                Ok(None) => break,
                Err(e) => {
                    if let PduErrorKind::UnexpectedMessageType { got } = e.kind() {
                        ctx.emit(MitmEvent::UnknownHeader(*got));
                        return Err(SessionError::UnknownHeader(*got));
                    }
                    return Err(e.into());
                }
            };

            if self.buffer.len() < info.length {
                break;
            }

            let frame: Vec<u8> = self.buffer.drain(..info.length).collect();

            match info.action {
                Action::X224 => ctx.forward_route(SEGMENTATION_TPKT, frame)?,
                Action::FastPath => ctx.forward_route(SEGMENTATION_FAST_PATH, frame)?,
            }
        }

        Ok(())
    }

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
        ctx.send_down(payload.to_vec());
        Ok(())
    }
}

/// Strips and restores the 4-byte TPKT header.
pub struct TpktLayer;

impl Layer for TpktLayer {
    fn name(&self) -> &'static str {
        "tpkt"
    }

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
        let mut src = ReadCursor::new(bytes);
        let header = TpktHeader::read(&mut src)?;

        let body_length = header.packet_length().saturating_sub(TpktHeader::SIZE);
        if src.len() < body_length {
            return Err(SessionError::Protocol("truncated TPKT frame"));
        }

        ctx.forward_up(src.read_slice(body_length).to_vec())
    }

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
        let header = TpktHeader {
            packet_length: u16::try_from(payload.len() + TpktHeader::SIZE)
                .map_err(|_| SessionError::Protocol("frame too large for TPKT"))?,
        };

        let mut frame = vec![0u8; TpktHeader::SIZE + payload.len()];
        let mut dst = WriteCursor::new(&mut frame);
        header.write(&mut dst)?;
        dst.write_slice(payload);

        ctx.send_down(frame);
        Ok(())
    }
}

/// X.224 class-0: connection PDUs surface as events, data TPDUs pass through.
pub struct X224Layer;

impl Layer for X224Layer {
    fn name(&self) -> &'static str {
        "x224"
    }

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
        let mut src = ReadCursor::new(bytes);
        let tpdu = TpduHeader::read(&mut src)?;

        if tpdu.code == TpduCode::DATA {
            if src.len() < tpdu.variable_part_size() {
                return Err(SessionError::Protocol("truncated X.224 data TPDU"));
            }
            let _variable_part = src.read_slice(tpdu.variable_part_size());

            return ctx.forward_up(src.read_remaining().to_vec());
        }

        if tpdu.code == TpduCode::CONNECTION_REQUEST {
            let pdu: ConnectionRequest = decode(bytes)?;
            ctx.emit(MitmEvent::X224ConnectionRequest(pdu));
            return Ok(());
        }

        if tpdu.code == TpduCode::CONNECTION_CONFIRM {
            let pdu: ConnectionConfirm = decode(bytes)?;
            ctx.emit(MitmEvent::X224ConnectionConfirm(pdu));
            return Ok(());
        }

        if tpdu.code == TpduCode::DISCONNECT_REQUEST {
            ctx.emit(MitmEvent::X224DisconnectRequest);
            return Ok(());
        }

        Err(SessionError::Protocol("unexpected X.224 TPDU code"))
    }

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
        let wrapped = encode_vec(&X224Data {
            data: payload.to_vec(),
        })?;

        ctx.send_down(wrapped);
        Ok(())
    }
}

/// MCS: connect PDUs and domain PDUs surface as events; send-data payloads
/// surface as per-channel data for the router (the orchestrator) to
/// demultiplex to the matching channel pipeline.
pub struct McsLayer;

impl Layer for McsLayer {
    fn name(&self) -> &'static str {
        "mcs"
    }

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
        if bytes.is_empty() {
            return Err(SessionError::Protocol("empty MCS payload"));
        }

        if is_connect_pdu(bytes[0]) {
            // Connect-Initial and Connect-Response are told apart by the
            // second byte of the BER application tag.
            let event = match bytes.get(1) {
                Some(0x65) => MitmEvent::McsConnectInitial(Box::new(decode::<ConnectInitial>(bytes)?)),
                Some(0x66) => MitmEvent::McsConnectResponse(Box::new(decode::<ConnectResponse>(bytes)?)),
                _ => return Err(SessionError::Protocol("unknown MCS connect PDU")),
            };

            ctx.emit(event);
            return Ok(());
        }

        let message: McsMessage = decode(bytes)?;

        let event = match message {
            McsMessage::ErectDomainRequest(pdu) => MitmEvent::McsErectDomain(pdu),
            McsMessage::AttachUserRequest(_) => MitmEvent::McsAttachUserRequest,
            McsMessage::AttachUserConfirm(pdu) => MitmEvent::McsAttachUserConfirm(pdu),
            McsMessage::ChannelJoinRequest(pdu) => MitmEvent::McsChannelJoinRequest(pdu),
            McsMessage::ChannelJoinConfirm(pdu) => MitmEvent::McsChannelJoinConfirm(pdu),
            McsMessage::SendDataRequest(pdu) => MitmEvent::ChannelData {
                initiator_id: pdu.initiator_id,
                channel_id: pdu.channel_id,
                data: pdu.user_data,
            },
            McsMessage::SendDataIndication(pdu) => MitmEvent::ChannelData {
                initiator_id: pdu.initiator_id,
                channel_id: pdu.channel_id,
                data: pdu.user_data,
            },
            McsMessage::DisconnectProviderUltimatum(pdu) => MitmEvent::McsDisconnect(pdu.reason),
        };

        ctx.emit(event);
        Ok(())
    }

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
        ctx.send_down(payload.to_vec());
        Ok(())
    }
}

/// Fast-path frames: parses the header for this side's direction, decrypts
/// when RDP standard security is active, and surfaces the plaintext events.
pub struct FastPathLayer {
    side: Side,
}

impl FastPathLayer {
    pub fn new(side: Side) -> Self {
        Self { side }
    }
}

impl Layer for FastPathLayer {
    fn name(&self) -> &'static str {
        "fast-path"
    }

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
        let mut src = ReadCursor::new(bytes);

        // The victim sends input events; the server sends output updates.
        let (flags, num_events) = match self.side {
            Side::Front => {
                let header: FastPathInputHeader = rdpspy_pdu::decode_cursor(&mut src)?;
                (header.flags, header.num_events)
            }
            Side::Back => {
                let header: FastPathHeader = rdpspy_pdu::decode_cursor(&mut src)?;
                (header.flags, 0)
            }
        };

        let payload = src.read_remaining().to_vec();

        let payload = if flags.contains(EncryptionFlags::ENCRYPTED) {
            if payload.len() < 8 {
                return Err(SessionError::Protocol("encrypted fast-path frame without a MAC"));
            }
            let (mac, ciphertext) = payload.split_at(8);
            ctx.shared.security.crypter().get()?.decrypt(ciphertext, mac)?
        } else {
            payload
        };

        let event = match self.side {
            Side::Front => MitmEvent::FastPathInput { num_events, payload },
            Side::Back => MitmEvent::FastPathOutput { payload },
        };

        ctx.emit(event);
        Ok(())
    }

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
        ctx.send_down(payload.to_vec());
        Ok(())
    }
}

/// Builds a fast-path frame for the given side's outgoing direction,
/// encrypting when that side uses RDP standard security.
pub fn build_fast_path_frame(
    shared: &mut SideShared,
    num_events: u8,
    payload: &[u8],
) -> SessionResult<Vec<u8>> {
    let (flags, body) = if shared.security.is_native() {
        let (ciphertext, mac) = shared.security.crypter().get()?.encrypt(payload);

        let mut body = mac.to_vec();
        body.extend_from_slice(&ciphertext);
        (EncryptionFlags::ENCRYPTED, body)
    } else {
        (EncryptionFlags::empty(), payload.to_vec())
    };

    // Sending towards the victim means emitting output updates; towards the
    // server, input events.
    let mut frame = match shared.side {
        Side::Front => encode_vec(&FastPathHeader::new(flags, body.len()))?,
        Side::Back => encode_vec(&FastPathInputHeader {
            flags,
            data_length: body.len(),
            num_events,
        })?,
    };

    frame.extend_from_slice(&body);
    Ok(frame)
}

/// One side's main protocol stack with its layer handles.
pub struct TopStack {
    stack: LayerStack,
    pub segmentation: LayerHandle,
    pub tpkt: LayerHandle,
    pub x224: LayerHandle,
    pub mcs: LayerHandle,
    pub fast_path: LayerHandle,
}

impl TopStack {
    pub fn new(side: Side) -> Self {
        let mut stack = LayerStack::new();

        let segmentation = stack.add_layer(SegmentationLayer::new());
        let tpkt = stack.add_layer(TpktLayer);
        let x224 = stack.add_layer(X224Layer);
        let mcs = stack.add_layer(McsLayer);
        let fast_path = stack.add_layer(FastPathLayer::new(side));

        stack.chain(&[segmentation, tpkt, x224, mcs]);
        stack.attach(segmentation, SEGMENTATION_TPKT, tpkt);
        stack.attach(segmentation, SEGMENTATION_FAST_PATH, fast_path);

        Self {
            stack,
            segmentation,
            tpkt,
            x224,
            mcs,
            fast_path,
        }
    }

    /// Feeds raw transport bytes into the stack.
    pub fn recv(&mut self, shared: &mut SideShared, bytes: &[u8]) -> SessionResult<StackOutput> {
        self.stack.recv(shared, bytes)
    }

    /// Sends a PDU that already carries its TPDU header (the negotiation
    /// PDUs); only the TPKT framing is added.
    pub fn send_tpdu<T: PduEncode>(&mut self, shared: &mut SideShared, pdu: &T) -> SessionResult<StackOutput> {
        let encoded = encode_vec(pdu)?;
        self.stack.send_from(shared, self.tpkt, &encoded)
    }

    /// Sends an MCS payload (connect or domain PDU), wrapped in an X.224
    /// data TPDU and TPKT.
    pub fn send_mcs<T: PduEncode>(&mut self, shared: &mut SideShared, pdu: &T) -> SessionResult<StackOutput> {
        let encoded = encode_vec(pdu)?;
        self.stack.send_from(shared, self.x224, &encoded)
    }

    /// Sends an already-framed fast-path frame.
    pub fn send_frame(&mut self, shared: &mut SideShared, frame: &[u8]) -> SessionResult<StackOutput> {
        self.stack.send_from(shared, self.segmentation, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::{SecurityMode, SecuritySettings};
    use rdpspy_pdu::nego::{RequestFlags, SecurityProtocol};

    fn shared(side: Side) -> SideShared {
        let mode = match side {
            Side::Front => SecurityMode::Server,
            Side::Back => SecurityMode::Client,
        };

        SideShared {
            side,
            security: SecuritySettings::new(mode),
        }
    }

    fn tpkt_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x03, 0x00];
        frame.extend_from_slice(&u16::try_from(payload.len() + 4).unwrap().to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn connection_request_surfaces_as_event() {
        let mut stack = TopStack::new(Side::Front);
        let mut shared = shared(Side::Front);

        let request = ConnectionRequest {
            nego_data: None,
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };
        let frame = tpkt_frame(&encode_vec(&request).unwrap());

        let output = stack.recv(&mut shared, &frame).unwrap();
        assert_eq!(output.events.len(), 1);
        assert!(matches!(output.events[0], MitmEvent::X224ConnectionRequest(_)));
    }

    #[test]
    fn partial_frames_are_buffered() {
        let mut stack = TopStack::new(Side::Front);
        let mut shared = shared(Side::Front);

        let request = ConnectionRequest {
            nego_data: None,
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };
        let frame = tpkt_frame(&encode_vec(&request).unwrap());

        let (first, rest) = frame.split_at(3);

        let output = stack.recv(&mut shared, first).unwrap();
        assert!(output.events.is_empty());

        let output = stack.recv(&mut shared, rest).unwrap();
        assert_eq!(output.events.len(), 1);
    }

    #[test]
    fn unknown_header_is_fatal_and_reported() {
        let mut stack = TopStack::new(Side::Back);
        let mut shared = shared(Side::Back);

        let err = stack.recv(&mut shared, &[0xFF, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, SessionError::UnknownHeader(0xFF)));
    }

    #[test]
    fn outgoing_tpdu_is_tpkt_framed() {
        let mut stack = TopStack::new(Side::Back);
        let mut shared = shared(Side::Back);

        let request = ConnectionRequest {
            nego_data: None,
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };

        let output = stack.send_tpdu(&mut shared, &request).unwrap();
        assert_eq!(output.transport.len(), 1);

        let frame = &output.transport[0];
        assert_eq!(frame[0], 0x03);
        assert_eq!(
            usize::from(u16::from_be_bytes([frame[2], frame[3]])),
            frame.len()
        );
    }

    #[test]
    fn plaintext_fast_path_input_round_trips_through_the_stack() {
        let mut stack = TopStack::new(Side::Front);
        let mut shared = shared(Side::Front);

        // One keyboard event, no encryption: header byte carries the count.
        let header = FastPathInputHeader {
            flags: EncryptionFlags::empty(),
            data_length: 2,
            num_events: 1,
        };
        let mut frame = encode_vec(&header).unwrap();
        frame.extend_from_slice(&[0x00, 0x1C]);

        let output = stack.recv(&mut shared, &frame).unwrap();
        assert_eq!(output.events.len(), 1);
        match &output.events[0] {
            MitmEvent::FastPathInput { num_events, payload } => {
                assert_eq!(*num_events, 1);
                assert_eq!(payload, &[0x00, 0x1C]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
