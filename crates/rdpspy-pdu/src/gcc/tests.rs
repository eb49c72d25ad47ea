use lazy_static::lazy_static;

use super::*;
use crate::{decode, encode_vec};

fn client_core_data() -> ClientCoreData {
    ClientCoreData {
        version: RdpVersion::V5_PLUS,
        desktop_width: 1280,
        desktop_height: 720,
        color_depth: ColorDepth::Bpp24,
        sec_access_sequence: SecureAccessSequence::Del,
        keyboard_layout: 0x409,
        client_build: 2600,
        client_name: "VICTIM-PC".to_owned(),
        keyboard_type: KeyboardType::IbmEnhanced,
        keyboard_subtype: 0,
        keyboard_functional_keys_count: 12,
        ime_file_name: String::new(),
        optional_data: ClientCoreOptionalData {
            post_beta2_color_depth: Some(ColorDepth::Bpp24),
            client_product_id: Some(1),
            serial_number: Some(0),
            high_color_depth: Some(HighColorDepth::Bpp24),
            supported_color_depths: Some(SupportedColorDepths::all()),
            early_capability_flags: Some(
                ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU | ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION,
            ),
            ..Default::default()
        },
    }
}

lazy_static! {
    static ref CLIENT_BLOCKS: ClientGccBlocks = ClientGccBlocks {
        core: client_core_data(),
        security: ClientSecurityData {
            encryption_methods: EncryptionMethod::BIT_40 | EncryptionMethod::BIT_128,
            ext_encryption_methods: 0,
        },
        network: Some(ClientNetworkData {
            channels: vec![
                ChannelDef {
                    name: ChannelName::from_utf8("cliprdr").unwrap(),
                    options: ChannelOptions::INITIALIZED | ChannelOptions::SHOW_PROTOCOL,
                },
                ChannelDef {
                    name: ChannelName::from_utf8("rdpdr").unwrap(),
                    options: ChannelOptions::INITIALIZED,
                },
            ],
        }),
        cluster: Some(ClientClusterData {
            flags: RedirectionFlags::REDIRECTION_SUPPORTED,
            redirection_version: RedirectionVersion::V4,
            redirected_session_id: 0,
        }),
        monitor: None,
        message_channel: None,
        multi_transport_channel: None,
    };
    static ref SERVER_BLOCKS: ServerGccBlocks = ServerGccBlocks {
        core: ServerCoreData {
            version: RdpVersion::V5_PLUS,
            optional_data: Default::default(),
        },
        network: ServerNetworkData {
            io_channel: 1003,
            channel_ids: vec![1004, 1005],
        },
        security: ServerSecurityData {
            encryption_method: EncryptionMethod::BIT_128,
            encryption_level: EncryptionLevel::ClientCompatible,
            server_random: Some([0x42; SERVER_RANDOM_LEN]),
            server_cert: vec![0xAA; 16],
        },
        message_channel: None,
        multi_transport_channel: None,
    };
}

#[test]
fn client_blocks_round_trip() {
    let encoded = encode_vec(&*CLIENT_BLOCKS).unwrap();
    assert_eq!(encoded.len(), CLIENT_BLOCKS.size());

    let decoded: ClientGccBlocks = decode(&encoded).unwrap();
    assert_eq!(decoded, *CLIENT_BLOCKS);
}

#[test]
fn server_blocks_round_trip() {
    let encoded = encode_vec(&*SERVER_BLOCKS).unwrap();
    assert_eq!(encoded.len(), SERVER_BLOCKS.size());

    let decoded: ServerGccBlocks = decode(&encoded).unwrap();
    assert_eq!(decoded, *SERVER_BLOCKS);
}

#[test]
fn conference_create_request_round_trips() {
    let request = ConferenceCreateRequest {
        gcc_blocks: CLIENT_BLOCKS.clone(),
    };

    let encoded = encode_vec(&request).unwrap();
    assert_eq!(encoded.len(), request.size());

    let decoded: ConferenceCreateRequest = decode(&encoded).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn conference_create_response_round_trips() {
    let response = ConferenceCreateResponse {
        user_id: 1002,
        gcc_blocks: SERVER_BLOCKS.clone(),
    };

    let encoded = encode_vec(&response).unwrap();

    let decoded: ConferenceCreateResponse = decode(&encoded).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn cleared_early_capability_flag_survives_reencode() {
    let mut blocks = CLIENT_BLOCKS.clone();

    let flags = blocks.core.optional_data.early_capability_flags.unwrap();
    blocks.core.optional_data.early_capability_flags =
        Some(flags - ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION);

    let encoded = encode_vec(&blocks).unwrap();
    let decoded: ClientGccBlocks = decode(&encoded).unwrap();

    let decoded_flags = decoded.core.optional_data.early_capability_flags.unwrap();
    assert!(!decoded_flags.contains(ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION));
    assert!(decoded_flags.contains(ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU));
}
