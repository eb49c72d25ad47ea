//! The session recorder: frames every intercepted event as a typed,
//! timestamped player message and broadcasts it to the configured sinks.

use std::io::{self, BufWriter, Write as _};
use std::time::{SystemTime, UNIX_EPOCH};

use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::{ensure_size, unsupported_value_err, PduDecode, PduEncode, PduResult};

/// The player message types. These values are part of the on-disk recording
/// format and must stay stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlayerMessageType {
    ConnectionClose = 0,
    ClientInfo = 1,
    SlowPathPdu = 2,
    FastPathInput = 3,
    FastPathOutput = 4,
    ClipboardData = 5,
    ClientData = 6,
}

impl PlayerMessageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ConnectionClose),
            1 => Some(Self::ClientInfo),
            2 => Some(Self::SlowPathPdu),
            3 => Some(Self::FastPathInput),
            4 => Some(Self::FastPathOutput),
            5 => Some(Self::ClipboardData),
            6 => Some(Self::ClientData),
            _ => None,
        }
    }
}

/// One frame of the recording stream:
/// `messageType: u8 ‖ timestamp_ms: u64-LE ‖ payload`.
///
/// There is no length prefix; the stream reader derives each frame's extent
/// from the transport (file chunking or the socket framing of the live
/// player).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerMessagePdu {
    pub message_type: PlayerMessageType,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl PlayerMessagePdu {
    const NAME: &'static str = "PlayerMessagePdu";

    const FIXED_PART_SIZE: usize = 1 /* type */ + 8 /* timestamp */;
}

impl PduEncode for PlayerMessagePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u8(self.message_type.as_u8());
        dst.write_u64(self.timestamp);
        dst.write_slice(&self.payload);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.payload.len()
    }
}

impl<'de> PduDecode<'de> for PlayerMessagePdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let raw_type = src.read_u8();
        let message_type = PlayerMessageType::from_u8(raw_type)
            .ok_or_else(|| unsupported_value_err!(Self::NAME, "messageType", raw_type.to_string()))?;
        let timestamp = src.read_u64();
        let payload = src.read_remaining().to_vec();

        Ok(Self {
            message_type,
            timestamp,
            payload,
        })
    }
}

/// Dispatches player messages to one hook per message type.
///
/// The default hooks fail with `NotImplemented`; implementors override the
/// messages they handle. An unknown message type is a recoverable error: the
/// caller reports it once and drops the message.
pub trait PlayerMessageVisitor {
    fn on_connection_close(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_client_info(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_slow_path_pdu(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_input(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_output(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_clipboard_data(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    fn on_client_data(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        Err(VisitError::NotImplemented)
    }

    /// Routes a message to the hook mapped to its type.
    fn visit(&mut self, pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
        match pdu.message_type {
            PlayerMessageType::ConnectionClose => self.on_connection_close(pdu),
            PlayerMessageType::ClientInfo => self.on_client_info(pdu),
            PlayerMessageType::SlowPathPdu => self.on_slow_path_pdu(pdu),
            PlayerMessageType::FastPathInput => self.on_input(pdu),
            PlayerMessageType::FastPathOutput => self.on_output(pdu),
            PlayerMessageType::ClipboardData => self.on_clipboard_data(pdu),
            PlayerMessageType::ClientData => self.on_client_data(pdu),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum VisitError {
    NotImplemented,
}

impl core::fmt::Display for VisitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotImplemented => f.write_str("hook not implemented"),
        }
    }
}

impl std::error::Error for VisitError {}

/// A destination for recording frames.
pub trait RecordingSink: Send {
    fn sink_name(&self) -> &str;

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Appends frames to a file as a plain concatenation; the replayer re-splits
/// the stream with the per-type payload parsers.
pub struct FileSink {
    name: String,
    writer: BufWriter<std::fs::File>,
}

impl FileSink {
    pub fn create(path: &std::path::Path) -> io::Result<Self> {
        let file = std::fs::File::create(path)?;

        Ok(Self {
            name: path.display().to_string(),
            writer: BufWriter::new(file),
        })
    }
}

impl RecordingSink for FileSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()
    }
}

/// Broadcasts recorded events to all sinks; a failing sink is closed and
/// dropped without affecting the others or the session.
pub struct Recorder {
    sinks: Vec<Box<dyn RecordingSink>>,
}

impl Recorder {
    pub fn new(sinks: Vec<Box<dyn RecordingSink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Frames and broadcasts one event.
    pub fn record(&mut self, message_type: PlayerMessageType, payload: &[u8]) {
        let pdu = PlayerMessagePdu {
            message_type,
            timestamp: current_timestamp_ms(),
            payload: payload.to_vec(),
        };

        let frame = match rdpspy_pdu::encode_vec(&pdu) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode a player message, event dropped");
                return;
            }
        };

        self.sinks.retain_mut(|sink| match sink.write_frame(&frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(sink = sink.sink_name(), error = %e, "recording sink failed, closing it");
                false
            }
        });
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct SharedVecSink {
        pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
        pub fail: Arc<Mutex<bool>>,
    }

    impl RecordingSink for SharedVecSink {
        fn sink_name(&self) -> &str {
            "test"
        }

        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(io::Error::other("sink failure"));
            }

            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn frames_parse_back_to_the_recorded_sequence() {
        let sink = SharedVecSink::default();
        let mut recorder = Recorder::new(vec![Box::new(sink.clone())]);

        recorder.record(PlayerMessageType::ClientData, b"client data");
        recorder.record(PlayerMessageType::SlowPathPdu, b"pdu");
        recorder.record(PlayerMessageType::ConnectionClose, b"");

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 3);

        let mut last_timestamp = 0;
        let expected = [
            (PlayerMessageType::ClientData, b"client data".as_slice()),
            (PlayerMessageType::SlowPathPdu, b"pdu".as_slice()),
            (PlayerMessageType::ConnectionClose, b"".as_slice()),
        ];

        for (frame, (expected_type, expected_payload)) in frames.iter().zip(expected) {
            let pdu: PlayerMessagePdu = rdpspy_pdu::decode(frame).unwrap();
            assert_eq!(pdu.message_type, expected_type);
            assert_eq!(pdu.payload, expected_payload);
            assert!(pdu.timestamp >= last_timestamp);
            last_timestamp = pdu.timestamp;
        }
    }

    #[test]
    fn failing_sink_is_dropped_but_others_continue() {
        let healthy = SharedVecSink::default();
        let failing = SharedVecSink::default();
        *failing.fail.lock().unwrap() = true;

        let mut recorder = Recorder::new(vec![Box::new(failing), Box::new(healthy.clone())]);
        assert_eq!(recorder.sink_count(), 2);

        recorder.record(PlayerMessageType::ClientInfo, b"secret");

        assert_eq!(recorder.sink_count(), 1);
        assert_eq!(healthy.frames.lock().unwrap().len(), 1);

        recorder.record(PlayerMessageType::ConnectionClose, b"");
        assert_eq!(healthy.frames.lock().unwrap().len(), 2);
    }

    struct CloseCounter {
        closes: usize,
    }

    impl PlayerMessageVisitor for CloseCounter {
        fn on_connection_close(&mut self, _pdu: &PlayerMessagePdu) -> Result<(), VisitError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn visitor_routes_to_the_mapped_hook_only() {
        let mut visitor = CloseCounter { closes: 0 };

        let close = PlayerMessagePdu {
            message_type: PlayerMessageType::ConnectionClose,
            timestamp: 1,
            payload: Vec::new(),
        };
        let info = PlayerMessagePdu {
            message_type: PlayerMessageType::ClientInfo,
            timestamp: 2,
            payload: Vec::new(),
        };

        assert_eq!(visitor.visit(&close), Ok(()));
        assert_eq!(visitor.visit(&info), Err(VisitError::NotImplemented));
        assert_eq!(visitor.closes, 1);
    }

    #[test]
    fn unknown_message_type_fails_to_decode() {
        let mut frame = vec![0x2Au8]; // not a known message type
        frame.extend_from_slice(&0u64.to_le_bytes());

        assert!(rdpspy_pdu::decode::<PlayerMessagePdu>(&frame).is_err());
    }
}
