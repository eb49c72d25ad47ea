//! Device I/O PDU bodies, the part of MS-RDPEFS the file stealer inspects.

use bitflags::bitflags;
use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::utils::from_utf16_bytes;
use rdpspy_pdu::{cast_length, ensure_size, invalid_message_err, PduDecode, PduEncode, PduResult};

/// Wire layout shared by the announce request/reply and clientid confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionAndIdPdu {
    pub version_major: u16,
    pub version_minor: u16,
    pub client_id: u32,
}

impl VersionAndIdPdu {
    const NAME: &'static str = "VersionAndIdPdu";

    const FIXED_PART_SIZE: usize = 2 + 2 + 4;

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: Self::FIXED_PART_SIZE);

        dst.write_u16(self.version_major);
        dst.write_u16(self.version_minor);
        dst.write_u32(self.client_id);
        Ok(())
    }

    pub(crate) fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for VersionAndIdPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        Ok(Self {
            version_major: src.read_u16(),
            version_minor: src.read_u16(),
            client_id: src.read_u32(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCapabilityKind {
    /// [2.2.2.7 Server Core Capability Request (DR_CORE_CAPABILITY_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/702789c3-b924-4bc2-9280-3221bc7d6797)
    ServerCoreCapabilityRequest,
    /// [2.2.2.8 Client Core Capability Response (DR_CORE_CAPABILITY_RSP)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/f513bf87-cca0-488a-b0d6-7631087f7e4b)
    ClientCoreCapabilityResponse,
}

/// Capability exchange PDU; the individual capability sets are opaque to the
/// proxy and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreCapability {
    pub kind: CoreCapabilityKind,
    pub payload: Vec<u8>,
}

impl CoreCapability {
    pub(crate) fn decode_with_kind(src: &mut ReadCursor<'_>, kind: CoreCapabilityKind) -> PduResult<Self> {
        Ok(Self {
            kind,
            payload: src.read_remaining().to_vec(),
        })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: self.name(), in: dst, size: self.payload.len());
        dst.write_slice(&self.payload);
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        match self.kind {
            CoreCapabilityKind::ServerCoreCapabilityRequest => "ServerCoreCapabilityRequest",
            CoreCapabilityKind::ClientCoreCapabilityResponse => "ClientCoreCapabilityResponse",
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.payload.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceType(pub u32);

impl DeviceType {
    pub const SERIAL: Self = Self(0x0000_0001);
    pub const PARALLEL: Self = Self(0x0000_0002);
    pub const PRINT: Self = Self(0x0000_0004);
    pub const FILESYSTEM: Self = Self(0x0000_0008);
    pub const SMARTCARD: Self = Self(0x0000_0020);

    pub fn description(self) -> &'static str {
        match self {
            Self::SERIAL => "serial port",
            Self::PARALLEL => "parallel port",
            Self::PRINT => "printer",
            Self::FILESYSTEM => "filesystem",
            Self::SMARTCARD => "smartcard",
            _ => "unknown device",
        }
    }
}

/// DEVICE_ANNOUNCE entry of the client device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAnnounce {
    pub device_type: DeviceType,
    pub device_id: u32,
    pub preferred_dos_name: [u8; 8],
    pub device_data: Vec<u8>,
}

impl DeviceAnnounce {
    const NAME: &'static str = "DEVICE_ANNOUNCE";

    const FIXED_PART_SIZE: usize = 4 + 4 + 8 + 4;

    pub fn dos_name(&self) -> String {
        String::from_utf8_lossy(&self.preferred_dos_name)
            .trim_end_matches('\u{0}')
            .to_owned()
    }
}

impl PduEncode for DeviceAnnounce {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.device_type.0);
        dst.write_u32(self.device_id);
        dst.write_slice(&self.preferred_dos_name);
        dst.write_u32(cast_length!(Self::NAME, "deviceDataLength", self.device_data.len())?);
        dst.write_slice(&self.device_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.device_data.len()
    }
}

impl<'de> PduDecode<'de> for DeviceAnnounce {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let device_type = DeviceType(src.read_u32());
        let device_id = src.read_u32();
        let preferred_dos_name = src.read_array();
        let device_data_length: usize = cast_length!(Self::NAME, "deviceDataLength", src.read_u32())?;

        ensure_size!(ctx: Self::NAME, in: src, size: device_data_length);
        let device_data = src.read_slice(device_data_length).to_vec();

        Ok(Self {
            device_type,
            device_id,
            preferred_dos_name,
            device_data,
        })
    }
}

/// [2.2.2.9 Client Device List Announce Request (DR_CORE_DEVICELIST_ANNOUNCE_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/10ef9ada-cba2-4384-ab60-7b6290ed4a9a)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDeviceListAnnounce {
    pub devices: Vec<DeviceAnnounce>,
}

impl ClientDeviceListAnnounce {
    const NAME: &'static str = "ClientDeviceListAnnounce";

    const FIXED_PART_SIZE: usize = 4 /* deviceCount */;
}

impl PduEncode for ClientDeviceListAnnounce {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(cast_length!(Self::NAME, "deviceCount", self.devices.len())?);

        for device in &self.devices {
            device.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.devices.iter().map(|d| d.size()).sum::<usize>()
    }
}

impl<'de> PduDecode<'de> for ClientDeviceListAnnounce {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let count: usize = cast_length!(Self::NAME, "deviceCount", src.read_u32())?;

        let mut devices = Vec::with_capacity(count);
        for _ in 0..count {
            devices.push(DeviceAnnounce::decode(src)?);
        }

        Ok(Self { devices })
    }
}

/// IRP major function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MajorFunction(pub u32);

impl MajorFunction {
    pub const CREATE: Self = Self(0x0000_0000);
    pub const CLOSE: Self = Self(0x0000_0002);
    pub const READ: Self = Self(0x0000_0003);
    pub const WRITE: Self = Self(0x0000_0004);
    pub const DEVICE_CONTROL: Self = Self(0x0000_000E);
    pub const QUERY_VOLUME_INFORMATION: Self = Self(0x0000_000A);
    pub const SET_VOLUME_INFORMATION: Self = Self(0x0000_000B);
    pub const QUERY_INFORMATION: Self = Self(0x0000_0005);
    pub const SET_INFORMATION: Self = Self(0x0000_0006);
    pub const DIRECTORY_CONTROL: Self = Self(0x0000_000C);
    pub const LOCK_CONTROL: Self = Self(0x0000_0011);

    pub fn description(self) -> &'static str {
        match self {
            Self::CREATE => "IRP_MJ_CREATE",
            Self::CLOSE => "IRP_MJ_CLOSE",
            Self::READ => "IRP_MJ_READ",
            Self::WRITE => "IRP_MJ_WRITE",
            Self::DEVICE_CONTROL => "IRP_MJ_DEVICE_CONTROL",
            Self::QUERY_VOLUME_INFORMATION => "IRP_MJ_QUERY_VOLUME_INFORMATION",
            Self::SET_VOLUME_INFORMATION => "IRP_MJ_SET_VOLUME_INFORMATION",
            Self::QUERY_INFORMATION => "IRP_MJ_QUERY_INFORMATION",
            Self::SET_INFORMATION => "IRP_MJ_SET_INFORMATION",
            Self::DIRECTORY_CONTROL => "IRP_MJ_DIRECTORY_CONTROL",
            Self::LOCK_CONTROL => "IRP_MJ_LOCK_CONTROL",
            _ => "IRP_MJ unknown",
        }
    }
}

/// NTSTATUS carried by device I/O responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: Self = Self(0);

    const SEVERITY_ERROR: u32 = 0b11;

    pub fn severity(self) -> u32 {
        self.0 >> 30
    }

    pub fn is_error(self) -> bool {
        self.severity() == Self::SEVERITY_ERROR
    }
}

bitflags! {
    /// File access rights used in the create request `DesiredAccess` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FileAccess: u32 {
        const FILE_READ_DATA = 0x0000_0001;
        const FILE_WRITE_DATA = 0x0000_0002;
        const FILE_APPEND_DATA = 0x0000_0004;
        const DELETE = 0x0001_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
        // Servers may set any access mask bits
        const _ = !0;
    }
}

bitflags! {
    /// `CreateOptions` field of the create request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CreateOptions: u32 {
        const FILE_DIRECTORY_FILE = 0x0000_0001;
        const FILE_WRITE_THROUGH = 0x0000_0002;
        const FILE_SEQUENTIAL_ONLY = 0x0000_0004;
        const FILE_NON_DIRECTORY_FILE = 0x0000_0040;
        const FILE_DELETE_ON_CLOSE = 0x0000_1000;
        // Servers may set any option bits
        const _ = !0;
    }
}

/// [2.2.1.4 Device I/O Request (DR_DEVICE_IOREQUEST)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/a087ffa8-d0d5-4874-ac7b-0494f63e2d5d)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIoRequest {
    pub device_id: u32,
    pub file_id: u32,
    pub completion_id: u32,
    pub major_function: MajorFunction,
    pub minor_function: u32,
    pub body: DeviceIoRequestBody,
}

impl DeviceIoRequest {
    const NAME: &'static str = "DeviceIoRequest";

    const FIXED_PART_SIZE: usize = 4 * 5;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIoRequestBody {
    Create(DeviceCreateRequest),
    Read(DeviceReadRequest),
    Write(DeviceWriteRequest),
    Close(DeviceCloseRequest),
    Other(Vec<u8>),
}

impl PduEncode for DeviceIoRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.device_id);
        dst.write_u32(self.file_id);
        dst.write_u32(self.completion_id);
        dst.write_u32(self.major_function.0);
        dst.write_u32(self.minor_function);

        match &self.body {
            DeviceIoRequestBody::Create(body) => body.encode(dst),
            DeviceIoRequestBody::Read(body) => body.encode(dst),
            DeviceIoRequestBody::Write(body) => body.encode(dst),
            DeviceIoRequestBody::Close(body) => body.encode(dst),
            DeviceIoRequestBody::Other(data) => {
                dst.write_slice(data);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body_size = match &self.body {
            DeviceIoRequestBody::Create(body) => body.size(),
            DeviceIoRequestBody::Read(body) => body.size(),
            DeviceIoRequestBody::Write(body) => body.size(),
            DeviceIoRequestBody::Close(body) => body.size(),
            DeviceIoRequestBody::Other(data) => data.len(),
        };

        Self::FIXED_PART_SIZE + body_size
    }
}

impl<'de> PduDecode<'de> for DeviceIoRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let device_id = src.read_u32();
        let file_id = src.read_u32();
        let completion_id = src.read_u32();
        let major_function = MajorFunction(src.read_u32());
        let minor_function = src.read_u32();

        let body = match major_function {
            MajorFunction::CREATE => DeviceIoRequestBody::Create(DeviceCreateRequest::decode(src)?),
            MajorFunction::READ => DeviceIoRequestBody::Read(DeviceReadRequest::decode(src)?),
            MajorFunction::WRITE => DeviceIoRequestBody::Write(DeviceWriteRequest::decode(src)?),
            MajorFunction::CLOSE => DeviceIoRequestBody::Close(DeviceCloseRequest::decode(src)?),
            _ => DeviceIoRequestBody::Other(src.read_remaining().to_vec()),
        };

        Ok(Self {
            device_id,
            file_id,
            completion_id,
            major_function,
            minor_function,
            body,
        })
    }
}

/// [2.2.1.4.1 Device Create Request (DR_CREATE_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/5f71f6d2-d9ff-40c2-bdb5-a739447d3c3e)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreateRequest {
    pub desired_access: FileAccess,
    pub allocation_size: u64,
    pub file_attributes: u32,
    pub shared_access: u32,
    pub create_disposition: u32,
    pub create_options: CreateOptions,
    /// UTF-16LE path, null terminator included, as received.
    pub path: Vec<u8>,
}

impl DeviceCreateRequest {
    const NAME: &'static str = "DeviceCreateRequest";

    const FIXED_PART_SIZE: usize = 4 + 8 + 4 + 4 + 4 + 4 + 4;

    /// The redirected path, decoded and trimmed.
    pub fn path_string(&self) -> String {
        from_utf16_bytes(&self.path).trim_end_matches('\u{0}').to_owned()
    }

    pub fn is_read_access(&self) -> bool {
        self.desired_access
            .intersects(FileAccess::GENERIC_READ | FileAccess::FILE_READ_DATA)
    }

    pub fn is_directory(&self) -> bool {
        self.create_options.contains(CreateOptions::FILE_DIRECTORY_FILE)
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.desired_access.bits());
        dst.write_u64(self.allocation_size);
        dst.write_u32(self.file_attributes);
        dst.write_u32(self.shared_access);
        dst.write_u32(self.create_disposition);
        dst.write_u32(self.create_options.bits());
        dst.write_u32(cast_length!(Self::NAME, "pathLength", self.path.len())?);
        dst.write_slice(&self.path);

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.path.len()
    }
}

impl<'de> PduDecode<'de> for DeviceCreateRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let desired_access = FileAccess::from_bits_retain(src.read_u32());
        let allocation_size = src.read_u64();
        let file_attributes = src.read_u32();
        let shared_access = src.read_u32();
        let create_disposition = src.read_u32();
        let create_options = CreateOptions::from_bits_retain(src.read_u32());
        let path_length: usize = cast_length!(Self::NAME, "pathLength", src.read_u32())?;

        ensure_size!(ctx: Self::NAME, in: src, size: path_length);
        let path = src.read_slice(path_length).to_vec();

        Ok(Self {
            desired_access,
            allocation_size,
            file_attributes,
            shared_access,
            create_disposition,
            create_options,
            path,
        })
    }
}

/// [2.2.1.4.3 Device Read Request (DR_READ_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/3192516d-36a6-47c5-987a-55c214aa0441)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReadRequest {
    pub length: u32,
    pub offset: u64,
}

impl DeviceReadRequest {
    const NAME: &'static str = "DeviceReadRequest";

    const FIXED_PART_SIZE: usize = 4 + 8 + 20 /* padding */;

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.length);
        dst.write_u64(self.offset);
        dst.write_slice(&[0u8; 20]); // padding

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for DeviceReadRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let length = src.read_u32();
        let offset = src.read_u64();
        let _padding = src.read_slice(20);

        Ok(Self { length, offset })
    }
}

/// [2.2.1.4.4 Device Write Request (DR_WRITE_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/2e25f0aa-a4ce-4ff3-ad62-ab6098280a3a)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWriteRequest {
    pub offset: u64,
    pub data: Vec<u8>,
}

impl DeviceWriteRequest {
    const NAME: &'static str = "DeviceWriteRequest";

    const FIXED_PART_SIZE: usize = 4 + 8 + 20 /* padding */;

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(cast_length!(Self::NAME, "length", self.data.len())?);
        dst.write_u64(self.offset);
        dst.write_slice(&[0u8; 20]); // padding
        dst.write_slice(&self.data);

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.data.len()
    }
}

impl<'de> PduDecode<'de> for DeviceWriteRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let length: usize = cast_length!(Self::NAME, "length", src.read_u32())?;
        let offset = src.read_u64();
        let _padding = src.read_slice(20);

        ensure_size!(ctx: Self::NAME, in: src, size: length);
        let data = src.read_slice(length).to_vec();

        Ok(Self { offset, data })
    }
}

/// [2.2.1.4.2 Device Close Request (DR_CLOSE_REQ)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/3ec6627f-9e0f-4941-a828-3fc6ed63d9e7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCloseRequest;

impl DeviceCloseRequest {
    const NAME: &'static str = "DeviceCloseRequest";

    const FIXED_PART_SIZE: usize = 32 /* padding */;

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_slice(&[0u8; 32]); // padding
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for DeviceCloseRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        // Some implementations omit the trailing padding entirely.
        let padding = src.len().min(Self::FIXED_PART_SIZE);
        let _ = src.read_slice(padding);

        Ok(Self)
    }
}

/// [2.2.1.5 Device I/O Response (DR_DEVICE_IOCOMPLETION)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/1c412a84-0776-4984-b35c-3f0445fcae65)
///
/// The response body layout depends on the request it answers, which only the
/// correlation table knows; it is therefore carried raw and re-parsed with
/// [`DeviceCreateResponse::from_body`] / [`DeviceReadResponse::from_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIoResponse {
    pub device_id: u32,
    pub completion_id: u32,
    pub io_status: NtStatus,
    pub body: Vec<u8>,
}

impl DeviceIoResponse {
    const NAME: &'static str = "DeviceIoResponse";

    const FIXED_PART_SIZE: usize = 4 * 3;
}

impl PduEncode for DeviceIoResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.device_id);
        dst.write_u32(self.completion_id);
        dst.write_u32(self.io_status.0);
        dst.write_slice(&self.body);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.body.len()
    }
}

impl<'de> PduDecode<'de> for DeviceIoResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let device_id = src.read_u32();
        let completion_id = src.read_u32();
        let io_status = NtStatus(src.read_u32());
        let body = src.read_remaining().to_vec();

        Ok(Self {
            device_id,
            completion_id,
            io_status,
            body,
        })
    }
}

/// [2.2.1.5.1 Device Create Response (DR_CREATE_RSP)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/99e5fca5-b37a-41e4-bc69-8d7da7860f76)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCreateResponse {
    pub file_id: u32,
    pub information: u8,
}

impl DeviceCreateResponse {
    const NAME: &'static str = "DeviceCreateResponse";

    pub fn from_body(body: &[u8]) -> PduResult<Self> {
        let mut src = ReadCursor::new(body);

        ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let file_id = src.read_u32();
        // The Information byte is optional on the wire.
        let information = if src.is_empty() { 0 } else { src.read_u8() };

        Ok(Self { file_id, information })
    }
}

/// [2.2.1.5.3 Device Read Response (DR_READ_RSP)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/d35d3f91-fc5b-492b-80be-47f483ad1dc9)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReadResponse {
    pub data: Vec<u8>,
}

impl DeviceReadResponse {
    const NAME: &'static str = "DeviceReadResponse";

    pub fn from_body(body: &[u8]) -> PduResult<Self> {
        let mut src = ReadCursor::new(body);

        ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let length: usize = cast_length!(Self::NAME, "length", src.read_u32())?;

        if src.len() < length {
            return Err(invalid_message_err!(
                Self::NAME,
                "length",
                "read data shorter than advertised"
            ));
        }
        let data = src.read_slice(length).to_vec();

        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::RdpdrPdu;
    use rdpspy_pdu::utils::to_utf16_bytes;
    use rdpspy_pdu::{decode, encode_vec};

    fn utf16_path(path: &str) -> Vec<u8> {
        let mut bytes = to_utf16_bytes(path);
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    #[test]
    fn create_request_round_trips() {
        let pdu = RdpdrPdu::DeviceIoRequest(DeviceIoRequest {
            device_id: 1,
            file_id: 0,
            completion_id: 42,
            major_function: MajorFunction::CREATE,
            minor_function: 0,
            body: DeviceIoRequestBody::Create(DeviceCreateRequest {
                desired_access: FileAccess::GENERIC_READ,
                allocation_size: 0,
                file_attributes: 0,
                shared_access: 7,
                create_disposition: 1,
                create_options: CreateOptions::FILE_NON_DIRECTORY_FILE,
                path: utf16_path("\\foo.txt"),
            }),
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded: RdpdrPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);

        match decoded {
            RdpdrPdu::DeviceIoRequest(DeviceIoRequest {
                body: DeviceIoRequestBody::Create(create),
                ..
            }) => {
                assert_eq!(create.path_string(), "\\foo.txt");
                assert!(create.is_read_access());
                assert!(!create.is_directory());
            }
            other => panic!("unexpected pdu: {other:?}"),
        }
    }

    #[test]
    fn read_request_round_trips() {
        let pdu = RdpdrPdu::DeviceIoRequest(DeviceIoRequest {
            device_id: 1,
            file_id: 3,
            completion_id: 43,
            major_function: MajorFunction::READ,
            minor_function: 0,
            body: DeviceIoRequestBody::Read(DeviceReadRequest {
                length: 2048,
                offset: 4096,
            }),
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: RdpdrPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn io_response_body_is_reparsed_by_request_kind() {
        let response = RdpdrPdu::DeviceIoResponse(DeviceIoResponse {
            device_id: 1,
            completion_id: 42,
            io_status: NtStatus::SUCCESS,
            body: vec![0x03, 0x00, 0x00, 0x00, 0x01],
        });

        let encoded = encode_vec(&response).unwrap();
        let decoded: RdpdrPdu = decode(&encoded).unwrap();

        match decoded {
            RdpdrPdu::DeviceIoResponse(response) => {
                assert!(!response.io_status.is_error());
                let create = DeviceCreateResponse::from_body(&response.body).unwrap();
                assert_eq!(create.file_id, 3);
                assert_eq!(create.information, 1);
            }
            other => panic!("unexpected pdu: {other:?}"),
        }
    }

    #[test]
    fn error_status_is_detected() {
        const STATUS_ACCESS_DENIED: u32 = 0xC000_0022;
        assert!(NtStatus(STATUS_ACCESS_DENIED).is_error());
        assert!(!NtStatus::SUCCESS.is_error());
    }

    #[test]
    fn read_response_parses_length_prefixed_data() {
        let mut body = 5u32.to_le_bytes().to_vec();
        body.extend_from_slice(b"hello");

        let read = DeviceReadResponse::from_body(&body).unwrap();
        assert_eq!(read.data, b"hello");
    }

    #[test]
    fn device_list_announce_round_trips() {
        let pdu = RdpdrPdu::ClientDeviceListAnnounce(ClientDeviceListAnnounce {
            devices: vec![DeviceAnnounce {
                device_type: DeviceType::FILESYSTEM,
                device_id: 1,
                preferred_dos_name: *b"C\0\0\0\0\0\0\0",
                device_data: b"C\0".to_vec(),
            }],
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: RdpdrPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
