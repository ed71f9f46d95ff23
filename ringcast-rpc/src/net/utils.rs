use std::mem;

use rkyv::{AlignedVec, Archive, Deserialize, Serialize};

use crate::RpcError;

static HEADER_TERMINATOR: &[u8] = b"\r\n";

pub const KIND_SIZE: usize = 1;
pub const META_LEN_SIZE: usize = mem::size_of::<u16>();
pub const DATA_LEN_SIZE: usize = mem::size_of::<u32>();
pub const CHECKSUM_SIZE: usize = mem::size_of::<u32>();
pub const LEN_SIZE: usize = KIND_SIZE + META_LEN_SIZE + DATA_LEN_SIZE + CHECKSUM_SIZE;
pub const HEADER_SIZE: usize = LEN_SIZE + 2;
pub const MESSAGE_KIND_REQUEST: u8 = 0;
pub const MESSAGE_KIND_RESPONSE: u8 = 1;
/// The largest metadata plus payload size accepted in one frame.
pub const MAX_FRAME_SIZE: usize = 64 << 20;

const META_SCRATCH_SPACE: usize = 256;
/// The longest error string a response can carry, leaving room for the rest
/// of the metadata within the u16 length field.
pub const MAX_ERROR_LEN: usize = u16::MAX as usize - 64;

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// Metadata sent ahead of the call arguments.
pub(crate) struct RequestMetadata {
    /// Matches the response to the request.
    pub(crate) seq: u64,
    /// The method being called.
    pub(crate) method: String,
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// Metadata sent ahead of the reply.
pub(crate) struct ResponseMetadata {
    /// The sequence number of the request being answered.
    pub(crate) seq: u64,
    /// Empty on success, otherwise the handler's error string.
    pub(crate) error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) kind: MessageKind,
    pub(crate) meta_len: usize,
    pub(crate) data_len: usize,
    pub(crate) checksum: u32,
}

/// Parses a frame header.
pub(crate) fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<FrameHeader, RpcError> {
    if &header[LEN_SIZE..] != HEADER_TERMINATOR {
        return Err(RpcError::Protocol("invalid header terminator".to_string()));
    }

    let kind = match header[0] {
        MESSAGE_KIND_REQUEST => MessageKind::Request,
        MESSAGE_KIND_RESPONSE => MessageKind::Response,
        other => {
            return Err(RpcError::Protocol(format!("unknown message kind {other}")))
        },
    };

    let mut cursor = KIND_SIZE;
    let meta_len =
        u16::from_le_bytes([header[cursor], header[cursor + 1]]) as usize;
    cursor += META_LEN_SIZE;
    let data_len = u32::from_le_bytes([
        header[cursor],
        header[cursor + 1],
        header[cursor + 2],
        header[cursor + 3],
    ]) as usize;
    cursor += DATA_LEN_SIZE;
    let checksum = u32::from_le_bytes([
        header[cursor],
        header[cursor + 1],
        header[cursor + 2],
        header[cursor + 3],
    ]);

    if meta_len + data_len > MAX_FRAME_SIZE {
        return Err(RpcError::Protocol(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
            meta_len + data_len,
        )));
    }

    Ok(FrameHeader {
        kind,
        meta_len,
        data_len,
        checksum,
    })
}

/// Checks the frame body against the checksum carried in its header.
pub(crate) fn verify_checksum(
    header: &FrameHeader,
    meta: &[u8],
    data: &[u8],
) -> Result<(), RpcError> {
    let actual = checksum(meta, data);
    if actual != header.checksum {
        return Err(RpcError::Protocol(format!(
            "checksum mismatch, expected {:#010x} got {actual:#010x}",
            header.checksum,
        )));
    }
    Ok(())
}

fn checksum(meta: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(meta);
    hasher.update(data);
    hasher.finalize()
}

fn serialize_header(
    kind: u8,
    metadata_len: usize,
    data_size: usize,
    checksum: u32,
) -> [u8; HEADER_SIZE] {
    let mut header = [0; HEADER_SIZE];
    let mut cursor = 0;
    header[cursor] = kind;
    cursor += KIND_SIZE;
    header[cursor..cursor + META_LEN_SIZE]
        .copy_from_slice(&(metadata_len as u16).to_le_bytes());
    cursor += META_LEN_SIZE;
    header[cursor..cursor + DATA_LEN_SIZE]
        .copy_from_slice(&(data_size as u32).to_le_bytes());
    cursor += DATA_LEN_SIZE;
    header[cursor..cursor + CHECKSUM_SIZE].copy_from_slice(&checksum.to_le_bytes());
    header[LEN_SIZE..].copy_from_slice(HEADER_TERMINATOR);
    header
}

/// Serializes a complete frame into a buffer.
pub(crate) fn serialize_frame(
    kind: MessageKind,
    metadata: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, RpcError> {
    if metadata.len() > u16::MAX as usize {
        return Err(RpcError::Protocol(format!(
            "metadata of {} bytes does not fit the header",
            metadata.len(),
        )));
    }
    if metadata.len() + data.len() > MAX_FRAME_SIZE {
        return Err(RpcError::Protocol(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
            metadata.len() + data.len(),
        )));
    }

    let kind = match kind {
        MessageKind::Request => MESSAGE_KIND_REQUEST,
        MessageKind::Response => MESSAGE_KIND_RESPONSE,
    };
    let header =
        serialize_header(kind, metadata.len(), data.len(), checksum(metadata, data));

    let mut buffer = Vec::with_capacity(HEADER_SIZE + metadata.len() + data.len());
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(metadata);
    buffer.extend_from_slice(data);

    Ok(buffer)
}

/// Cuts an error string down to [MAX_ERROR_LEN] bytes on a char boundary.
pub(crate) fn truncate_error(mut error: String) -> String {
    if error.len() <= MAX_ERROR_LEN {
        return error;
    }

    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error.truncate(end);
    error
}

pub(crate) fn encode_request_metadata(
    metadata: &RequestMetadata,
) -> Result<AlignedVec, RpcError> {
    rkyv::to_bytes::<_, META_SCRATCH_SPACE>(metadata)
        .map_err(|e| RpcError::Protocol(format!("failed to encode metadata: {e}")))
}

pub(crate) fn encode_response_metadata(
    metadata: &ResponseMetadata,
) -> Result<AlignedVec, RpcError> {
    rkyv::to_bytes::<_, META_SCRATCH_SPACE>(metadata)
        .map_err(|e| RpcError::Protocol(format!("failed to encode metadata: {e}")))
}

pub(crate) fn decode_request_metadata(buf: &[u8]) -> Result<RequestMetadata, RpcError> {
    let aligned = align(buf);
    rkyv::from_bytes::<RequestMetadata>(&aligned)
        .map_err(|e| RpcError::Protocol(format!("invalid request metadata: {e}")))
}

pub(crate) fn decode_response_metadata(
    buf: &[u8],
) -> Result<ResponseMetadata, RpcError> {
    let aligned = align(buf);
    rkyv::from_bytes::<ResponseMetadata>(&aligned)
        .map_err(|e| RpcError::Protocol(format!("invalid response metadata: {e}")))
}

fn align(buf: &[u8]) -> AlignedVec {
    let mut aligned = AlignedVec::with_capacity(buf.len());
    aligned.extend_from_slice(buf);
    aligned
}
