// iRacing SDK shared-memory snapshot decoder.
// Invariants: operates on a copied byte buffer only; truncated or inconsistent layouts decode to None.

use std::collections::HashMap;

use crate::source::TelemetrySource;
use crate::value::Value;

pub const HEADER_LEN: usize = 112;
pub const VAR_HEADER_LEN: usize = 144;
pub const MAX_BUFS: usize = 4;
pub const MAX_VARS: usize = 4096;
pub const STATUS_CONNECTED: i32 = 0x1;

const VAR_BUF_OFFSET: usize = 48;
const VAR_BUF_LEN: usize = 16;
const NAME_OFFSET: usize = 16;
const NAME_LEN: usize = 32;

const TYPE_CHAR: i32 = 0;
const TYPE_BOOL: i32 = 1;
const TYPE_INT: i32 = 2;
const TYPE_BITFIELD: i32 = 3;
const TYPE_FLOAT: i32 = 4;
const TYPE_DOUBLE: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarBuf {
    pub tick_count: i32,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub status: i32,
    pub tick_rate: i32,
    pub session_info_update: i32,
    pub session_info_len: usize,
    pub session_info_offset: usize,
    pub num_vars: usize,
    pub var_header_offset: usize,
    pub buf_len: usize,
    pub buffers: Vec<VarBuf>,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Option<Header> {
        let num_buf = read_usize(bytes, 32)?;
        if num_buf == 0 || num_buf > MAX_BUFS {
            return None;
        }
        let num_vars = read_usize(bytes, 24)?;
        if num_vars > MAX_VARS {
            return None;
        }
        let mut buffers = Vec::with_capacity(num_buf);
        for index in 0..num_buf {
            let base = VAR_BUF_OFFSET + index * VAR_BUF_LEN;
            buffers.push(VarBuf {
                tick_count: read_i32(bytes, base)?,
                offset: read_usize(bytes, base + 4)?,
            });
        }

        Some(Header {
            version: read_i32(bytes, 0)?,
            status: read_i32(bytes, 4)?,
            tick_rate: read_i32(bytes, 8)?,
            session_info_update: read_i32(bytes, 12)?,
            session_info_len: read_usize(bytes, 16)?,
            session_info_offset: read_usize(bytes, 20)?,
            num_vars,
            var_header_offset: read_usize(bytes, 28)?,
            buf_len: read_usize(bytes, 36)?,
            buffers,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.status & STATUS_CONNECTED != 0
    }

    pub fn latest_buffer(&self) -> Option<VarBuf> {
        self.buffers.iter().copied().max_by_key(|buf| buf.tick_count)
    }

    /// Number of leading bytes a copy must cover to decode every variable.
    pub fn required_len(&self) -> usize {
        let headers_end = self.var_header_offset + self.num_vars * VAR_HEADER_LEN;
        let buffers_end = self
            .buffers
            .iter()
            .map(|buf| buf.offset + self.buf_len)
            .max()
            .unwrap_or(0);
        HEADER_LEN.max(headers_end).max(buffers_end)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub header: Header,
    pub tick_count: i32,
    pub values: HashMap<String, Value>,
}

impl Snapshot {
    pub fn decode(bytes: &[u8]) -> Option<Snapshot> {
        let header = Header::parse(bytes)?;
        let latest = header.latest_buffer()?;
        let data = bytes.get(latest.offset..latest.offset.checked_add(header.buf_len)?)?;

        let mut values = HashMap::with_capacity(header.num_vars);
        for index in 0..header.num_vars {
            let base = header.var_header_offset + index * VAR_HEADER_LEN;
            let var_header = bytes.get(base..base + VAR_HEADER_LEN)?;
            let var_type = read_i32(var_header, 0)?;
            let offset = read_usize(var_header, 4)?;
            let count = read_usize(var_header, 8)?;
            let name = read_cstr(var_header, NAME_OFFSET, NAME_LEN)?;
            if let Some(value) = data.get(offset..).and_then(|raw| decode_var(raw, var_type, count)) {
                values.insert(name, value);
            }
        }

        Some(Snapshot {
            tick_count: latest.tick_count,
            header,
            values,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.header.is_connected()
    }
}

impl TelemetrySource for Snapshot {
    fn is_ready(&self) -> bool {
        self.is_connected()
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Copies the bytes a decode needs out of a live view into `buffer`. Fails
/// when the view is shorter than the layout its own header describes.
pub fn copy_image(view: &[u8], buffer: &mut Vec<u8>) -> bool {
    let Some(header) = view.get(..HEADER_LEN).and_then(Header::parse) else {
        return false;
    };
    let Some(image) = view.get(..header.required_len()) else {
        return false;
    };
    buffer.clear();
    buffer.extend_from_slice(image);
    true
}

fn decode_var(raw: &[u8], var_type: i32, count: usize) -> Option<Value> {
    if count == 0 {
        return None;
    }
    if var_type == TYPE_CHAR {
        return read_cstr(raw, 0, count).map(Value::Text);
    }
    let width = match var_type {
        TYPE_BOOL => 1,
        TYPE_INT | TYPE_BITFIELD | TYPE_FLOAT => 4,
        TYPE_DOUBLE => 8,
        _ => return None,
    };
    let decode_one = |offset: usize| -> Option<Value> {
        match var_type {
            TYPE_BOOL => read_u8(raw, offset).map(|value| Value::Bool(value != 0)),
            TYPE_INT => read_i32(raw, offset).map(Value::Int),
            TYPE_BITFIELD => read_u32(raw, offset).map(Value::Bitfield),
            TYPE_FLOAT => read_f32(raw, offset).map(Value::Float),
            TYPE_DOUBLE => read_f64(raw, offset).map(Value::Double),
            _ => None,
        }
    };
    if count == 1 {
        return decode_one(0);
    }
    (0..count)
        .map(|index| decode_one(index * width))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}

fn read_u8(payload: &[u8], offset: usize) -> Option<u8> {
    payload.get(offset).copied()
}

fn read_i32(payload: &[u8], offset: usize) -> Option<i32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(i32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u32(payload: &[u8], offset: usize) -> Option<u32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_usize(payload: &[u8], offset: usize) -> Option<usize> {
    read_i32(payload, offset).and_then(|value| usize::try_from(value).ok())
}

fn read_f32(payload: &[u8], offset: usize) -> Option<f32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(f32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_f64(payload: &[u8], offset: usize) -> Option<f64> {
    let bytes = payload.get(offset..offset + 8)?;
    Some(f64::from_le_bytes(bytes.try_into().ok()?))
}

fn read_cstr(payload: &[u8], offset: usize, len: usize) -> Option<String> {
    let bytes = payload.get(offset..offset + len)?;
    let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}
