//! Protocol constants for the thin-client binary protocol.

use std::fmt;

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Default upper bound for a single frame payload (64 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Size of the request id that leads every request and response payload.
pub const REQUEST_ID_SIZE: usize = 8;

/// Size of the request header: request id + opcode.
pub const REQUEST_HEADER_SIZE: usize = REQUEST_ID_SIZE + 2;

/// Size of the fixed response header: request id + status + flags.
pub const RESPONSE_HEADER_SIZE: usize = REQUEST_ID_SIZE + 4 + 2;

/// Response status for a successfully processed request.
pub const STATUS_SUCCESS: i32 = 0;

/// Generic server failure status.
pub const STATUS_FAILED: i32 = 1;

/// Status returned when the addressed cache does not exist.
pub const STATUS_CACHE_DOES_NOT_EXIST: i32 = 1000;

/// Status returned for an opcode the server does not understand.
pub const STATUS_INVALID_OP_CODE: i32 = 2;

/// Response flag: a topology version and endpoint list follow the header.
pub const FLAG_TOPOLOGY_CHANGED: u16 = 1 << 0;

/// First byte of a handshake request.
pub const HANDSHAKE_CODE: u8 = 1;

/// Client type written in the handshake.
pub const THIN_CLIENT_TYPE: u8 = 2;

/// Flags byte sent after the cache id when no special mode is requested.
pub const CACHE_FLAGS_NONE: u8 = 0;

/// Request operation codes.
///
/// The set is closed; decoding an unlisted code fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OpCode {
    /// Releases a server-side resource.
    ResourceClose = 0,
    /// Keep-alive ping.
    Heartbeat = 1,
    /// Reads one key.
    CacheGet = 1000,
    /// Writes one key.
    CachePut = 1001,
    /// Writes one key if absent.
    CachePutIfAbsent = 1002,
    /// Reads several keys.
    CacheGetAll = 1003,
    /// Writes several keys.
    CachePutAll = 1004,
    /// Writes one key and returns the previous value.
    CacheGetAndPut = 1005,
    /// Removes one key and returns the previous value.
    CacheGetAndRemove = 1007,
    /// Replaces the value of an existing key.
    CacheReplace = 1009,
    /// Checks for a key.
    CacheContainsKey = 1011,
    /// Removes every entry.
    CacheClear = 1013,
    /// Removes one key.
    CacheRemoveKey = 1016,
    /// Counts entries.
    CacheGetSize = 1020,
    /// Lists cache names.
    CacheGetNames = 1050,
    /// Creates a cache unless it exists.
    CacheGetOrCreateWithName = 1052,
    /// Destroys a cache.
    CacheDestroy = 1056,
    /// Scans every entry of a cache.
    QueryScan = 2000,
}

impl OpCode {
    /// Maps a wire code to an opcode.
    pub fn from_code(code: u16) -> Option<Self> {
        let op = match code {
            0 => Self::ResourceClose,
            1 => Self::Heartbeat,
            1000 => Self::CacheGet,
            1001 => Self::CachePut,
            1002 => Self::CachePutIfAbsent,
            1003 => Self::CacheGetAll,
            1004 => Self::CachePutAll,
            1005 => Self::CacheGetAndPut,
            1007 => Self::CacheGetAndRemove,
            1009 => Self::CacheReplace,
            1011 => Self::CacheContainsKey,
            1013 => Self::CacheClear,
            1016 => Self::CacheRemoveKey,
            1020 => Self::CacheGetSize,
            1050 => Self::CacheGetNames,
            1052 => Self::CacheGetOrCreateWithName,
            1056 => Self::CacheDestroy,
            2000 => Self::QueryScan,
            _ => return None,
        };
        Some(op)
    }

    /// Returns the wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns `true` if applying the request twice has the same effect as
    /// applying it once, so it may be replayed on another endpoint after the
    /// first attempt was written.
    pub fn is_idempotent(self) -> bool {
        match self {
            Self::Heartbeat
            | Self::CacheGet
            | Self::CacheGetAll
            | Self::CacheContainsKey
            | Self::CacheGetSize
            | Self::CacheGetNames
            | Self::QueryScan
            | Self::CachePut
            | Self::CachePutAll
            | Self::CacheClear
            | Self::CacheGetOrCreateWithName => true,
            Self::ResourceClose
            | Self::CachePutIfAbsent
            | Self::CacheGetAndPut
            | Self::CacheGetAndRemove
            | Self::CacheReplace
            | Self::CacheRemoveKey
            | Self::CacheDestroy => false,
        }
    }

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ResourceClose => "RESOURCE_CLOSE",
            Self::Heartbeat => "HEARTBEAT",
            Self::CacheGet => "CACHE_GET",
            Self::CachePut => "CACHE_PUT",
            Self::CachePutIfAbsent => "CACHE_PUT_IF_ABSENT",
            Self::CacheGetAll => "CACHE_GET_ALL",
            Self::CachePutAll => "CACHE_PUT_ALL",
            Self::CacheGetAndPut => "CACHE_GET_AND_PUT",
            Self::CacheGetAndRemove => "CACHE_GET_AND_REMOVE",
            Self::CacheReplace => "CACHE_REPLACE",
            Self::CacheContainsKey => "CACHE_CONTAINS_KEY",
            Self::CacheClear => "CACHE_CLEAR",
            Self::CacheRemoveKey => "CACHE_REMOVE_KEY",
            Self::CacheGetSize => "CACHE_GET_SIZE",
            Self::CacheGetNames => "CACHE_GET_NAMES",
            Self::CacheGetOrCreateWithName => "CACHE_GET_OR_CREATE_WITH_NAME",
            Self::CacheDestroy => "CACHE_DESTROY",
            Self::QueryScan => "QUERY_SCAN",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}
