/// Default capacity of the buffered reader wrapped around every byte source (64KB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 65536;

/// Default upper bound for the declared total length of a single pcapng block (16MB).
pub const DEFAULT_MAX_BLOCK_LEN: u32 = 16 * 1024 * 1024;

/// The tcpdump default snapshot length (2^18). Payload buffers are pre-sized to at most this,
/// larger packets grow the buffer as their bytes arrive.
pub(crate) const MAX_PREALLOC: usize = 262144;

/// Tunables shared by both decoders.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReaderConfig {
    /// Capacity of the `BufReader` placed in front of the byte source.
    pub buffer_capacity: usize,

    /// Buffered pcapng blocks declaring a larger total length are rejected as malformed.
    /// Skipped blocks are not bounded.
    pub max_block_len: u32,
}

impl ReaderConfig {
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_max_block_len(mut self, max_block_len: u32) -> Self {
        self.max_block_len = max_block_len;
        self
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_block_len: DEFAULT_MAX_BLOCK_LEN,
        }
    }
}

pub(crate) fn prealloc_len(snaplen: u32) -> usize {
    (snaplen as usize).min(MAX_PREALLOC)
}
