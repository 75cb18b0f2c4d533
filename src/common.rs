use chrono::{
    DateTime,
    Utc,
};
use std::{
    fmt,
    io::{
        BufRead,
        Error as IoError,
        ErrorKind,
        Read,
        Result as IoResult,
    },
};
use thiserror::Error;

/// A specialized result for capture decoding that uses the pcap error type.
pub type PcapResult<T> = Result<T, PcapError>;

/// Enumeration of all the possible errors that can occur when decoding capture data.
///
/// End of stream is not an error: [`crate::Traffic::next_packet`] reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum PcapError {
    /// The file extension selects neither the pcap nor the pcapng decoder.
    #[error("unknown file extension, expected .pcap or .pcapng")]
    UnknownExtension,

    /// Structural violation of either format (bad magic, bad lengths, truncated records).
    #[error("malformed capture: {0}")]
    MalformedInput(&'static str),

    /// The input holds no bytes at all.
    #[error("capture is empty")]
    Empty,

    /// Classic pcap version other than 2.4.
    #[error("unsupported pcap version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// The traffic source was stopped, either explicitly or by a terminal outcome.
    #[error("the traffic source has already been stopped")]
    AlreadyStopped,

    /// Underlying IO error.
    #[error("io error: {0}")]
    Io(#[source] IoError),
}

impl From<IoError> for PcapError {
    fn from(e: IoError) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => Self::MalformedInput("truncated input"),
            _ => Self::Io(e),
        }
    }
}

/// Timestamp resolution of classic pcap record headers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TsResolution {
    /// Microsecond resolution.
    MicroSecond,
    /// Nanosecond resolution.
    NanoSecond,
}

impl TsResolution {
    /// Multiplier turning the record's sub-second field into nanoseconds.
    pub fn nanos_factor(self) -> u64 {
        match self {
            TsResolution::MicroSecond => 1000,
            TsResolution::NanoSecond => 1,
        }
    }
}

/// Byte order of the capture metadata.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Endianness {
    /// Big endian.
    Big,
    /// Little endian.
    Little,
}

#[inline]
fn array_at<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&buf[offset..offset + N]);
    bytes
}

impl Endianness {
    #[inline]
    pub(crate) fn u16_at(self, buf: &[u8], offset: usize) -> u16 {
        let bytes = array_at(buf, offset);
        match self {
            Endianness::Big => u16::from_be_bytes(bytes),
            Endianness::Little => u16::from_le_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn u32_at(self, buf: &[u8], offset: usize) -> u32 {
        let bytes = array_at(buf, offset);
        match self {
            Endianness::Big => u32::from_be_bytes(bytes),
            Endianness::Little => u32::from_le_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn i32_at(self, buf: &[u8], offset: usize) -> i32 {
        self.u32_at(buf, offset) as i32
    }

    #[inline]
    pub(crate) fn u64_at(self, buf: &[u8], offset: usize) -> u64 {
        let bytes = array_at(buf, offset);
        match self {
            Endianness::Big => u64::from_be_bytes(bytes),
            Endianness::Little => u64::from_le_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn i64_at(self, buf: &[u8], offset: usize) -> i64 {
        self.u64_at(buf, offset) as i64
    }
}

/// A transparent wrapper around a `std::io::Read` implementation that implements the `ReadEndian`
/// trait for big endian data.
#[derive(Debug)]
#[repr(transparent)]
pub(crate) struct BigEndianReader<R>(R)
where
    R: Read;

impl<R> From<R> for BigEndianReader<R>
where
    R: Read,
{
    fn from(r: R) -> Self {
        Self(r)
    }
}

impl<R> Read for BigEndianReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

/// A transparent wrapper around a `std::io::Read` implementation that implements the `ReadEndian`
/// trait for little endian data.
#[derive(Debug)]
#[repr(transparent)]
pub(crate) struct LittleEndianReader<R>(R)
where
    R: Read;

impl<R> From<R> for LittleEndianReader<R>
where
    R: Read,
{
    fn from(r: R) -> Self {
        Self(r)
    }
}

impl<R> Read for LittleEndianReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

/// A trait that encapsulates reading the types (u32, i32, u16) in an endian specific way.
/// Implemented by `BigEndianReader` and `LittleEndianReader`.
pub(crate) trait ReadEndian: Read {
    fn read_u32(&mut self) -> PcapResult<u32>;
    fn read_i32(&mut self) -> PcapResult<i32>;
    fn read_u16(&mut self) -> PcapResult<u16>;
    fn endianness(&self) -> Endianness;
}

impl<R> ReadEndian for LittleEndianReader<R>
where
    R: Read,
{
    #[inline]
    fn read_u32(&mut self) -> PcapResult<u32> {
        let mut bytes = [0u8; 4];
        self.0.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    #[inline]
    fn read_i32(&mut self) -> PcapResult<i32> {
        let mut bytes = [0u8; 4];
        self.0.read_exact(&mut bytes)?;
        Ok(i32::from_le_bytes(bytes))
    }

    #[inline]
    fn read_u16(&mut self) -> PcapResult<u16> {
        let mut bytes = [0u8; 2];
        self.0.read_exact(&mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    #[inline]
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }
}

impl<R> ReadEndian for BigEndianReader<R>
where
    R: Read,
{
    #[inline]
    fn read_u32(&mut self) -> PcapResult<u32> {
        let mut bytes = [0u8; 4];
        self.0.read_exact(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    #[inline]
    fn read_i32(&mut self) -> PcapResult<i32> {
        let mut bytes = [0u8; 4];
        self.0.read_exact(&mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }

    #[inline]
    fn read_u16(&mut self) -> PcapResult<u16> {
        let mut bytes = [0u8; 2];
        self.0.read_exact(&mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    #[inline]
    fn endianness(&self) -> Endianness {
        Endianness::Big
    }
}

/// Link-layer header type, the first protocol of every packet in the capture.
///
/// The tag is kept opaque; only a handful of common values are named here.
///
/// See <http://www.tcpdump.org/linktypes.html>.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct LinkLayerType(pub u32);

impl LinkLayerType {
    pub const NULL: LinkLayerType = LinkLayerType(0);
    pub const ETHERNET: LinkLayerType = LinkLayerType(1);
    pub const IEEE802_5: LinkLayerType = LinkLayerType(6);
    pub const PPP: LinkLayerType = LinkLayerType(9);
    pub const RAW: LinkLayerType = LinkLayerType(101);
    pub const IEEE802_11: LinkLayerType = LinkLayerType(105);
    pub const LOOP: LinkLayerType = LinkLayerType(108);
    pub const LINUX_SLL: LinkLayerType = LinkLayerType(113);
    pub const IEEE802_11_RADIOTAP: LinkLayerType = LinkLayerType(127);
    pub const IPV4: LinkLayerType = LinkLayerType(228);
    pub const IPV6: LinkLayerType = LinkLayerType(229);
    pub const LINUX_SLL2: LinkLayerType = LinkLayerType(276);

    /// Short name of well known link types.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            LinkLayerType::NULL => "NULL",
            LinkLayerType::ETHERNET => "ETHERNET",
            LinkLayerType::IEEE802_5 => "IEEE802_5",
            LinkLayerType::PPP => "PPP",
            LinkLayerType::RAW => "RAW",
            LinkLayerType::IEEE802_11 => "IEEE802_11",
            LinkLayerType::LOOP => "LOOP",
            LinkLayerType::LINUX_SLL => "LINUX_SLL",
            LinkLayerType::IEEE802_11_RADIOTAP => "IEEE802_11_RADIOTAP",
            LinkLayerType::IPV4 => "IPV4",
            LinkLayerType::IPV6 => "IPV6",
            LinkLayerType::LINUX_SLL2 => "LINUX_SLL2",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for LinkLayerType {
    fn from(n: u32) -> Self {
        LinkLayerType(n)
    }
}

impl From<u16> for LinkLayerType {
    fn from(n: u16) -> Self {
        LinkLayerType(u32::from(n))
    }
}

impl From<LinkLayerType> for u32 {
    fn from(link: LinkLayerType) -> u32 {
        link.0
    }
}

impl fmt::Display for LinkLayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

pub(crate) const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Builds a UTC capture time, carrying whole seconds out of `nanos`.
pub(crate) fn capture_time(secs: i64, nanos: u64) -> PcapResult<DateTime<Utc>> {
    const OUT_OF_RANGE: PcapError = PcapError::MalformedInput("timestamp out of range");

    let carry = i64::try_from(nanos / NANOS_PER_SEC).map_err(|_| OUT_OF_RANGE)?;
    let secs = secs.checked_add(carry).ok_or(OUT_OF_RANGE)?;
    let nanos = (nanos % NANOS_PER_SEC) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).ok_or(OUT_OF_RANGE)
}

/// Check for eof by checking the inner buffer without consuming.
/// TODO: move to `BufRead::has_data_left` once it is stable.
#[inline]
pub(crate) fn has_data_left<R>(reader: &mut R) -> IoResult<bool>
where
    R: BufRead,
{
    reader.fill_buf().map(|b| !b.is_empty())
}
