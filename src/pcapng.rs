//! Pcapng decoding as a block state machine.
//!
//! Every block is `type(4) | total length(4) | body | total length(4)`. The decoder reads one
//! block per transition and only keeps the state of a single interface per section: the first
//! one described, or a later one with the same link-layer type and name. Packets of any other
//! interface are skipped.
//!
//! See <https://www.ietf.org/archive/id/draft-tuexen-opsawg-pcapng-03.html>.

use crate::{
    common::{
        has_data_left,
        Endianness,
        LinkLayerType,
        PcapError,
        PcapResult,
    },
    config::{
        prealloc_len,
        ReaderConfig,
    },
    interface::{
        InterfaceDescription,
        TsParams,
    },
    traffic::{
        Packet,
        PacketInfo,
        Traffic,
    },
};
use std::io::{
    self,
    BufReader,
    Read,
};
use tracing::{
    debug,
    trace,
    warn,
};

/// Section Header Block, the same bytes in either byte order.
pub(crate) const SHB: u32 = 0x0A0D0D0A;
/// Interface Description Block.
pub(crate) const IDB: u32 = 0x00000001;
/// Simple Packet Block.
pub(crate) const SPB: u32 = 0x00000003;
/// Enhanced Packet Block.
pub(crate) const EPB: u32 = 0x00000006;

const BYTE_ORDER_MAGIC: u32 = 0x1A2B3C4D;
const UNKNOWN_SECTION_LEN: u64 = 0xFFFFFFFFFFFFFFFF;

// Smallest valid total length of each block kind.
const BLOCK_MIN_LEN: u32 = 12;
const SHB_MIN_LEN: u32 = 28;
const IDB_MIN_LEN: u32 = 20;
const SPB_MIN_LEN: u32 = 16;
const EPB_MIN_LEN: u32 = 32;

/// What the decoder reads next.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum BlockState {
    BlockType,
    IgnoreBlock,
    IgnoreSection,
    InterfaceDescription,
    SectionHeader,
    SimplePacket,
    EnhancedPacket,
    /// End of stream or unrecoverable error.
    Done,
}

impl BlockState {
    /// States whose handler may produce a packet.
    pub(crate) fn is_data_ready(self) -> bool {
        matches!(self, BlockState::SimplePacket | BlockState::EnhancedPacket)
    }
}

/// Result of running one state handler.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct Transition {
    pub(crate) next: BlockState,
    /// The handler left a packet in the reader's packet slot.
    pub(crate) emitted: bool,
}

impl Transition {
    fn to(next: BlockState) -> Self {
        Transition {
            next,
            emitted: false,
        }
    }

    fn emit() -> Self {
        Transition {
            next: BlockState::BlockType,
            emitted: true,
        }
    }
}

fn read_vec<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>, len: usize) -> PcapResult<()>
where
    R: Read,
{
    buf.clear();
    let read = reader.by_ref().take(len as u64).read_to_end(buf)?;
    if read != len {
        return Err(PcapError::MalformedInput("truncated block"));
    }
    Ok(())
}

/// A reader of a Pcapng file. Can target any `std::io::Read` implementor.
#[derive(Debug)]
pub struct PcapNgReader<R>
where
    R: Read,
{
    // `None` once the source has been released.
    reader: Option<BufReader<R>>,
    config: ReaderConfig,
    state: BlockState,

    // Section Header Block
    endianness: Endianness,
    section_len: u64,
    // Bytes read since the end of the section header block.
    section_consumed: u64,

    // Interface Description Blocks. The link type and name lock outlive sections, everything
    // else is reset by each section header.
    if_counter: u32,
    if_id: Option<u32>,
    link_type: Option<LinkLayerType>,
    name_hash: Option<[u8; 16]>,
    snaplen: u32,
    ts: TsParams,
    time_zone: i32,
    time_offset: i64,

    info: PacketInfo,
    data: Vec<u8>,
    options: Vec<u8>,
}

impl<R> PcapNgReader<R>
where
    R: Read,
{
    /// Opens the stream with the default [`ReaderConfig`].
    pub fn new(reader: R) -> PcapResult<Self> {
        Self::with_config(reader, &ReaderConfig::default())
    }

    /// Checks the leading section header tag and decodes up to the first packet carrying block.
    ///
    /// `PcapError::Empty` when the source holds no bytes, `PcapError::MalformedInput` when it
    /// does not start with a section header block. A file without packets opens fine and
    /// reports end of stream on the first `next_packet`.
    pub fn with_config(reader: R, config: &ReaderConfig) -> PcapResult<Self> {
        let mut reader = BufReader::with_capacity(config.buffer_capacity, reader);
        if !has_data_left(&mut reader)? {
            return Err(PcapError::Empty);
        }

        let mut block_type = [0u8; 4];
        reader.read_exact(&mut block_type)?;
        if u32::from_be_bytes(block_type) != SHB {
            return Err(PcapError::MalformedInput(
                "file does not start with a section header block",
            ));
        }

        let mut ng = PcapNgReader {
            reader: Some(reader),
            config: *config,
            state: BlockState::SectionHeader,
            endianness: Endianness::Little,
            section_len: UNKNOWN_SECTION_LEN,
            section_consumed: 0,
            if_counter: 0,
            if_id: None,
            link_type: None,
            name_hash: None,
            snaplen: 0,
            ts: TsParams::default(),
            time_zone: 0,
            time_offset: 0,
            info: PacketInfo {
                capture_time: None,
                size: 0,
            },
            data: Vec::new(),
            options: Vec::new(),
        };
        ng.advance_to_data()?;
        Ok(ng)
    }

    /// Id of the interface whose packets are surfaced in the current section.
    pub fn interface_id(&self) -> Option<u32> {
        self.if_id
    }

    /// Snapshot length of the current interface, 0 meaning unlimited.
    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// `if_tszone` of the current interface.
    pub fn time_zone(&self) -> i32 {
        self.time_zone
    }

    /// `if_tsoffset` of the current interface, in seconds.
    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }

    /// Byte order of the current section.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Whether the byte source has been released.
    pub fn is_stopped(&self) -> bool {
        self.reader.is_none()
    }

    /// Runs handlers until the next one may produce a packet.
    fn advance_to_data(&mut self) -> PcapResult<()> {
        while !self.state.is_data_ready() && self.state != BlockState::Done {
            self.state = self.step(self.state)?.next;
        }
        Ok(())
    }

    pub(crate) fn step(&mut self, state: BlockState) -> PcapResult<Transition> {
        match state {
            BlockState::BlockType => self.block_type(),
            BlockState::IgnoreBlock => self.ignore_block(),
            BlockState::IgnoreSection => self.ignore_section(),
            BlockState::InterfaceDescription => self.interface_description(),
            BlockState::SectionHeader => self.section_header(),
            BlockState::SimplePacket => self.simple_packet(),
            BlockState::EnhancedPacket => self.enhanced_packet(),
            BlockState::Done => Ok(Transition::to(BlockState::Done)),
        }
    }

    fn source(&mut self) -> PcapResult<&mut BufReader<R>> {
        self.reader.as_mut().ok_or(PcapError::AlreadyStopped)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> PcapResult<()> {
        self.source()?.read_exact(buf)?;
        self.section_consumed += buf.len() as u64;
        Ok(())
    }

    fn discard(&mut self, len: u64) -> PcapResult<()> {
        let reader = self.source()?;
        let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
        self.section_consumed += skipped;
        if skipped != len {
            return Err(PcapError::MalformedInput("truncated block"));
        }
        Ok(())
    }

    fn read_data(&mut self, len: usize) -> PcapResult<()> {
        let reader = self.reader.as_mut().ok_or(PcapError::AlreadyStopped)?;
        read_vec(reader, &mut self.data, len)?;
        self.section_consumed += len as u64;
        Ok(())
    }

    fn read_options(&mut self, len: usize) -> PcapResult<()> {
        let reader = self.reader.as_mut().ok_or(PcapError::AlreadyStopped)?;
        read_vec(reader, &mut self.options, len)?;
        self.section_consumed += len as u64;
        Ok(())
    }

    /// `Ok(None)` on a clean end of file.
    fn read_block_type(&mut self) -> PcapResult<Option<u32>> {
        if !has_data_left(self.source()?)? {
            return Ok(None);
        }
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(Some(self.endianness.u32_at(&buf, 0)))
    }

    fn check_min_len(total: u32, min_len: u32) -> PcapResult<()> {
        if total < min_len {
            return Err(PcapError::MalformedInput("block length below minimum"));
        }
        Ok(())
    }

    /// Only blocks whose body is buffered are bounded, skipped ones stream through.
    fn check_buffered_len(&self, total: u32) -> PcapResult<()> {
        if total > self.config.max_block_len {
            debug!(
                total,
                max_block_len = self.config.max_block_len,
                "block exceeds configured limit"
            );
            return Err(PcapError::MalformedInput("block length exceeds limit"));
        }
        Ok(())
    }

    fn read_block_len(&mut self, min_len: u32) -> PcapResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        let total = self.endianness.u32_at(&buf, 0);
        Self::check_min_len(total, min_len)?;
        Ok(total)
    }

    /// Reads the trailing copy of the total length and checks it against the leading one.
    fn read_trailer(&mut self, total: u32) -> PcapResult<()> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        if self.endianness.u32_at(&buf, 0) != total {
            return Err(PcapError::MalformedInput("block length trailer mismatch"));
        }
        Ok(())
    }

    fn block_type(&mut self) -> PcapResult<Transition> {
        let Some(block_type) = self.read_block_type()? else {
            return Ok(Transition::to(BlockState::Done));
        };

        let next = match block_type {
            SHB => BlockState::SectionHeader,
            IDB => BlockState::InterfaceDescription,
            SPB => BlockState::SimplePacket,
            EPB => BlockState::EnhancedPacket,
            _ => BlockState::IgnoreBlock,
        };
        trace!(block_type, next = ?next, "dispatch block");
        Ok(Transition::to(next))
    }

    fn ignore_block(&mut self) -> PcapResult<Transition> {
        let total = self.read_block_len(BLOCK_MIN_LEN)?;
        self.discard(u64::from(total) - 8)?;
        Ok(Transition::to(BlockState::BlockType))
    }

    /// Skips the rest of the section. Without a known section length it skips block by block
    /// until the next section header.
    fn ignore_section(&mut self) -> PcapResult<Transition> {
        if self.section_len != UNKNOWN_SECTION_LEN {
            let remaining = self
                .section_len
                .checked_sub(self.section_consumed)
                .ok_or(PcapError::MalformedInput("section overruns its declared length"))?;
            self.discard(remaining)?;
            return Ok(Transition::to(BlockState::BlockType));
        }

        match self.read_block_type()? {
            None => Ok(Transition::to(BlockState::Done)),
            Some(SHB) => Ok(Transition::to(BlockState::SectionHeader)),
            Some(_) => {
                let total = self.read_block_len(BLOCK_MIN_LEN)?;
                self.discard(u64::from(total) - 8)?;
                Ok(Transition::to(BlockState::IgnoreSection))
            }
        }
    }

    fn section_header(&mut self) -> PcapResult<Transition> {
        // total length, byte-order magic, major, minor, section length
        let mut buf = [0u8; 20];
        self.read_exact(&mut buf)?;

        self.endianness = if Endianness::Big.u32_at(&buf, 4) == BYTE_ORDER_MAGIC {
            Endianness::Big
        } else if Endianness::Little.u32_at(&buf, 4) == BYTE_ORDER_MAGIC {
            Endianness::Little
        } else {
            return Err(PcapError::MalformedInput("unknown byte-order magic"));
        };

        let total = self.endianness.u32_at(&buf, 0);
        Self::check_min_len(total, SHB_MIN_LEN)?;
        let major = self.endianness.u16_at(&buf, 8);
        let minor = self.endianness.u16_at(&buf, 10);
        let section_len = self.endianness.u64_at(&buf, 12);

        self.discard(u64::from(total - SHB_MIN_LEN))?;
        self.read_trailer(total)?;
        self.reset_section(section_len);

        // A minor version of 2 is to be read as 0.
        if major != 1 || (minor != 0 && minor != 2) {
            warn!(major, minor, section_len, "skipping section of unsupported version");
            return Ok(Transition::to(BlockState::IgnoreSection));
        }

        debug!(endianness = ?self.endianness, section_len, "section header");
        Ok(Transition::to(BlockState::BlockType))
    }

    fn reset_section(&mut self, section_len: u64) {
        self.section_len = section_len;
        self.section_consumed = 0;
        self.if_counter = 0;
        self.if_id = None;
        self.snaplen = 0;
        self.ts = TsParams::default();
        self.time_zone = 0;
        self.time_offset = 0;
    }

    fn interface_description(&mut self) -> PcapResult<Transition> {
        let total = self.read_block_len(IDB_MIN_LEN)?;
        self.check_buffered_len(total)?;
        let mut fixed = [0u8; InterfaceDescription::FIXED_LEN];
        self.read_exact(&mut fixed)?;
        self.read_options((total - IDB_MIN_LEN) as usize)?;
        self.read_trailer(total)?;

        let if_id = self.if_counter;
        self.if_counter = self.if_counter.wrapping_add(1);

        // The lock is checked before the remaining options are decoded, a discarded interface
        // cannot fail the stream.
        let link_type = InterfaceDescription::link_type_of(&fixed, self.endianness);
        if let Some(reason) = self.lock_mismatch(link_type) {
            debug!(if_id, link_type = %link_type, reason, "interface discarded");
            return Ok(Transition::to(BlockState::BlockType));
        }

        let description = InterfaceDescription::parse(&fixed, &self.options, self.endianness)?;
        self.adopt(if_id, &description);
        debug!(
            if_id,
            link_type = %description.link_type,
            snaplen = description.snaplen,
            second_mask = description.ts.second_mask,
            "interface adopted"
        );
        Ok(Transition::to(BlockState::BlockType))
    }

    /// Why an interface of `link_type` with the current option list cannot take over the lock.
    fn lock_mismatch(&self, link_type: LinkLayerType) -> Option<&'static str> {
        if self.link_type.is_some_and(|locked| locked != link_type) {
            return Some("link-layer type differs");
        }
        let name_hash = InterfaceDescription::name_hash_of(&self.options, self.endianness);
        match (self.name_hash, name_hash) {
            (Some(locked), Some(hash)) if locked != hash => Some("interface name differs"),
            _ => None,
        }
    }

    fn adopt(&mut self, if_id: u32, description: &InterfaceDescription) {
        self.if_id = Some(if_id);
        self.link_type = Some(description.link_type);
        if description.name_hash.is_some() {
            self.name_hash = description.name_hash;
        }
        self.snaplen = description.snaplen;
        self.ts = description.ts;
        self.time_zone = description.time_zone;
        self.time_offset = description.time_offset;
        self.data.reserve(prealloc_len(description.snaplen));
    }

    fn simple_packet(&mut self) -> PcapResult<Transition> {
        let total = self.read_block_len(SPB_MIN_LEN)?;
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        let orig_len = self.endianness.u32_at(&buf, 0);

        if self.if_id.is_none() {
            debug!("simple packet block without an interface, skipping section");
            self.discard(u64::from(total) - 12)?;
            return Ok(Transition::to(BlockState::IgnoreSection));
        }

        self.check_buffered_len(total)?;
        self.read_data((total - SPB_MIN_LEN) as usize)?;
        self.read_trailer(total)?;

        // The data area is padded to 32 bits, the packet itself ends at min(orig_len, snaplen).
        let mut captured = orig_len;
        if self.snaplen != 0 {
            captured = captured.min(self.snaplen);
        }
        self.data.truncate(captured as usize);

        self.info = PacketInfo {
            capture_time: None,
            size: orig_len,
        };
        Ok(Transition::emit())
    }

    fn enhanced_packet(&mut self) -> PcapResult<Transition> {
        let total = self.read_block_len(EPB_MIN_LEN)?;
        // interface id, timestamp high, timestamp low, captured length, original length
        let mut buf = [0u8; 20];
        self.read_exact(&mut buf)?;
        let if_id = self.endianness.u32_at(&buf, 0);
        let ts_high = self.endianness.u32_at(&buf, 4);
        let ts_low = self.endianness.u32_at(&buf, 8);
        let cap_len = self.endianness.u32_at(&buf, 12);
        let orig_len = self.endianness.u32_at(&buf, 16);

        // captured data, padding and options
        let body = u64::from(total - EPB_MIN_LEN);

        if self.if_id != Some(if_id) {
            trace!(if_id, locked = ?self.if_id, "packet of another interface");
            self.discard(body)?;
            self.read_trailer(total)?;
            return Ok(Transition::to(BlockState::BlockType));
        }

        self.check_buffered_len(total)?;
        let padded = (u64::from(cap_len) + 3) & !3;
        if padded > body {
            return Err(PcapError::MalformedInput(
                "captured length exceeds block length",
            ));
        }

        self.read_data(cap_len as usize)?;
        self.discard(body - u64::from(cap_len))?;
        self.read_trailer(total)?;

        let ticks = (u64::from(ts_high) << 32) | u64::from(ts_low);
        self.info = PacketInfo {
            capture_time: Some(self.ts.capture_time(ticks, self.time_offset)?),
            size: orig_len,
        };
        Ok(Transition::emit())
    }
}

impl<R> Traffic for PcapNgReader<R>
where
    R: Read,
{
    fn next_packet(&mut self) -> PcapResult<Option<(PacketInfo, Packet<'_>)>> {
        if self.reader.is_none() {
            return Err(PcapError::AlreadyStopped);
        }

        loop {
            if self.state == BlockState::Done {
                self.stop();
                return Ok(None);
            }
            match self.step(self.state) {
                Ok(transition) => {
                    self.state = transition.next;
                    if transition.emitted {
                        break;
                    }
                }
                Err(e) => {
                    self.state = BlockState::Done;
                    self.stop();
                    return Err(e);
                }
            }
        }

        Ok(Some((self.info, Packet::new(&self.data))))
    }

    /// The locked link-layer type, `LinkLayerType::NULL` before any interface was described.
    fn link_layer_type(&self) -> LinkLayerType {
        self.link_type.unwrap_or_default()
    }

    fn stop(&mut self) {
        if self.reader.take().is_some() {
            debug!("pcapng source released");
        }
    }
}
