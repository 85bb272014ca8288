//! Massif binary layout.
//!
//! A massif blob is a fixed 64 byte start header, a pre-allocated peak index
//! area sized by the massif height, then 32 byte MMR node entries appended
//! in MMR index order:
//!
//! ```text
//! [0 .. 64)                     MassifStart header
//! [64 .. 64 + P(height))        peak index area, zero filled at creation
//! [64 + P(height) ..)           node entries, 32 bytes each
//! ```
//!
//! The peak index area of massif `i` holds the global MMR peak hashes at
//! size `first_index(i)`, highest peak first, remaining slots zero. Nodes
//! appended within the massif that close subtrees spanning earlier massifs
//! resolve their left siblings from this area, so a single massif suffices
//! to extend the log.
//!
//! # Start header layout
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0      | 2    | format version (big endian) |
//! | 2      | 4    | commitment epoch |
//! | 6      | 8    | last id timestamp (advisory mirror of the `lastid` tag) |
//! | 14     | 8    | first index |
//! | 22     | 4    | massif index |
//! | 26     | 1    | reserved |
//! | 27     | 1    | massif height |
//! | 28     | 4    | reserved |
//! | 32     | 32   | previous root |

use crate::error::{Error, Result};
use crate::mmr;

/// End offset of the start header; the peak index area begins here.
pub const START_HEADER_END: usize = 64;

/// Size of one MMR node entry.
pub const NODE_SIZE: usize = 32;

/// Offset of the raw massif height byte within the start header.
///
/// The height is readable at this fixed offset without decoding the header,
/// which supports path and sizing decisions over raw blob bytes.
pub const MASSIF_HEIGHT_BYTE: usize = 27;

/// Current start header format version.
pub const START_HEADER_VERSION: u16 = 1;

/// Size in bytes of the peak index area for a massif of the given height.
///
/// Fixed per height: one slot for every ancestor peak a massif of this
/// height can ever need, which keeps the node area offset independent of the
/// massif index.
#[must_use]
pub fn peak_stack_bytes(height: u8) -> usize {
    NODE_SIZE * (64 - usize::from(height))
}

/// Byte capacity of a massif's node area: `(2^height - 1)` nodes.
///
/// Individual massifs may hold slightly more nodes than this when a spur
/// completes across the boundary; the commit-time overfill rule, not this
/// figure, is the hard limit. Occupancy at or beyond this size is what rolls
/// the log over to the next massif.
#[must_use]
pub fn tree_size_bytes(height: u8) -> u64 {
    ((1u64 << height) - 1) * NODE_SIZE as u64
}

/// Number of leaves allocated to each massif of the given height.
#[must_use]
pub fn leaf_span(height: u8) -> u64 {
    1u64 << (height - 1)
}

/// Reads the massif height from raw blob bytes without decoding the header.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the buffer is too short or the byte
/// is not a plausible height.
pub fn read_height(data: &[u8]) -> Result<u8> {
    let byte = *data
        .get(MASSIF_HEIGHT_BYTE)
        .ok_or_else(|| Error::InvalidInput("data too short for a massif start header".into()))?;
    if byte == 0 || byte > 63 {
        return Err(Error::InvalidInput(format!(
            "implausible massif height {byte}"
        )));
    }
    Ok(byte)
}

/// The versioned fixed header at the front of every massif blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MassifStart {
    /// Header format version.
    pub version: u16,
    /// Commitment epoch the log's id timestamps are relative to.
    pub commitment_epoch: u32,
    /// Most recent id timestamp appended into this massif. Advisory; the
    /// `lastid` blob tag is the authoritative copy.
    pub last_id_timestamp: u64,
    /// MMR index of the first node stored in this massif.
    pub first_index: u64,
    /// Zero based, dense massif index within the log.
    pub massif_index: u32,
    /// Tree height allocated by this massif.
    pub massif_height: u8,
    /// The node that completed the preceding massif; zero for massif 0.
    pub previous_root: [u8; 32],
}

impl MassifStart {
    /// Creates a header for a new massif.
    #[must_use]
    pub fn new(massif_index: u32, commitment_epoch: u32, massif_height: u8, first_index: u64) -> Self {
        Self {
            version: START_HEADER_VERSION,
            commitment_epoch,
            last_id_timestamp: 0,
            first_index,
            massif_index,
            massif_height,
            previous_root: [0u8; 32],
        }
    }

    /// Encodes the header into its fixed binary form.
    #[must_use]
    pub fn encode(&self) -> [u8; START_HEADER_END] {
        let mut buf = [0u8; START_HEADER_END];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..6].copy_from_slice(&self.commitment_epoch.to_be_bytes());
        buf[6..14].copy_from_slice(&self.last_id_timestamp.to_be_bytes());
        buf[14..22].copy_from_slice(&self.first_index.to_be_bytes());
        buf[22..26].copy_from_slice(&self.massif_index.to_be_bytes());
        buf[MASSIF_HEIGHT_BYTE] = self.massif_height;
        buf[32..64].copy_from_slice(&self.previous_root);
        buf
    }

    /// Decodes a header from the front of a blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the buffer is too short, the
    /// version is unknown, or the height is implausible.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < START_HEADER_END {
            return Err(Error::InvalidInput(format!(
                "data too short for a massif start header: {} bytes",
                data.len()
            )));
        }
        let version = u16::from_be_bytes([data[0], data[1]]);
        if version != START_HEADER_VERSION {
            return Err(Error::InvalidInput(format!(
                "unknown massif start version {version}"
            )));
        }
        let massif_height = read_height(data)?;
        let mut previous_root = [0u8; 32];
        previous_root.copy_from_slice(&data[32..64]);
        Ok(Self {
            version,
            commitment_epoch: u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
            last_id_timestamp: be_u64(&data[6..14]),
            first_index: be_u64(&data[14..22]),
            massif_index: u32::from_be_bytes([data[22], data[23], data[24], data[25]]),
            massif_height,
            previous_root,
        })
    }
}

// Length-checked by the caller.
fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

/// An in-memory massif: parsed header plus the full blob bytes, ready for
/// appends.
///
/// The byte buffer is loaned to the appender until commit; it may grow but
/// the existing prefix must never change.
#[derive(Debug, Clone)]
pub struct MassifContext {
    /// The parsed start header.
    pub start: MassifStart,
    /// The blob bytes: header, peak index area, then node entries.
    pub data: Vec<u8>,
    /// True when the context targets a path where no blob exists yet.
    pub creating: bool,
}

impl MassifContext {
    /// Builds the very first massif of a log: header plus zero filled peak
    /// index area, ready for the first append.
    #[must_use]
    pub fn new_first(commitment_epoch: u32, massif_height: u8) -> Self {
        let start = MassifStart::new(0, commitment_epoch, massif_height, 0);
        let mut data = start.encode().to_vec();
        data.resize(data.len() + peak_stack_bytes(massif_height), 0);
        Self {
            start,
            data,
            creating: true,
        }
    }

    /// Byte offset at which node entries begin.
    #[must_use]
    pub fn log_start(&self) -> usize {
        START_HEADER_END + peak_stack_bytes(self.start.massif_height)
    }

    /// Number of node entries currently present.
    #[must_use]
    pub fn count(&self) -> u64 {
        (self.data.len().saturating_sub(self.log_start()) / NODE_SIZE) as u64
    }

    /// MMR size of the whole log as seen from this massif.
    #[must_use]
    pub fn mmr_size(&self) -> u64 {
        self.start.first_index + self.count()
    }

    /// True while the node area occupancy is below the allocated tree size.
    ///
    /// Just before the massif's last leaf is added the occupancy is below
    /// the base size; adding that leaf and its spur immediately reaches or
    /// exceeds it, so this is the roll-over test.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        ((self.data.len() - self.log_start()) as u64) < tree_size_bytes(self.start.massif_height)
    }

    /// Records the id timestamp of the most recent append, mirroring it into
    /// the header bytes.
    pub fn set_last_id_timestamp(&mut self, id: u64) {
        self.start.last_id_timestamp = id;
        self.data[6..14].copy_from_slice(&id.to_be_bytes());
    }

    /// The most recent id timestamp recorded by the appender.
    #[must_use]
    pub fn last_id_timestamp(&self) -> u64 {
        self.start.last_id_timestamp
    }

    /// Appends one node entry.
    pub fn append_node(&mut self, node: &[u8; NODE_SIZE]) {
        self.data.extend_from_slice(node);
    }

    /// Returns the node stored at the given MMR index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the index is outside this
    /// massif's stored range.
    pub fn get_node(&self, mmr_index: u64) -> Result<[u8; NODE_SIZE]> {
        if mmr_index < self.start.first_index || mmr_index >= self.mmr_size() {
            return Err(Error::InvalidInput(format!(
                "mmr index {mmr_index} is not stored by massif {}",
                self.start.massif_index
            )));
        }
        let offset =
            self.log_start() + usize::try_from(mmr_index - self.start.first_index).unwrap_or(0) * NODE_SIZE;
        let mut node = [0u8; NODE_SIZE];
        node.copy_from_slice(&self.data[offset..offset + NODE_SIZE]);
        Ok(node)
    }

    /// Returns entry `slot` of the peak index area.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the slot is out of range.
    pub fn peak_stack_entry(&self, slot: usize) -> Result<[u8; NODE_SIZE]> {
        let offset = START_HEADER_END + slot * NODE_SIZE;
        if offset + NODE_SIZE > self.log_start() {
            return Err(Error::InvalidInput(format!(
                "peak stack slot {slot} is out of range for height {}",
                self.start.massif_height
            )));
        }
        let mut entry = [0u8; NODE_SIZE];
        entry.copy_from_slice(&self.data[offset..offset + NODE_SIZE]);
        Ok(entry)
    }

    /// Resolves an MMR index to a hash, falling back to the peak index area
    /// for nodes that live in earlier massifs.
    ///
    /// An index below `first_index` is only resolvable when it was a global
    /// peak at `first_index`; anything else would need another massif's node
    /// area, which this massif deliberately does not require.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the index is neither stored here
    /// nor an ancestor peak.
    pub fn node_or_ancestor_peak(&self, mmr_index: u64) -> Result<[u8; NODE_SIZE]> {
        if mmr_index >= self.start.first_index {
            return self.get_node(mmr_index);
        }
        let slot = mmr::peaks(self.start.first_index)
            .iter()
            .position(|p| *p == mmr_index)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "mmr index {mmr_index} is not an ancestor peak of massif {}",
                    self.start.massif_index
                ))
            })?;
        self.peak_stack_entry(slot)
    }

    /// Builds the successor massif context once this one is full.
    ///
    /// The successor's header advances the massif index and first index,
    /// carries the epoch and height forward, records this massif's final
    /// node as the previous root, and its peak index area is populated with
    /// the global peaks at the new first index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when called on a massif that cannot
    /// resolve the peaks the successor needs (only possible on a massif that
    /// is not actually full).
    pub fn start_next_massif(&self) -> Result<Self> {
        let height = self.start.massif_height;
        let next_index = self.start.massif_index + 1;
        let first_leaf = leaf_span(height) * u64::from(next_index);
        let next_first = mmr::mmr_index(first_leaf);

        let mut start = MassifStart::new(
            next_index,
            self.start.commitment_epoch,
            height,
            next_first,
        );
        start.previous_root = self.get_node(next_first - 1).map_err(|_| {
            Error::internal(format!(
                "massif {} is not full enough to start its successor",
                self.start.massif_index
            ))
        })?;

        let mut data = start.encode().to_vec();
        data.resize(START_HEADER_END + peak_stack_bytes(height), 0);

        for (slot, peak) in mmr::peaks(next_first).iter().enumerate() {
            let hash = self.node_or_ancestor_peak(*peak).map_err(|_| {
                Error::internal(format!(
                    "peak {peak} needed by massif {next_index} is unavailable"
                ))
            })?;
            let offset = START_HEADER_END + slot * NODE_SIZE;
            data[offset..offset + NODE_SIZE].copy_from_slice(&hash);
        }

        Ok(Self {
            start,
            data,
            creating: true,
        })
    }
}
