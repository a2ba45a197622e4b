//! Record Codec - payload encoding for the sync characteristics.
//!
//! Two payload kinds travel over the radio:
//!
//! - **Summary page**: MessagePack of `(version, index, pages, {origin: timestamp})`.
//!   A summary too large for one payload is split across pages by origin;
//!   every page fits on its own.
//! - **Batch**: a small binary frame so each record decodes independently:
//!
//! ```text
//! ┌─────────┬────────────┬──────────────┬───────────────┬─────┐
//! │ version │ count (BE) │ len (BE) #1  │ record #1     │ ... │
//! │ 1 byte  │ 2 bytes    │ 2 bytes      │ len bytes     │     │
//! └─────────┴────────────┴──────────────┴───────────────┴─────┘
//! ```
//!
//! A corrupt record frame is skipped by [`WireCodec::decode_batch_lenient`]
//! without losing its neighbours. Payloads never exceed the codec's
//! `max_payload`; oversized batches are an error, not a silent truncation.

use crate::{Record, Summary, SyncError};

/// Current wire protocol version.
pub const WIRE_VERSION: u8 = 1;

/// Default payload limit: the maximum length of a single attribute value.
pub const DEFAULT_MAX_PAYLOAD: usize = 512;

/// Bytes before the first record frame (version + count).
pub const BATCH_HEADER_LEN: usize = 3;

/// Bytes of length prefix in front of every record frame.
pub const FRAME_HEADER_LEN: usize = 2;

/// Upper bound on the pages of one summary.
pub const MAX_SUMMARY_PAGES: u16 = 256;

/// Worst-case bytes of a summary page around its entries: array header,
/// version, two u16 page numbers and a map32 header.
const SUMMARY_PAGE_OVERHEAD: usize = 1 + 1 + 3 + 3 + 5;

/// One page of a summary.
///
/// Pages partition the origins of a summary; merging every page restores
/// it. A page past the sender's last one is empty and still carries the
/// sender's page count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryPage {
    /// Zero-based page number.
    pub index: u16,
    /// Pages the sender's summary spans. Never zero.
    pub pages: u16,
    /// Origins on this page.
    pub entries: Summary,
}

impl SummaryPage {
    /// An empty page at `index` for a summary of `pages` pages.
    pub fn empty(index: u16, pages: u16) -> Self {
        Self {
            index,
            pages,
            entries: Summary::new(),
        }
    }
}

/// Result of a best-effort batch decode.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Records that decoded successfully, in wire order.
    pub records: Vec<Record>,
    /// Number of record frames that were present but undecodable.
    pub rejected: usize,
    /// Framing defect that stopped decoding early (truncation, trailing bytes).
    pub defect: Option<SyncError>,
}

impl DecodedBatch {
    /// Whether every declared record decoded and the framing was intact.
    pub fn is_clean(&self) -> bool {
        self.rejected == 0 && self.defect.is_none()
    }
}

/// Encoder/decoder bound to a maximum payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    max_payload: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl WireCodec {
    /// Create a codec that refuses payloads larger than `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// The payload limit in bytes.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Split a summary into pages that each fit in one payload.
    ///
    /// Always returns at least one page. Fails if a single origin cannot
    /// fit a page or the summary needs more than [`MAX_SUMMARY_PAGES`].
    pub fn paginate_summary(&self, summary: &Summary) -> Result<Vec<SummaryPage>, SyncError> {
        let budget = self.max_payload.saturating_sub(SUMMARY_PAGE_OVERHEAD);
        let mut chunks = Vec::new();
        let mut current = Summary::new();
        let mut used = 0usize;

        for (origin, timestamp) in summary {
            let len = rmp_serde::to_vec(origin)
                .map_err(SyncError::Serialization)?
                .len()
                + rmp_serde::to_vec(timestamp)
                    .map_err(SyncError::Serialization)?
                    .len();
            if len > budget {
                return Err(SyncError::PayloadTooLarge {
                    size: len + SUMMARY_PAGE_OVERHEAD,
                    limit: self.max_payload,
                });
            }
            if used + len > budget {
                chunks.push(std::mem::take(&mut current));
                used = 0;
            }
            current.observe(origin, *timestamp);
            used += len;
        }
        chunks.push(current);

        let pages = u16::try_from(chunks.len())
            .ok()
            .filter(|n| *n <= MAX_SUMMARY_PAGES)
            .ok_or_else(|| {
                SyncError::InvalidData(format!(
                    "summary needs {} pages, limit is {MAX_SUMMARY_PAGES}",
                    chunks.len()
                ))
            })?;

        Ok((0..pages)
            .zip(chunks)
            .map(|(index, entries)| SummaryPage {
                index,
                pages,
                entries,
            })
            .collect())
    }

    /// Encode one summary page.
    pub fn encode_summary_page(&self, page: &SummaryPage) -> Result<Vec<u8>, SyncError> {
        let bytes = rmp_serde::to_vec(&(WIRE_VERSION, page.index, page.pages, &page.entries))
            .map_err(SyncError::Serialization)?;
        self.check_size(bytes.len())?;
        Ok(bytes)
    }

    /// Decode one summary page.
    ///
    /// An empty value means the peer never answered and is an error.
    pub fn decode_summary_page(&self, bytes: &[u8]) -> Result<SummaryPage, SyncError> {
        if bytes.is_empty() {
            return Err(SyncError::MissingResponse);
        }
        self.check_size(bytes.len())?;

        let (version, index, pages, entries): (u8, u16, u16, Summary) =
            rmp_serde::from_slice(bytes).map_err(SyncError::Deserialization)?;
        if version != WIRE_VERSION {
            return Err(SyncError::UnsupportedVersion(version));
        }
        if pages == 0 || pages > MAX_SUMMARY_PAGES {
            return Err(SyncError::InvalidData(format!(
                "summary page count {pages} out of range"
            )));
        }
        if index >= pages && !entries.is_empty() {
            return Err(SyncError::InvalidData(format!(
                "summary page {index} of {pages} carries entries"
            )));
        }
        Ok(SummaryPage {
            index,
            pages,
            entries,
        })
    }

    /// Encoded size of one record including its frame header.
    pub fn frame_len(&self, record: &Record) -> Result<usize, SyncError> {
        Ok(FRAME_HEADER_LEN + record.to_bytes()?.len())
    }

    /// Encode a batch of records.
    ///
    /// Fails with [`SyncError::PayloadTooLarge`] if the encoding would not
    /// fit in `max_payload`.
    pub fn encode_batch(&self, records: &[Record]) -> Result<Vec<u8>, SyncError> {
        let count = u16::try_from(records.len()).map_err(|_| {
            SyncError::InvalidData(format!("too many records in batch: {}", records.len()))
        })?;

        let mut out = Vec::with_capacity(BATCH_HEADER_LEN + records.len() * 64);
        out.push(WIRE_VERSION);
        out.extend_from_slice(&count.to_be_bytes());

        for record in records {
            let frame = record.to_bytes()?;
            let len = u16::try_from(frame.len()).map_err(|_| SyncError::PayloadTooLarge {
                size: frame.len(),
                limit: u16::MAX as usize,
            })?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&frame);
        }

        self.check_size(out.len())?;
        Ok(out)
    }

    /// Decode a batch, failing on any defect.
    pub fn decode_batch(&self, bytes: &[u8]) -> Result<Vec<Record>, SyncError> {
        let decoded = self.decode_batch_lenient(bytes)?;
        if let Some(defect) = decoded.defect {
            return Err(defect);
        }
        if decoded.rejected > 0 {
            return Err(SyncError::InvalidData(format!(
                "{} undecodable record(s) in batch",
                decoded.rejected
            )));
        }
        Ok(decoded.records)
    }

    /// Decode as many records as possible.
    ///
    /// Header problems (oversize, unknown version, missing header) are
    /// errors. Problems inside the frame sequence are reported on the
    /// returned [`DecodedBatch`] alongside every record decoded before them.
    /// An empty value is an empty batch.
    pub fn decode_batch_lenient(&self, bytes: &[u8]) -> Result<DecodedBatch, SyncError> {
        if bytes.is_empty() {
            return Ok(DecodedBatch::default());
        }
        self.check_size(bytes.len())?;
        if bytes.len() < BATCH_HEADER_LEN {
            return Err(SyncError::Truncated {
                offset: 0,
                needed: BATCH_HEADER_LEN,
            });
        }
        if bytes[0] != WIRE_VERSION {
            return Err(SyncError::UnsupportedVersion(bytes[0]));
        }

        let count = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        // Every frame takes at least its length prefix.
        let plausible = (bytes.len() - BATCH_HEADER_LEN) / FRAME_HEADER_LEN;
        let mut decoded = DecodedBatch {
            records: Vec::with_capacity(count.min(plausible)),
            ..DecodedBatch::default()
        };
        let mut offset = BATCH_HEADER_LEN;

        for _ in 0..count {
            if bytes.len() - offset < FRAME_HEADER_LEN {
                decoded.defect = Some(SyncError::Truncated {
                    offset,
                    needed: FRAME_HEADER_LEN,
                });
                return Ok(decoded);
            }
            let len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
            offset += FRAME_HEADER_LEN;

            if bytes.len() - offset < len {
                decoded.defect = Some(SyncError::Truncated {
                    offset,
                    needed: len,
                });
                return Ok(decoded);
            }

            match Record::from_bytes(&bytes[offset..offset + len]) {
                Ok(record) => decoded.records.push(record),
                Err(_) => decoded.rejected += 1,
            }
            offset += len;
        }

        if offset != bytes.len() {
            decoded.defect = Some(SyncError::InvalidData(format!(
                "{} trailing bytes after {} records",
                bytes.len() - offset,
                count
            )));
        }

        Ok(decoded)
    }

    fn check_size(&self, size: usize) -> Result<(), SyncError> {
        if size > self.max_payload {
            return Err(SyncError::PayloadTooLarge {
                size,
                limit: self.max_payload,
            });
        }
        Ok(())
    }
}
