//! Erase/program/verify state machine for one region

use std::ops::Range;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use super::{FlashError, MAX_CHUNK_LEN};
use crate::protocol::{crc16_modbus, Command, CommandChannel, Response};

/// Progress after a chunk has been acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashProgress {
    /// Bytes acknowledged so far
    pub written: usize,
    /// Bytes in the region
    pub total: usize,
}

impl FlashProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.written as f64 * 100.0 / self.total as f64
        }
    }
}

/// One write command's slice of the region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute flash address of the first byte
    pub address: u32,
    /// Offsets into the region data
    pub range: Range<usize>,
}

/// Split `len` bytes at `address` into contiguous chunks of at most
/// `chunk_len` bytes; only the last chunk may be shorter
pub fn plan_chunks(address: u32, len: usize, chunk_len: usize) -> impl Iterator<Item = Chunk> {
    let chunk_len = chunk_len.clamp(1, MAX_CHUNK_LEN);
    (0..len).step_by(chunk_len).map(move |offset| Chunk {
        address: address.wrapping_add(offset as u32),
        range: offset..(offset + chunk_len).min(len),
    })
}

/// Summary of a verified region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    pub address: u32,
    pub length: u32,
    pub crc: u16,
    pub chunks: usize,
}

/// Writes regions through a command channel
pub struct FlashWriter<'a> {
    channel: &'a mut CommandChannel,
    chunk_len: usize,
}

impl<'a> FlashWriter<'a> {
    pub fn new(channel: &'a mut CommandChannel) -> Self {
        Self {
            channel,
            chunk_len: MAX_CHUNK_LEN,
        }
    }

    /// Use smaller write commands (clamped to 1..=128)
    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.clamp(1, MAX_CHUNK_LEN);
        self
    }

    /// Erase, program and verify `data` at `address`
    ///
    /// `progress` is called after every acknowledged chunk. It only observes
    /// the transfer.
    pub async fn write_region(
        &mut self,
        address: u32,
        data: &Bytes,
        mut progress: Option<&mut (dyn FnMut(FlashProgress) + Send)>,
    ) -> Result<RegionReport, FlashError> {
        let total = data.len();
        let length = u32::try_from(total)
            .ok()
            .filter(|len| address.checked_add(*len).is_some())
            .ok_or(FlashError::OutOfRange {
                address,
                length: total,
            })?;

        // Computed once over the whole buffer
        let expected = crc16_modbus(data);
        debug!(
            address = format_args!("0x{:08X}", address),
            length,
            crc = format_args!("0x{:04X}", expected),
            "Writing region"
        );

        // Phase 1: Erase
        self.channel
            .send_command(&Command::Erase { address, length })
            .await
            .and_then(Response::expect_bare_ok)
            .map_err(|source| FlashError::Erase {
                address,
                length,
                source,
            })?;

        // Phase 2: Program
        let mut chunks = 0;
        for chunk in plan_chunks(address, total, self.chunk_len) {
            let size = chunk.range.len();
            let written = chunk.range.end;
            let command = Command::Write {
                address: chunk.address,
                data: data.slice(chunk.range),
            };

            self.channel
                .send_command(&command)
                .await
                .and_then(Response::expect_ok)
                .map_err(|source| FlashError::Write {
                    address: chunk.address,
                    size,
                    source,
                })?;

            chunks += 1;
            if let Some(report) = progress.as_deref_mut() {
                report(FlashProgress { written, total });
            }
        }

        // Phase 3: Verify
        let actual = self
            .channel
            .send_command(&Command::Verify { address, length })
            .await
            .and_then(Response::expect_ok)
            .and_then(|response| response.crc16())
            .map_err(|source| FlashError::Verify {
                address,
                length,
                source,
            })?;

        if actual != expected {
            return Err(FlashError::CrcMismatch {
                address,
                length,
                expected,
                actual,
            });
        }

        info!(
            address = format_args!("0x{:08X}", address),
            length,
            chunks,
            crc = format_args!("0x{:04X}", expected),
            "Region verified"
        );

        Ok(RegionReport {
            address,
            length,
            crc: expected,
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::config::{ChannelConfig, MockConfig};
    use crate::protocol::{CommandError, CommandKind};
    use crate::transport::mock::{MockFaults, MockTransportAdapter, STATUS_REJECTED};

    const BASE: u32 = 0x40000;

    async fn setup(faults: MockFaults) -> (Arc<MockTransportAdapter>, CommandChannel) {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        mock.set_faults(faults);
        let channel = CommandChannel::open(mock.clone(), &ChannelConfig::default())
            .await
            .unwrap();
        (mock, channel)
    }

    fn image(len: usize) -> Bytes {
        (0..len).map(|i| (i * 7 % 251) as u8).collect::<Vec<_>>().into()
    }

    fn frames_of(mock: &MockTransportAdapter, kind: CommandKind) -> Vec<Vec<u8>> {
        mock.sent_frames()
            .into_iter()
            .filter(|f| CommandKind::from_frame(f) == Some(kind))
            .collect()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(128, 1)]
    #[case(129, 2)]
    #[case(300, 3)]
    #[case(4096, 32)]
    fn test_chunk_plan(#[case] len: usize, #[case] expected_chunks: usize) {
        let chunks: Vec<Chunk> = plan_chunks(BASE, len, MAX_CHUNK_LEN).collect();

        assert_eq!(chunks.len(), expected_chunks);
        assert_eq!(chunks.len(), len.div_ceil(MAX_CHUNK_LEN));
        assert_eq!(chunks.iter().map(|c| c.range.len()).sum::<usize>(), len);

        let mut next_address = BASE;
        let mut next_offset = 0;
        for chunk in &chunks {
            assert_eq!(chunk.address, next_address);
            assert_eq!(chunk.range.start, next_offset);
            assert!(chunk.range.len() <= MAX_CHUNK_LEN && !chunk.range.is_empty());
            next_address += chunk.range.len() as u32;
            next_offset = chunk.range.end;
        }
    }

    #[test]
    fn test_progress_percent() {
        let half = FlashProgress {
            written: 150,
            total: 300,
        };
        assert_eq!(half.percent(), 50.0);
        let empty = FlashProgress {
            written: 0,
            total: 0,
        };
        assert_eq!(empty.percent(), 100.0);
    }

    #[test]
    fn test_chunk_len_is_clamped() {
        let chunks: Vec<Chunk> = plan_chunks(0, 512, 1024).collect();
        assert_eq!(chunks.len(), 4);
    }

    #[tokio::test]
    async fn test_write_region_verifies() {
        let (mock, mut channel) = setup(MockFaults::default()).await;
        let data = image(300);

        let report = FlashWriter::new(&mut channel)
            .write_region(BASE, &data, None)
            .await
            .unwrap();

        assert_eq!(report.crc, crc16_modbus(&data));
        assert_eq!(report.chunks, 3);
        assert_eq!(report.length, 300);
        assert_eq!(mock.flash(BASE, 300), data.to_vec());

        let writes = frames_of(&mock, CommandKind::Write);
        let sizes: Vec<usize> = writes.iter().map(|f| f.len() - 6).collect();
        assert_eq!(sizes, vec![128, 128, 44]);
    }

    #[tokio::test]
    async fn test_progress_reports_each_chunk() {
        let (_mock, mut channel) = setup(MockFaults::default()).await;
        let data = image(300);
        let mut seen = Vec::new();
        let mut sink = |p: FlashProgress| seen.push((p.written, p.total));

        FlashWriter::new(&mut channel)
            .write_region(BASE, &data, Some(&mut sink))
            .await
            .unwrap();

        assert_eq!(seen, vec![(128, 300), (256, 300), (300, 300)]);
    }

    #[tokio::test]
    async fn test_crc_mismatch_reports_both_values() {
        let (_mock, mut channel) = setup(MockFaults {
            corrupt_crc: true,
            ..Default::default()
        })
        .await;
        let data = image(200);
        let local = crc16_modbus(&data);

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &data, None)
            .await
            .unwrap_err();

        match err {
            FlashError::CrcMismatch {
                address,
                length,
                expected,
                actual,
            } => {
                assert_eq!(address, BASE);
                assert_eq!(length, 200);
                assert_eq!(expected, local);
                assert_eq!(actual, local ^ 0x5A5A);
            }
            other => panic!("Expected CrcMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_erase_failure_stops_before_programming() {
        let (mock, mut channel) = setup(MockFaults {
            erase_status: Some(STATUS_REJECTED),
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(64), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FlashError::Erase {
                source: CommandError::Status { status: STATUS_REJECTED, .. },
                ..
            }
        ));
        assert!(frames_of(&mock, CommandKind::Write).is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_identifies_chunk() {
        let (mock, mut channel) = setup(MockFaults {
            write_status_at: Some((BASE + 128, STATUS_REJECTED)),
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(300), None)
            .await
            .unwrap_err();

        match err {
            FlashError::Write { address, size, .. } => {
                assert_eq!(address, BASE + 128);
                assert_eq!(size, 128);
            }
            other => panic!("Expected Write error, got {:?}", other),
        }
        assert_eq!(frames_of(&mock, CommandKind::Write).len(), 2);
        assert!(frames_of(&mock, CommandKind::Verify).is_empty());
    }

    fn kinds_sent(mock: &MockTransportAdapter) -> Vec<CommandKind> {
        mock.sent_frames()
            .iter()
            .filter_map(|f| CommandKind::from_frame(f))
            .collect()
    }

    const FULL_REGION_300: [CommandKind; 5] = [
        CommandKind::Erase,
        CommandKind::Write,
        CommandKind::Write,
        CommandKind::Write,
        CommandKind::Verify,
    ];

    #[tokio::test]
    async fn test_verify_status_rejected() {
        let (mock, mut channel) = setup(MockFaults {
            verify_status: Some(STATUS_REJECTED),
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(300), None)
            .await
            .unwrap_err();

        match err {
            FlashError::Verify {
                address,
                length,
                source: CommandError::Status { command, status },
            } => {
                assert_eq!(address, BASE);
                assert_eq!(length, 300);
                assert_eq!(command, CommandKind::Verify);
                assert_eq!(status, STATUS_REJECTED);
            }
            other => panic!("Expected Verify status error, got {:?}", other),
        }
        assert_eq!(kinds_sent(&mock), FULL_REGION_300);
    }

    #[tokio::test]
    async fn test_short_verify_reply_is_malformed() {
        let (mock, mut channel) = setup(MockFaults {
            verify_reply: Some(vec![0x60, 0x12]),
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(300), None)
            .await
            .unwrap_err();

        match err {
            FlashError::Verify {
                address,
                length,
                source: CommandError::Malformed { command, response },
            } => {
                assert_eq!(address, BASE);
                assert_eq!(length, 300);
                assert_eq!(command, CommandKind::Verify);
                assert_eq!(response, "6012");
            }
            other => panic!("Expected malformed Verify error, got {:?}", other),
        }
        assert_eq!(kinds_sent(&mock), FULL_REGION_300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_timeout() {
        let (mock, mut channel) = setup(MockFaults {
            silent_at: Some((CommandKind::Verify, BASE)),
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(300), None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        match err {
            FlashError::Verify {
                address,
                length,
                source: CommandError::Timeout { command, .. },
            } => {
                assert_eq!(address, BASE);
                assert_eq!(length, 300);
                assert_eq!(command, CommandKind::Verify);
            }
            other => panic!("Expected Verify timeout, got {:?}", other),
        }
        assert_eq!(kinds_sent(&mock), FULL_REGION_300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_chunk_timeout() {
        let (mock, mut channel) = setup(MockFaults {
            silent_at: Some((CommandKind::Write, BASE + 128)),
            ..Default::default()
        })
        .await;
        let mut acknowledged = Vec::new();
        let mut sink = |p: FlashProgress| acknowledged.push(p.written);

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(300), Some(&mut sink))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        match err {
            FlashError::Write {
                address,
                size,
                source: CommandError::Timeout { command, .. },
            } => {
                assert_eq!(address, 0x40080);
                assert_eq!(size, 128);
                assert_eq!(command, CommandKind::Write);
            }
            other => panic!("Expected Write timeout, got {:?}", other),
        }
        assert_eq!(acknowledged, vec![128]);
        assert_eq!(
            kinds_sent(&mock),
            vec![CommandKind::Erase, CommandKind::Write, CommandKind::Write]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_aborts_erase() {
        let (mock, mut channel) = setup(MockFaults {
            silent: true,
            ..Default::default()
        })
        .await;

        let err = FlashWriter::new(&mut channel)
            .write_region(BASE, &image(10), None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(err, FlashError::Erase { .. }));
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn test_smaller_chunks() {
        let (mock, mut channel) = setup(MockFaults::default()).await;

        let report = FlashWriter::new(&mut channel)
            .with_chunk_len(20)
            .write_region(BASE, &image(50), None)
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(frames_of(&mock, CommandKind::Write).len(), 3);
    }
}
