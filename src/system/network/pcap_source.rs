use std::io;
use std::time::Duration;

use pcap::{Active, Capture};

use super::capture::{Frame, FrameSource};
use crate::system::error::{SourceError, SourceResult};

const SNAPLEN: i32 = 65_535;

/// Live libpcap handle in promiscuous mode.
pub struct PcapSource {
    capture: Capture<Active>,
}

impl PcapSource {
    pub fn open(interface: &str, read_timeout: Duration) -> SourceResult<Self> {
        let timeout_ms = i32::try_from(read_timeout.as_millis()).unwrap_or(i32::MAX);
        let capture = Capture::from_device(interface)
            .map_err(capture_error)?
            .promisc(true)
            .snaplen(SNAPLEN)
            .timeout(timeout_ms)
            .open()
            .map_err(capture_error)?;
        Ok(PcapSource { capture })
    }
}

impl FrameSource for PcapSource {
    fn next_frame(&mut self) -> SourceResult<Option<Frame<'_>>> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(Frame {
                len: packet.header.len,
                data: packet.data,
            })),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(err) => Err(capture_error(err)),
        }
    }
}

fn capture_error(err: pcap::Error) -> SourceError {
    let detail = err.to_string();
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("not permitted") {
        SourceError::PermissionDenied { detail }
    } else {
        SourceError::unavailable("packet capture", io::Error::other(detail))
    }
}
