use std::fmt;
use std::str::FromStr;

use crate::system::error::SourceError;

/// 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Source address of an Ethernet II frame (bytes 6..12).
    pub fn source_of(frame: &[u8]) -> Option<MacAddr> {
        let bytes: [u8; 6] = frame.get(6..12)?.try_into().ok()?;
        Some(MacAddr(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SourceError::malformed("hardware address", format!("{s:?}"));
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split([':', '-']);
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(malformed)?;
            if part.len() != 2 {
                return Err(malformed());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
        }
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(MacAddr(bytes))
    }
}

/// Interface whose traffic is being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIdentity {
    pub name: String,
    pub mac: MacAddr,
}
