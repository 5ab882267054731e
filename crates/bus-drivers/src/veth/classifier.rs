use driver_interface::{
    Frame,
    net::{ETH_HLEN, ETH_P_IP, IPPROTO_UDP},
};
use rdrive::DeviceInstance;

/// Default destination port of the traffic the device accepts.
pub const PORTNUM: u16 = 54295;

const IPV4_MIN_HLEN: usize = 20;
/// Source and destination port, length, checksum.
const UDP_HLEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// Not Ethernet II carrying IPv4.
    NotIpv4,
    /// Truncated or inconsistent headers.
    Malformed,
    /// IPv4, but another transport.
    Protocol,
    /// Right transport, another destination port.
    Port,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Reject),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PacketClassifier {
    transport: u8,
    port: u16,
}

impl Default for PacketClassifier {
    fn default() -> Self {
        Self::udp(PORTNUM)
    }
}

impl PacketClassifier {
    pub const fn new(transport: u8, port: u16) -> Self {
        Self { transport, port }
    }

    pub const fn udp(port: u16) -> Self {
        Self::new(IPPROTO_UDP, port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> u8 {
        self.transport
    }

    /// Looks at the headers only. Nothing is counted.
    pub fn classify(&self, data: &[u8]) -> Verdict {
        match self.check(data) {
            Ok(()) => Verdict::Accepted,
            Err(r) => Verdict::Rejected(r),
        }
    }

    /// Classifies `frame`, counts it on `dev` when accepted, and frees it.
    pub fn classify_and_account(&self, dev: &DeviceInstance, frame: Frame) -> Verdict {
        let verdict = self.classify(frame.data());
        if verdict.is_accepted() {
            let len = frame.len() as u64;
            dev.update_stats(|s| {
                s.tx_packets += 1;
                s.tx_bytes += len;
            });
        }
        drop(frame);
        verdict
    }

    fn check(&self, data: &[u8]) -> Result<(), Reject> {
        let ethertype = data
            .get(12..ETH_HLEN)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or(Reject::Malformed)?;
        if ethertype != ETH_P_IP {
            return Err(Reject::NotIpv4);
        }

        let ip = &data[ETH_HLEN..];
        let ver_ihl = *ip.first().ok_or(Reject::Malformed)?;
        if ver_ihl >> 4 != 4 {
            return Err(Reject::NotIpv4);
        }
        let ihl = usize::from(ver_ihl & 0x0f) * 4;
        if ihl < IPV4_MIN_HLEN || ip.len() < ihl {
            return Err(Reject::Malformed);
        }

        if ip[9] != self.transport {
            return Err(Reject::Protocol);
        }

        let l4 = ip.get(ihl..ihl + UDP_HLEN).ok_or(Reject::Malformed)?;
        let dest = u16::from_be_bytes([l4[2], l4[3]]);
        if dest != self.port {
            return Err(Reject::Port);
        }
        Ok(())
    }
}
