use alloc::{string::String, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Debug, Display},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{DeviceId, DriverResult};

custom_type!(NetHandle, u32, "netdev{}");

pub const ETH_ALEN: usize = 6;
pub const ETH_HLEN: usize = 14;
pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Unicast and not all zeroes.
    pub fn is_valid_ether_addr(&self) -> bool {
        !self.is_multicast() && !self.is_zero()
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NetFlags: u32 {
        const UP = 1 << 0;
        const BROADCAST = 1 << 1;
        const RUNNING = 1 << 6;
        const NOARP = 1 << 7;
        const MULTICAST = 1 << 12;
    }
}

#[derive(Debug, Clone)]
pub struct NetDeviceInfo {
    pub name: String,
    pub mac: MacAddr,
    pub flags: NetFlags,
    pub watchdog_timeo_ms: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetStats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
}

/// Tracks frame buffers so that leaks and double frees are observable.
#[derive(Debug, Default)]
pub struct FrameAllocator {
    allocated: AtomicU64,
    freed: AtomicU64,
}

impl FrameAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alloc(self: &Arc<Self>, data: Vec<u8>) -> Frame {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Frame {
            data,
            pool: Some(self.clone()),
        }
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Relaxed)
    }

    pub fn outstanding(&self) -> u64 {
        self.allocated() - self.freed()
    }
}

/// An outbound or inbound frame buffer.
///
/// Whoever holds the `Frame` owns the buffer; dropping it frees the buffer.
pub struct Frame {
    data: Vec<u8>,
    pool: Option<Arc<FrameAllocator>>,
}

impl Frame {
    /// A frame not tracked by any allocator.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pool: None }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("tracked", &self.pool.is_some())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.freed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Ok,
    Busy,
}

/// Device operations a network driver hands to the subsystem at registration.
pub trait NetDeviceOps: Send + Sync {
    fn open(&self) -> DriverResult;
    fn stop(&self) -> DriverResult;
    /// Consumes the frame whatever the outcome.
    fn start_xmit(&self, frame: Frame) -> TxStatus;
    fn get_stats(&self) -> NetStats;
    fn tx_timeout(&self, _queue: u32) {}
}

pub trait NetSubsystem: Send + Sync {
    fn alloc_etherdev(&self, owner: DeviceId, info: &NetDeviceInfo) -> DriverResult<NetHandle>;
    fn free_netdev(&self, handle: NetHandle) -> DriverResult;
    fn register_netdev(&self, handle: NetHandle, ops: Arc<dyn NetDeviceOps>) -> DriverResult;
    fn unregister_netdev(&self, handle: NetHandle) -> DriverResult;
    fn carrier_on(&self, handle: NetHandle);
    fn carrier_off(&self, handle: NetHandle);
    fn start_queue(&self, handle: NetHandle);
    fn stop_queue(&self, handle: NetHandle);
    /// Hands a received frame to the stack.
    fn netif_rx(&self, handle: NetHandle, frame: Frame);
}
