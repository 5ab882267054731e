use crate::DriverResult;

custom_type!(IoMapping, u32, "iomap{}");

/// Byte offset of a 32-bit register inside a mapping.
pub type RegOffset = usize;

/// Register access through a mapping handed out by a bus.
pub trait Mmio: Send + Sync {
    fn read32(&self, map: IoMapping, offset: RegOffset) -> DriverResult<u32>;
    fn write32(&self, map: IoMapping, offset: RegOffset, value: u32) -> DriverResult;
    fn mapping_len(&self, map: IoMapping) -> DriverResult<usize>;
}
