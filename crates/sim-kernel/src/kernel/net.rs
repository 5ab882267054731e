use std::{collections::BTreeMap, sync::Arc};

use driver_interface::{
    DeviceId, DriverError, DriverResult, Frame, NetDeviceInfo, NetDeviceOps, NetFlags, NetHandle,
    NetStats, NetSubsystem, TxStatus,
};
use log::{debug, info, trace};

use super::{FaultPoint, SimKernel};

struct NetDev {
    owner: DeviceId,
    info: NetDeviceInfo,
    ops: Option<Arc<dyn NetDeviceOps>>,
    flags: NetFlags,
    queue_active: bool,
    received: Vec<Vec<u8>>,
}

#[derive(Default)]
pub(super) struct NetState {
    next: u32,
    devs: BTreeMap<NetHandle, NetDev>,
}

impl NetState {
    pub(super) fn held(&self) -> usize {
        self.devs.len() + self.devs.values().filter(|d| d.ops.is_some()).count()
    }

    fn dev_mut(&mut self, handle: NetHandle) -> Option<&mut NetDev> {
        self.devs.get_mut(&handle)
    }

    fn ops(&self, handle: NetHandle) -> DriverResult<Arc<dyn NetDeviceOps>> {
        self.devs
            .get(&handle)
            .and_then(|d| d.ops.clone())
            .ok_or(DriverError::NotFound)
    }
}

impl SimKernel {
    /// Net device allocated on behalf of `owner`.
    pub fn netdev(&self, owner: DeviceId) -> Option<NetHandle> {
        self.net
            .lock()
            .devs
            .iter()
            .find(|(_, d)| d.owner == owner)
            .map(|(h, _)| *h)
    }

    pub fn netdev_info(&self, handle: NetHandle) -> Option<NetDeviceInfo> {
        self.net.lock().devs.get(&handle).map(|d| d.info.clone())
    }

    pub fn netdev_flags(&self, handle: NetHandle) -> NetFlags {
        self.net
            .lock()
            .devs
            .get(&handle)
            .map(|d| d.flags)
            .unwrap_or_default()
    }

    pub fn netdev_queue_active(&self, handle: NetHandle) -> bool {
        self.net
            .lock()
            .devs
            .get(&handle)
            .is_some_and(|d| d.queue_active)
    }

    /// Brings the interface up through the driver's `open`.
    pub fn net_open(&self, handle: NetHandle) -> DriverResult {
        let ops = {
            let s = self.net.lock();
            if s.devs.get(&handle).is_some_and(|d| d.flags.contains(NetFlags::UP)) {
                return Ok(());
            }
            s.ops(handle)?
        };
        ops.open()?;
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.flags.insert(NetFlags::UP);
        }
        Ok(())
    }

    pub fn net_stop(&self, handle: NetHandle) -> DriverResult {
        let ops = {
            let s = self.net.lock();
            if !s.devs.get(&handle).is_some_and(|d| d.flags.contains(NetFlags::UP)) {
                return Ok(());
            }
            s.ops(handle)?
        };
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.flags.remove(NetFlags::UP);
        }
        ops.stop()
    }

    /// Queues `frame` for transmission. The frame is consumed on every path.
    pub fn net_xmit(&self, handle: NetHandle, frame: Frame) -> DriverResult<TxStatus> {
        let ops = {
            let s = self.net.lock();
            let d = s.devs.get(&handle).ok_or(DriverError::NotFound)?;
            if !d.flags.contains(NetFlags::UP) {
                return Err(DriverError::InvalidArgument(format!("{} is down", d.info.name)));
            }
            if !d.queue_active {
                return Ok(TxStatus::Busy);
            }
            s.ops(handle)?
        };
        Ok(ops.start_xmit(frame))
    }

    pub fn net_stats(&self, handle: NetHandle) -> Option<NetStats> {
        let ops = self.net.lock().ops(handle).ok()?;
        Some(ops.get_stats())
    }

    /// Fires the transmit watchdog of `queue`.
    pub fn net_tx_timeout(&self, handle: NetHandle, queue: u32) -> DriverResult {
        let ops = self.net.lock().ops(handle)?;
        ops.tx_timeout(queue);
        Ok(())
    }

    /// Frames handed to the stack through `netif_rx`.
    pub fn net_received(&self, handle: NetHandle) -> Vec<Vec<u8>> {
        self.net
            .lock()
            .devs
            .get(&handle)
            .map(|d| d.received.clone())
            .unwrap_or_default()
    }
}

impl NetSubsystem for SimKernel {
    fn alloc_etherdev(&self, owner: DeviceId, info: &NetDeviceInfo) -> DriverResult<NetHandle> {
        self.fault(FaultPoint::AllocEtherdev)?;
        let mut s = self.net.lock();
        s.next += 1;
        let handle = NetHandle::from(s.next);
        s.devs.insert(
            handle,
            NetDev {
                owner,
                info: info.clone(),
                ops: None,
                flags: info.flags,
                queue_active: false,
                received: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn free_netdev(&self, handle: NetHandle) -> DriverResult {
        {
            let mut s = self.net.lock();
            match s.devs.get(&handle) {
                None => return Err(DriverError::NotFound),
                Some(d) if d.ops.is_some() => return Err(DriverError::Busy),
                Some(_) => {}
            }
            s.devs.remove(&handle);
        }
        self.log_release("free_netdev");
        Ok(())
    }

    fn register_netdev(&self, handle: NetHandle, ops: Arc<dyn NetDeviceOps>) -> DriverResult {
        self.fault(FaultPoint::RegisterNetdev)?;
        let mut s = self.net.lock();
        let d = s.dev_mut(handle).ok_or(DriverError::NotFound)?;
        if d.ops.is_some() {
            return Err(DriverError::Busy);
        }
        d.ops = Some(ops);
        info!("{handle}: registered {} ({})", d.info.name, d.info.mac);
        Ok(())
    }

    fn unregister_netdev(&self, handle: NetHandle) -> DriverResult {
        let (ops, was_up) = {
            let mut s = self.net.lock();
            let d = s.dev_mut(handle).ok_or(DriverError::NotFound)?;
            let ops = d.ops.take().ok_or(DriverError::NotFound)?;
            let was_up = d.flags.contains(NetFlags::UP);
            d.flags.remove(NetFlags::UP);
            (ops, was_up)
        };
        if was_up {
            debug!("{handle}: stopping before unregister");
            ops.stop()?;
        }
        self.log_release("unregister_netdev");
        Ok(())
    }

    fn carrier_on(&self, handle: NetHandle) {
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.flags.insert(NetFlags::RUNNING);
        }
    }

    fn carrier_off(&self, handle: NetHandle) {
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.flags.remove(NetFlags::RUNNING);
        }
    }

    fn start_queue(&self, handle: NetHandle) {
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.queue_active = true;
        }
    }

    fn stop_queue(&self, handle: NetHandle) {
        if let Some(d) = self.net.lock().dev_mut(handle) {
            d.queue_active = false;
        }
    }

    fn netif_rx(&self, handle: NetHandle, frame: Frame) {
        match self.net.lock().dev_mut(handle) {
            Some(d) => d.received.push(frame.data().to_vec()),
            None => trace!("{handle}: rx frame of {} bytes dropped", frame.len()),
        }
    }
}
