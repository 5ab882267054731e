//! Virtual Ethernet device.
//!
//! Nothing leaves the machine. Transmitted frames are classified: UDP to the
//! target port is counted, everything else is dropped. With the `loopback`
//! property set, accepted frames come back in through the receive path.

use alloc::{
    string::ToString,
    sync::{Arc, Weak},
    vec::Vec,
};

use driver_interface::{
    DriverError, DriverResult, Frame, MacAddr, NetDeviceInfo, NetDeviceOps, NetFlags, NetHandle,
    NetStats, NetSubsystem, PropertyValue, TxStatus, KernelServices,
};
use log::{Level, debug, info, log_enabled, warn};
use rdrive::{
    BindError, DeviceInstance, DriverRegister, ProbeContext, ProbeKind, PropertyPolicy,
    resource::{NetDeviceObject, NetRegistration},
};

mod classifier;

pub use classifier::{PORTNUM, PacketClassifier, Reject, Verdict};

pub const INTF_NAME: &str = "veth";
pub const VETH_MAC: MacAddr = MacAddr([0x48, 0x0F, 0x0E, 0x0D, 0x0A, 0x02]);
pub const WATCHDOG_TIMEO_MS: u32 = 8_000;

const KINDS: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["demo,veth"],
    on_probe: probe,
}];

pub const VETH: DriverRegister = DriverRegister {
    name: "veth",
    probe_kinds: KINDS,
    property_policy: PropertyPolicy::WarnAndContinue,
    on_remove: Some(remove),
};

fn probe(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    let id = ctx.id();
    crate::validate_match(ctx, KINDS)?;

    let port = match ctx.property_int("target-port")? {
        None => PORTNUM,
        Some(p) => u16::try_from(p)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| BindError::InvalidProperty {
                name: "target-port".into(),
                reason: alloc::format!("{p} is not a port number"),
            })?,
    };
    let loopback = match ctx.property("loopback")? {
        Some(PropertyValue::Int(v)) => v != 0,
        Some(PropertyValue::Str(s)) => matches!(s.as_str(), "on" | "true" | "yes"),
        None => false,
    };

    if !VETH_MAC.is_valid_ether_addr() {
        warn!("[{id}] {INTF_NAME}: invalid MAC address {VETH_MAC}, set one before use");
    }
    let info = NetDeviceInfo {
        name: INTF_NAME.to_string(),
        mac: VETH_MAC,
        flags: NetFlags::BROADCAST | NetFlags::MULTICAST | NetFlags::NOARP,
        watchdog_timeo_ms: WATCHDOG_TIMEO_MS,
    };

    let obj = ctx.acquire("alloc_etherdev", |k| {
        NetDeviceObject::alloc_etherdev(k, id, info)
    })?;
    let handle = ctx
        .resource(obj)
        .map(|o| o.handle())
        .ok_or(BindError::ConfigurationMissing("net device".into()))?;

    let veth = Arc::new(VethDevice {
        instance: Arc::downgrade(ctx.instance()),
        services: ctx.services().clone(),
        handle,
        classifier: PacketClassifier::udp(port),
        loopback,
    });
    ctx.set_drvdata(veth.clone());

    ctx.register("register_netdev", |k| NetRegistration::register(k, handle, veth))?;
    info!("[{id}] {INTF_NAME} ({VETH_MAC}) up for udp port {port}, loopback {loopback}");
    Ok(())
}

fn remove(dev: &DeviceInstance) {
    let s = dev.stats();
    info!(
        "[{}] {INTF_NAME} removed: tx {} pkts / {} bytes, rx {} pkts / {} bytes",
        dev.id(),
        s.tx_packets,
        s.tx_bytes,
        s.rx_packets,
        s.rx_bytes
    );
}

/// Driver state handed to the network subsystem as the device operations.
pub struct VethDevice {
    instance: Weak<DeviceInstance>,
    services: Arc<dyn KernelServices>,
    handle: NetHandle,
    classifier: PacketClassifier,
    loopback: bool,
}

impl VethDevice {
    pub fn handle(&self) -> NetHandle {
        self.handle
    }

    pub fn classifier(&self) -> &PacketClassifier {
        &self.classifier
    }

    fn net(&self) -> DriverResult<&dyn NetSubsystem> {
        self.services.net().ok_or(DriverError::NotSupported)
    }

    /// Emulated receive: hands `data` back to the stack as a new frame.
    fn rx(&self, dev: &DeviceInstance, data: Vec<u8>) {
        let Ok(net) = self.net() else {
            return;
        };
        let len = data.len() as u64;
        dev.update_stats(|s| {
            s.rx_packets += 1;
            s.rx_bytes += len;
        });
        net.netif_rx(self.handle, Frame::new(data));
    }
}

impl NetDeviceOps for VethDevice {
    fn open(&self) -> DriverResult {
        let net = self.net()?;
        net.carrier_on(self.handle);
        net.start_queue(self.handle);
        debug!("{INTF_NAME}: open");
        Ok(())
    }

    fn stop(&self) -> DriverResult {
        let net = self.net()?;
        net.stop_queue(self.handle);
        net.carrier_off(self.handle);
        debug!("{INTF_NAME}: stop");
        Ok(())
    }

    fn start_xmit(&self, frame: Frame) -> TxStatus {
        let Some(dev) = self.instance.upgrade() else {
            return TxStatus::Ok;
        };

        if log_enabled!(Level::Debug) && self.classifier.classify(frame.data()).is_accepted() {
            self.services.hex_dump(INTF_NAME, frame.data());
        }
        let echo = self.loopback.then(|| frame.data().to_vec());

        match self.classifier.classify_and_account(&dev, frame) {
            Verdict::Accepted => {
                info!("[{}] udp frame to port {} sent", dev.id(), self.classifier.port());
                if let Some(data) = echo {
                    self.rx(&dev, data);
                }
            }
            Verdict::Rejected(r) => debug!("[{}] frame dropped: {r:?}", dev.id()),
        }
        TxStatus::Ok
    }

    fn get_stats(&self) -> NetStats {
        self.instance
            .upgrade()
            .map(|d| d.stats().net())
            .unwrap_or_default()
    }

    fn tx_timeout(&self, queue: u32) {
        warn!("{INTF_NAME}: tx timed out on queue {queue}");
    }
}
