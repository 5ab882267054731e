use anyhow::{Result, bail, ensure};
use bus_drivers::{
    pci_skeleton,
    pushbtn::{PUSHBTN, PUSHBTN_SIMPLE},
    veth::{self, VethDevice},
};
use log::{info, warn};
use rdrive::{
    DeviceInstance,
    driver_interface::{
        FrameAllocator, TxStatus,
        net::{ETH_P_IP, IPPROTO_TCP, IPPROTO_UDP},
    },
};
use sim_kernel::{Board, BoardConfig};

pub fn run(board: &Board, cfg: &BoardConfig, presses: u32, interrupts: u32) -> Result<()> {
    let report = board.probe_all();
    for (id, e) in &report.failed {
        warn!("[{id}] not bound: {e}");
    }

    for dev in board.engine().instances() {
        match dev.driver_name() {
            n if n == PUSHBTN.name || n == PUSHBTN_SIMPLE.name => {
                press(board, cfg, &dev, presses)
            }
            pci_skeleton::DRV_NAME => {
                for cause in 0..interrupts {
                    board.kernel().pci_raise(dev.id(), 1 << (cause % 32));
                }
            }
            n if n == veth::VETH.name => send(board, &dev)?,
            other => info!("[{}] nothing to exercise for {other}", dev.id()),
        }
    }

    print_stats(board);

    let reports = board.shutdown();
    let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
    let held = board.kernel().held();
    info!("{} devices unbound, {failures} release failures", reports.len());
    ensure!(held == 0, "{held} kernel objects still held after shutdown");
    if failures > 0 {
        bail!("{failures} release failures");
    }
    Ok(())
}

fn press(board: &Board, cfg: &BoardConfig, dev: &DeviceInstance, presses: u32) {
    let lines = cfg
        .devices
        .iter()
        .filter(|d| d.name == dev.descriptor().name)
        .flat_map(|d| d.gpios.iter().map(|g| g.line));
    for line in lines {
        for _ in 0..presses {
            board.kernel().drive_line(line, true);
            board.kernel().drive_line(line, false);
        }
    }
}

fn send(board: &Board, dev: &DeviceInstance) -> Result<()> {
    let k = board.kernel();
    let Some(handle) = k.netdev(dev.id()) else {
        bail!("[{}] bound without a net device", dev.id());
    };
    let port = dev
        .drvdata::<VethDevice>()
        .map(|v| v.classifier().port())
        .unwrap_or(veth::PORTNUM);

    k.net_open(handle)?;
    let pool = FrameAllocator::new();
    for (proto, payload) in [
        (IPPROTO_UDP, &b"hey, veth, wassup"[..]),
        (IPPROTO_TCP, &b"not for us"[..]),
        (IPPROTO_UDP, &b"second datagram"[..]),
    ] {
        if k.net_xmit(handle, pool.alloc(ipv4_frame(proto, port, payload)))? == TxStatus::Busy {
            warn!("[{}] tx queue busy", dev.id());
        }
    }
    k.net_stop(handle)?;

    ensure!(
        pool.outstanding() == 0,
        "{} frames not freed",
        pool.outstanding()
    );
    info!(
        "[{}] {} frames sent, {} came back",
        dev.id(),
        pool.allocated(),
        k.net_received(handle).len()
    );
    Ok(())
}

fn print_stats(board: &Board) {
    println!(
        "{:<6} {:<20} {:<16} {:>6} {:>8} {:>8} {:>8} {:>8}",
        "id", "device", "driver", "events", "tx_pkts", "tx_bytes", "rx_pkts", "rx_bytes"
    );
    for dev in board.engine().instances() {
        let s = dev.stats();
        println!(
            "{:<6} {:<20} {:<16} {:>6} {:>8} {:>8} {:>8} {:>8}",
            dev.id().to_string(),
            dev.descriptor().name,
            dev.driver_name(),
            s.events,
            s.tx_packets,
            s.tx_bytes,
            s.rx_packets,
            s.rx_bytes
        );
    }
}

/// Ethernet II, IPv4 without options, then an 8-byte transport header.
fn ipv4_frame(proto: u8, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::with_capacity(42 + payload.len());
    f.extend_from_slice(&veth::VETH_MAC.0);
    f.extend_from_slice(&[0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
    f.extend_from_slice(&ETH_P_IP.to_be_bytes());
    f.extend_from_slice(&[0x45, 0x00]);
    f.extend_from_slice(&((28 + payload.len()) as u16).to_be_bytes());
    f.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 0x40, proto, 0x00, 0x00]);
    f.extend_from_slice(&[10, 0, 2, 15, 10, 0, 2, 2]);
    f.extend_from_slice(&0x8452u16.to_be_bytes());
    f.extend_from_slice(&dport.to_be_bytes());
    f.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    f.extend_from_slice(&[0, 0]);
    f.extend_from_slice(payload);
    f
}
