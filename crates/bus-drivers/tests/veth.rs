use std::{sync::Arc, thread};

use bus_drivers::veth::{INTF_NAME, PORTNUM, VETH_MAC, VethDevice};
use rdrive::{
    BindError,
    driver_interface::{
        FrameAllocator, NetFlags, NetHandle, NetStats, TxStatus,
        net::{ETH_P_IP, IPPROTO_TCP, IPPROTO_UDP},
    },
};
use sim_kernel::{Board, BoardConfig};

fn board(properties: &str) -> Board {
    board_with("", properties)
}

fn board_with(policies: &str, properties: &str) -> Board {
    let _ = env_logger::builder().is_test(true).try_init();
    let text = format!(
        "{policies}\n[[devices]]\nname = \"veth0\"\ncompatible = \"demo,veth\"\n\
         properties = {{ {properties} }}\n"
    );
    let cfg: BoardConfig = text.parse().unwrap();
    Board::new(&cfg, &bus_drivers::registers()).unwrap()
}

/// Ethernet II + IPv4 without options + 8-byte transport header + payload.
fn frame(proto: u8, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::new();
    f.extend_from_slice(&VETH_MAC.0);
    f.extend_from_slice(&[0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
    f.extend_from_slice(&ETH_P_IP.to_be_bytes());
    f.extend_from_slice(&[0x45, 0x00]);
    f.extend_from_slice(&((28 + payload.len()) as u16).to_be_bytes());
    f.extend_from_slice(&[0x4a, 0x4e, 0x40, 0x00, 0x40, proto, 0x00, 0x00]);
    f.extend_from_slice(&[10, 0, 2, 15, 192, 168, 1, 201]);
    f.extend_from_slice(&0x8452u16.to_be_bytes());
    f.extend_from_slice(&dport.to_be_bytes());
    f.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    f.extend_from_slice(&[0, 0]);
    f.extend_from_slice(payload);
    f
}

fn up(board: &Board) -> NetHandle {
    board.probe_all();
    let id = board.device_id("veth0").unwrap();
    let handle = board.kernel().netdev(id).unwrap();
    board.kernel().net_open(handle).unwrap();
    handle
}

#[test]
fn test_registration_and_open() {
    let board = board("");
    let id = board.device_id("veth0").unwrap();
    assert_eq!(board.probe_all().bound, [id]);

    let k = board.kernel();
    let handle = k.netdev(id).unwrap();
    let info = k.netdev_info(handle).unwrap();
    assert_eq!(info.name, INTF_NAME);
    assert_eq!(info.mac, VETH_MAC);
    assert_eq!(info.watchdog_timeo_ms, 8_000);
    assert!(k.netdev_flags(handle).contains(NetFlags::NOARP));
    assert!(!k.netdev_queue_active(handle));

    k.net_open(handle).unwrap();
    assert!(k.netdev_flags(handle).contains(NetFlags::UP | NetFlags::RUNNING));
    assert!(k.netdev_queue_active(handle));
    k.net_tx_timeout(handle, 0).unwrap();

    let veth = board
        .engine()
        .instance(id)
        .and_then(|d| d.drvdata::<VethDevice>())
        .unwrap();
    assert_eq!(veth.handle(), handle);
    assert_eq!(veth.classifier().port(), PORTNUM);

    k.net_stop(handle).unwrap();
    assert!(!k.netdev_flags(handle).contains(NetFlags::RUNNING));
    assert!(!k.netdev_queue_active(handle));
}

#[test]
fn test_rejected_frame_is_freed_uncounted() {
    let board = board("");
    let handle = up(&board);
    let k = board.kernel();
    let pool = FrameAllocator::new();

    let tcp = pool.alloc(frame(IPPROTO_TCP, PORTNUM, b"hello"));
    assert_eq!(k.net_xmit(handle, tcp), Ok(TxStatus::Ok));
    let udp_elsewhere = pool.alloc(frame(IPPROTO_UDP, 53, b"hello"));
    assert_eq!(k.net_xmit(handle, udp_elsewhere), Ok(TxStatus::Ok));

    assert_eq!(k.net_stats(handle), Some(NetStats::default()));
    assert_eq!(pool.allocated(), 2);
    assert_eq!(pool.freed(), 2);
}

#[test]
fn test_accepted_frame_is_counted() {
    let board = board("");
    let handle = up(&board);
    let k = board.kernel();
    let pool = FrameAllocator::new();

    let data = frame(IPPROTO_UDP, PORTNUM, b"hey, veth, wassup");
    let len = data.len() as u64;
    assert_eq!(k.net_xmit(handle, pool.alloc(data)), Ok(TxStatus::Ok));

    let stats = k.net_stats(handle).unwrap();
    assert_eq!(stats.tx_packets, 1);
    assert_eq!(stats.tx_bytes, len);
    assert_eq!(stats.rx_packets, 0);
    assert_eq!(pool.outstanding(), 0);
    assert!(k.net_received(handle).is_empty());

    let id = board.device_id("veth0").unwrap();
    assert_eq!(board.engine().get_stats(id).unwrap().net(), stats);
}

#[test]
fn test_down_interface_still_frees() {
    let board = board("");
    board.probe_all();
    let k = board.kernel();
    let handle = k.netdev(board.device_id("veth0").unwrap()).unwrap();
    let pool = FrameAllocator::new();

    assert!(k.net_xmit(handle, pool.alloc(frame(IPPROTO_UDP, PORTNUM, b""))).is_err());
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(k.net_stats(handle).unwrap().tx_packets, 0);
}

#[test]
fn test_loopback_and_port_override() {
    let board = board("loopback = \"on\", target-port = 9999");
    let handle = up(&board);
    let k = board.kernel();
    let pool = FrameAllocator::new();

    let data = frame(IPPROTO_UDP, 9999, b"ping");
    assert_eq!(k.net_xmit(handle, pool.alloc(data.clone())), Ok(TxStatus::Ok));
    assert_eq!(k.net_xmit(handle, pool.alloc(frame(IPPROTO_UDP, PORTNUM, b"x"))), Ok(TxStatus::Ok));

    assert_eq!(k.net_received(handle), [data.clone()]);
    let stats = k.net_stats(handle).unwrap();
    assert_eq!(stats.tx_packets, 1);
    assert_eq!(stats.rx_packets, 1);
    assert_eq!(stats.rx_bytes, data.len() as u64);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_bad_port_is_invalid() {
    let board = board("target-port = 70000");
    let report = board.probe_all();
    assert!(matches!(
        report.failed[0].1,
        BindError::InvalidProperty { ref name, .. } if name == "target-port"
    ));
    assert_eq!(board.kernel().held(), 0);
}

#[test]
fn test_fail_closed_override_needs_port() {
    let board = board_with("[policies]\nveth = \"FailClosed\"", "loopback = \"on\"");
    let k = board.kernel();
    let report = board.probe_all();
    assert!(report.bound.is_empty());
    assert!(matches!(
        report.failed[0].1,
        BindError::ConfigurationMissing(ref p) if p == "target-port"
    ));
    assert_eq!(k.held(), 0);
    assert!(k.releases().is_empty());
}

#[test]
fn test_fail_closed_override_binds_when_set() {
    let board = board_with(
        "[policies]\nveth = \"FailClosed\"",
        "loopback = \"off\", target-port = 4242",
    );
    let handle = up(&board);
    let id = board.device_id("veth0").unwrap();
    let veth = board
        .engine()
        .instance(id)
        .and_then(|d| d.drvdata::<VethDevice>())
        .unwrap();
    assert_eq!(veth.classifier().port(), 4242);

    let pool = FrameAllocator::new();
    let k = board.kernel();
    let data = frame(IPPROTO_UDP, 4242, b"x");
    assert_eq!(k.net_xmit(handle, pool.alloc(data)), Ok(TxStatus::Ok));
    assert!(k.net_received(handle).is_empty());
    assert_eq!(k.net_stats(handle).unwrap().tx_packets, 1);
}

#[test]
fn test_unbind_while_up() {
    let board = board("");
    let handle = up(&board);
    let k = board.kernel();
    k.clear_releases();

    let reports = board.shutdown();
    assert!(reports[0].is_clean());
    assert_eq!(k.releases(), ["unregister_netdev", "free_netdev"]);
    assert_eq!(k.held(), 0);
    assert!(k.net_stats(handle).is_none());
}

#[test]
fn test_stats_reads_are_consistent() {
    let board = board("");
    let handle = up(&board);
    let data = frame(IPPROTO_UDP, PORTNUM, &[0xa5; 64]);
    let len = data.len() as u64;
    let pool = FrameAllocator::new();

    let writer = {
        let k = board.kernel().clone();
        let pool = pool.clone();
        let data = data.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                k.net_xmit(handle, pool.alloc(data.clone())).unwrap();
            }
        })
    };
    let reader = {
        let k = Arc::clone(board.kernel());
        thread::spawn(move || {
            for _ in 0..2000 {
                let s = k.net_stats(handle).unwrap();
                assert_eq!(s.tx_bytes, s.tx_packets * len);
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();

    let s = board.kernel().net_stats(handle).unwrap();
    assert_eq!(s.tx_packets, 2000);
    assert_eq!(pool.outstanding(), 0);
}
