use rdrive::{
    BindError,
    driver_interface::{InputEvent, IrqReturn, input::KEY_ENTER},
};
use sim_kernel::{Board, BoardConfig, FaultPoint};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const BUTTONS: &str = r#"
[[devices]]
name = "pushbutton_device"
compatible = "demo,pushbutton"
properties = { purpose = "launch button" }
gpios = [{ con_id = "pushbtn", line = 17, active_low = true }]

[[devices]]
name = "pushbutton_simple"
compatible = "demo,pushbutton-simple"
gpios = [{ con_id = "pushbtn", line = 18 }]
"#;

const NO_PURPOSE: &str = r#"
[[devices]]
name = "pushbutton_device"
compatible = "demo,pushbutton"
gpios = [{ con_id = "pushbtn", line = 17 }]
"#;

fn board(text: &str) -> Board {
    init_log();
    let cfg: BoardConfig = text.parse().unwrap();
    Board::new(&cfg, &bus_drivers::registers()).unwrap()
}

fn press() -> InputEvent {
    InputEvent::key(KEY_ENTER, true)
}

fn release() -> InputEvent {
    InputEvent::key(KEY_ENTER, false)
}

#[test]
fn test_both_variants_bind_and_report() {
    let board = board(BUTTONS);
    let report = board.probe_all();
    assert_eq!(report.bound.len(), 2);
    assert!(report.failed.is_empty());

    let k = board.kernel();
    let strict = board.device_id("pushbutton_device").unwrap();
    let simple = board.device_id("pushbutton_simple").unwrap();

    let dev = board.engine().instance(strict).unwrap();
    assert_eq!(dev.driver_name(), "pushbtn");
    assert_eq!(
        dev.resource_steps(),
        [
            "gpiod_get",
            "gpiod_to_irq",
            "input_allocate_device",
            "request_irq",
            "input_register_device"
        ]
    );
    assert_eq!(board.engine().instance(simple).unwrap().driver_name(), "pushbtn_simple");

    let strict_input = k.input_handle(strict).unwrap();
    let simple_input = k.input_handle(simple).unwrap();
    let info = k.input_info(strict_input).unwrap();
    assert_eq!(info.name, "GPIO PushButton");
    assert_eq!(info.phys, "pushbtn/input0");
    assert!(k.input_registered(strict_input));

    for line in [17u32, 18] {
        assert_eq!(k.drive_line(line, true), Some(IrqReturn::Handled));
        assert_eq!(k.drive_line(line, false), Some(IrqReturn::Handled));
    }

    // sync after every event
    assert_eq!(
        k.input_events(strict_input),
        [press(), InputEvent::sync(), release(), InputEvent::sync()]
    );
    // sync on release only
    assert_eq!(
        k.input_events(simple_input),
        [press(), release(), InputEvent::sync()]
    );
    assert_eq!(board.engine().get_stats(strict).unwrap().events, 2);
    assert_eq!(board.engine().get_stats(simple).unwrap().events, 2);
}

#[test]
fn test_unbind_releases_in_reverse() {
    let board = board(BUTTONS);
    board.probe_all();
    let k = board.kernel();
    let strict = board.device_id("pushbutton_device").unwrap();
    k.clear_releases();

    let report = board.bus().remove_device(strict).unwrap().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.released, 5);
    assert_eq!(
        k.releases(),
        ["input_unregister_device", "free_irq", "input_free_device", "gpiod_put"]
    );
    assert!(!k.line_claimed(17));
    assert_eq!(k.drive_line(17, true), None);

    board.shutdown();
    assert_eq!(k.held(), 0);
}

#[test]
fn test_missing_purpose_fails_closed() {
    let board = board(NO_PURPOSE);
    let id = board.device_id("pushbutton_device").unwrap();
    let report = board.probe_all();

    assert!(report.bound.is_empty());
    let (failed, err) = &report.failed[0];
    assert_eq!(*failed, id);
    assert!(matches!(err, BindError::ConfigurationMissing(p) if p == "purpose"));

    let k = board.kernel();
    assert_eq!(k.held(), 0);
    assert_eq!(k.releases(), ["gpiod_put"]);
    assert!(k.input_handle(id).is_none());
}

#[test]
fn test_policy_override_lets_strict_bind() {
    let text = format!("[policies]\npushbtn = \"WarnAndContinue\"\n{NO_PURPOSE}");
    let board = board(&text);
    assert_eq!(board.probe_all().bound.len(), 1);
}

#[test]
fn test_register_failure_unwinds() {
    let board = board(BUTTONS);
    let k = board.kernel();
    k.inject_fault(FaultPoint::InputRegister);

    let strict = board.device_id("pushbutton_device").unwrap();
    let desc = board.bus().descriptor(strict).unwrap();
    let err = board.engine().bind(&desc).unwrap_err();
    assert!(matches!(err, BindError::RegistrationFailed { .. }));
    assert_eq!(err.step(), Some("input_register_device"));
    assert_eq!(k.held(), 0);
    assert_eq!(k.releases(), ["free_irq", "input_free_device", "gpiod_put"]);
    assert_eq!(k.drive_line(17, true), None);

    // the fault fired once, the next attempt binds
    assert!(board.engine().bind(&desc).is_ok());
}
