use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use rdrive::{
    BindError, BindingEngine, DeviceInstance, DeviceState, DriverRegister, HandlerFault,
    ProbeContext, ProbeKind, PropertyPolicy, ResourceKind,
    driver_interface::{
        CompatibleKey, DeviceDescriptor, DeviceId, Direction, DriverError, DriverResult, EventKind,
        GpioController, GpioDesc, InputEvent, InputHandle, InputInfo, InputSubsystem, IrqAction,
        IrqChip, IrqConfig, IrqId, KernelServices, Trigger,
    },
    resource::{InputDeviceObject, InputLine, InputRegistration},
};

/// In-memory kernel that logs every release and counts what is held.
#[derive(Default)]
struct MockKernel {
    log: Mutex<Vec<&'static str>>,
    held: AtomicUsize,
    next: AtomicU32,
    actions: Mutex<BTreeMap<IrqId, Arc<dyn IrqAction>>>,
    fail_register: AtomicBool,
}

impl MockKernel {
    fn take(&self) -> u32 {
        self.held.fetch_add(1, Ordering::SeqCst);
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn put(&self, what: &'static str) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(what);
    }

    fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    fn releases(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    fn fire(&self, irq: IrqId) -> bool {
        let action = self.actions.lock().unwrap().get(&irq).cloned();
        match action {
            Some(a) => {
                a.handle(irq);
                true
            }
            None => false,
        }
    }
}

impl GpioController for MockKernel {
    fn gpiod_get(&self, _dev: DeviceId, _con_id: &str, _dir: Direction) -> DriverResult<GpioDesc> {
        Ok(GpioDesc::from(self.take()))
    }

    fn gpiod_put(&self, _desc: GpioDesc) -> DriverResult {
        self.put("gpiod_put");
        Ok(())
    }

    fn get_value(&self, _desc: GpioDesc) -> DriverResult<bool> {
        Ok(true)
    }

    fn to_irq(&self, desc: GpioDesc) -> DriverResult<IrqId> {
        Ok(IrqId::from(desc.raw() as usize + 100))
    }
}

impl IrqChip for MockKernel {
    fn request_irq(
        &self,
        cfg: &IrqConfig,
        _name: &str,
        action: Arc<dyn IrqAction>,
    ) -> DriverResult {
        self.take();
        self.actions.lock().unwrap().insert(cfg.irq, action);
        Ok(())
    }

    fn disable_irq(&self, _irq: IrqId) {}

    fn free_irq(&self, irq: IrqId) -> DriverResult {
        self.actions.lock().unwrap().remove(&irq);
        self.put("free_irq");
        Ok(())
    }
}

impl InputSubsystem for MockKernel {
    fn allocate_device(&self, _owner: DeviceId, _info: &InputInfo) -> DriverResult<InputHandle> {
        Ok(InputHandle::from(self.take()))
    }

    fn free_device(&self, _handle: InputHandle) -> DriverResult {
        self.put("free_device");
        Ok(())
    }

    fn register_device(&self, _handle: InputHandle) -> DriverResult {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(DriverError::Busy);
        }
        self.take();
        Ok(())
    }

    fn unregister_device(&self, _handle: InputHandle) -> DriverResult {
        self.put("unregister_device");
        Ok(())
    }

    fn report_event(&self, _handle: InputHandle, _event: InputEvent) {}
}

impl KernelServices for MockKernel {
    fn gpio(&self) -> Option<&dyn GpioController> {
        Some(self)
    }

    fn irq_chip(&self) -> Option<&dyn IrqChip> {
        Some(self)
    }

    fn input(&self) -> Option<&dyn InputSubsystem> {
        Some(self)
    }
}

fn info() -> InputInfo {
    InputInfo {
        name: "test-button".into(),
        phys: "test/input0".into(),
        capability: (EventKind::Key, 28),
    }
}

fn count_event(dev: &DeviceInstance, _irq: IrqId) -> Result<(), HandlerFault> {
    dev.update_stats(|s| s.events += 1);
    Ok(())
}

/// line, device object, event registration.
fn probe_three(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    let id = ctx.id();
    let line = ctx.acquire("line", |k| InputLine::get(k, id, "btn"))?;
    let desc = ctx
        .resource(line)
        .map(|l| l.desc())
        .ok_or(BindError::ConfigurationMissing("line".into()))?;
    let irq = ctx
        .services()
        .gpio()
        .ok_or(BindError::ConfigurationMissing("gpio".into()))?
        .to_irq(desc)
        .map_err(|source| BindError::ResourceUnavailable {
            step: "line irq",
            kind: ResourceKind::EventLine,
            source,
        })?;
    ctx.acquire("device object", |k| InputDeviceObject::allocate(k, id, &info()))?;
    ctx.request_event(
        "event",
        IrqConfig {
            irq,
            trigger: Trigger::EdgeBoth,
        },
        "test-button",
        count_event,
    )
}

/// Acquires a line, then asks for a required property.
fn probe_needs_purpose(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    let id = ctx.id();
    ctx.acquire("line", |k| InputLine::get(k, id, "btn"))?;
    ctx.property("purpose")?;
    Ok(())
}

/// Everything, then a registration that may fail.
fn probe_with_registration(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    probe_three(ctx)?;
    let id = ctx.id();
    let handle = ctx.acquire("second object", |k| InputDeviceObject::allocate(k, id, &info()))?;
    let handle = ctx.resource(handle).map(|o| o.handle()).ok_or(BindError::NoMatch(id))?;
    ctx.register("register", |k| InputRegistration::register(k, handle))?;
    Ok(())
}

fn probe_two_events(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    probe_three(ctx)?;
    ctx.request_event(
        "second event",
        IrqConfig {
            irq: IrqId::from(1usize),
            trigger: Trigger::EdgeRising,
        },
        "again",
        count_event,
    )
}

static STARTED: AtomicBool = AtomicBool::new(false);
static FINISHED: AtomicBool = AtomicBool::new(false);

fn slow_event(dev: &DeviceInstance, _irq: IrqId) -> Result<(), HandlerFault> {
    STARTED.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    dev.update_stats(|s| s.events += 1);
    FINISHED.store(true, Ordering::SeqCst);
    Ok(())
}

fn probe_slow(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    let id = ctx.id();
    let line = ctx.acquire("line", |k| InputLine::get(k, id, "btn"))?;
    let desc = ctx.resource(line).map(|l| l.desc()).ok_or(BindError::NoMatch(id))?;
    ctx.request_event(
        "event",
        IrqConfig {
            irq: IrqId::from(desc.raw() as usize + 100),
            trigger: Trigger::EdgeBoth,
        },
        "slow",
        slow_event,
    )
}

static REMOVED: AtomicUsize = AtomicUsize::new(0);

fn on_remove(_dev: &DeviceInstance) {
    REMOVED.fetch_add(1, Ordering::SeqCst);
}

fn driver(
    name: &'static str,
    kinds: &'static [ProbeKind],
    policy: PropertyPolicy,
) -> DriverRegister {
    DriverRegister {
        name,
        probe_kinds: kinds,
        property_policy: policy,
        on_remove: Some(on_remove),
    }
}

static THREE: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["test,three"],
    on_probe: probe_three,
}];
static PURPOSE: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["test,purpose"],
    on_probe: probe_needs_purpose,
}];
static REGISTERED: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["test,registered"],
    on_probe: probe_with_registration,
}];
static TWO_EVENTS: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["test,two-events"],
    on_probe: probe_two_events,
}];
static SLOW: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["test,slow"],
    on_probe: probe_slow,
}];

fn setup() -> (Arc<MockKernel>, BindingEngine) {
    let _ = env_logger::builder().is_test(true).try_init();
    let kernel = Arc::new(MockKernel::default());
    let engine = BindingEngine::new(kernel.clone());
    engine.append_register(&[
        driver("three", THREE, PropertyPolicy::FailClosed),
        driver("purpose", PURPOSE, PropertyPolicy::FailClosed),
        driver("registered", REGISTERED, PropertyPolicy::FailClosed),
        driver("two-events", TWO_EVENTS, PropertyPolicy::FailClosed),
        driver("slow", SLOW, PropertyPolicy::FailClosed),
    ]);
    (kernel, engine)
}

fn device(id: u64, compatible: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(
        DeviceId::from(id),
        "dev",
        CompatibleKey::Compatible(compatible.into()),
    )
}

#[test]
fn test_missing_property_fail_closed() {
    let (kernel, engine) = setup();
    let desc = device(1, "test,purpose");

    let err = engine.bind(&desc).unwrap_err();
    assert_eq!(err, BindError::ConfigurationMissing("purpose".into()));
    assert_eq!(kernel.held(), 0);
    assert_eq!(kernel.releases(), ["gpiod_put"]);
    assert!(engine.instance(desc.device_id).is_none());

    // a failed bind leaves the device bindable
    engine.set_property_policy("purpose", PropertyPolicy::WarnAndContinue);
    let inst = engine.bind(&desc).unwrap();
    assert_eq!(inst.state(), DeviceState::Bound);
    assert_eq!(kernel.held(), 1);
}

#[test]
fn test_unbind_releases_in_reverse() {
    let (kernel, engine) = setup();
    let desc = device(2, "test,three");

    let inst = engine.bind(&desc).unwrap();
    assert_eq!(inst.resource_steps(), ["line", "device object", "event"]);
    assert_eq!(kernel.held(), 3);

    let report = engine.unbind(desc.device_id).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.released, 3);
    assert_eq!(kernel.releases(), ["free_irq", "free_device", "gpiod_put"]);
    assert_eq!(kernel.held(), 0);
    assert_eq!(inst.state(), DeviceState::Unbound);
    assert!(inst.resource_steps().is_empty());
}

#[test]
fn test_failed_registration_unwinds_everything() {
    let (kernel, engine) = setup();
    kernel.fail_register.store(true, Ordering::SeqCst);
    let desc = device(3, "test,registered");

    let err = engine.bind(&desc).unwrap_err();
    assert_eq!(err.step(), Some("register"));
    assert!(matches!(err, BindError::RegistrationFailed { .. }));
    assert_eq!(kernel.held(), 0);
    assert_eq!(
        kernel.releases(),
        ["free_device", "free_irq", "free_device", "gpiod_put"]
    );
}

#[test]
fn test_second_dispatcher_refused() {
    let (kernel, engine) = setup();
    let err = engine.bind(&device(4, "test,two-events")).unwrap_err();
    assert_eq!(
        err,
        BindError::ResourceUnavailable {
            step: "second event",
            kind: ResourceKind::EventRegistration,
            source: DriverError::Busy,
        }
    );
    assert_eq!(kernel.held(), 0);
}

#[test]
fn test_events_counted_only_while_bound() {
    let (kernel, engine) = setup();
    let desc = device(5, "test,three");
    let inst = engine.bind(&desc).unwrap();

    // first line handed out is gpio1, so the event line is 101
    let irq = IrqId::from(101usize);
    assert!(kernel.fire(irq));
    assert!(kernel.fire(irq));
    assert_eq!(engine.get_stats(desc.device_id).unwrap().events, 2);

    engine.unbind(desc.device_id).unwrap();
    assert!(!kernel.fire(irq));
    assert_eq!(inst.stats().events, 2);
}

#[test]
fn test_unbind_waits_for_running_handler() {
    let (kernel, engine) = setup();
    let desc = device(6, "test,slow");
    let inst = engine.bind(&desc).unwrap();

    let k = kernel.clone();
    let t = thread::spawn(move || k.fire(IrqId::from(101usize)));
    while !STARTED.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    engine.unbind(desc.device_id).unwrap();
    assert!(FINISHED.load(Ordering::SeqCst));
    assert_eq!(inst.stats().events, 1);
    assert!(t.join().unwrap());
    assert_eq!(kernel.held(), 0);
    assert_eq!(inst.stats().events, 1);
}

#[test]
fn test_bind_errors_have_no_side_effects() {
    let (kernel, engine) = setup();

    let unknown = device(7, "test,unknown");
    assert_eq!(engine.matches(&unknown), None);
    assert_eq!(engine.bind(&unknown).unwrap_err(), BindError::NoMatch(unknown.device_id));
    assert_eq!(kernel.held(), 0);

    let desc = device(8, "test,three");
    assert_eq!(engine.matches(&desc), Some("three"));
    engine.bind(&desc).unwrap();
    assert_eq!(engine.bind(&desc).unwrap_err(), BindError::AlreadyBound(desc.device_id));
    assert_eq!(kernel.held(), 3);

    assert_eq!(
        engine.unbind(DeviceId::from(99u64)).unwrap_err(),
        BindError::NotBound(DeviceId::from(99u64))
    );
    engine.unbind(desc.device_id).unwrap();
    assert_eq!(
        engine.unbind(desc.device_id).unwrap_err(),
        BindError::NotBound(desc.device_id)
    );
}

#[test]
fn test_unbind_all_reverse_order() {
    let (kernel, engine) = setup();
    let before = REMOVED.load(Ordering::SeqCst);
    engine.bind(&device(10, "test,three")).unwrap();
    engine.bind(&device(11, "test,three")).unwrap();
    assert_eq!(engine.instances().len(), 2);

    let reports = engine.unbind_all();
    let order: Vec<_> = reports.iter().map(|r| r.device).collect();
    assert_eq!(order, [DeviceId::from(11u64), DeviceId::from(10u64)]);
    assert!(engine.instances().is_empty());
    assert_eq!(kernel.held(), 0);
    assert!(REMOVED.load(Ordering::SeqCst) >= before + 2);
}
