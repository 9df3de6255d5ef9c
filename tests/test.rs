use axerrno::{ax_err, AxError, AxResult};
use axsensor::{
    Clock, DispatchMode, EarlySuspend, IrqChip, IrqKind, IrqRequest, IrqReturn, PowerManager,
    SensorConfig, SensorCore, SensorDevice, SensorOps, TimeValue, WorkQueue, COMPDONE_IRQ,
    FAR_IRQ, SENSOR_EARLY_SUSPEND_LEVEL,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct TestClock {
    now: Mutex<Duration>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> TimeValue {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct TestIrqChip {
    lines: Mutex<BTreeMap<u32, IrqRequest>>,
    busy: AtomicBool,
}

impl TestIrqChip {
    fn registered(&self, irq: u32) -> Option<IrqKind> {
        self.lines.lock().unwrap().get(&irq).map(|req| req.kind)
    }

    fn fire(&self, irq: u32) -> IrqReturn {
        let Some((handler, kind)) = self
            .lines
            .lock()
            .unwrap()
            .get(&irq)
            .map(|req| (Arc::clone(&req.handler), req.kind))
        else {
            return IrqReturn::None;
        };
        match handler.handle(irq) {
            IrqReturn::WakeThread if kind == IrqKind::Threaded => handler.handle_threaded(irq),
            ret => ret,
        }
    }
}

impl IrqChip for TestIrqChip {
    fn request_irq(&self, request: IrqRequest) -> AxResult {
        if self.busy.load(Ordering::SeqCst) {
            return ax_err!(ResourceBusy, "irq line in use");
        }
        println!("[Test] request_irq: {:?}", request);
        self.lines.lock().unwrap().insert(request.irq, request);
        Ok(())
    }

    fn free_irq(&self, irq: u32) {
        self.lines.lock().unwrap().remove(&irq);
    }
}

struct TestSensor {
    status: AtomicU32,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

impl TestSensor {
    fn new(status: u32) -> Self {
        Self {
            status: AtomicU32::new(status),
            busy: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }
}

impl SensorOps for TestSensor {
    fn refresh_status(&self, _dev: &SensorDevice) -> u32 {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(50));
        self.busy.store(false, Ordering::SeqCst);
        self.status.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TestPowerManager {
    hooks: Mutex<BTreeMap<usize, (u32, Arc<dyn EarlySuspend>)>>,
    next: AtomicUsize,
    pending: AtomicBool,
}

impl TestPowerManager {
    fn hooks(&self) -> Vec<(u32, Arc<dyn EarlySuspend>)> {
        self.hooks.lock().unwrap().values().cloned().collect()
    }
}

impl PowerManager for TestPowerManager {
    fn register_early_suspend(&self, level: u32, hooks: Arc<dyn EarlySuspend>) -> usize {
        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().unwrap().insert(handle, (level, hooks));
        handle
    }

    fn unregister_early_suspend(&self, handle: usize) {
        self.hooks.lock().unwrap().remove(&handle);
    }

    fn suspend_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

struct Rig {
    clock: Arc<TestClock>,
    queue: Arc<WorkQueue>,
    chip: Arc<TestIrqChip>,
    sensor: Arc<TestSensor>,
    line_low: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Rig {
    fn new(status: u32) -> Self {
        let clock = Arc::new(TestClock::new());
        Self {
            queue: Arc::new(WorkQueue::new(clock.clone())),
            clock,
            chip: Arc::new(TestIrqChip::default()),
            sensor: Arc::new(TestSensor::new(status)),
            line_low: Arc::new(AtomicBool::new(true)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn core(&self) -> SensorCore {
        SensorCore::new(self.chip.clone(), self.queue.clone())
    }

    fn device(&self, config: SensorConfig) -> Arc<SensorDevice> {
        let level = Arc::clone(&self.line_low);
        let far = Arc::clone(&self.log);
        let compdone = Arc::clone(&self.log);
        Arc::new(
            SensorDevice::builder(config)
                .ops(self.sensor.clone())
                .line_level(move || level.load(Ordering::SeqCst))
                .init(|_dev| Ok(()))
                .on_status(5, move |_dev| far.lock().unwrap().push("far"))
                .unwrap()
                .on_status(4, move |_dev| compdone.lock().unwrap().push("compdone"))
                .unwrap()
                .build(),
        )
    }

    fn events(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

#[test]
fn test_threaded_dispatch_order() {
    let rig = Rig::new(FAR_IRQ | COMPDONE_IRQ);
    let core = rig.core();
    core.setup(rig.device(SensorConfig::new("sx9500", 7))).unwrap();

    assert_eq!(rig.chip.registered(7), Some(IrqKind::Threaded));
    assert_eq!(rig.chip.fire(7), IrqReturn::Handled);
    assert_eq!(rig.events(), vec!["compdone", "far"]);

    core.teardown().unwrap();
}

#[test]
fn test_registration_failure() {
    let rig = Rig::new(0);
    rig.chip.busy.store(true, Ordering::SeqCst);
    let core = rig.core();
    let dev = rig.device(SensorConfig::new("sx9500", 7));

    assert_eq!(core.setup(dev.clone()), Err(AxError::ResourceBusy));
    assert_eq!(rig.chip.registered(7), None);
    assert!(dev.irq_disabled());
    assert!(!core.is_bound());
}

#[test]
fn test_setup_preconditions() {
    let rig = Rig::new(0);
    let core = rig.core();

    let bare = Arc::new(SensorDevice::builder(SensorConfig::new("sx9500", 7)).build());
    assert_eq!(core.setup(bare), Err(AxError::NoMemory));
    assert_eq!(rig.chip.registered(7), None);

    let no_init = Arc::new(
        SensorDevice::builder(SensorConfig::new("sx9500", 7))
            .ops(rig.sensor.clone())
            .build(),
    );
    assert_eq!(core.setup(no_init), Err(AxError::NoMemory));
    assert!(core.is_bound());
    core.teardown().unwrap();
    assert_eq!(rig.chip.registered(7), None);
}

#[test]
fn test_teardown_stops_repoll() {
    let rig = Rig::new(FAR_IRQ);
    let core = rig.core();
    let config = SensorConfig::new("sx9500", 7).with_irq_timer(Duration::from_millis(100));
    core.setup(rig.device(config)).unwrap();

    rig.chip.fire(7);
    assert_eq!(rig.events().len(), 1);
    rig.line_low.store(false, Ordering::SeqCst);

    core.teardown().unwrap();
    assert_eq!(core.teardown(), Err(AxError::NoMemory));
    assert_eq!(rig.chip.fire(7), IrqReturn::None);

    for _ in 0..5 {
        rig.clock.advance(Duration::from_millis(100));
        rig.queue.run_expired();
    }
    assert_eq!(rig.events().len(), 1);
}

#[test]
fn test_repoll_after_timeout() {
    let rig = Rig::new(FAR_IRQ);
    let core = rig.core();
    let config = SensorConfig::new("sx9500", 7).with_irq_timer(Duration::from_millis(100));
    core.setup(rig.device(config)).unwrap();

    rig.chip.fire(7);
    rig.line_low.store(false, Ordering::SeqCst);

    rig.clock.advance(Duration::from_millis(99));
    assert_eq!(rig.queue.run_expired(), 0);
    assert_eq!(rig.events(), vec!["far"]);

    rig.clock.advance(Duration::from_millis(1));
    assert_eq!(rig.queue.run_expired(), 1);
    assert_eq!(rig.events(), vec!["far", "far"]);

    // The re-poll does not arm another one.
    assert!(rig.queue.is_empty());

    // Neither does a resume.
    core.resume();
    assert_eq!(rig.events().len(), 3);
    assert!(rig.queue.is_empty());

    core.teardown().unwrap();
}

#[test]
fn test_threaded_mutual_exclusion() {
    let rig = Rig::new(FAR_IRQ);
    let core = Arc::new(rig.core());
    core.setup(rig.device(SensorConfig::new("sx9500", 7))).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let chip = Arc::clone(&rig.chip);
            let core = Arc::clone(&core);
            thread::spawn(move || {
                for _ in 0..20 {
                    if i == 0 {
                        core.resume();
                    } else {
                        chip.fire(7);
                    }
                }
            })
        })
        .collect();
    workers.into_iter().for_each(|w| w.join().unwrap());

    assert_eq!(rig.sensor.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(rig.events().len(), 80);
    core.teardown().unwrap();
}

#[test]
fn test_power_management_hooks() {
    let rig = Rig::new(FAR_IRQ);
    let pm = Arc::new(TestPowerManager::default());
    pm.pending.store(true, Ordering::SeqCst);
    let core = rig.core().with_power_manager(pm.clone());
    core.setup(rig.device(SensorConfig::new("sx9500", 7).with_mode(DispatchMode::Deferred)))
        .unwrap();

    let hooks = pm.hooks();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].0, SENSOR_EARLY_SUSPEND_LEVEL);
    assert!(rig.queue.is_empty());

    hooks[0].1.late_resume();
    assert_eq!(rig.queue.run_expired(), 1);
    assert_eq!(rig.events(), vec!["far"]);

    core.teardown().unwrap();
    assert!(pm.hooks().is_empty());

    // A stale subscriber reference must not reach the torn-down engine.
    hooks[0].1.late_resume();
    assert_eq!(rig.queue.run_expired(), 0);
    assert_eq!(rig.events(), vec!["far"]);
}

#[test]
fn test_deferred_end_to_end() {
    let rig = Rig::new(FAR_IRQ);
    let core = rig.core();
    let config = SensorConfig::new("sx9500", 9)
        .with_mode(DispatchMode::Deferred)
        .with_irq_timer(Duration::from_millis(30));
    let dev = rig.device(config);
    core.setup(dev.clone()).unwrap();
    assert_eq!(rig.chip.registered(9), Some(IrqKind::Hard));

    assert_eq!(rig.chip.fire(9), IrqReturn::Handled);
    assert!(rig.events().is_empty());
    assert_eq!(rig.queue.run_expired(), 1);
    assert_eq!(rig.events(), vec!["far"]);

    // Line still low: polled again after the timeout.
    rig.clock.advance(Duration::from_millis(30));
    assert_eq!(rig.queue.run_expired(), 1);
    assert_eq!(rig.events().len(), 2);

    rig.line_low.store(false, Ordering::SeqCst);
    rig.clock.advance(Duration::from_millis(30));
    assert_eq!(rig.queue.run_expired(), 1);
    assert!(rig.queue.is_empty());
    assert_eq!(dev.stats().passes(), 3);

    core.teardown().unwrap();
}
