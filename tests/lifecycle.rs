use kbdlink::backends::virtual_input::{HostCall, VirtualHost, VirtualKeyboard};
use kbdlink::features::{pids, VENDOR_ID};
use kbdlink::{
    close, prepare_for_reset, setup, try_reset, Config, DeviceEvent, DeviceManager, Error,
    EventBus, EventFilter, EventKind, EventListener, FeatureSet, JsonProfileStore, Keymap,
    Lifecycle, MemoryProfileStore, Message, Mode, PollRate, ProfileStore, Services,
    TransportError,
};
use parking_lot::Mutex;
use std::sync::Arc;

struct Recorder(Arc<Mutex<Vec<EventKind>>>);

impl EventListener for Recorder {
    fn on_event(&mut self, event: &DeviceEvent) {
        self.0.lock().push(event.kind.clone());
    }
}

struct Rig {
    host: VirtualHost,
    store: Arc<MemoryProfileStore>,
    events: Arc<Mutex<Vec<EventKind>>>,
    services: Services,
}

fn rig() -> Rig {
    rig_with(Config::immediate())
}

fn rig_with(config: Config) -> Rig {
    let host = VirtualHost::new();
    let store = Arc::new(MemoryProfileStore::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let bus = Arc::new(EventBus::new());
    bus.add_listener(Recorder(events.clone()), EventFilter::All, None);
    let services = host.services(config, bus, store.clone());
    Rig {
        host,
        store,
        events,
        services,
    }
}

#[test]
fn setup_leaves_empty_queue_and_system_keymap() {
    let rig = rig();
    for (i, &pid) in pids::ALL.iter().enumerate() {
        let kb = VirtualKeyboard::new(format!("KB{i}"));
        let dev = setup(kb.skeleton(), VENDOR_ID, pid, &rig.services).unwrap();
        let state = dev.lock_state();
        assert_eq!(state.queue.len(), 0);
        assert_eq!(state.profile.keymap, Some(Keymap::System));
        assert!(state.lifecycle.has_control_node());
    }
}

#[test]
fn enqueue_is_all_or_nothing() {
    let rig = rig();
    let kb = VirtualKeyboard::new("Q1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap();
    let cap = rig.services.config.queue_capacity;

    dev.enqueue(&vec![Message::default(); cap - 1]).unwrap();
    let err = dev.enqueue(&[Message::default(); 2]).unwrap_err();
    assert!(matches!(
        err,
        Error::QueueFull {
            queued,
            requested: 2,
            capacity
        } if queued == cap - 1 && capacity == cap
    ));
    assert_eq!(dev.queued(), cap - 1);

    dev.enqueue(&[Message::default()]).unwrap();
    assert_eq!(dev.queued(), cap);
}

#[test]
fn close_is_idempotent() {
    let rig = rig();
    let kb = VirtualKeyboard::new("C1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::COMPACT_RGB, &rig.services).unwrap();

    close(&dev, &rig.services);
    close(&dev, &rig.services);

    assert_eq!(dev.lifecycle(), Lifecycle::Closed);
    assert_eq!(
        rig.host
            .count(|c| matches!(c, HostCall::RemoveControl(_))),
        1
    );
    assert_eq!(rig.store.len(), 1);
    let state = dev.lock_state();
    assert!(!state.is_open());
    assert!(!state.queue.is_allocated());
}

#[test]
fn close_reports_disconnect() {
    let rig = rig();
    let kb = VirtualKeyboard::new("EV1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap();
    rig.events.lock().clear();

    close(&dev, &rig.services);

    let events = rig.events.lock().clone();
    assert_eq!(events.first(), Some(&EventKind::ConnectivityChanged));
    assert!(events.contains(&EventKind::Disconnected {
        serial: "EV1".into(),
        name: "Corsair K70 RGB".into(),
    }));
}

#[test]
fn profile_survives_reconnect() {
    let rig = rig();
    let kb = VirtualKeyboard::new("RT1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &rig.services).unwrap();
    let edited = {
        let mut state = dev.lock_state();
        state.profile.name = "Gaming".into();
        state.profile.keymap = Some(Keymap::Named("dvorak".into()));
        state.profile.modes[1] = Mode {
            name: "Fire".into(),
            lighting: vec![0xff, 0, 0],
        };
        state.profile.current_mode = 1;
        state.profile.clone()
    };
    close(&dev, &rig.services);
    assert_eq!(rig.store.find("RT1").unwrap(), Some(edited.clone()));

    let kb = VirtualKeyboard::new("RT1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &rig.services).unwrap();
    assert_eq!(dev.lock_state().profile, edited);
    assert!(rig.host.calls().contains(&HostCall::LoadProfile {
        serial: "RT1".into(),
        validate: false
    }));
}

#[test]
fn profile_survives_reconnect_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let host = VirtualHost::new();
    let store = Arc::new(JsonProfileStore::open(dir.path()).unwrap());
    let services = host.services(Config::immediate(), Arc::new(EventBus::new()), store.clone());

    let kb = VirtualKeyboard::new("DISK/1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap();
    dev.lock_state().profile.name = "Office".into();
    close(&dev, &services);

    let reopened = JsonProfileStore::open(dir.path()).unwrap();
    let profile = reopened.find("DISK/1").unwrap().unwrap();
    assert_eq!(profile.name, "Office");
}

#[test]
fn full_size_without_stored_profile_has_three_modes() {
    let rig = rig();
    let kb = VirtualKeyboard::new("K95");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &rig.services).unwrap();
    let state = dev.lock_state();
    assert!(state.profile.modes.len() >= 3);
    assert_eq!(state.profile.current_mode, 0);
}

#[test]
fn outdated_firmware_parks_device() {
    let rig = rig();
    rig.host.script().fw_version = Some(0x0042);
    let kb = VirtualKeyboard::new("OLD");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap();
    {
        let state = dev.lock_state();
        assert_eq!(state.lifecycle, Lifecycle::NeedsUpdate);
        assert_eq!(state.features, FeatureSet::UPDATE_ONLY);
        assert!(state.active);
        assert!(!state.queue.is_allocated());
        assert!(!state.hw_loaded);
    }
    assert!(matches!(
        dev.enqueue(&[Message::default()]),
        Err(Error::QueueFull { capacity: 0, .. })
    ));
    assert_eq!(
        rig.host
            .count(|c| matches!(c, HostCall::LoadProfile { .. })),
        0
    );

    // a pending update makes prepare a no-op
    prepare_for_reset(&dev, &rig.services).unwrap();
    assert_eq!(rig.host.count(|c| matches!(c, HostCall::SetActive(_))), 0);

    close(&dev, &rig.services);
    assert!(rig.store.is_empty());
}

#[test]
fn update_pending_close_keeps_stored_profile() {
    let rig = rig();
    let mut mine = kbdlink::Profile::new("U1");
    mine.name = "Mine".into();
    mine.keymap = Some(Keymap::Named("dvorak".into()));
    rig.store.upsert("U1", mine.clone()).unwrap();

    rig.host.script().fw_version = Some(0x0042);
    let kb = VirtualKeyboard::new("U1");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &rig.services).unwrap();
    assert_eq!(dev.lifecycle(), Lifecycle::NeedsUpdate);
    assert_eq!(dev.lock_state().profile.keymap, Some(Keymap::System));

    close(&dev, &rig.services);

    assert_eq!(rig.store.find("U1").unwrap(), Some(mine));
}

#[test]
fn close_without_hardware_only_announces_change() {
    let rig = rig();
    let skeleton = kbdlink::DeviceSkeleton::new("NOHW");
    let dev = setup(skeleton, VENDOR_ID, pids::STANDARD, &rig.services).unwrap();
    rig.events.lock().clear();
    rig.host.clear_calls();

    close(&dev, &rig.services);

    assert_eq!(*rig.events.lock(), vec![EventKind::ConnectivityChanged]);
    assert_eq!(
        rig.host.calls(),
        vec![HostCall::RemoveControl("NOHW".into())]
    );
    assert!(rig.store.is_empty());
    assert_eq!(dev.lifecycle(), Lifecycle::Closed);
}

#[test]
fn plain_board_setup() {
    let rig = rig();
    let kb = VirtualKeyboard::new("PLAIN");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE, &rig.services).unwrap();
    let state = dev.lock_state();
    assert_eq!(state.identity.name, "Corsair K95");
    assert_eq!(state.features, FeatureSet::STANDARD_NON_RGB);
    assert_eq!(state.poll_rate, PollRate::Disabled);
    assert_eq!(state.profile.keymap, Some(Keymap::System));
    assert_eq!(state.profile.modes.len(), 3);
    assert!(state.active);
    assert!(!state.queue.is_allocated());
    let calls = rig.host.calls();
    assert!(calls.contains(&HostCall::HardwareMode(false)));
    assert!(calls.contains(&HostCall::ModeMarker("PLAIN".into())));
    assert!(!calls.iter().any(|c| matches!(c, HostCall::QueryVersion(_))));
}

#[test]
fn failed_setup_releases_everything() {
    let rig = rig();
    rig.host.script().fail_input = true;
    let kb = VirtualKeyboard::new("FAIL");
    let err = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap_err();
    assert!(matches!(err, Error::InputOpenFailed(_)));
    assert!(kb.is_closed());
    assert_eq!(
        rig.host.calls(),
        vec![
            HostCall::CreateControl("FAIL".into()),
            HostCall::OpenInput("FAIL".into()),
            HostCall::RemoveControl("FAIL".into()),
        ]
    );
}

#[test]
fn try_reset_distinguishes_fatal_from_transient() {
    let rig = rig();
    let kb = VirtualKeyboard::new("TR");
    let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap();

    kb.push_reset_result(Err(TransportError::Timeout));
    try_reset(&dev, &rig.services).unwrap();
    assert_eq!(kb.reset_count(), 2);

    dev.lock_state().hw_loaded = false;
    rig.host.script().fail_load = true;
    let err = try_reset(&dev, &rig.services).unwrap_err();
    assert!(matches!(err, Error::ResetIncomplete));
    assert_eq!(kb.reset_count(), 3);
}

#[test]
fn input_is_dropped_after_close() {
    let rig = rig();
    let kb = VirtualKeyboard::new("IN");
    let dev = Arc::new(setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &rig.services).unwrap());

    assert!(dev.deliver_input(&rig.services, &[0u8; 8]));

    let reader = {
        let dev = dev.clone();
        let services = rig.services.clone();
        std::thread::spawn(move || {
            let mut delivered = 0;
            for _ in 0..1000 {
                if dev.deliver_input(&services, &[1u8; 8]) {
                    delivered += 1;
                }
            }
            delivered
        })
    };
    close(&dev, &rig.services);
    let delivered = reader.join().unwrap();

    assert!(!dev.deliver_input(&rig.services, &[0u8; 8]));
    let emitted = rig.host.count(|c| matches!(c, HostCall::Emit(..)));
    assert_eq!(emitted, delivered + 1);
}

#[test]
fn manager_round_trip() {
    let rig = rig_with(Config {
        max_devices: 2,
        ..Config::immediate()
    });
    let mut manager = DeviceManager::new(rig.services.clone());
    let a = VirtualKeyboard::new("MA");
    let slot = manager
        .connect(a.skeleton(), VENDOR_ID, pids::COMPACT_RGB)
        .unwrap();
    assert!(rig.events.lock().contains(&EventKind::Connected {
        serial: "MA".into(),
        name: "Corsair K65 RGB".into(),
    }));

    manager.recover(slot).unwrap();
    assert_eq!(a.reset_count(), 1);

    manager.disconnect_all();
    assert!(manager.snapshot().is_empty());
    assert!(a.is_closed());
    assert!(rig.store.find("MA").unwrap().is_some());
}
