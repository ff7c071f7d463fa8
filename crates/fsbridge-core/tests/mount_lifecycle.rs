// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use fsbridge_core::testing::MockLoop;
use fsbridge_core::{Bridge, BridgeConfig, BridgeError, FileSystem, MemoryFs, MountState, ViolationPolicy, ROOT_INO};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bridge() -> Bridge {
    Bridge::new(BridgeConfig {
        violation_policy: ViolationPolicy::Report,
        reply_timeout_ms: Some(5_000),
        ..Default::default()
    })
}

#[test]
fn mount_serve_and_unmount() {
    let bridge = bridge();
    let native = Arc::new(MockLoop::new());
    let controller = Arc::new(bridge.mount_controller(native.clone()));
    let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());

    let runner = {
        let controller = Arc::clone(&controller);
        let fs = Arc::clone(&fs);
        thread::spawn(move || controller.mount_and_run(["prog", "/tmp/mnt"], fs))
    };
    assert!(native.wait_for_sessions(1, Duration::from_secs(5)));

    let mountpoint = Path::new("/tmp/mnt");
    assert_eq!(controller.state(mountpoint), MountState::Mounted);
    let entry = bridge.mounts().lookup(mountpoint).expect("registered");
    assert!(Arc::ptr_eq(&entry.filesystem, &fs));

    // requests against the mount reach the bound filesystem
    let client = bridge.client(Arc::new(bridge.loopback(bridge.dispatch_sink())), mountpoint);
    let dir = client.mkdir(ROOT_INO, OsStr::new("served"), 0o755).unwrap();
    assert_eq!(client.lookup(ROOT_INO, OsStr::new("served")).unwrap().ino, dir.ino);

    controller.unmount(mountpoint).unwrap();
    assert_eq!(runner.join().unwrap(), 0);
    assert!(bridge.mounts().lookup(mountpoint).is_none());
    assert_eq!(controller.state(mountpoint), MountState::Unmounted);
    assert_eq!(native.exits(), 1);

    // the mount is gone, so requests now fail with ENOENT
    let err = client.getattr(ROOT_INO).unwrap_err();
    assert!(matches!(err, BridgeError::Status(libc::ENOENT)));
    assert_eq!(bridge.requests().pending_count(), 0);
}

#[test]
fn relative_mountpoints_are_registered_absolute() {
    let bridge = bridge();
    let native = Arc::new(MockLoop::new());
    let controller = Arc::new(bridge.mount_controller(native.clone()));

    let runner = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            controller.mount_and_run(["prog", "fsbridge-relative-mnt"], Arc::new(MemoryFs::new()))
        })
    };
    assert!(native.wait_for_sessions(1, Duration::from_secs(5)));

    let expected: PathBuf = std::env::current_dir().unwrap().join("fsbridge-relative-mnt");
    assert_eq!(bridge.mounts().mountpoints(), vec![expected.clone()]);

    // the same relative spelling unmounts it; a sibling does not
    let sibling = controller.unmount(Path::new("fsbridge-other-mnt")).unwrap_err();
    assert!(matches!(sibling, BridgeError::NotMounted(_)));
    controller.unmount(Path::new("./fsbridge-relative-mnt")).unwrap();
    assert_eq!(runner.join().unwrap(), 0);
    assert!(bridge.mounts().is_empty());
}

#[test]
fn concurrent_mounts_are_independent() {
    let bridge = bridge();
    let native = Arc::new(MockLoop::new());
    let controller = Arc::new(bridge.mount_controller(native.clone()));

    let mut runners: Vec<_> = ["/tmp/fsbridge-a", "/tmp/fsbridge-b", "/tmp/fsbridge-c"]
        .into_iter()
        .map(|mp| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.mount_and_run(["prog", mp], Arc::new(MemoryFs::new())))
        })
        .collect();
    assert!(native.wait_for_sessions(3, Duration::from_secs(5)));
    assert_eq!(bridge.mounts().len(), 3);

    let loopback = Arc::new(bridge.loopback(bridge.dispatch_sink()));
    let a = bridge.client(loopback.clone(), "/tmp/fsbridge-a");
    let b = bridge.client(loopback, "/tmp/fsbridge-b");
    a.mkdir(ROOT_INO, OsStr::new("only-in-a"), 0o755).unwrap();
    assert!(matches!(
        b.lookup(ROOT_INO, OsStr::new("only-in-a")),
        Err(BridgeError::Status(libc::ENOENT))
    ));

    controller.unmount(Path::new("/tmp/fsbridge-b")).unwrap();
    assert_eq!(runners.remove(1).join().unwrap(), 0);
    assert_eq!(bridge.mounts().len(), 2);
    assert!(a.lookup(ROOT_INO, OsStr::new("only-in-a")).is_ok());

    controller.unmount(Path::new("/tmp/fsbridge-a")).unwrap();
    controller.unmount(Path::new("/tmp/fsbridge-c")).unwrap();
    for runner in runners {
        assert_eq!(runner.join().unwrap(), 0);
    }
    assert!(bridge.mounts().is_empty());
}

#[test]
fn loop_status_is_passed_through() {
    let bridge = bridge();
    let native = Arc::new(MockLoop::new());
    native.set_run_status(7);
    let controller = Arc::new(bridge.mount_controller(native.clone()));

    let runner = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.mount_and_run(["prog", "/tmp/fsbridge-status"], Arc::new(MemoryFs::new())))
    };
    assert!(native.wait_for_sessions(1, Duration::from_secs(5)));
    controller.unmount(Path::new("/tmp/fsbridge-status")).unwrap();
    assert_eq!(runner.join().unwrap(), 7);
}
