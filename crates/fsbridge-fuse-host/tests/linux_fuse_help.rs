// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#[cfg(target_os = "linux")]
mod linux_tests {
    use std::process::Command;

    #[test]
    fn fuse_host_binary_help_runs() {
        let bin_path = env!("CARGO_BIN_EXE_fsbridge-fuse-host");

        // --help must not attempt a mount
        let output = Command::new(bin_path)
            .arg("--help")
            .output()
            .expect("able to execute fsbridge-fuse-host");

        assert!(output.status.success(), "--help should succeed");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--allow-other"));
        assert!(stdout.contains("--log-level"));
    }

    #[test]
    fn fuse_host_binary_requires_a_mount_point() {
        let status = Command::new(env!("CARGO_BIN_EXE_fsbridge-fuse-host"))
            .status()
            .expect("able to execute fsbridge-fuse-host");
        assert!(!status.success());
    }
}
