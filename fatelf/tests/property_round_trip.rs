//! Property: build/select round trip.
//!
//! After building a container from N images, a host whose descriptor equals
//! image k's gets image k, and the materialized bytes equal image k's file
//! exactly, whichever launcher materializes them.

mod common;

use std::fs;

use fatelf::exec::{ImageLauncher, TempFileLauncher};
use fatelf::{ContainerBuilder, Trampoline};
use proptest::prelude::*;

fn launchers() -> Vec<Box<dyn ImageLauncher>> {
    let mut all: Vec<Box<dyn ImageLauncher>> = vec![Box::new(TempFileLauncher)];
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    if fatelf::exec::MemfdLauncher::is_available() {
        all.push(Box::new(fatelf::exec::MemfdLauncher));
    }
    all
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn host_gets_its_own_bytes(
        targets in proptest::sample::subsequence(common::target_pool(), 1..=6),
        sizes in proptest::collection::vec(0usize..6000, 6),
        version in 0u8..4,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ContainerBuilder::with_options(common::options());
        let mut inputs = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            let path = common::write_elf(dir.path(), &format!("img{i}"), target, sizes[i], 7 * i as u8);
            builder.push(&path, None).unwrap();
            inputs.push(path);
        }
        let out = dir.path().join("fat");
        builder.build(&out).unwrap();

        for (k, target) in targets.iter().enumerate() {
            // Version never takes part in matching.
            let host = fatelf::TargetDescriptor { osabi_version: version, ..*target };
            let selection = fatelf::loader::locate(&out, &host).unwrap();
            prop_assert_eq!(selection.index, k);

            let expected = fs::read(&inputs[k]).unwrap();
            for launcher in launchers() {
                let name = launcher.name();
                let image = Trampoline::with_launcher(launcher).prepare(&out, &host).unwrap();
                prop_assert_eq!(image.contents().unwrap(), expected.clone(), "launcher {}", name);
            }
        }
    }
}
