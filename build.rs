//! Windows builds need FFmpeg located explicitly; print hints when it is not.

use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn warn(message: &str) {
    println!("cargo:warning={message}");
}

fn vcpkg_install_dir(root: &Path) -> PathBuf {
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    root.join("installed").join(triplet)
}

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    let targets_windows = env::var("CARGO_CFG_TARGET_OS").is_ok_and(|os| os == "windows");
    if !targets_windows || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Some(root) = env::var_os("VCPKG_ROOT").map(PathBuf::from) else {
        warn("FFMPEG_DIR is not set; graybalance needs FFmpeg development libraries (e.g. via vcpkg with VCPKG_ROOT and FFMPEG_DIR)");
        return;
    };

    let install_dir = vcpkg_install_dir(&root);
    if !install_dir.exists() {
        warn(&format!("no vcpkg FFmpeg install found under {}", install_dir.display()));
        return;
    }

    warn(&format!(
        "found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to pin it",
        install_dir.display()
    ));
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        warn("set VCPKGRS_DYNAMIC=1 when linking a dynamic vcpkg FFmpeg");
    }
}
