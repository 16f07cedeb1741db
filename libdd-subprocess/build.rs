// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

fn main() {
    println!("cargo:rustc-check-cfg=cfg(bsd)");

    // kqueue with EVFILT_PROC is available on every BSD flavour
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let vendor = std::env::var("CARGO_CFG_TARGET_VENDOR").unwrap_or_default();
    if vendor == "apple"
        || matches!(
            os.as_str(),
            "freebsd" | "dragonfly" | "netbsd" | "openbsd"
        )
    {
        println!("cargo:rustc-cfg=bsd");
    }
}
