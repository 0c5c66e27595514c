// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates the linker script from the IRAM layout in `consts`, so the
//! image, the relocator window and the stack can never disagree with the
//! addresses the loader uses at run time.
//!
//! The hardware bring-up routines come from an external C library
//! (`libnxhw.a`). Point `NXHW_LIB_DIR` at the directory holding it.

use consts::{CHAINLOADER_ADDR, CHAINLOADER_SIZE, LOADER_MAX_SIZE, PAYLOAD_BASE_ADDR, STACK_TOP};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let link_ld_content = format!(
        r##"
        ENTRY(_start)

        STACK_TOP = {:#X};

        MEMORY
        {{
            /* The boot ROM drops RCM payloads here; everything above the */
            /* loader image is the staging region */
            IRAM (rwx) : ORIGIN = {:#X}, LENGTH = {:#X}
            /* Relocator window, below the stack */
            CHAINLOADER (rwx) : ORIGIN = {:#X}, LENGTH = {:#X}
        }}

        SECTIONS
        {{
            .text : {{
                KEEP(*(.text.start))
                *(.text .text.*)
            }} > IRAM

            .rodata : ALIGN(4) {{
                *(.rodata .rodata.*)
            }} > IRAM

            .data : ALIGN(4) {{
                *(.data .data.*)
            }} > IRAM

            .chainloader : ALIGN(4) {{
                __chainloader_start = .;
                KEEP(*(.chainloader .chainloader.*))
                . = ALIGN(4);
                __chainloader_end = .;
            }} > CHAINLOADER AT > IRAM
            __chainloader_lma = LOADADDR(.chainloader);

            .bss (NOLOAD) : ALIGN(4) {{
                __bss_start = .;
                *(.bss .bss.*)
                *(COMMON)
                . = ALIGN(4);
                __bss_end = .;
            }} > IRAM

            /DISCARD/ : {{
                *(.ARM.exidx .ARM.exidx.*)
                *(.ARM.extab .ARM.extab.*)
            }}
        }}
        "##,
        STACK_TOP, PAYLOAD_BASE_ADDR, LOADER_MAX_SIZE, CHAINLOADER_ADDR, CHAINLOADER_SIZE
    );
    // Put `link.ld` in our output directory and ensure it's
    // on the linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("link.ld"))
        .unwrap()
        .write_all(link_ld_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=NXHW_LIB_DIR");
    if let Some(dir) = env::var_os("NXHW_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", PathBuf::from(dir).display());
    }
    println!("cargo:rustc-link-lib=static=nxhw");

    println!("cargo:rustc-link-arg-bins=-Tlink.ld");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
