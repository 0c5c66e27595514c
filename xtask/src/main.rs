// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use consts::{FIRMWARE_VERSION_OFFSET, LOADER_MAX_SIZE, STAGING_SIZE};
use crc::{Crc, CRC_32_ISCSI};
use modchip_protocol::CHUNK_SIZE;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, Stdio};
use std::{env, fs};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the raw loader image to inject over RCM:
    /// release profile, core rebuilt for armv4t-none-eabi,
    /// flat binary checked against the IRAM window below the staging region
    #[command(verbatim_doc_comment)]
    BuildPayload {
        /// Build the variant that updates the companion chip from firmware.bin
        #[arg(long)]
        update: bool,
        /// Log over RTT
        #[arg(long)]
        debug: bool,
    },

    /// Check that a next-stage payload.bin is one the loader will chainload
    CheckPayload {
        file: PathBuf,
    },

    /// Print what the loader will see in a companion firmware image
    FirmwareInfo {
        file: PathBuf,
    },
}

fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR")).ancestors().nth(1).unwrap().to_path_buf()
}

pub fn cargo() -> String {
    env::var("CARGO").unwrap_or_else(|_| "cargo".to_string())
}

fn build_tools_check(verbose: bool) {
    tracing::info!("Checking cargo binutils install state");
    let mut cargo_cmd = Command::new(cargo());
    let mut cmd = cargo_cmd.current_dir(project_root()).args(["objcopy", "--version"]);
    if !verbose {
        cmd = cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let status = cmd.status().expect("Running Cargo objcopy version fails");
    if !status.success() {
        tracing::info!("Please install cargo binutils with these commands:");
        tracing::info!("cargo install cargo-binutils");
        tracing::info!("rustup component add llvm-tools");
        exit(-1);
    }

    if env::var_os("NXHW_LIB_DIR").is_none() {
        tracing::warn!("NXHW_LIB_DIR is not set, the linker must find libnxhw.a on its own");
    }

    let build_dir = project_root().join("SdPackage");
    if !build_dir.exists() {
        fs::create_dir(build_dir).unwrap();
    }
}

fn loader_version() -> String {
    MetadataCommand::new()
        .manifest_path(project_root().join("bootloader/Cargo.toml"))
        .no_deps()
        .exec()
        .expect("Failed to get bootloader metadata")
        .packages
        .iter()
        .find(|p| p.name == "bootloader")
        .map(|p| p.version.to_string())
        .expect("Bootloader crate not found")
}

fn build_payload(update: bool, debug: bool, verbose: bool) {
    let mut features = vec![];
    if update {
        features.push("update-capable");
    }
    if debug {
        features.push("debug");
    }
    let features = ["--features".to_string(), features.join(",")];
    let features: &[String] = if update || debug { &features[..] } else { &[] };
    let name = if update { "sdloader_update.bin" } else { "sdloader.bin" };

    tracing::info!("Building loader {} ({})...", loader_version(), name);
    let mut cargo_cmd = Command::new(cargo());
    let mut cmd = cargo_cmd
        .current_dir(project_root().join("bootloader"))
        .args(["build", "--release"])
        .args(features);
    if !verbose {
        cmd = cmd.stdout(Stdio::null()).stderr(Stdio::null()).arg("--quiet");
    }
    let status = cmd.status().expect("Running Cargo failed");
    if !status.success() {
        tracing::error!("Loader build failed");
        exit(-1);
    }

    tracing::info!("Creating loader binary file");
    let output = format!("../SdPackage/{name}");
    let mut cargo_cmd = Command::new(cargo());
    let cmd = cargo_cmd
        .current_dir(project_root().join("bootloader"))
        .args(["objcopy", "--release"])
        .args(features);
    let mut cmd = cmd.args(["--", "-O", "binary", output.as_str()]);
    if !verbose {
        cmd = cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let status = cmd.status().expect("Running Cargo objcopy failed");
    if !status.success() {
        tracing::error!("Loader binary generation failed");
        exit(-1);
    }

    let path = project_root().join("SdPackage").join(name);
    let size = print_binary_size(&path, "Loader Binary", LOADER_MAX_SIZE as u64);
    if size > LOADER_MAX_SIZE as u64 {
        tracing::error!("Loader overlaps the staging region");
        exit(-1);
    }
}

/// Mirrors the checks the loader applies before chainloading.
fn check_payload(file: &Path) {
    let size = print_binary_size(file, "Payload", STAGING_SIZE as u64);
    if size == 0 {
        tracing::error!("Payload is empty, the loader will show NO BIN");
        exit(-1);
    }
    if size > STAGING_SIZE as u64 {
        tracing::error!("Payload is too large, the loader will show BIG BIN");
        exit(-1);
    }
    tracing::info!("Payload OK");
}

fn firmware_info(file: &Path) {
    let image = match fs::read(file) {
        Ok(image) => image,
        Err(e) => {
            tracing::error!("Unable to read {}: {}", file.display(), e);
            exit(-1);
        }
    };

    let at = FIRMWARE_VERSION_OFFSET as usize;
    let Some(version) = image.get(at..at + 4) else {
        tracing::error!("Image too short to carry a version, the loader will skip the update");
        exit(-1);
    };
    let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
    let crc = Crc::<u32>::new(&CRC_32_ISCSI);

    println!("📦 Companion Firmware:");
    println!("   Version: {} ({:#010x})", version, version);
    println!("   Bytes: {} bytes", image.len());
    println!("   Chunks: {} x {} bytes", image.len().div_ceil(CHUNK_SIZE), CHUNK_SIZE);
    println!("   CRC-32/ISCSI: {:#010x}", crc.checksum(&image));
}

fn print_binary_size(binary_path: &Path, description: &str, available: u64) -> u64 {
    let Ok(metadata) = fs::metadata(binary_path) else {
        tracing::error!("Could not read binary metadata for: {}", binary_path.display());
        exit(-1);
    };
    let size_bytes = metadata.len();
    let size_kb = size_bytes as f64 / 1024.0;
    let usage_percentage = (size_bytes as f64 / available as f64) * 100.0;

    println!("📊 {} Size:", description);
    println!("   Bytes: {} bytes", size_bytes);
    println!("   KiB: {:.2} KiB", size_kb);
    println!("   IRAM Usage: {:.1}% of {} bytes available", usage_percentage, available);
    size_bytes
}

fn main() {
    // Adding some info tracing just for logging activity
    env::set_var("RUST_LOG", "info");

    // Tracing using RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = XtaskArgs::parse();

    match args.command {
        Commands::BuildPayload { update, debug } => {
            build_tools_check(args.verbose);
            build_payload(update, debug, args.verbose);
        }
        Commands::CheckPayload { file } => {
            check_payload(&file);
        }
        Commands::FirmwareInfo { file } => {
            firmware_info(&file);
        }
    }
}
