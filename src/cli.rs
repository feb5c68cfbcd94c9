use std::ffi::OsString;

use clap::Parser;

use crate::provider::ProductId;

/// Default SDK verbosity: info.
pub const DEFAULT_SDK_LOG_LEVEL: i32 = 2;

/// Probe a pair of glasses through the vendor provider library.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Product ID to initialize, decimal or 0x-prefixed hex.
    /// Scans every ID known to the SDK when omitted.
    #[arg(value_parser = parse_product_id)]
    pub product_id: Option<ProductId>,

    /// Path or file name of the glasses provider library.
    #[arg(long, env = "GLASSES_PROVIDER_LIB", default_value_os_t = default_library())]
    pub library: OsString,

    /// Log level handed to the vendor SDK.
    #[arg(long, env = "GLASSES_SDK_LOG_LEVEL", default_value_t = DEFAULT_SDK_LOG_LEVEL)]
    pub sdk_log_level: i32,

    /// Only list product IDs the SDK knows about.
    #[arg(long, conflicts_with = "product_id")]
    pub scan_only: bool,

    /// Skip the libusb presence check on initialization failure.
    #[arg(long)]
    pub no_usb_check: bool,
}

pub fn default_library() -> OsString {
    libloading::library_filename("glasses_provider")
}

/// Accepts `4353`, `0x1101` or `0X1101`.
pub fn parse_product_id(raw: &str) -> Result<ProductId, String> {
    let raw = raw.trim();

    let (digits, radix) = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };

    // from_str_radix takes a leading '+'
    if digits.starts_with('+') {
        return Err(format!("`{raw}` is not a 16-bit product ID: unexpected sign"));
    }

    let parsed = u16::from_str_radix(digits, radix);

    parsed
        .map(ProductId)
        .map_err(|err| format!("`{raw}` is not a 16-bit product ID: {err}"))
}
