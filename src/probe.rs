//! The probe sequence: pick a product ID, bring the device up, read it back.

use log::{debug, warn};
use thiserror::Error;

use crate::provider::{DeviceProvider, ProductId, ProviderError, Session};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no valid product ID found or provided")]
    NoProductId,

    #[error("failed to create device provider handle")]
    Create(#[source] ProviderError),

    #[error("failed to initialize device provider for product ID {product_id}")]
    Initialize {
        product_id: ProductId,
        #[source]
        source: ProviderError,
    },
}

/// A product ID the SDK accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub product_id: ProductId,
    pub market_name: Option<String>,
}

/// What an initialized device reported. Query failures keep their SDK code.
#[derive(Debug)]
pub struct DeviceReport {
    pub product_id: ProductId,
    pub device_type: i32,
    pub firmware_version: Result<String, ProviderError>,
    pub brightness: Result<i32, ProviderError>,
}

/// Asks the SDK about every 16-bit ID. This is a table lookup inside the SDK,
/// no USB traffic happens here.
pub fn scan<P: DeviceProvider>(provider: &P) -> Vec<Candidate> {
    ProductId::all()
        .filter(|&id| provider.is_product_id_valid(id))
        .map(|product_id| {
            let market_name = provider
                .market_name(product_id)
                .inspect_err(|err| debug!("no market name for {product_id}: {err}"))
                .ok();

            Candidate {
                product_id,
                market_name,
            }
        })
        .collect()
}

pub fn print_candidates(candidates: &[Candidate]) {
    for candidate in candidates {
        println!("Found valid Product ID: {}", candidate.product_id);
        if let Some(name) = &candidate.market_name {
            println!("  Market Name: {name}");
        }
    }
}

/// An explicit ID wins; otherwise the first scanned candidate. Zero never qualifies.
pub fn select(
    requested: Option<ProductId>,
    candidates: &[Candidate],
) -> Result<ProductId, ProbeError> {
    requested
        .or_else(|| candidates.first().map(|c| c.product_id))
        .filter(|id| !id.is_unset())
        .ok_or(ProbeError::NoProductId)
}

/// Creates a session, sets the SDK log level and initializes the device.
///
/// On failure the handle is already destroyed when this returns.
pub fn bring_up<P: DeviceProvider>(
    provider: &P,
    product_id: ProductId,
    sdk_log_level: i32,
) -> Result<Session<'_, P>, ProbeError> {
    let mut session = Session::create(provider, product_id).map_err(ProbeError::Create)?;

    provider.set_log_level(sdk_log_level);

    session
        .initialize()
        .map_err(|source| ProbeError::Initialize { product_id, source })?;

    Ok(session)
}

pub fn read_report<P: DeviceProvider>(session: &Session<'_, P>) -> DeviceReport {
    DeviceReport {
        product_id: session.product_id(),
        device_type: session.device_type(),
        firmware_version: session.glasses_version(),
        brightness: session.brightness_level(),
    }
}

pub fn print_report(report: &DeviceReport) {
    println!("Device Type: {}", report.device_type);

    match &report.firmware_version {
        Ok(version) => println!("Firmware Version: {version}"),
        Err(err) => warn!("Failed to get firmware version: {err}"),
    }

    match &report.brightness {
        Ok(level) => println!("Current Brightness: {level}"),
        Err(err) => warn!("Failed to get brightness: {err}"),
    }
}

/// Runs the whole probe against `provider`, printing progress as it goes.
///
/// `before_init` sees the selected product ID before any handle exists.
pub fn run<P: DeviceProvider>(
    provider: &P,
    requested: Option<ProductId>,
    sdk_log_level: i32,
    before_init: impl FnOnce(ProductId),
) -> Result<DeviceReport, ProbeError> {
    let candidates = match requested {
        Some(id) => {
            println!("Using provided Product ID: {id}");
            Vec::new()
        }
        None => {
            println!("No Product ID provided. Scanning for valid product IDs...");
            let candidates = scan(provider);
            print_candidates(&candidates);
            candidates
        }
    };

    let product_id = select(requested, &candidates)?;
    before_init(product_id);

    println!("Attempting to initialize device with Product ID: {product_id}");
    let session = bring_up(provider, product_id, sdk_log_level)?;
    println!("Device initialized successfully!");

    let report = read_report(&session);
    print_report(&report);

    println!("Shutting down...");
    drop(session);

    Ok(report)
}
