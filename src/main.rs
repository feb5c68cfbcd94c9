mod cli;
mod probe;
mod provider;
mod usb;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use cli::Cli;
use probe::ProbeError;
use provider::{DeviceProvider, ProductId, VendorLibrary};
use usb::{AttachedDevice, UsbBus};

/// Printed after every initialization failure, whatever the USB check finds.
const CONNECT_HINT: &str =
    "Ensure the glasses are connected and you have permissions (udev rules).";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    println!("Glasses provider probe");

    let result = VendorLibrary::load(&cli.library)
        .with_context(|| format!("cannot use provider library {:?}", cli.library))
        .and_then(|provider| run(&cli, &provider, attached));

    ExitCode::from(exit_status(&result))
}

/// 0 on success, 1 on any failure. The error chain is logged here.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            error!("{err:#}");
            1
        }
    }
}

fn run<P, F>(cli: &Cli, provider: &P, usb_lookup: F) -> Result<()>
where
    P: DeviceProvider,
    F: Fn(ProductId) -> Result<Vec<AttachedDevice>>,
{
    if cli.scan_only {
        let candidates = probe::scan(provider);
        probe::print_candidates(&candidates);
        anyhow::ensure!(!candidates.is_empty(), ProbeError::NoProductId);
        return Ok(());
    }

    let usb_check = !cli.no_usb_check;

    let before_init = |product_id: ProductId| {
        if usb_check && log::log_enabled!(log::Level::Debug) {
            debug!("usb devices for {product_id}: {:?}", usb_lookup(product_id).ok());
        }
    };

    match probe::run(provider, cli.product_id, cli.sdk_log_level, before_init) {
        Ok(report) => {
            info!("probe of {} complete", report.product_id);
            println!("Done.");
            Ok(())
        }
        Err(err @ ProbeError::Initialize { product_id, .. }) => {
            let usb = usb_check.then(|| usb_lookup(product_id));
            for hint in initialize_failure_hints(product_id, usb) {
                warn!("{hint}");
            }
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn attached(product_id: ProductId) -> Result<Vec<AttachedDevice>> {
    let bus = UsbBus::new()?;
    debug!("{}", UsbBus::libusb_version_string());
    Ok(bus.find_product(product_id))
}

/// What the bus says about a device the provider refused to initialize.
#[derive(Debug, PartialEq, Eq)]
enum UsbHint {
    NotConnected,
    PermissionDenied,
    Rejected,
}

fn usb_hint(devices: &[AttachedDevice]) -> UsbHint {
    if devices.is_empty() {
        UsbHint::NotConnected
    } else if devices.iter().any(AttachedDevice::permission_denied) {
        UsbHint::PermissionDenied
    } else {
        UsbHint::Rejected
    }
}

/// The connect/udev hint first, then whatever the USB check adds.
/// `usb` is `None` when the check was skipped.
fn initialize_failure_hints(
    product_id: ProductId,
    usb: Option<Result<Vec<AttachedDevice>>>,
) -> Vec<String> {
    let mut hints = vec![CONNECT_HINT.to_string()];

    match usb {
        None => {}
        Some(Err(err)) => hints.push(format!("USB check unavailable: {err:#}")),
        Some(Ok(devices)) => {
            hints.extend(devices.iter().map(|device| format!("Found {device}")));
            hints.push(match usb_hint(&devices) {
                UsbHint::NotConnected => {
                    format!("No USB device with product ID {product_id} found.")
                }
                UsbHint::PermissionDenied => {
                    "The glasses are connected but not accessible. Check your udev rules."
                        .to_string()
                }
                UsbHint::Rejected => {
                    "The glasses are connected; the provider rejected them anyway.".to_string()
                }
            });
        }
    }

    hints
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::anyhow;
    use libusb1_sys::constants::LIBUSB_ERROR_ACCESS;

    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::usb::Access;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("glasses-probe").chain(args.iter().copied())).unwrap()
    }

    fn no_usb(_: ProductId) -> Result<Vec<AttachedDevice>> {
        panic!("USB lookup must not run")
    }

    fn device(access: Access) -> AttachedDevice {
        AttachedDevice {
            vendor_id: 0x35ca,
            product_id: 0x1101,
            bus: 1,
            address: 4,
            product: None,
            manufacturer: None,
            access,
        }
    }

    #[test]
    fn scan_only_fails_when_sdk_knows_no_products() {
        let provider = MockProvider::with_products(&[]);
        let result = run(&cli(&["--scan-only"]), &provider, no_usb);
        assert!(result.is_err());
        assert_eq!(exit_status(&result), 1);
    }

    #[test]
    fn scan_only_lists_without_creating_handles() {
        let provider = MockProvider::with_products(&[(0x1101, Some("One"))]);
        let result = run(&cli(&["--scan-only"]), &provider, no_usb);
        assert_eq!(exit_status(&result), 0);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn successful_probe_exits_zero() {
        let provider = MockProvider::with_products(&[(0x1101, None)]);
        let result = run(&cli(&["--no-usb-check"]), &provider, no_usb);
        assert_eq!(exit_status(&result), 0);
    }

    #[test]
    fn missing_product_id_exits_one() {
        let provider = MockProvider::with_products(&[]);
        let result = run(&cli(&[]), &provider, no_usb);
        assert_eq!(exit_status(&result), 1);
    }

    #[test]
    fn initialize_failure_without_usb_check_skips_lookup() {
        let mut provider = MockProvider::with_products(&[(0x1101, None)]);
        provider.init_code = -5;

        let result = run(&cli(&["--no-usb-check", "0x1101"]), &provider, no_usb);

        let err = result.as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::Initialize { .. })
        ));
        assert_eq!(exit_status(&result), 1);
    }

    #[test]
    fn initialize_failure_looks_up_selected_product() {
        let mut provider = MockProvider::with_products(&[(0x1121, None)]);
        provider.init_code = -5;
        let looked_up = RefCell::new(Vec::new());

        let result = run(&cli(&[]), &provider, |id| {
            looked_up.borrow_mut().push(id);
            Ok(Vec::new())
        });

        assert_eq!(exit_status(&result), 1);
        assert_eq!(looked_up.borrow().last(), Some(&ProductId(0x1121)));
    }

    #[test]
    fn connect_hint_is_always_first() {
        let id = ProductId(0x1101);

        assert_eq!(initialize_failure_hints(id, None), [CONNECT_HINT]);

        let lookup_error = anyhow!("libusb_init failed: LIBUSB_ERROR_OTHER");
        let unavailable = initialize_failure_hints(id, Some(Err(lookup_error)));
        assert_eq!(
            unavailable,
            [
                CONNECT_HINT,
                "USB check unavailable: libusb_init failed: LIBUSB_ERROR_OTHER"
            ]
        );

        let not_connected = initialize_failure_hints(id, Some(Ok(Vec::new())));
        assert_eq!(
            not_connected,
            [CONNECT_HINT, "No USB device with product ID 0x1101 found."]
        );
    }

    #[test]
    fn found_devices_are_listed_before_the_verdict() {
        let hints = initialize_failure_hints(
            ProductId(0x1101),
            Some(Ok(vec![device(Access::Denied(LIBUSB_ERROR_ACCESS))])),
        );
        assert_eq!(hints.len(), 3);
        assert!(hints[1].starts_with("Found bus 001 device 004: 35ca:1101"));
        assert!(hints[2].contains("udev rules"));
    }

    #[test]
    fn usb_hint_outcomes() {
        assert_eq!(usb_hint(&[]), UsbHint::NotConnected);
        assert_eq!(
            usb_hint(&[
                device(Access::Granted),
                device(Access::Denied(LIBUSB_ERROR_ACCESS)),
            ]),
            UsbHint::PermissionDenied
        );
        assert_eq!(usb_hint(&[device(Access::Granted)]), UsbHint::Rejected);
        assert_eq!(usb_hint(&[device(Access::Denied(-4))]), UsbHint::Rejected);
    }
}
