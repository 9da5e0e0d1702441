//! Core application runner for `bthome-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::device_key::DeviceKey;
use crate::error::DecodeError;
use crate::mac_address::MacAddress;
use crate::parser::Parser;
use crate::scanner::{AdvertisementResult, ScanError};
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(clap::Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Only decode advertisements from this device. May be repeated.
    #[arg(long = "mac", value_name = "MAC")]
    pub macs: Vec<MacAddress>,

    /// Encryption bind key for a device.
    /// Format: --key 54:48:E6:8F:80:A5=231d39c1d7cc1ab1aee224cd096db932
    #[arg(long = "key", value_parser = crate::device_key::parse_device_key, value_name = "MAC=KEY")]
    pub keys: Vec<DeviceKey>,

    /// Verbose output, print decode errors and debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid key for {address}: {source}")]
    InvalidKey {
        address: MacAddress,
        source: DecodeError,
    },
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        verbose: bool,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>> + Send + '_,
        >,
    >;
}

/// Real scanner implementation that delegates to the compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        verbose: bool,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>> + Send + '_,
        >,
    > {
        Box::pin(async move { crate::scanner::start_scan(verbose).await })
    }
}

/// Build a parser with every key from the options registered.
fn build_parser(keys: &[DeviceKey]) -> Result<Parser, RunError> {
    let mut parser = Parser::new();
    for device_key in keys {
        parser
            .register_key(&device_key.address.to_string(), &device_key.key)
            .map_err(|source| RunError::InvalidKey {
                address: device_key.address,
                source,
            })?;
    }
    Ok(parser)
}

/// Run the core processing loop, writing decoded packets to `out` and verbose errors to `err`.
///
/// - Every decoded, non-duplicate packet is written as one `[MAC] packet` line to `out`.
/// - Decode and scanner errors are written to `err` only when `options.verbose` is true.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let mut parser = build_parser(&options.keys)?;

    let mut advertisements = scanner.start_scan(options.verbose).await?;

    while let Some(result) = advertisements.recv().await {
        match result {
            Ok(advertisement) => {
                if !options.macs.is_empty() && !options.macs.contains(&advertisement.mac) {
                    continue;
                }

                let address = advertisement.mac.to_string();
                match parser.parse_pairs(&address, advertisement.pairs()) {
                    Ok(packets) => {
                        for packet in &packets {
                            writeln!(out, "[{address}] {packet}")?;
                        }
                    }
                    Err(decode_err) => {
                        if options.verbose {
                            writeln!(err, "[{address}] Error: {decode_err}")?;
                        }
                    }
                }
            }
            Err(scan_err) => {
                if options.verbose {
                    writeln!(err, "{scan_err}")?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{BATTERY, PACKET_ID, TEMPERATURE};
    use crate::scanner::{Advertisement, ServiceData};
    use crate::test_utils::{TEST_KEY, TEST_MAC, encrypted_payload};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FakeScanner {
        results: Mutex<Vec<AdvertisementResult>>,
    }

    impl FakeScanner {
        fn new(results: Vec<AdvertisementResult>) -> Self {
            Self {
                results: Mutex::new(results),
            }
        }
    }

    impl Scanner for FakeScanner {
        fn start_scan(
            &self,
            _verbose: bool,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>>
                    + Send
                    + '_,
            >,
        > {
            let results = self.results.lock().unwrap().clone();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<AdvertisementResult>(results.len().max(1));
                tokio::spawn(async move {
                    for r in results {
                        let _ = tx.send(r).await;
                    }
                    // drop tx to close channel
                });
                Ok(rx)
            })
        }
    }

    fn options() -> Options {
        Options {
            macs: vec![],
            keys: vec![],
            verbose: false,
        }
    }

    fn advertisement(mac: MacAddress, data: Vec<u8>) -> AdvertisementResult {
        Ok(Advertisement {
            mac,
            service_data: vec![ServiceData::bthome(data)],
        })
    }

    async fn run(options: Options, results: Vec<AdvertisementResult>) -> (String, String) {
        let scanner = FakeScanner::new(results);
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        run_with_io(options, &scanner, &mut out, &mut err)
            .await
            .unwrap();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[tokio::test]
    async fn run_writes_packets_to_out() {
        let (out, err) = run(
            options(),
            vec![advertisement(TEST_MAC, vec![0x40, BATTERY, 0x5a])],
        )
        .await;

        assert!(err.is_empty());
        assert_eq!(
            out,
            "[54:48:E6:8F:80:A5] BTHomePacket{Encrypted: false, Trigger: Interval, \
             Version: 2, ID: 0, Battery: [90]}\n"
        );
    }

    #[tokio::test]
    async fn run_drops_duplicate_packets() {
        let packet = vec![0x40, PACKET_ID, 1, BATTERY, 0x5a];
        let next = vec![0x40, PACKET_ID, 2, BATTERY, 0x59];
        let (out, _) = run(
            options(),
            vec![
                advertisement(TEST_MAC, packet.clone()),
                advertisement(TEST_MAC, packet),
                advertisement(TEST_MAC, next),
            ],
        )
        .await;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("ID: 2"));
    }

    #[tokio::test]
    async fn run_prints_decode_errors_only_when_verbose() {
        let results = vec![advertisement(TEST_MAC, vec![0x40, 0x99])];

        // non-verbose: nothing written
        let (out, err) = run(options(), results.clone()).await;
        assert!(out.is_empty());
        assert!(err.is_empty());

        // verbose: error is written to err
        let mut verbose = options();
        verbose.verbose = true;
        let (out, err) = run(verbose, results).await;
        assert!(out.is_empty());
        assert_eq!(err, "[54:48:E6:8F:80:A5] Error: Unknown object id: 0x99\n");
    }

    #[tokio::test]
    async fn run_prints_scan_errors_only_when_verbose() {
        let results = vec![Err(ScanError::Bluetooth("device vanished".into()))];

        let (_, err) = run(options(), results.clone()).await;
        assert!(err.is_empty());

        let mut verbose = options();
        verbose.verbose = true;
        let (_, err) = run(verbose, results).await;
        assert!(err.contains("Bluetooth error: device vanished"));
    }

    #[tokio::test]
    async fn run_filters_by_mac() {
        let other = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let mut filtered = options();
        filtered.macs = vec![other];

        let (out, _) = run(
            filtered,
            vec![
                advertisement(TEST_MAC, vec![0x40, BATTERY, 1]),
                advertisement(other, vec![0x40, BATTERY, 2]),
            ],
        )
        .await;

        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("[11:22:33:44:55:66]"));
        assert!(out.contains("Battery: [2]"));
    }

    #[tokio::test]
    async fn run_decrypts_with_configured_key() {
        let mut with_key = options();
        with_key.keys = vec![DeviceKey {
            address: TEST_MAC,
            key: TEST_KEY.to_string(),
        }];

        let data = encrypted_payload(0x41, 7, &[PACKET_ID, 4, TEMPERATURE, 0xd7, 0x00]);
        let (out, err) = run(with_key, vec![advertisement(TEST_MAC, data)]).await;

        assert!(err.is_empty());
        assert!(out.contains("Encrypted: true"));
        assert!(out.contains("Counter: 7"));
        assert!(out.contains("Temperature: [21.50]"));
    }

    #[tokio::test]
    async fn run_rejects_invalid_key() {
        let mut bad_key = options();
        bad_key.keys = vec![DeviceKey {
            address: TEST_MAC,
            key: "abcd".to_string(),
        }];

        let scanner = FakeScanner::new(vec![]);
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let result = run_with_io(bad_key, &scanner, &mut out, &mut err).await;

        assert!(matches!(
            result,
            Err(RunError::InvalidKey { address, .. }) if address == TEST_MAC
        ));
    }
}
