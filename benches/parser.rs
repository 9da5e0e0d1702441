//! Benchmarks for BTHome payload decoding.
//!
//! Measures the parser on its own (no scanner, no async runtime) for plain
//! and encrypted payloads.

use bthome_listener::{BTHOME_UUID, DeviceCipher, MacAddress, Parser};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

const TEST_MAC: MacAddress = MacAddress([0x54, 0x48, 0xE6, 0x8F, 0x80, 0xA5]);
const TEST_ADDRESS: &str = "54:48:E6:8F:80:A5";
const TEST_KEY: &str = "231d39c1d7cc1ab1aee224cd096db932";

/// Object stream of a typical temperature/humidity sensor
fn objects() -> Vec<u8> {
    vec![
        0x00, 0x11, // packet id 17
        0x01, 0x5a, // battery 90%
        0x45, 0xd7, 0x00, // temperature 21.5
        0x2e, 0x37, // humidity 55%
        0xf1, 0x01, 0x00, 0x02, 0x04, // firmware 4.2.0.1
    ]
}

fn plain_payload() -> Vec<u8> {
    let mut payload = vec![0x40];
    payload.extend(objects());
    payload
}

fn encrypted_payload() -> Vec<u8> {
    let cipher = DeviceCipher::from_hex(TEST_KEY).unwrap();
    let mut payload = vec![0x41];
    payload.extend(cipher.encrypt(TEST_MAC, 0x41, 1, &objects()).unwrap());
    payload
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    // no address, so duplicate suppression never drops the repeated payload
    let plain = plain_payload();
    let mut parser = Parser::new();
    group.bench_function("plain", |b| {
        b.iter(|| {
            let packets = parser
                .parse("", &[Some(&BTHOME_UUID[..]), Some(black_box(&plain[..]))])
                .unwrap();
            black_box(packets)
        })
    });

    // duplicate suppression needs an address here, so the same payload is
    // dropped after the first iteration and only decryption is measured
    let encrypted = encrypted_payload();
    let mut parser = Parser::new();
    parser.register_key(TEST_ADDRESS, TEST_KEY).unwrap();
    group.bench_function("encrypted", |b| {
        b.iter(|| {
            let packets = parser
                .parse(
                    TEST_ADDRESS,
                    &[Some(&BTHOME_UUID[..]), Some(black_box(&encrypted[..]))],
                )
                .unwrap();
            black_box(packets)
        })
    });

    group.finish();
}

fn bench_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("cipher");
    group.throughput(Throughput::Elements(1));

    let cipher = DeviceCipher::from_hex(TEST_KEY).unwrap();
    let blob = encrypted_payload()[1..].to_vec();
    group.bench_function("decrypt", |b| {
        b.iter(|| black_box(cipher.decrypt(TEST_MAC, 0x41, black_box(&blob)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_cipher);
criterion_main!(benches);
