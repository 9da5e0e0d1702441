use crate::crypto::DeviceCipher;
use crate::mac_address::MacAddress;

/// Address and bind key of the encrypted example in the BTHome docs.
pub const TEST_MAC: MacAddress = MacAddress([0x54, 0x48, 0xE6, 0x8F, 0x80, 0xA5]);
pub const TEST_ADDRESS: &str = "54:48:E6:8F:80:A5";
pub const TEST_KEY: &str = "231d39c1d7cc1ab1aee224cd096db932";

/// Build a complete encrypted service data payload (header included) for
/// `TEST_MAC` under `TEST_KEY`.
pub fn encrypted_payload(header: u8, counter: u32, objects: &[u8]) -> Vec<u8> {
    let cipher = DeviceCipher::from_hex(TEST_KEY).unwrap();
    let mut payload = vec![header];
    payload.extend(cipher.encrypt(TEST_MAC, header, counter, objects).unwrap());
    payload
}
